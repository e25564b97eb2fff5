use clap::Parser;
use miette::{IntoDiagnostic, Result};
use shopkeep::application::accounts::AccountService;
use shopkeep::application::engine::ShopEngine;
use shopkeep::config::Settings;
use shopkeep::domain::ports::StorageRef;
use shopkeep::infrastructure::in_memory::InMemoryStorage;
use shopkeep::interfaces::csv::catalog_reader::CatalogReader;
use shopkeep::interfaces::terminal::Terminal;
use shopkeep::telemetry;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to `shopkeep.toml` when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Products CSV file to seed the catalog with.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    if cli.db_path.is_some() {
        settings.db_path = cli.db_path;
    }
    if cli.catalog.is_some() {
        settings.catalog_path = cli.catalog;
    }
    telemetry::init(&settings.log);

    let storage = open_storage(&settings)?;
    let engine = ShopEngine::new(storage.clone(), settings.retry.clone());
    let accounts = AccountService::new(storage, settings.retry.clone(), settings.minimum_age);

    if let Some(path) = &settings.catalog_path {
        seed_catalog(&engine, path).await?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    Terminal::new(&engine, &accounts, stdin.lock(), stdout.lock())
        .run()
        .await
        .into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(settings: &Settings) -> Result<StorageRef> {
    use shopkeep::infrastructure::rocksdb::RocksDbStorage;

    let storage: StorageRef = match &settings.db_path {
        Some(db_path) => Arc::new(
            RocksDbStorage::open(db_path, settings.lock_timeout()).into_diagnostic()?,
        ),
        None => Arc::new(InMemoryStorage::new(settings.lock_timeout())),
    };
    Ok(storage)
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(settings: &Settings) -> Result<StorageRef> {
    if let Some(db_path) = &settings.db_path {
        tracing::warn!(
            db_path = %db_path.display(),
            "Persistent storage requested, but the 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(Arc::new(InMemoryStorage::new(settings.lock_timeout())))
}

async fn seed_catalog(engine: &ShopEngine, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let reader = CatalogReader::new(file);

    let mut products = Vec::new();
    for product_result in reader.products() {
        match product_result {
            Ok(product) => products.push(product),
            Err(e) => tracing::warn!(error = %e, "skipping malformed catalog row"),
        }
    }

    let inserted = engine.seed_catalog(&products).await.into_diagnostic()?;
    tracing::info!(path = %path.display(), inserted, read = products.len(), "catalog file loaded");
    Ok(())
}
