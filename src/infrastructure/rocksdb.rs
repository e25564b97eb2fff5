use crate::domain::cart::{CartLine, UserId};
use crate::domain::order::{NewOrderLine, OrderId, OrderLine, newest_first};
use crate::domain::ports::{
    CartStore, CatalogStore, OrderStore, Storage, StoreTransaction, UserStore,
};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::{NewUser, User};
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for product records, keyed by product id.
pub const CF_PRODUCTS: &str = "products";
/// Column Family for cart lines, keyed by user id then product id.
pub const CF_CART: &str = "cart";
/// Column Family for the order ledger, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for users, keyed by username.
pub const CF_USERS: &str = "users";
/// Column Family for id sequences.
pub const CF_META: &str = "meta";

const ALL_CFS: [&str; 5] = [CF_PRODUCTS, CF_CART, CF_ORDERS, CF_USERS, CF_META];

const LAST_ORDER_ID: &[u8] = b"last_order_id";
const LAST_USER_ID: &[u8] = b"last_user_id";

/// A persistent store implementation using RocksDB.
///
/// Each table lives in its own Column Family and records are stored as JSON.
/// A transaction holds the store's commit lock, stages its writes in memory
/// and applies them with a single atomic `WriteBatch` on commit.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStorage {
    db: Arc<DB>,
    lock: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl RocksDbStorage {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that every column family exists.
    pub fn open<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            lock: Arc::new(Mutex::new(())),
            lock_timeout,
        })
    }
}

#[async_trait]
impl Storage for RocksDbStorage {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.lock.clone().lock_owned())
            .await
            .map_err(|_| {
                ShopError::StorageConflict(format!(
                    "store busy for more than {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;
        Ok(Box::new(RocksDbTransaction {
            db: self.db.clone(),
            _guard: guard,
            staged: BTreeMap::new(),
        }))
    }
}

type StagedKey = (&'static str, Vec<u8>);

struct RocksDbTransaction {
    db: Arc<DB>,
    _guard: OwnedMutexGuard<()>,
    /// Pending writes; `None` marks a delete.
    staged: BTreeMap<StagedKey, Option<Vec<u8>>>,
}

impl RocksDbTransaction {
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ShopError::storage(format!("{name} column family not found"))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &'static str, key: &[u8]) -> Result<Option<T>> {
        let bytes = match self.staged.get(&(cf_name, key.to_vec())) {
            Some(staged) => staged.clone(),
            None => self.db.get_cf(self.cf(cf_name)?, key)?,
        };
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(ShopError::from))
            .transpose()
    }

    fn stage<T: Serialize>(
        &mut self,
        cf_name: &'static str,
        key: Vec<u8>,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert((cf_name, key), Some(bytes));
        Ok(())
    }

    fn stage_delete(&mut self, cf_name: &'static str, key: Vec<u8>) {
        self.staged.insert((cf_name, key), None);
    }

    /// All records whose key starts with `prefix`, staged writes included.
    fn scan<T: DeserializeOwned>(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let mut rows: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        let iter = self
            .db
            .iterator_cf(self.cf(cf_name)?, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.insert(key.to_vec(), value.to_vec());
        }

        for ((cf, key), value) in &self.staged {
            if *cf != cf_name || !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(bytes) => rows.insert(key.clone(), bytes.clone()),
                None => rows.remove(key),
            };
        }

        rows.values()
            .map(|b| serde_json::from_slice(b).map_err(ShopError::from))
            .collect()
    }

    fn next_id(&mut self, key: &'static [u8]) -> Result<u64> {
        let last: u64 = self.read(CF_META, key)?.unwrap_or(0);
        let next = last + 1;
        self.stage(CF_META, key.to_vec(), &next)?;
        Ok(next)
    }
}

fn cart_key(user_id: UserId, product_id: ProductId) -> Vec<u8> {
    let mut key = user_id.to_be_bytes().to_vec();
    key.extend_from_slice(&product_id.to_be_bytes());
    key
}

#[async_trait]
impl CatalogStore for RocksDbTransaction {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        self.read(CF_PRODUCTS, &product_id.to_be_bytes())
    }

    async fn put_product(&mut self, product: Product) -> Result<()> {
        self.stage(CF_PRODUCTS, product.id.to_be_bytes().to_vec(), &product)
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        self.scan(CF_PRODUCTS, &[])
    }
}

#[async_trait]
impl CartStore for RocksDbTransaction {
    async fn get_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        self.read(CF_CART, &cart_key(user_id, product_id))
    }

    async fn put_line(&mut self, line: CartLine) -> Result<()> {
        self.stage(CF_CART, cart_key(line.user_id, line.product_id), &line)
    }

    async fn delete_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()> {
        self.stage_delete(CF_CART, cart_key(user_id, product_id));
        Ok(())
    }

    async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        self.scan(CF_CART, &user_id.to_be_bytes())
    }
}

#[async_trait]
impl OrderStore for RocksDbTransaction {
    async fn append(&mut self, line: NewOrderLine) -> Result<OrderLine> {
        let order_id: OrderId = self.next_id(LAST_ORDER_ID)?;
        let order = line.with_id(order_id);
        self.stage(CF_ORDERS, order_id.to_be_bytes().to_vec(), &order)?;
        Ok(order)
    }

    async fn history_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderLine>> {
        let mut lines: Vec<OrderLine> = self.scan(CF_ORDERS, &[])?;
        lines.retain(|o| o.user_id == user_id);
        newest_first(&mut lines);
        Ok(lines)
    }
}

#[async_trait]
impl UserStore for RocksDbTransaction {
    async fn get_user_by_name(&mut self, username: &str) -> Result<Option<User>> {
        self.read(CF_USERS, username.as_bytes())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.get_user_by_name(&user.username).await?.is_some() {
            return Err(ShopError::UsernameTaken(user.username));
        }
        let id = UserId::try_from(self.next_id(LAST_USER_ID)?)
            .map_err(|_| ShopError::storage("user id space exhausted"))?;
        let user = user.with_id(id);
        self.stage(CF_USERS, user.username.as_bytes().to_vec(), &user)?;
        Ok(user)
    }
}

#[async_trait]
impl StoreTransaction for RocksDbTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for ((cf_name, key), value) in &self.staged {
            let cf = self.cf(cf_name)?;
            match value {
                Some(bytes) => batch.put_cf(cf, key, bytes),
                None => batch.delete_cf(cf, key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}
