#![allow(dead_code)]

use rust_decimal_macros::dec;
use shopkeep::application::engine::ShopEngine;
use shopkeep::config::RetrySettings;
use shopkeep::domain::ports::StorageRef;
use shopkeep::domain::product::{Product, ProductId};
use shopkeep::infrastructure::in_memory::InMemoryStorage;
use std::sync::Arc;

pub fn catalog() -> Vec<Product> {
    vec![
        Product::new(1, "Pale Ale", dec!(24.90), 12),
        Product::new(2, "Dry Cider", dec!(15.00), 4),
        Product::new(3, "Stout", dec!(32.50), 0),
    ]
}

/// An engine over fresh in-memory storage seeded with `products`.
pub async fn engine_with(products: &[Product]) -> (ShopEngine, StorageRef) {
    let storage: StorageRef = Arc::new(InMemoryStorage::default());
    let engine = ShopEngine::new(storage.clone(), RetrySettings::default());
    engine.seed_catalog(products).await.unwrap();
    (engine, storage)
}

pub async fn stock_of(engine: &ShopEngine, product_id: ProductId) -> u32 {
    engine
        .list_products()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.id == product_id)
        .map(|p| p.stock)
        .unwrap()
}

/// Sum of stock, reserved and ordered units for a product across `users`.
pub async fn accounted_units(engine: &ShopEngine, product_id: ProductId, users: &[u32]) -> u64 {
    let mut total = u64::from(stock_of(engine, product_id).await);
    for &user in users {
        let cart = engine.view_cart(user).await.unwrap();
        total += cart
            .entries
            .iter()
            .filter(|e| e.product_id == product_id)
            .map(|e| u64::from(e.quantity))
            .sum::<u64>();
        let history = engine.view_order_history(user).await.unwrap();
        total += history
            .iter()
            .filter(|e| e.product_id == product_id)
            .map(|e| u64::from(e.quantity))
            .sum::<u64>();
    }
    total
}

