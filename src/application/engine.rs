use super::retry::with_retry;
use crate::config::RetrySettings;
use crate::domain::cart::{CartEntry, CartLine, CartView, Quantity, UserId};
use crate::domain::order::{NewOrderLine, OrderHistoryEntry, Receipt, ReceiptLine};
use crate::domain::ports::{CartStore, CatalogStore, OrderStore, StorageRef};
use crate::domain::product::{Money, Product, ProductId};
use crate::error::{Missing, Result, ShopError};
use chrono::Utc;
use std::collections::HashMap;

/// Keeps stock, carts and the order ledger consistent with each other.
///
/// Stock is reserved when a product is added to a cart, released when it is
/// removed, and a purchase only moves reserved lines into the ledger. Every
/// operation runs in one storage transaction, so it either applies fully or
/// not at all. Storage conflicts are retried according to the retry policy.
pub struct ShopEngine {
    storage: StorageRef,
    retry: RetrySettings,
}

impl ShopEngine {
    /// Creates a new `ShopEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `storage` - The backend holding products, carts and orders.
    /// * `retry` - How storage conflicts are retried.
    pub fn new(storage: StorageRef, retry: RetrySettings) -> Self {
        Self { storage, retry }
    }

    /// Reserves `quantity` units of a product for the user's cart.
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartLine> {
        let quantity = Quantity::new(quantity)?;
        let result = with_retry(&self.retry, || self.reserve(user_id, product_id, quantity)).await;
        log_outcome("add_to_cart", user_id, &result);
        result
    }

    async fn reserve(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartLine> {
        let mut tx = self.storage.begin().await?;

        let available = tx.get_stock(product_id).await?;
        if available < quantity.value() {
            return Err(ShopError::InsufficientStock {
                product_id,
                requested: u64::from(quantity.value()),
                available,
            });
        }

        let line = tx.upsert(user_id, product_id, quantity).await?;
        let product = tx.adjust_stock(product_id, -i64::from(quantity)).await?;
        tx.commit().await?;

        tracing::info!(
            user_id,
            product_id,
            quantity = quantity.value(),
            reserved = line.quantity.value(),
            stock = product.stock,
            "stock reserved"
        );
        Ok(line)
    }

    /// Releases `quantity` reserved units back into stock.
    pub async fn remove_from_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        let quantity = Quantity::new(quantity)?;
        let result = with_retry(&self.retry, || self.release(user_id, product_id, quantity)).await;
        log_outcome("remove_from_cart", user_id, &result);
        result
    }

    async fn release(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<()> {
        let mut tx = self.storage.begin().await?;

        let line = tx
            .get_line(user_id, product_id)
            .await?
            .ok_or(ShopError::NotFound(Missing::CartLine {
                user_id,
                product_id,
            }))?;
        if quantity > line.quantity {
            return Err(ShopError::InsufficientCartQuantity {
                product_id,
                requested: quantity.value(),
                reserved: line.quantity.value(),
            });
        }

        tx.reduce(user_id, product_id, quantity).await?;
        let product = tx.adjust_stock(product_id, i64::from(quantity)).await?;
        tx.commit().await?;

        tracing::info!(
            user_id,
            product_id,
            quantity = quantity.value(),
            stock = product.stock,
            "reservation released"
        );
        Ok(())
    }

    /// Converts every reserved cart line into an order line.
    ///
    /// Unit prices are captured now. Stock is left alone: it was taken when
    /// the lines were reserved.
    pub async fn complete_purchase(&self, user_id: UserId) -> Result<Receipt> {
        let result = with_retry(&self.retry, || self.checkout(user_id)).await;
        log_outcome("complete_purchase", user_id, &result);
        result
    }

    async fn checkout(&self, user_id: UserId) -> Result<Receipt> {
        let mut tx = self.storage.begin().await?;

        let cart = tx.list_for_user(user_id).await?;
        if cart.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        let placed_at = Utc::now();
        let mut lines = Vec::with_capacity(cart.len());
        for line in cart {
            let product = require_product(tx.as_mut(), line.product_id).await?;
            let order = tx
                .append(NewOrderLine {
                    user_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: product.unit_price,
                    placed_at,
                })
                .await?;
            let line_total = order.line_total()?;
            lines.push(ReceiptLine {
                order,
                product_name: product.name,
                line_total,
            });
        }
        let grand_total = Money::total(lines.iter().map(|l| l.line_total))?;

        tx.clear_for_user(user_id).await?;
        tx.commit().await?;

        tracing::info!(
            user_id,
            lines = lines.len(),
            grand_total = %grand_total,
            "purchase completed"
        );
        Ok(Receipt { lines, grand_total })
    }

    /// The user's reserved lines priced at current catalog prices.
    pub async fn view_cart(&self, user_id: UserId) -> Result<CartView> {
        with_retry(&self.retry, || self.load_cart(user_id)).await
    }

    async fn load_cart(&self, user_id: UserId) -> Result<CartView> {
        let mut tx = self.storage.begin().await?;
        let mut entries = Vec::new();
        for line in tx.list_for_user(user_id).await? {
            let product = require_product(tx.as_mut(), line.product_id).await?;
            let quantity = line.quantity.value();
            entries.push(CartEntry {
                product_id: product.id,
                product_name: product.name,
                quantity,
                unit_price: product.unit_price,
                line_total: product.unit_price.times(quantity)?,
            });
        }
        let total = Money::total(entries.iter().map(|e| e.line_total))?;
        Ok(CartView { entries, total })
    }

    /// Past purchases, newest first.
    pub async fn view_order_history(&self, user_id: UserId) -> Result<Vec<OrderHistoryEntry>> {
        with_retry(&self.retry, || self.load_history(user_id)).await
    }

    async fn load_history(&self, user_id: UserId) -> Result<Vec<OrderHistoryEntry>> {
        let mut tx = self.storage.begin().await?;
        let orders = tx.history_for_user(user_id).await?;

        // Products are never deleted today, but history must outlive them.
        let mut names: HashMap<ProductId, String> = HashMap::new();
        let mut entries = Vec::with_capacity(orders.len());
        for order in orders {
            if !names.contains_key(&order.product_id) {
                let name = match tx.get_product(order.product_id).await? {
                    Some(product) => product.name,
                    None => format!("product #{}", order.product_id),
                };
                names.insert(order.product_id, name);
            }
            entries.push(OrderHistoryEntry {
                order_id: order.order_id,
                product_id: order.product_id,
                product_name: names[&order.product_id].clone(),
                quantity: order.quantity.value(),
                unit_price: order.unit_price,
                line_total: order.line_total()?,
                placed_at: order.placed_at,
            });
        }
        Ok(entries)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        with_retry(&self.retry, || self.load_products(None)).await
    }

    /// Case-insensitive substring search over product names.
    pub async fn search_products(&self, needle: &str) -> Result<Vec<Product>> {
        with_retry(&self.retry, || self.load_products(Some(needle))).await
    }

    async fn load_products(&self, needle: Option<&str>) -> Result<Vec<Product>> {
        let mut tx = self.storage.begin().await?;
        match needle {
            Some(needle) => tx.search_by_name(needle).await,
            None => tx.list_products().await,
        }
    }

    /// Adds products that are not in the catalog yet.
    ///
    /// Existing products are left untouched so a persistent catalog keeps its
    /// live stock. Returns how many products were inserted.
    pub async fn seed_catalog(&self, products: &[Product]) -> Result<usize> {
        let inserted = with_retry(&self.retry, || self.insert_missing(products)).await?;
        tracing::info!(inserted, offered = products.len(), "catalog seeded");
        Ok(inserted)
    }

    async fn insert_missing(&self, products: &[Product]) -> Result<usize> {
        let mut tx = self.storage.begin().await?;
        let mut inserted = 0;
        for product in products {
            if tx.get_product(product.id).await?.is_none() {
                tx.put_product(product.clone()).await?;
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

async fn require_product<S>(tx: &mut S, product_id: ProductId) -> Result<Product>
where
    S: CatalogStore + ?Sized,
{
    tx.get_product(product_id)
        .await?
        .ok_or(ShopError::NotFound(Missing::Product(product_id)))
}

fn log_outcome<T>(operation: &'static str, user_id: UserId, result: &Result<T>) {
    match result {
        Ok(_) => {}
        Err(err @ ShopError::StorageFailure(_)) => {
            tracing::error!(operation, user_id, error = %err, "storage failure");
        }
        Err(err) => {
            tracing::warn!(operation, user_id, error = %err, "operation rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Storage;
    use crate::infrastructure::in_memory::InMemoryStorage;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    const USER: UserId = 1;
    const P1: ProductId = 1;

    async fn engine_with(products: &[Product]) -> (ShopEngine, InMemoryStorage) {
        let storage = InMemoryStorage::default();
        let engine = ShopEngine::new(Arc::new(storage.clone()), RetrySettings::default());
        engine.seed_catalog(products).await.unwrap();
        (engine, storage)
    }

    async fn stock_of(engine: &ShopEngine, product_id: ProductId) -> u32 {
        engine
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.id == product_id)
            .unwrap()
            .stock
    }

    async fn reserved(engine: &ShopEngine, user_id: UserId, product_id: ProductId) -> u32 {
        engine
            .view_cart(user_id)
            .await
            .unwrap()
            .entries
            .iter()
            .find(|e| e.product_id == product_id)
            .map_or(0, |e| e.quantity)
    }

    #[tokio::test]
    async fn test_reservation_scenario() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;

        let line = engine.add_to_cart(USER, P1, 4).await.unwrap();
        assert_eq!(line.quantity.value(), 4);
        assert_eq!(stock_of(&engine, P1).await, 6);

        let line = engine.add_to_cart(USER, P1, 3).await.unwrap();
        assert_eq!(line.quantity.value(), 7);
        assert_eq!(stock_of(&engine, P1).await, 3);

        engine.remove_from_cart(USER, P1, 2).await.unwrap();
        assert_eq!(stock_of(&engine, P1).await, 5);
        assert_eq!(reserved(&engine, USER, P1).await, 5);

        let receipt = engine.complete_purchase(USER).await.unwrap();
        assert_eq!(receipt.lines.len(), 1);
        let order = &receipt.lines[0].order;
        assert_eq!(order.user_id, USER);
        assert_eq!(order.product_id, P1);
        assert_eq!(order.quantity.value(), 5);
        assert_eq!(order.unit_price, Money::new(dec!(12.50)));
        assert_eq!(receipt.grand_total, Money::new(dec!(62.50)));

        assert!(engine.view_cart(USER).await.unwrap().is_empty());
        assert_eq!(stock_of(&engine, P1).await, 5);
    }

    #[tokio::test]
    async fn test_add_with_no_stock_changes_nothing() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 0)]).await;

        let result = engine.add_to_cart(USER, P1, 1).await;
        assert!(matches!(
            result,
            Err(ShopError::InsufficientStock {
                requested: 1,
                available: 0,
                ..
            })
        ));
        assert_eq!(stock_of(&engine, P1).await, 0);
        assert!(engine.view_cart(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_validates_input_and_product() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;

        assert!(matches!(
            engine.add_to_cart(USER, P1, 0).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.add_to_cart(USER, P1, -2).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.add_to_cart(USER, 99, 1).await,
            Err(ShopError::NotFound(Missing::Product(99)))
        ));
        assert_eq!(stock_of(&engine, P1).await, 10);
    }

    #[tokio::test]
    async fn test_remove_errors_leave_state_alone() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;

        assert!(matches!(
            engine.remove_from_cart(USER, P1, 1).await,
            Err(ShopError::NotFound(Missing::CartLine { .. }))
        ));

        engine.add_to_cart(USER, P1, 3).await.unwrap();
        assert!(matches!(
            engine.remove_from_cart(USER, P1, 4).await,
            Err(ShopError::InsufficientCartQuantity {
                requested: 4,
                reserved: 3,
                ..
            })
        ));
        assert!(matches!(
            engine.remove_from_cart(USER, P1, 0).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert_eq!(stock_of(&engine, P1).await, 7);
        assert_eq!(reserved(&engine, USER, P1).await, 3);
    }

    #[tokio::test]
    async fn test_add_then_remove_round_trips() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;

        engine.add_to_cart(USER, P1, 6).await.unwrap();
        engine.remove_from_cart(USER, P1, 6).await.unwrap();

        assert_eq!(stock_of(&engine, P1).await, 10);
        assert!(engine.view_cart(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_with_empty_cart() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;

        assert!(matches!(
            engine.complete_purchase(USER).await,
            Err(ShopError::EmptyCart)
        ));
        assert!(engine.view_order_history(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_snapshots_price() {
        let (engine, storage) = engine_with(&[
            Product::new(1, "Lager", dec!(12.50), 10),
            Product::new(2, "Stout", dec!(30.00), 10),
        ])
        .await;
        engine.add_to_cart(USER, 1, 2).await.unwrap();
        engine.add_to_cart(USER, 2, 1).await.unwrap();

        let receipt = engine.complete_purchase(USER).await.unwrap();
        assert_eq!(receipt.grand_total, Money::new(dec!(55.00)));

        // Reprice after the sale; history must keep the old price.
        let mut tx = storage.begin().await.unwrap();
        let mut lager = tx.get_product(1).await.unwrap().unwrap();
        lager.unit_price = Money::new(dec!(99.00));
        tx.put_product(lager).await.unwrap();
        tx.commit().await.unwrap();

        let history = engine.view_order_history(USER).await.unwrap();
        assert_eq!(history.len(), 2);
        let lager_line = history.iter().find(|h| h.product_name == "Lager").unwrap();
        assert_eq!(lager_line.unit_price, Money::new(dec!(12.50)));
        assert_eq!(lager_line.line_total, Money::new(dec!(25.00)));
    }

    #[tokio::test]
    async fn test_purchase_rolls_back_when_a_product_is_missing() {
        let (engine, storage) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;
        engine.add_to_cart(USER, P1, 3).await.unwrap();

        // A cart line whose product is no longer in the catalog.
        let mut tx = storage.begin().await.unwrap();
        tx.upsert(USER, 99, Quantity::new(1).unwrap()).await.unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            engine.complete_purchase(USER).await,
            Err(ShopError::NotFound(Missing::Product(99)))
        ));

        assert!(engine.view_order_history(USER).await.unwrap().is_empty());
        assert_eq!(stock_of(&engine, P1).await, 7);
        let mut tx = storage.begin().await.unwrap();
        let lines = tx.list_for_user(USER).await.unwrap();
        assert_eq!(lines.len(), 2);
        let lager = lines.iter().find(|l| l.product_id == P1).unwrap();
        assert_eq!(lager.quantity.value(), 3);
    }

    #[tokio::test]
    async fn test_price_overflow_is_rejected_without_changes() {
        let (engine, storage) =
            engine_with(&[Product::new(P1, "Gold", rust_decimal::Decimal::MAX, 5)]).await;
        engine.add_to_cart(USER, P1, 2).await.unwrap();

        assert!(matches!(
            engine.view_cart(USER).await,
            Err(ShopError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.complete_purchase(USER).await,
            Err(ShopError::InvalidInput(_))
        ));

        assert!(engine.view_order_history(USER).await.unwrap().is_empty());
        assert_eq!(stock_of(&engine, P1).await, 3);
        let mut tx = storage.begin().await.unwrap();
        let line = tx.get_line(USER, P1).await.unwrap().unwrap();
        assert_eq!(line.quantity.value(), 2);
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let (engine, _) = engine_with(&[Product::new(P1, "Lager", dec!(12.50), 10)]).await;
        engine.add_to_cart(1, P1, 2).await.unwrap();
        engine.add_to_cart(2, P1, 3).await.unwrap();

        engine.complete_purchase(1).await.unwrap();

        assert!(engine.view_cart(1).await.unwrap().is_empty());
        assert_eq!(reserved(&engine, 2, P1).await, 3);
        assert!(engine.view_order_history(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_does_not_reset_existing_stock() {
        let lager = Product::new(P1, "Lager", dec!(12.50), 10);
        let (engine, _) = engine_with(std::slice::from_ref(&lager)).await;
        engine.add_to_cart(USER, P1, 4).await.unwrap();

        let inserted = engine
            .seed_catalog(&[lager, Product::new(2, "Stout", dec!(30.00), 5)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(stock_of(&engine, P1).await, 6);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_retries() {
        let storage = InMemoryStorage::new(Duration::from_millis(10));
        let retry = RetrySettings {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        let engine = ShopEngine::new(Arc::new(storage.clone()), retry);
        engine
            .seed_catalog(&[Product::new(P1, "Lager", dec!(12.50), 10)])
            .await
            .unwrap();

        let held = storage.begin().await.unwrap();
        let result = engine.add_to_cart(USER, P1, 1).await;
        assert!(matches!(result, Err(ShopError::StorageConflict(_))));
        drop(held);

        assert_eq!(stock_of(&engine, P1).await, 10);
    }

    #[tokio::test]
    async fn test_retry_succeeds_once_store_is_released() {
        let storage = InMemoryStorage::new(Duration::from_millis(20));
        let retry = RetrySettings {
            max_attempts: 10,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        };
        let engine = ShopEngine::new(Arc::new(storage.clone()), retry);
        engine
            .seed_catalog(&[Product::new(P1, "Lager", dec!(12.50), 10)])
            .await
            .unwrap();

        let held = storage.begin().await.unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(held);
        });

        engine.add_to_cart(USER, P1, 2).await.unwrap();
        release.await.unwrap();
        assert_eq!(stock_of(&engine, P1).await, 8);
    }
}
