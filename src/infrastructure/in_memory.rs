use crate::domain::cart::{CartLine, UserId};
use crate::domain::order::{NewOrderLine, OrderId, OrderLine, newest_first};
use crate::domain::ports::{
    CartStore, CatalogStore, OrderStore, Storage, StoreTransaction, UserStore,
};
use crate::domain::product::{Product, ProductId};
use crate::domain::user::{NewUser, User};
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    cart: BTreeMap<(UserId, ProductId), CartLine>,
    orders: BTreeMap<OrderId, OrderLine>,
    users: BTreeMap<String, User>,
    last_order_id: OrderId,
    last_user_id: UserId,
}

/// A process-local store for products, carts, orders and users.
///
/// Transactions take the single table lock for their whole lifetime and
/// work on a private copy that replaces the tables on commit, so they are
/// serializable and all-or-nothing. Used for tests and for sessions that do
/// not need persistence.
#[derive(Clone)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl InMemoryStorage {
    /// Creates a new, empty store.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout,
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| {
                ShopError::StorageConflict(format!(
                    "store busy for more than {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl CatalogStore for InMemoryTransaction {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn put_product(&mut self, product: Product) -> Result<()> {
        self.working.products.insert(product.id, product);
        Ok(())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        Ok(self.working.products.values().cloned().collect())
    }
}

#[async_trait]
impl CartStore for InMemoryTransaction {
    async fn get_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        Ok(self.working.cart.get(&(user_id, product_id)).cloned())
    }

    async fn put_line(&mut self, line: CartLine) -> Result<()> {
        self.working.cart.insert((line.user_id, line.product_id), line);
        Ok(())
    }

    async fn delete_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()> {
        self.working.cart.remove(&(user_id, product_id));
        Ok(())
    }

    async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .working
            .cart
            .range((user_id, ProductId::MIN)..=(user_id, ProductId::MAX))
            .map(|(_, line)| line.clone())
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryTransaction {
    async fn append(&mut self, line: NewOrderLine) -> Result<OrderLine> {
        self.working.last_order_id += 1;
        let order = line.with_id(self.working.last_order_id);
        self.working.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    async fn history_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderLine>> {
        let mut lines: Vec<OrderLine> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut lines);
        Ok(lines)
    }
}

#[async_trait]
impl UserStore for InMemoryTransaction {
    async fn get_user_by_name(&mut self, username: &str) -> Result<Option<User>> {
        Ok(self.working.users.get(username).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.working.users.contains_key(&user.username) {
            return Err(ShopError::UsernameTaken(user.username));
        }
        self.working.last_user_id += 1;
        let user = user.with_id(self.working.last_user_id);
        self.working.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
