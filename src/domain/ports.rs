//! Storage contracts the application layer is written against.
//!
//! A backend hands out a [`StoreTransaction`] from [`Storage::begin`]. Every
//! read and write made through it is isolated from other transactions, and
//! nothing becomes visible until [`StoreTransaction::commit`] succeeds.
//! Dropping a transaction without committing discards its writes.
//!
//! Backends only implement the primitive record accessors; the contract rules
//! (stock guard, cart merge/reduce, idempotent clear) are provided methods so
//! every backend enforces them identically.

use super::cart::{CartLine, Quantity, UserId};
use super::order::{NewOrderLine, OrderLine};
use super::product::{Product, ProductId};
use super::user::{NewUser, User};
use crate::error::{Missing, Result, ShopError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CatalogStore: Send {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;
    async fn put_product(&mut self, product: Product) -> Result<()>;
    async fn list_products(&mut self) -> Result<Vec<Product>>;

    async fn get_stock(&mut self, product_id: ProductId) -> Result<u32> {
        self.get_product(product_id)
            .await?
            .map(|p| p.stock)
            .ok_or(ShopError::NotFound(Missing::Product(product_id)))
    }

    /// Applies `stock += delta`. A last-resort guard: callers check stock first.
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<Product> {
        let mut product = self
            .get_product(product_id)
            .await?
            .ok_or(ShopError::NotFound(Missing::Product(product_id)))?;
        product.adjust_stock(delta)?;
        self.put_product(product.clone()).await?;
        Ok(product)
    }

    async fn search_by_name(&mut self, needle: &str) -> Result<Vec<Product>> {
        let mut products = self.list_products().await?;
        products.retain(|p| p.name_matches(needle));
        Ok(products)
    }
}

#[async_trait]
pub trait CartStore: Send {
    async fn get_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>>;
    async fn put_line(&mut self, line: CartLine) -> Result<()>;
    async fn delete_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()>;
    async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Creates the line or adds to its quantity.
    async fn upsert(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartLine> {
        let line = match self.get_line(user_id, product_id).await? {
            Some(mut line) => {
                line.merge(quantity)?;
                line
            }
            None => CartLine::new(user_id, product_id, quantity),
        };
        self.put_line(line.clone()).await?;
        Ok(line)
    }

    /// Decrements the line, deleting it when it reaches zero.
    async fn reduce(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<()> {
        let line = self
            .get_line(user_id, product_id)
            .await?
            .ok_or(ShopError::NotFound(Missing::CartLine {
                user_id,
                product_id,
            }))?;
        match line.reduce(quantity)? {
            Some(left) => self.put_line(left).await,
            None => self.delete_line(user_id, product_id).await,
        }
    }

    async fn clear_for_user(&mut self, user_id: UserId) -> Result<()> {
        for line in self.list_for_user(user_id).await? {
            self.delete_line(line.user_id, line.product_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait OrderStore: Send {
    /// Stores the line under a freshly generated, never reused id.
    async fn append(&mut self, line: NewOrderLine) -> Result<OrderLine>;
    /// Newest first.
    async fn history_for_user(&mut self, user_id: UserId) -> Result<Vec<OrderLine>>;
}

#[async_trait]
pub trait UserStore: Send {
    async fn get_user_by_name(&mut self, username: &str) -> Result<Option<User>>;
    async fn insert_user(&mut self, user: NewUser) -> Result<User>;
}

#[async_trait]
pub trait StoreTransaction: CatalogStore + CartStore + OrderStore + UserStore {
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens an exclusive unit of work.
    ///
    /// Fails with [`ShopError::StorageConflict`] when the store stays busy
    /// past the backend's lock timeout.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

pub type StorageRef = Arc<dyn Storage>;
