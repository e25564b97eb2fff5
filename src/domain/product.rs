use crate::error::{Result, ShopError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProductId = u32;

/// A monetary value, kept as an exact decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Price of `quantity` units at this unit price.
    pub fn times(self, quantity: u32) -> Result<Self> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or_else(|| ShopError::InvalidInput(format!("{quantity} x {self} is too large")))
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| ShopError::InvalidInput("Total amount is too large".to_string()))
    }

    /// Sums amounts, failing instead of overflowing.
    pub fn total<I: IntoIterator<Item = Self>>(amounts: I) -> Result<Self> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A catalog entry and its physical stock on hand.
///
/// `stock` counts units that are neither reserved by a cart nor sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "product_id")]
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Money,
    pub stock: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: Decimal, stock: u32) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price: Money::new(unit_price),
            stock,
        }
    }

    /// Applies `stock += delta`, refusing to go below zero.
    pub fn adjust_stock(&mut self, delta: i64) -> Result<()> {
        let next = i64::from(self.stock) + delta;
        if next < 0 {
            return Err(ShopError::InsufficientStock {
                product_id: self.id,
                requested: delta.unsigned_abs(),
                available: self.stock,
            });
        }
        self.stock = u32::try_from(next).map_err(|_| {
            ShopError::InvalidInput(format!("stock for product {} would overflow", self.id))
        })?;
        Ok(())
    }

    pub fn name_matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(&needle.to_lowercase())
    }
}
