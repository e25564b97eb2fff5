use super::product::{Money, ProductId};
use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};

pub type UserId = u32;

/// A strictly positive number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(ShopError::InvalidInput("Quantity must be positive".to_string()));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| ShopError::InvalidInput(format!("Quantity {value} is too large")))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = ShopError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl From<Quantity> for i64 {
    fn from(quantity: Quantity) -> Self {
        i64::from(quantity.0)
    }
}

/// Units of a product reserved by one user.
///
/// The quantity has already been taken out of the product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

impl CartLine {
    pub fn new(user_id: UserId, product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            user_id,
            product_id,
            quantity,
        }
    }

    /// Accumulates a further reservation onto this line.
    pub fn merge(&mut self, quantity: Quantity) -> Result<()> {
        let merged = self.quantity.value().checked_add(quantity.value()).ok_or_else(|| {
            ShopError::InvalidInput(format!(
                "Cart quantity for product {} would overflow",
                self.product_id
            ))
        })?;
        self.quantity = Quantity(merged);
        Ok(())
    }

    /// Releases part of the reservation.
    ///
    /// Returns the remaining line, or `None` when nothing is left.
    pub fn reduce(self, quantity: Quantity) -> Result<Option<CartLine>> {
        let reserved = self.quantity.value();
        let requested = quantity.value();
        match reserved.checked_sub(requested) {
            None => Err(ShopError::InsufficientCartQuantity {
                product_id: self.product_id,
                requested,
                reserved,
            }),
            Some(0) => Ok(None),
            Some(left) => Ok(Some(CartLine {
                quantity: Quantity(left),
                ..self
            })),
        }
    }
}

/// One row of a cart as shown to the customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CartEntry {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartView {
    pub entries: Vec<CartEntry>,
    pub total: Money,
}

impl CartView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
