use super::cart::{Quantity, UserId};
use super::product::{Money, ProductId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type OrderId = u64;

/// An order line before the store has assigned its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub placed_at: DateTime<Utc>,
}

impl NewOrderLine {
    pub fn with_id(self, order_id: OrderId) -> OrderLine {
        OrderLine {
            order_id,
            user_id: self.user_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            placed_at: self.placed_at,
        }
    }
}

/// A finalized purchase of one product. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price captured when the purchase completed.
    pub unit_price: Money,
    #[serde(rename = "order_date")]
    pub placed_at: DateTime<Utc>,
}

impl OrderLine {
    pub fn line_total(&self) -> Result<Money> {
        self.unit_price.times(self.quantity.value())
    }
}

/// Newest first; ties on the timestamp fall back to the later order id.
pub fn newest_first(lines: &mut [OrderLine]) {
    lines.sort_by(|a, b| {
        b.placed_at
            .cmp(&a.placed_at)
            .then_with(|| b.order_id.cmp(&a.order_id))
    });
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLine {
    pub order: OrderLine,
    pub product_name: String,
    pub line_total: Money,
}

/// Everything `complete_purchase` converted, with the amount due.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub lines: Vec<ReceiptLine>,
    pub grand_total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderHistoryEntry {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub placed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn line(order_id: OrderId, second: u32) -> OrderLine {
        OrderLine {
            order_id,
            user_id: 1,
            product_id: 1,
            quantity: Quantity::new(2).unwrap(),
            unit_price: Money::new(dec!(3.25)),
            placed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line(1, 0).line_total().unwrap(), Money::new(dec!(6.50)));
    }

    #[test]
    fn test_newest_first_ordering() {
        let mut lines = vec![line(1, 0), line(3, 5), line(2, 5)];
        newest_first(&mut lines);
        let ids: Vec<_> = lines.iter().map(|l| l.order_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
