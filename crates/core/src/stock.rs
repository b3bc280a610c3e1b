//! Stock entity
//!
//! The only mutable domain object. Its quantity is a non-negative counter and
//! `decrease` is the read-modify-write step every critical section performs.

use crate::error::{StrataError, StrataResult};
use crate::types::{ProductId, StockId};
use serde::{Deserialize, Serialize};

/// Quantity counter for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    id: StockId,
    product_id: ProductId,
    quantity: u64,
}

impl Stock {
    /// Create a stock record with an initial quantity
    pub fn new(id: StockId, product_id: ProductId, quantity: u64) -> Self {
        Self {
            id,
            product_id,
            quantity,
        }
    }

    /// Stock identity
    pub fn id(&self) -> StockId {
        self.id
    }

    /// Product this stock counts
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Current quantity
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Decrease the quantity by `amount`
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the quantity would drop below zero.
    /// The quantity is left unchanged in that case.
    pub fn decrease(&mut self, amount: u64) -> StrataResult<()> {
        match self.quantity.checked_sub(amount) {
            Some(remaining) => {
                self.quantity = remaining;
                Ok(())
            }
            None => Err(StrataError::invariant(
                self.id,
                format!(
                    "cannot decrease quantity {} by {}: stock exhausted",
                    self.quantity, amount
                ),
            )),
        }
    }
}

/// Stock as read from committed storage, with the commit version that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedStock {
    /// Committed entity state
    pub stock: Stock,
    /// Version of the commit that produced this state
    pub version: u64,
}
