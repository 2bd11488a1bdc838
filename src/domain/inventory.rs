use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::errors::DomainError;

/// Catalog product as seen by the fulfillment core: price, ownership and the
/// stock counters the inventory ledger guards.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
    pub sold: i32,
}

impl Product {
    /// Guarded decrement: either the full quantity is taken or nothing changes.
    pub fn take_stock(&mut self, quantity: i32) -> Result<(), DomainError> {
        ensure_positive_quantity(quantity)?;
        if self.stock < quantity {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        self.sold += quantity;
        Ok(())
    }

    /// Puts previously sold units back on the shelf.
    pub fn return_stock(&mut self, quantity: i32) -> Result<(), DomainError> {
        ensure_positive_quantity(quantity)?;
        self.stock += quantity;
        self.sold = (self.sold - quantity).max(0);
        Ok(())
    }

    pub fn restock(&mut self, quantity: i32) -> Result<(), DomainError> {
        ensure_positive_quantity(quantity)?;
        self.stock += quantity;
        Ok(())
    }
}

pub fn ensure_positive_quantity(quantity: i32) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::InvalidInput(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}
