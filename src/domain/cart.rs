use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};
use uuid::Uuid;

use super::errors::DomainError;
use super::inventory::ensure_positive_quantity;

/// Selected product options, e.g. `{"size": "M"}`. Stored as a JSON column.
pub type Variant = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Catalog price at the moment the line was first added.
    pub unit_price: BigDecimal,
    pub variant: Option<Variant>,
}

impl CartLine {
    pub fn subtotal(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }

    fn matches(&self, product_id: Uuid, variant: &Option<Variant>) -> bool {
        self.product_id == product_id && &self.variant == variant
    }
}

#[derive(Debug, Clone)]
pub struct NewCartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Variant>,
    /// Stock on hand when the request was made; the merged line may not exceed it.
    pub stock_on_hand: i32,
}

#[derive(Debug, Clone)]
pub enum CartOp {
    Add(NewCartLine),
    SetQuantity { line_id: Uuid, quantity: i32 },
    Remove { line_id: Uuid },
    Clear,
}

/// What a mutation did to the line set, so a store can persist only the diff.
#[derive(Debug, Clone, PartialEq)]
pub enum CartChange {
    Inserted(CartLine),
    QuantityChanged { line_id: Uuid, quantity: i32 },
    Removed { line_id: Uuid },
    Cleared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartMutation {
    pub change: CartChange,
    /// Amount added to (or, when negative, removed from) the running total.
    pub delta: BigDecimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub lines: Vec<CartLine>,
    pub total: BigDecimal,
}

impl Cart {
    pub fn empty(id: Uuid, owner_id: Uuid) -> Self {
        Self {
            id,
            owner_id,
            lines: Vec::new(),
            total: BigDecimal::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Σ(price × qty), recomputed from scratch.
    pub fn computed_total(&self) -> BigDecimal {
        self.lines
            .iter()
            .fold(BigDecimal::zero(), |acc, l| acc + l.subtotal())
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.computed_total()
    }

    /// Applies `op` in place and returns the change with its total delta.
    /// On error the cart is left untouched.
    pub fn apply(&mut self, op: CartOp) -> Result<CartMutation, DomainError> {
        let mutation = match op {
            CartOp::Add(new_line) => self.add(new_line)?,
            CartOp::SetQuantity { line_id, quantity } => self.set_quantity(line_id, quantity)?,
            CartOp::Remove { line_id } => self.remove(line_id)?,
            CartOp::Clear => {
                let delta = -self.total.clone();
                self.lines.clear();
                CartMutation {
                    change: CartChange::Cleared,
                    delta,
                }
            }
        };
        self.total = &self.total + &mutation.delta;
        Ok(mutation)
    }

    fn add(&mut self, new_line: NewCartLine) -> Result<CartMutation, DomainError> {
        ensure_positive_quantity(new_line.quantity)?;
        if new_line.unit_price < BigDecimal::zero() {
            return Err(DomainError::InvalidInput(
                "unit price must not be negative".to_string(),
            ));
        }

        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.matches(new_line.product_id, &new_line.variant))
        {
            let merged = existing
                .quantity
                .checked_add(new_line.quantity)
                .ok_or_else(|| DomainError::InvalidInput("quantity overflow".to_string()))?;
            check_stock(new_line.product_id, merged, new_line.stock_on_hand)?;
            existing.quantity = merged;
            return Ok(CartMutation {
                change: CartChange::QuantityChanged {
                    line_id: existing.id,
                    quantity: merged,
                },
                delta: &existing.unit_price * BigDecimal::from(new_line.quantity),
            });
        }

        check_stock(
            new_line.product_id,
            new_line.quantity,
            new_line.stock_on_hand,
        )?;
        let line = CartLine {
            id: Uuid::new_v4(),
            product_id: new_line.product_id,
            quantity: new_line.quantity,
            unit_price: new_line.unit_price,
            variant: new_line.variant,
        };
        let delta = line.subtotal();
        self.lines.push(line.clone());
        Ok(CartMutation {
            change: CartChange::Inserted(line),
            delta,
        })
    }

    fn set_quantity(&mut self, line_id: Uuid, quantity: i32) -> Result<CartMutation, DomainError> {
        if quantity < 0 {
            return Err(DomainError::InvalidInput(format!(
                "quantity must not be negative, got {quantity}"
            )));
        }
        if quantity == 0 {
            return self.remove(line_id);
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("cart line {line_id}")))?;
        let delta = &line.unit_price * BigDecimal::from(quantity - line.quantity);
        line.quantity = quantity;
        Ok(CartMutation {
            change: CartChange::QuantityChanged { line_id, quantity },
            delta,
        })
    }

    fn remove(&mut self, line_id: Uuid) -> Result<CartMutation, DomainError> {
        let idx = self
            .lines
            .iter()
            .position(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("cart line {line_id}")))?;
        let line = self.lines.remove(idx);
        Ok(CartMutation {
            change: CartChange::Removed { line_id },
            delta: -line.subtotal(),
        })
    }
}

fn check_stock(product_id: Uuid, wanted: i32, on_hand: i32) -> Result<(), DomainError> {
    if wanted > on_hand {
        return Err(DomainError::InsufficientStock {
            product_id,
            requested: wanted,
            available: on_hand,
        });
    }
    Ok(())
}
