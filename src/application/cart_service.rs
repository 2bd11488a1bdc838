use std::sync::Arc;

use uuid::Uuid;

use crate::domain::cart::{Cart, CartOp, NewCartLine, Variant};
use crate::domain::errors::DomainError;
use crate::domain::inventory::ensure_positive_quantity;
use crate::domain::ports::{CartRepository, Catalog};

pub struct CartService {
    repo: Arc<dyn CartRepository>,
    catalog: Arc<dyn Catalog>,
}

impl CartService {
    pub fn new(repo: Arc<dyn CartRepository>, catalog: Arc<dyn Catalog>) -> Self {
        Self { repo, catalog }
    }

    pub fn get(&self, owner_id: Uuid) -> Result<Cart, DomainError> {
        self.repo.load(owner_id)
    }

    /// Adds a line priced at the catalog's current price. Re-adding the same
    /// product and variant bumps the existing line instead.
    pub fn add_line(
        &self,
        owner_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        variant: Option<Variant>,
    ) -> Result<Cart, DomainError> {
        ensure_positive_quantity(quantity)?;
        let product = self
            .catalog
            .find_product(product_id)?
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))?;

        let variant = variant.filter(|v| !v.is_empty());
        let cart = self.repo.mutate(
            owner_id,
            CartOp::Add(NewCartLine {
                product_id,
                quantity,
                unit_price: product.price,
                variant,
                stock_on_hand: product.stock,
            }),
        )?;
        log::debug!("Cart {} now totals {}", cart.id, cart.total);
        Ok(cart)
    }

    /// Zero removes the line. Raising the quantity is checked against the
    /// stock on hand; checkout makes the binding check.
    pub fn set_quantity(
        &self,
        owner_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, DomainError> {
        if quantity > 0 {
            let cart = self.repo.load(owner_id)?;
            let line = cart
                .line(line_id)
                .ok_or_else(|| DomainError::not_found(format!("cart line {line_id}")))?;
            if quantity > line.quantity {
                let product = self
                    .catalog
                    .find_product(line.product_id)?
                    .ok_or_else(|| DomainError::not_found(format!("product {}", line.product_id)))?;
                if quantity > product.stock {
                    return Err(DomainError::InsufficientStock {
                        product_id: product.id,
                        requested: quantity,
                        available: product.stock,
                    });
                }
            }
        }
        self.repo.mutate(owner_id, CartOp::SetQuantity { line_id, quantity })
    }

    pub fn remove_line(&self, owner_id: Uuid, line_id: Uuid) -> Result<Cart, DomainError> {
        self.repo.mutate(owner_id, CartOp::Remove { line_id })
    }

    pub fn clear(&self, owner_id: Uuid) -> Result<Cart, DomainError> {
        self.repo.mutate(owner_id, CartOp::Clear)
    }

    pub fn reconcile(&self, owner_id: Uuid) -> Result<Cart, DomainError> {
        let (cart, stale) = self.repo.reconcile(owner_id)?;
        if let Some(stale) = stale {
            log::warn!(
                "Cart {} total drifted: stored {}, recomputed {}; repaired",
                cart.id,
                stale,
                cart.total
            );
        }
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::inventory::Product;
    use crate::infrastructure::memory::InMemoryStore;

    fn setup(stock: i32) -> (CartService, Product) {
        let store = Arc::new(InMemoryStore::new());
        let product = Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Cotton tee".to_string(),
            price: BigDecimal::from(100),
            stock,
            sold: 0,
        };
        store.upsert_product(product.clone()).expect("seed");
        (CartService::new(store.clone(), store), product)
    }

    fn size(s: &str) -> Option<Variant> {
        Some(Variant::from([("size".to_string(), s.to_string())]))
    }

    #[test]
    fn variants_get_their_own_lines() {
        let (service, product) = setup(10);
        let owner = Uuid::new_v4();

        service.add_line(owner, product.id, 1, size("M")).expect("add M");
        service.add_line(owner, product.id, 1, size("L")).expect("add L");
        let cart = service.add_line(owner, product.id, 2, size("M")).expect("add M again");

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.total, BigDecimal::from(400));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let (service, _) = setup(10);
        let err = service
            .add_line(Uuid::new_v4(), Uuid::new_v4(), 1, None)
            .expect_err("no such product");
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn raising_quantity_past_stock_is_refused() {
        let (service, product) = setup(3);
        let owner = Uuid::new_v4();
        let cart = service.add_line(owner, product.id, 1, None).expect("add");
        let line_id = cart.lines[0].id;

        let err = service.set_quantity(owner, line_id, 4).expect_err("too many");
        assert!(matches!(err, DomainError::InsufficientStock { available: 3, .. }));

        let cart = service.set_quantity(owner, line_id, 0).expect("remove");
        assert!(cart.is_empty());
        assert_eq!(cart.total, BigDecimal::from(0));
    }

    #[test]
    fn zero_quantity_add_is_invalid() {
        let (service, product) = setup(3);
        let err = service
            .add_line(Uuid::new_v4(), product.id, 0, None)
            .expect_err("zero");
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}
