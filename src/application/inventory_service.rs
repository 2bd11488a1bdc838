use std::sync::Arc;

use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::errors::DomainError;
use crate::domain::inventory::{ensure_positive_quantity, Product};
use crate::domain::ports::{Catalog, InventoryLedger};

pub struct InventoryService {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn InventoryLedger>,
}

impl InventoryService {
    pub fn new(catalog: Arc<dyn Catalog>, ledger: Arc<dyn InventoryLedger>) -> Self {
        Self { catalog, ledger }
    }

    /// Adds stock to a product. Allowed for the product's seller and admins.
    pub fn restock(
        &self,
        actor: &Actor,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Product, DomainError> {
        ensure_positive_quantity(quantity)?;
        let product = self
            .catalog
            .find_product(product_id)?
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))?;
        if !actor.is_admin() && product.seller_id != actor.user_id {
            return Err(DomainError::Forbidden(format!(
                "product {product_id} belongs to another seller"
            )));
        }

        let product = self.ledger.restock(product_id, quantity)?;
        log::info!(
            "Product {} restocked by {} (+{}), stock now {}",
            product.id,
            actor.user_id,
            quantity,
            product.stock
        );
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::actor::Role;
    use crate::infrastructure::memory::InMemoryStore;

    #[test]
    fn only_owner_or_admin_restocks() {
        let store = Arc::new(InMemoryStore::new());
        let seller = Actor::new(Uuid::new_v4(), Role::Seller);
        let product = Product {
            id: Uuid::new_v4(),
            seller_id: seller.user_id,
            name: "Fish sauce".to_string(),
            price: BigDecimal::from(45),
            stock: 2,
            sold: 0,
        };
        store.upsert_product(product.clone()).expect("seed");
        let service = InventoryService::new(store.clone(), store);

        let rival = Actor::new(Uuid::new_v4(), Role::Seller);
        let err = service.restock(&rival, product.id, 5).expect_err("not theirs");
        assert!(matches!(err, DomainError::Forbidden(_)));

        assert_eq!(service.restock(&seller, product.id, 5).expect("own").stock, 7);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        assert_eq!(service.restock(&admin, product.id, 1).expect("admin").stock, 8);

        let err = service.restock(&seller, product.id, -1).expect_err("negative");
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}
