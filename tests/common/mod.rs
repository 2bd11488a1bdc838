#![allow(dead_code)]

use std::sync::Arc;

use bigdecimal::BigDecimal;
use fulfillment_service::application::{ServiceSettings, Services};
use fulfillment_service::domain::actor::{Actor, Role};
use fulfillment_service::domain::inventory::Product;
use fulfillment_service::domain::payment::SlipReviewPolicy;
use fulfillment_service::infrastructure::live::LiveConnections;
use fulfillment_service::infrastructure::memory::InMemoryStore;
use fulfillment_service::infrastructure::memory_ports;
use uuid::Uuid;

pub const ADDRESS: &str = "12 Canal Road, Bangkok 10200";
pub const PHONE: &str = "+66 81 234 5678";

pub struct Market {
    pub store: Arc<InMemoryStore>,
    pub live: LiveConnections,
    pub services: Services,
}

impl Market {
    pub fn new() -> Self {
        Self::with_policy(SlipReviewPolicy::Auto)
    }

    pub fn with_policy(slip_review: SlipReviewPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let live = LiveConnections::new(16);
        let settings = ServiceSettings {
            slip_review,
            ..ServiceSettings::default()
        };
        let services = Services::new(memory_ports(store.clone(), live.clone()), settings);
        Self { store, live, services }
    }

    pub fn product(&self, seller_id: Uuid, name: &str, price: i64, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .upsert_product(Product {
                id,
                seller_id,
                name: name.to_string(),
                price: BigDecimal::from(price),
                stock,
                sold: 0,
            })
            .expect("seed product");
        id
    }

    pub fn stock(&self, product_id: Uuid) -> i32 {
        use fulfillment_service::domain::ports::Catalog;
        self.store
            .find_product(product_id)
            .expect("lookup")
            .expect("product exists")
            .stock
    }

    pub fn add(&self, buyer: Uuid, product_id: Uuid, quantity: i32) {
        self.services
            .carts
            .add_line(buyer, product_id, quantity, None)
            .expect("add to cart");
    }
}

pub fn buyer() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Buyer)
}

pub fn seller() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Seller)
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn amount(value: i64) -> BigDecimal {
    BigDecimal::from(value)
}
