pub mod cart_repo;
pub mod catalog_repo;
pub mod coupon_repo;
pub mod live;
pub mod memory;
pub mod models;
pub mod notification_repo;
pub mod order_repo;
pub mod outbox;
pub mod payment_repo;
#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use diesel::result::DatabaseErrorKind;

use crate::application::Ports;
use crate::db::DbPool;
use crate::domain::errors::DomainError;

use self::cart_repo::DieselCartRepository;
use self::catalog_repo::DieselProductRepository;
use self::coupon_repo::DieselCouponRepository;
use self::live::LiveConnections;
use self::memory::InMemoryStore;
use self::notification_repo::DieselNotificationRepository;
use self::order_repo::DieselOrderRepository;
use self::payment_repo::DieselPaymentRepository;

/// Wires every port to its Diesel repository on the shared pool.
pub fn postgres_ports(pool: DbPool, live: LiveConnections) -> Ports {
    let products = Arc::new(DieselProductRepository::new(pool.clone()));
    Ports {
        catalog: products.clone(),
        inventory: products,
        carts: Arc::new(DieselCartRepository::new(pool.clone())),
        coupons: Arc::new(DieselCouponRepository::new(pool.clone())),
        orders: Arc::new(DieselOrderRepository::new(pool.clone())),
        payments: Arc::new(DieselPaymentRepository::new(pool.clone())),
        notifications: Arc::new(DieselNotificationRepository::new(pool)),
        live: Arc::new(live),
    }
}

/// Wires every port to one shared in-process store.
pub fn memory_ports(store: Arc<InMemoryStore>, live: LiveConnections) -> Ports {
    Ports {
        catalog: store.clone(),
        inventory: store.clone(),
        carts: store.clone(),
        coupons: store.clone(),
        orders: store.clone(),
        payments: store.clone(),
        notifications: store,
        live: Arc::new(live),
    }
}

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DomainError::Conflict(info.message().to_string())
            }
            // 40001 surfaces as SerializationFailure; 40P01 only by its message.
            diesel::result::Error::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                DomainError::Conflict(format!("concurrent update, retry: {}", info.message()))
            }
            diesel::result::Error::DatabaseError(_, info)
                if info.message().starts_with("deadlock detected") =>
            {
                DomainError::Conflict(format!("concurrent update, retry: {}", info.message()))
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}
