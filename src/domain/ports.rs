use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::actor::Actor;
use super::cart::{Cart, CartOp};
use super::coupon::{Coupon, NewCoupon};
use super::errors::DomainError;
use super::inventory::Product;
use super::notification::{Notification, NotificationTarget};
use super::order::{CheckoutRequest, Order, OrderPage};
use super::payment::{OrderStatusChange, Payment, PaymentTransition};

/// Read access to the catalog owned by another service.
pub trait Catalog: Send + Sync + 'static {
    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError>;
}

pub trait InventoryLedger: Send + Sync + 'static {
    /// Adds `quantity` units of stock and returns the updated product.
    fn restock(&self, product_id: Uuid, quantity: i32) -> Result<Product, DomainError>;
}

/// Carts are created lazily and every mutation runs under the cart's lock.
pub trait CartRepository: Send + Sync + 'static {
    fn load(&self, owner_id: Uuid) -> Result<Cart, DomainError>;
    fn mutate(&self, owner_id: Uuid, op: CartOp) -> Result<Cart, DomainError>;
    /// Recomputes the total from the lines. Returns the cart and, if the stored
    /// total had drifted, the value it held before repair.
    fn reconcile(&self, owner_id: Uuid) -> Result<(Cart, Option<BigDecimal>), DomainError>;
}

pub trait CouponRepository: Send + Sync + 'static {
    /// Fails with `Conflict` when the code, or a second welcome coupon for
    /// the same owner, already exists.
    fn insert(&self, coupon: NewCoupon) -> Result<Coupon, DomainError>;
    fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DomainError>;
    fn find_welcome(&self, owner_id: Uuid) -> Result<Option<Coupon>, DomainError>;
    fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Coupon>, DomainError>;
}

pub trait OrderRepository: Send + Sync + 'static {
    /// The checkout transaction: locks the cart, consumes the coupon, takes
    /// stock, writes the order and empties the cart, all or nothing.
    fn place_order(&self, request: &CheckoutRequest) -> Result<Order, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError>;
    /// Compare-and-set on `change.from`. With `restock`, every line's units go
    /// back to inventory in the same transaction.
    fn update_status(&self, change: OrderStatusChange, restock: bool)
        -> Result<Order, DomainError>;
}

pub trait PaymentRepository: Send + Sync + 'static {
    /// Inserts the payment (and applies `order_change`) unless the order
    /// already has a payment that is not `failed`.
    fn create(
        &self,
        payment: Payment,
        order_change: Option<OrderStatusChange>,
    ) -> Result<Payment, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError>;
    fn apply(&self, transition: PaymentTransition) -> Result<Payment, DomainError>;
}

pub trait NotificationRepository: Send + Sync + 'static {
    fn insert(&self, notification: &Notification) -> Result<(), DomainError>;
    /// Newest first: notifications addressed to the actor or to the actor's role.
    fn list_for(&self, actor: &Actor, limit: i64) -> Result<Vec<Notification>, DomainError>;
    fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification, DomainError>;
}

/// Live-connection registry. Returns how many subscribers received the push.
pub trait LivePush: Send + Sync + 'static {
    fn push(&self, target: NotificationTarget, notification: &Notification) -> usize;
}
