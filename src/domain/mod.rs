pub mod actor;
pub mod cart;
pub mod coupon;
pub mod errors;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod ports;
