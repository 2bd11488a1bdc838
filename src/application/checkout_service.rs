use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::coupon::normalize_code;
use crate::domain::errors::DomainError;
use crate::domain::notification::{NotificationEvent, NotificationTarget};
use crate::domain::order::{CheckoutRequest, Order, ShippingDetails};
use crate::domain::ports::OrderRepository;

use super::notification_dispatcher::NotificationDispatcher;

pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CheckoutService {
    pub fn new(orders: Arc<dyn OrderRepository>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { orders, dispatcher }
    }

    /// Turns the buyer's cart into an order. Nothing is written unless every
    /// step succeeds.
    pub fn checkout(
        &self,
        customer_id: Uuid,
        coupon_code: Option<&str>,
        address: &str,
        phone: &str,
    ) -> Result<Order, DomainError> {
        let shipping = ShippingDetails::new(address, phone)?;
        let coupon_code = coupon_code
            .filter(|c| !c.trim().is_empty())
            .map(normalize_code)
            .transpose()?;

        let request = CheckoutRequest {
            customer_id,
            coupon_code,
            shipping,
        };
        let order = match self.orders.place_order(&request) {
            Ok(order) => order,
            Err(e) => {
                log::debug!("Checkout for {} refused: {}", customer_id, e);
                return Err(e);
            }
        };

        log::info!(
            "Order {} placed by {}: subtotal {}, discount {}, total {}",
            order.id,
            order.customer_id,
            order.subtotal,
            order.discount_amount,
            order.total
        );

        let placed = NotificationEvent::OrderPlaced {
            order_id: order.id,
            total: order.total.to_string(),
        };
        self.dispatcher
            .notify(NotificationTarget::User(order.customer_id), placed.clone());
        let sellers: BTreeSet<Uuid> = order.lines.iter().map(|l| l.seller_id).collect();
        for seller_id in sellers {
            self.dispatcher
                .notify(NotificationTarget::User(seller_id), placed.clone());
        }

        Ok(order)
    }
}
