use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::order::Order;
use super::payment::{OrderStatusChange, Payment};

/// Row written in the same transaction as the state change it describes.
/// CDC routes on `aggregate_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    fn new(aggregate_type: &str, aggregate_id: Uuid, event_type: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn order_placed(order: &Order) -> Self {
        let lines: Vec<Value> = order
            .lines
            .iter()
            .map(|l| {
                json!({
                    "product_id": l.product_id,
                    "seller_id": l.seller_id,
                    "quantity": l.quantity,
                    "unit_price": l.unit_price.to_string()
                })
            })
            .collect();

        Self::new(
            "Order",
            order.id,
            "OrderPlaced",
            json!({
                "order_id": order.id,
                "customer_id": order.customer_id,
                "status": order.status.as_str(),
                "subtotal": order.subtotal.to_string(),
                "discount_amount": order.discount_amount.to_string(),
                "coupon_id": order.coupon_id,
                "total": order.total.to_string(),
                "lines": lines
            }),
        )
    }

    pub fn order_status_changed(change: &OrderStatusChange) -> Self {
        Self::new(
            "Order",
            change.order_id,
            "OrderStatusChanged",
            json!({
                "order_id": change.order_id,
                "from": change.from.as_str(),
                "to": change.to.as_str()
            }),
        )
    }

    pub fn payment_status_changed(payment: &Payment) -> Self {
        Self::new(
            "Payment",
            payment.id,
            "PaymentStatusChanged",
            json!({
                "payment_id": payment.id,
                "order_id": payment.order_id,
                "method": payment.method.as_str(),
                "status": payment.status.as_str(),
                "amount": payment.amount.to_string(),
                "transaction_id": payment.transaction_id,
                "reason": payment.rejection_reason
            }),
        )
    }
}
