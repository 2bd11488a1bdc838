use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::actor::{Actor, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationTarget {
    User(Uuid),
    Role(Role),
}

impl NotificationTarget {
    pub fn includes(&self, actor: &Actor) -> bool {
        match self {
            NotificationTarget::User(id) => *id == actor.user_id,
            NotificationTarget::Role(role) => *role == actor.role,
        }
    }
}

/// Status changes worth telling someone about. Serialized as the
/// notification payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderPlaced {
        order_id: Uuid,
        total: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: String,
        to: String,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        payment_id: Uuid,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PaymentAwaitingApproval {
        order_id: Uuid,
        payment_id: Uuid,
        slip_url: String,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::OrderPlaced { .. } => "order_placed",
            NotificationEvent::OrderStatusChanged { .. } => "order_status_changed",
            NotificationEvent::PaymentStatusChanged { .. } => "payment_status_changed",
            NotificationEvent::PaymentAwaitingApproval { .. } => "payment_awaiting_approval",
        }
    }

    pub fn title(&self) -> String {
        match self {
            NotificationEvent::OrderPlaced { .. } => "Order placed".to_string(),
            NotificationEvent::OrderStatusChanged { .. } => "Order updated".to_string(),
            NotificationEvent::PaymentStatusChanged { .. } => "Payment updated".to_string(),
            NotificationEvent::PaymentAwaitingApproval { .. } => {
                "Payment slip awaiting review".to_string()
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            NotificationEvent::OrderPlaced { order_id, total } => {
                format!("Order {order_id} was placed with a total of {total}")
            }
            NotificationEvent::OrderStatusChanged { order_id, to, .. } => {
                format!("Order {order_id} is now {to}")
            }
            NotificationEvent::PaymentStatusChanged {
                payment_id,
                status,
                reason: Some(reason),
                ..
            } => format!("Payment {payment_id} is now {status}: {reason}"),
            NotificationEvent::PaymentStatusChanged {
                payment_id, status, ..
            } => format!("Payment {payment_id} is now {status}"),
            NotificationEvent::PaymentAwaitingApproval { order_id, .. } => {
                format!("A transfer slip for order {order_id} needs approval")
            }
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            NotificationEvent::OrderPlaced { order_id, .. }
            | NotificationEvent::OrderStatusChanged { order_id, .. }
            | NotificationEvent::PaymentStatusChanged { order_id, .. }
            | NotificationEvent::PaymentAwaitingApproval { order_id, .. } => *order_id,
        }
    }

    pub fn payment_id(&self) -> Option<Uuid> {
        match self {
            NotificationEvent::PaymentStatusChanged { payment_id, .. }
            | NotificationEvent::PaymentAwaitingApproval { payment_id, .. } => Some(*payment_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(skip)]
    pub target: NotificationTarget,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub payload: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_event(
        target: NotificationTarget,
        event: &NotificationEvent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            kind: event.kind().to_string(),
            title: event.title(),
            message: event.message(),
            order_id: Some(event.order_id()),
            payment_id: event.payment_id(),
            payload: serde_json::to_value(event).unwrap_or_default(),
            is_read: false,
            created_at: now,
        }
    }
}

/// Result of a dispatch. Live push is best effort; the stored record is the
/// durable copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed to at least one live subscriber.
    Live { receivers: usize },
    /// Nobody listening; the persisted record waits for the next fetch.
    Stored,
    /// Neither persisted nor pushed.
    Dropped,
}
