use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{Order, OrderStatus, StatusTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    QrCode,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::QrCode => "qr_code",
        }
    }

    /// Cash and card settle at creation; QR transfers wait for a slip.
    pub fn settles_immediately(self) -> bool {
        !matches!(self, PaymentMethod::QrCode)
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "qr_code" => Ok(PaymentMethod::QrCode),
            other => Err(DomainError::InvalidInput(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    WaitingApproval,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::WaitingApproval => "waiting_approval",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// A payment in any of these states blocks another payment for its order.
    pub fn blocks_new_payment(self) -> bool {
        !matches!(self, PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "waiting_approval" => Ok(PaymentStatus::WaitingApproval),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::InvalidInput(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}

/// How an uploaded transfer slip is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipReviewPolicy {
    /// The slip settles the payment immediately.
    Auto,
    /// The slip parks the payment in `waiting_approval` until an admin decides.
    Manual,
}

impl FromStr for SlipReviewPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SlipReviewPolicy::Auto),
            "manual" => Ok(SlipReviewPolicy::Manual),
            other => Err(DomainError::InvalidInput(format!(
                "unknown slip review policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub qr_payload: Option<String>,
    pub slip_url: Option<String>,
    pub customer_info: CustomerInfo,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order status write guarded by the status it is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderStatusChange {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Clone)]
pub enum PaymentAction {
    UploadSlip {
        slip_url: String,
        policy: SlipReviewPolicy,
    },
    Approve {
        admin_id: Uuid,
    },
    Reject {
        admin_id: Uuid,
        reason: String,
    },
    GatewayFailed {
        reason: Option<String>,
    },
}

/// The new payment row plus the order change to commit with it. Stores apply
/// it only if the payment still has status `expected`.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment: Payment,
    pub expected: PaymentStatus,
    pub order_change: Option<OrderStatusChange>,
}

impl Payment {
    /// Opens a payment for `order`. Immediate methods complete straight away
    /// and move the order to `Processing` in the same write.
    pub fn initiate(
        order: &Order,
        method: PaymentMethod,
        customer_info: CustomerInfo,
        now: DateTime<Utc>,
    ) -> Result<(Payment, Option<OrderStatusChange>), DomainError> {
        if !matches!(
            order.status,
            OrderStatus::NotProcess | OrderStatus::PaymentFailed
        ) {
            return Err(DomainError::InvalidState(format!(
                "order {} is {} and cannot take a payment",
                order.id, order.status
            )));
        }
        if customer_info.name.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "customer name is required".to_string(),
            ));
        }

        let transaction_id = new_transaction_id();
        let amount = order.total.with_scale(2);
        let (status, qr_payload, order_change) = if method.settles_immediately() {
            let to = order
                .status
                .transition(OrderStatus::Processing, StatusTrigger::PaymentSettled)?;
            let change = OrderStatusChange {
                order_id: order.id,
                from: order.status,
                to,
            };
            (PaymentStatus::Completed, None, Some(change))
        } else {
            let payload = format!("promptpay://pay?ref={transaction_id}&amount={amount}");
            (PaymentStatus::Pending, Some(payload), None)
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount,
            method,
            status,
            transaction_id,
            qr_payload,
            slip_url: None,
            customer_info,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        Ok((payment, order_change))
    }

    /// Validates `action` against the current status and computes the result.
    /// `order_status` is the owning order's status as last read.
    pub fn plan(
        &self,
        action: PaymentAction,
        order_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransition, DomainError> {
        let mut next = self.clone();
        next.updated_at = now;

        let order_change = match action {
            PaymentAction::UploadSlip { slip_url, policy } => {
                if self.method != PaymentMethod::QrCode || self.status != PaymentStatus::Pending {
                    return Err(self.refuse("upload a slip for"));
                }
                next.slip_url = Some(check_slip_url(&slip_url)?);
                next.status = match policy {
                    SlipReviewPolicy::Auto => PaymentStatus::Completed,
                    SlipReviewPolicy::Manual => PaymentStatus::WaitingApproval,
                };
                Some(self.order_change(
                    order_status,
                    OrderStatus::Processing,
                    StatusTrigger::PaymentSettled,
                )?)
            }
            PaymentAction::Approve { admin_id } => {
                if self.status != PaymentStatus::WaitingApproval {
                    return Err(self.refuse("approve"));
                }
                next.status = PaymentStatus::Completed;
                next.approved_by = Some(admin_id);
                next.approved_at = Some(now);
                None
            }
            PaymentAction::Reject { admin_id, reason } => {
                if self.status != PaymentStatus::WaitingApproval {
                    return Err(self.refuse("reject"));
                }
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(DomainError::InvalidInput(
                        "a rejection reason is required".to_string(),
                    ));
                }
                next.status = PaymentStatus::Failed;
                next.rejected_by = Some(admin_id);
                next.rejected_at = Some(now);
                next.rejection_reason = Some(reason.to_string());
                self.follow_up(
                    order_status,
                    OrderStatus::NotProcess,
                    StatusTrigger::PaymentRejected,
                )
            }
            PaymentAction::GatewayFailed { reason } => {
                if !matches!(
                    self.status,
                    PaymentStatus::Pending | PaymentStatus::WaitingApproval
                ) {
                    return Err(self.refuse("fail"));
                }
                next.status = PaymentStatus::Failed;
                next.rejected_at = Some(now);
                next.rejection_reason = reason;
                self.follow_up(
                    order_status,
                    OrderStatus::PaymentFailed,
                    StatusTrigger::PaymentFailed,
                )
            }
        };

        Ok(PaymentTransition {
            payment: next,
            expected: self.status,
            order_change,
        })
    }

    fn order_change(
        &self,
        from: OrderStatus,
        to: OrderStatus,
        trigger: StatusTrigger,
    ) -> Result<OrderStatusChange, DomainError> {
        let to = from.transition(to, trigger)?;
        Ok(OrderStatusChange {
            order_id: self.order_id,
            from,
            to,
        })
    }

    /// Order change that accompanies a failed payment. The payment still fails
    /// when the order has already moved on (e.g. cancelled); the order is left alone.
    fn follow_up(
        &self,
        from: OrderStatus,
        to: OrderStatus,
        trigger: StatusTrigger,
    ) -> Option<OrderStatusChange> {
        match self.order_change(from, to, trigger) {
            Ok(change) => Some(change),
            Err(e) => {
                log::warn!(
                    "Payment {} failed but order {} stays {}: {}",
                    self.id,
                    self.order_id,
                    from,
                    e
                );
                None
            }
        }
    }

    fn refuse(&self, verb: &str) -> DomainError {
        DomainError::InvalidState(format!(
            "cannot {verb} payment {} ({} via {})",
            self.id,
            self.status,
            self.method.as_str()
        ))
    }
}

fn check_slip_url(url: &str) -> Result<String, DomainError> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) || url.len() > 2048 {
        return Err(DomainError::InvalidInput(format!(
            "slip url must be an http(s) url, got '{url}'"
        )));
    }
    Ok(url.to_string())
}

fn new_transaction_id() -> String {
    let id = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("TXN-{}", &id[..16])
}
