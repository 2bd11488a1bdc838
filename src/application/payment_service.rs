use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::actor::{Actor, Role};
use crate::domain::errors::DomainError;
use crate::domain::notification::{NotificationEvent, NotificationTarget};
use crate::domain::order::Order;
use crate::domain::payment::{
    CustomerInfo, OrderStatusChange, Payment, PaymentAction, PaymentMethod, PaymentStatus,
    SlipReviewPolicy,
};
use crate::domain::ports::{OrderRepository, PaymentRepository};

use super::notification_dispatcher::NotificationDispatcher;

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<dyn OrderRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    slip_review: SlipReviewPolicy,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        orders: Arc<dyn OrderRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        slip_review: SlipReviewPolicy,
    ) -> Self {
        Self {
            payments,
            orders,
            dispatcher,
            slip_review,
        }
    }

    pub fn create_payment(
        &self,
        actor: &Actor,
        order_id: Uuid,
        method: PaymentMethod,
        customer_info: CustomerInfo,
    ) -> Result<Payment, DomainError> {
        let order = self.order(order_id)?;
        if order.customer_id != actor.user_id {
            return Err(DomainError::Forbidden(format!(
                "only the buyer can pay for order {order_id}"
            )));
        }

        let (payment, order_change) = Payment::initiate(&order, method, customer_info, Utc::now())?;
        let payment = self.payments.create(payment, order_change)?;
        log::info!(
            "Payment {} ({}) created for order {}: {}",
            payment.id,
            payment.method.as_str(),
            order_id,
            payment.status
        );

        self.announce(&order, &payment, order_change);
        Ok(payment)
    }

    pub fn get_payment(&self, actor: &Actor, id: Uuid) -> Result<Payment, DomainError> {
        let payment = self.payment(id)?;
        let order = self.order(payment.order_id)?;
        if !order.can_view(actor) {
            return Err(DomainError::Forbidden(format!("payment {id} is not visible to you")));
        }
        Ok(payment)
    }

    pub fn upload_slip(
        &self,
        actor: &Actor,
        id: Uuid,
        slip_url: &str,
    ) -> Result<Payment, DomainError> {
        let payment = self.payment(id)?;
        let order = self.order(payment.order_id)?;
        if order.customer_id != actor.user_id {
            return Err(DomainError::Forbidden(format!(
                "only the buyer can upload a slip for payment {id}"
            )));
        }
        self.advance(
            payment,
            order,
            PaymentAction::UploadSlip {
                slip_url: slip_url.to_string(),
                policy: self.slip_review,
            },
        )
    }

    pub fn approve(&self, actor: &Actor, id: Uuid) -> Result<Payment, DomainError> {
        actor.require_admin()?;
        let payment = self.payment(id)?;
        let order = self.order(payment.order_id)?;
        self.advance(payment, order, PaymentAction::Approve { admin_id: actor.user_id })
    }

    pub fn reject(&self, actor: &Actor, id: Uuid, reason: &str) -> Result<Payment, DomainError> {
        actor.require_admin()?;
        let payment = self.payment(id)?;
        let order = self.order(payment.order_id)?;
        self.advance(
            payment,
            order,
            PaymentAction::Reject {
                admin_id: actor.user_id,
                reason: reason.to_string(),
            },
        )
    }

    /// Gateway failure callback. The gateway only ever reports failures;
    /// settlement goes through slip upload and review. Callers act as admin.
    pub fn gateway_failure(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Payment, DomainError> {
        actor.require_admin()?;
        let payment = self.payment(id)?;
        let order = self.order(payment.order_id)?;
        self.advance(payment, order, PaymentAction::GatewayFailed { reason })
    }

    fn advance(
        &self,
        payment: Payment,
        order: Order,
        action: PaymentAction,
    ) -> Result<Payment, DomainError> {
        let from = payment.status;
        let transition = match payment.plan(action, order.status, Utc::now()) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Payment {} action refused: {}", payment.id, e);
                return Err(e);
            }
        };
        let order_change = transition.order_change;
        let updated = self.payments.apply(transition)?;
        log::info!("Payment {} moved {} -> {}", updated.id, from, updated.status);

        self.announce(&order, &updated, order_change);
        Ok(updated)
    }

    fn announce(&self, order: &Order, payment: &Payment, order_change: Option<OrderStatusChange>) {
        let buyer = NotificationTarget::User(order.customer_id);

        self.dispatcher.notify(
            buyer,
            NotificationEvent::PaymentStatusChanged {
                order_id: order.id,
                payment_id: payment.id,
                status: payment.status.to_string(),
                reason: payment
                    .rejection_reason
                    .clone()
                    .filter(|_| payment.status == PaymentStatus::Failed),
            },
        );

        if let Some(change) = order_change {
            self.dispatcher.notify(
                buyer,
                NotificationEvent::OrderStatusChanged {
                    order_id: order.id,
                    from: change.from.to_string(),
                    to: change.to.to_string(),
                },
            );
        }

        if payment.status == PaymentStatus::WaitingApproval {
            if let Some(slip_url) = payment.slip_url.clone() {
                self.dispatcher.notify(
                    NotificationTarget::Role(Role::Admin),
                    NotificationEvent::PaymentAwaitingApproval {
                        order_id: order.id,
                        payment_id: payment.id,
                        slip_url,
                    },
                );
            }
        }
    }

    fn payment(&self, id: Uuid) -> Result<Payment, DomainError> {
        self.payments
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("payment {id}")))
    }

    fn order(&self, id: Uuid) -> Result<Order, DomainError> {
        self.orders
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))
    }
}
