use std::sync::Arc;

use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::errors::DomainError;
use crate::domain::notification::{NotificationEvent, NotificationTarget};
use crate::domain::order::{page_offset, Order, OrderPage, OrderStatus, StatusTrigger};
use crate::domain::payment::OrderStatusChange;
use crate::domain::ports::OrderRepository;

use super::notification_dispatcher::NotificationDispatcher;

pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    pub fn get_order(&self, actor: &Actor, id: Uuid) -> Result<Order, DomainError> {
        let order = self
            .repo
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))?;
        if !order.can_view(actor) {
            return Err(DomainError::Forbidden(format!("order {id} is not visible to you")));
        }
        Ok(order)
    }

    pub fn list_orders(
        &self,
        actor: &Actor,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError> {
        if page < 1 || !(1..=100).contains(&limit) {
            return Err(DomainError::InvalidInput(format!(
                "page must be >= 1 and limit within 1..=100, got page {page} limit {limit}"
            )));
        }
        page_offset(page, limit)?;
        self.repo.list_for_customer(actor.user_id, page, limit)
    }

    /// Manual transition by a seller on the order or an admin. Cancelling
    /// puts every line's stock back.
    pub fn change_status(
        &self,
        actor: &Actor,
        id: Uuid,
        to: OrderStatus,
    ) -> Result<Order, DomainError> {
        let order = self
            .repo
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))?;
        if !order.can_manage(actor) {
            return Err(DomainError::Forbidden(format!(
                "{} {} cannot manage order {id}",
                actor.role, actor.user_id
            )));
        }

        let to = order.status.transition(to, StatusTrigger::Manual)?;
        let change = OrderStatusChange {
            order_id: order.id,
            from: order.status,
            to,
        };
        let updated = self.repo.update_status(change, to == OrderStatus::Cancelled)?;
        log::info!(
            "Order {} moved {} -> {} by {} {}",
            id,
            change.from,
            change.to,
            actor.role,
            actor.user_id
        );

        self.dispatcher.notify(
            NotificationTarget::User(updated.customer_id),
            NotificationEvent::OrderStatusChanged {
                order_id: id,
                from: change.from.to_string(),
                to: change.to.to_string(),
            },
        );
        Ok(updated)
    }
}
