use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::errors::DomainError;
use crate::domain::notification::{
    DeliveryOutcome, Notification, NotificationEvent, NotificationTarget,
};
use crate::domain::ports::{LivePush, NotificationRepository};

/// Persists a notification, then pushes it to whoever is connected.
///
/// Only call after the state change being announced has committed. Failures
/// never reach the caller; they are logged and reported as the outcome.
pub struct NotificationDispatcher {
    repo: Arc<dyn NotificationRepository>,
    live: Arc<dyn LivePush>,
}

impl NotificationDispatcher {
    pub fn new(repo: Arc<dyn NotificationRepository>, live: Arc<dyn LivePush>) -> Self {
        Self { repo, live }
    }

    pub fn notify(&self, target: NotificationTarget, event: NotificationEvent) -> DeliveryOutcome {
        let notification = Notification::from_event(target, &event, Utc::now());

        let stored = match self.repo.insert(&notification) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to store {} notification {} for {:?}: {}",
                    notification.kind,
                    notification.id,
                    target,
                    e
                );
                false
            }
        };

        let receivers = self.live.push(target, &notification);
        let outcome = match (receivers, stored) {
            (0, true) => DeliveryOutcome::Stored,
            (0, false) => DeliveryOutcome::Dropped,
            (receivers, _) => DeliveryOutcome::Live { receivers },
        };

        if outcome == DeliveryOutcome::Dropped {
            log::warn!("Notification {} for {:?} was dropped", notification.id, target);
        } else {
            log::debug!("Notification {} for {:?}: {:?}", notification.id, target, outcome);
        }
        outcome
    }

    pub fn list(&self, actor: &Actor, limit: i64) -> Result<Vec<Notification>, DomainError> {
        self.repo.list_for(actor, limit)
    }

    pub fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification, DomainError> {
        self.repo.mark_read(actor, id)
    }
}
