//! Live notification fan-out.
//!
//! One broadcast channel per recipient (a user or a whole role). SSE handlers
//! subscribe to their user channel and their role channel; the dispatcher
//! pushes to whichever channel a notification targets.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::notification::{Notification, NotificationTarget};
use crate::domain::ports::LivePush;

#[derive(Clone)]
pub struct LiveConnections {
    channels: Arc<DashMap<NotificationTarget, broadcast::Sender<Notification>>>,
    capacity: usize,
}

impl LiveConnections {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, target: NotificationTarget) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(target)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of open subscriptions for `target`.
    pub fn listeners(&self, target: NotificationTarget) -> usize {
        self.channels
            .get(&target)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl LivePush for LiveConnections {
    fn push(&self, target: NotificationTarget, notification: &Notification) -> usize {
        let Some(tx) = self.channels.get(&target).map(|tx| tx.clone()) else {
            return 0;
        };
        match tx.send(notification.clone()) {
            Ok(receivers) => receivers,
            Err(_) => {
                // Every subscriber hung up; drop the channel unless someone
                // re-subscribed in the meantime.
                self.channels
                    .remove_if(&target, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::actor::Role;
    use crate::domain::notification::NotificationEvent;

    fn notification(target: NotificationTarget) -> Notification {
        let event = NotificationEvent::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            from: "processing".to_string(),
            to: "shipped".to_string(),
        };
        Notification::from_event(target, &event, Utc::now())
    }

    #[test]
    fn push_without_listeners_reaches_nobody() {
        let live = LiveConnections::new(8);
        let target = NotificationTarget::User(Uuid::new_v4());
        assert_eq!(live.push(target, &notification(target)), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_pushes_for_their_target_only() {
        let live = LiveConnections::new(8);
        let me = NotificationTarget::User(Uuid::new_v4());
        let admins = NotificationTarget::Role(Role::Admin);
        let mut mine = live.subscribe(me);
        let mut admin_feed = live.subscribe(admins);

        let n = notification(me);
        assert_eq!(live.push(me, &n), 1);

        assert_eq!(mine.recv().await.expect("delivered").id, n.id);
        assert!(admin_feed.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_cleaned_up() {
        let live = LiveConnections::new(8);
        let target = NotificationTarget::Role(Role::Seller);
        let rx = live.subscribe(target);
        assert_eq!(live.listeners(target), 1);
        drop(rx);

        assert_eq!(live.push(target, &notification(target)), 0);
        assert_eq!(live.listeners(target), 0);
    }
}
