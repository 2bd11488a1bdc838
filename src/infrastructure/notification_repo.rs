use std::collections::HashSet;

use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Nullable};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::actor::Actor;
use crate::domain::errors::DomainError;
use crate::domain::notification::Notification;
use crate::domain::ports::NotificationRepository;
use crate::schema::{notification_reads, notifications};

use super::models::NotificationRow;

pub struct DieselNotificationRepository {
    pool: DbPool,
}

impl DieselNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl NotificationRepository for DieselNotificationRepository {
    fn insert(&self, notification: &Notification) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(notifications::table)
            .values(&NotificationRow::from(notification))
            .execute(&mut conn)?;
        Ok(())
    }

    fn list_for(&self, actor: &Actor, limit: i64) -> Result<Vec<Notification>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = notifications::table
            .filter(visible_to(actor))
            .order(notifications::created_at.desc())
            .limit(limit)
            .select(NotificationRow::as_select())
            .load(&mut conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let read: HashSet<Uuid> = notification_reads::table
            .filter(notification_reads::user_id.eq(actor.user_id))
            .filter(notification_reads::notification_id.eq_any(&ids))
            .select(notification_reads::notification_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect();

        rows.into_iter()
            .map(|row| {
                let mut n = Notification::try_from(row)?;
                n.is_read |= read.contains(&n.id);
                Ok(n)
            })
            .collect()
    }

    /// Direct notifications carry their own flag. Role notifications are
    /// shared, so each recipient gets a row in `notification_reads`.
    fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let row = notifications::table
                .filter(notifications::id.eq(id))
                .filter(visible_to(actor))
                .select(NotificationRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| DomainError::not_found(format!("notification {id}")))?;

            let mut notification = if row.target_user_id == Some(actor.user_id) {
                let row = diesel::update(notifications::table.find(id))
                    .set(notifications::is_read.eq(true))
                    .returning(NotificationRow::as_returning())
                    .get_result(conn)?;
                Notification::try_from(row)?
            } else {
                diesel::insert_into(notification_reads::table)
                    .values((
                        notification_reads::notification_id.eq(id),
                        notification_reads::user_id.eq(actor.user_id),
                        notification_reads::read_at.eq(Utc::now()),
                    ))
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                Notification::try_from(row)?
            };
            notification.is_read = true;
            Ok(notification)
        })
    }
}

type Visibility = Box<dyn BoxableExpression<notifications::table, Pg, SqlType = Nullable<Bool>>>;

/// Addressed to the actor directly or to the actor's role.
fn visible_to(actor: &Actor) -> Visibility {
    Box::new(
        notifications::target_user_id
            .eq(actor.user_id)
            .or(notifications::target_role.eq(actor.role.as_str().to_string())),
    )
}
