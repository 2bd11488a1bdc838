use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::domain::errors::DomainError;
use crate::domain::outbox::OutboxEvent;
use crate::schema::marketplace_outbox;

use super::models::{NewOutboxEventRow, OutboxEventRow};

/// Inserts an outbox row on `conn`. Call it inside the transaction that
/// commits the change being announced.
pub(crate) fn write(conn: &mut PgConnection, event: OutboxEvent) -> Result<(), DomainError> {
    diesel::insert_into(marketplace_outbox::table)
        .values(&NewOutboxEventRow::from(event))
        .execute(conn)?;
    Ok(())
}

pub fn events_for(
    conn: &mut PgConnection,
    aggregate_id: &str,
) -> Result<Vec<OutboxEventRow>, DomainError> {
    Ok(marketplace_outbox::table
        .filter(marketplace_outbox::aggregate_id.eq(aggregate_id))
        .order(marketplace_outbox::created_at.asc())
        .select(OutboxEventRow::as_select())
        .load(conn)?)
}
