use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::actor::Actor;
use crate::domain::notification::{Notification, NotificationTarget};
use crate::errors::AppError;
use crate::infrastructure::live::LiveConnections;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListNotificationsParams {
    /// Defaults to 50, maximum 200.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id,
            kind: n.kind,
            title: n.title,
            message: n.message,
            order_id: n.order_id,
            payment_id: n.payment_id,
            payload: n.payload,
            is_read: n.is_read,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

/// GET /notifications
///
/// Notifications addressed to the caller or the caller's role, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum items (default 50, max 200)"),
    ),
    responses(
        (status = 200, description = "Notifications", body = [NotificationResponse]),
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    services: web::Data<Services>,
    actor: Actor,
    query: web::Query<ListNotificationsParams>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.clamp(1, 200);

    let items = web::block(move || services.notifications.list(&actor, limit))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let body: Vec<NotificationResponse> =
        items.into_iter().map(NotificationResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /notifications/{id}/read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Notification UUID"),
    ),
    responses(
        (status = 200, description = "Marked as read", body = NotificationResponse),
        (status = 404, description = "No such notification for the caller"),
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let notification = web::block(move || services.notifications.mark_read(&actor, id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(NotificationResponse::from(notification)))
}

/// GET /notifications/stream
///
/// Server-Sent Events feed of new notifications for the caller and the
/// caller's role. Anything missed while disconnected is in `GET /notifications`.
#[utoipa::path(
    get,
    path = "/notifications/stream",
    responses(
        (status = 200, description = "text/event-stream of notifications"),
    ),
    tag = "notifications"
)]
pub async fn stream_notifications(live: web::Data<LiveConnections>, actor: Actor) -> HttpResponse {
    let personal = BroadcastStream::new(live.subscribe(NotificationTarget::User(actor.user_id)));
    let role = BroadcastStream::new(live.subscribe(NotificationTarget::Role(actor.role)));
    log::debug!("{} {} subscribed to live notifications", actor.role, actor.user_id);

    let events = personal.merge(role).filter_map(move |item| match item {
        Ok(notification) => sse_frame(notification).map(Ok::<_, actix_web::Error>),
        Err(e) => {
            log::warn!("Live feed for {} fell behind: {}", actor.user_id, e);
            None
        }
    });

    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

fn sse_frame(notification: Notification) -> Option<Bytes> {
    let kind = notification.kind.clone();
    let data = serde_json::to_string(&NotificationResponse::from(notification)).ok()?;
    Some(Bytes::from(format!("event: {kind}\ndata: {data}\n\n")))
}
