use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::actor::{Actor, Role};
use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity, taken from headers set by the upstream auth gateway.
impl FromRequest for Actor {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req))
    }
}

fn actor_from_headers(req: &HttpRequest) -> Result<Actor, AppError> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let unauthorized = || AppError::Unauthorized("unauthorized".to_string());

    let user_id = header(USER_ID_HEADER)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(unauthorized)?;
    let role = header(USER_ROLE_HEADER)
        .and_then(|v| v.parse::<Role>().ok())
        .ok_or_else(unauthorized)?;

    Ok(Actor::new(user_id, role))
}
