use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::coupon_service::CouponDraft;
use crate::application::Services;
use crate::domain::actor::Actor;
use crate::domain::coupon::{Coupon, CouponValidation, DiscountRule};
use crate::errors::AppError;

use super::{money, parse_money};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueCouponRequest {
    pub owner_id: Uuid,
    /// Generated when omitted.
    pub code: Option<String>,
    /// Flat discount, e.g. "100". Exclusive with `discount_percent`.
    pub discount_amount: Option<String>,
    pub discount_percent: Option<String>,
    pub max_discount: Option<String>,
    #[serde(default)]
    pub min_purchase: Option<String>,
    /// Days until expiry. Defaults to 30.
    #[serde(default = "default_valid_days")]
    pub valid_days: i64,
}

fn default_valid_days() -> i64 {
    30
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    /// Defaults to the caller's current cart total.
    pub cart_total: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub discount_amount: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl From<CouponValidation> for ValidateCouponResponse {
    fn from(v: CouponValidation) -> Self {
        ValidateCouponResponse {
            valid: v.valid,
            discount_amount: money(&v.discount_amount),
            reason: v.rejection.as_ref().map(|r| r.code().to_string()),
            message: v.rejection.as_ref().map(|r| r.to_string()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub owner_id: Uuid,
    pub kind: String,
    pub discount_amount: Option<String>,
    pub discount_percent: Option<String>,
    pub max_discount: Option<String>,
    pub min_purchase: String,
    pub expires_at: String,
    pub is_used: bool,
    pub used_at: Option<String>,
    pub order_id: Option<Uuid>,
}

impl From<Coupon> for CouponResponse {
    fn from(c: Coupon) -> Self {
        let (discount_amount, discount_percent, max_discount) = match &c.rule {
            DiscountRule::Flat(amount) => (Some(money(amount)), None, None),
            DiscountRule::Percent {
                percent,
                max_discount,
            } => (None, Some(percent.to_string()), max_discount.as_ref().map(money)),
        };
        CouponResponse {
            id: c.id,
            code: c.code,
            owner_id: c.owner_id,
            kind: c.kind.as_str().to_string(),
            discount_amount,
            discount_percent,
            max_discount,
            min_purchase: money(&c.min_purchase),
            expires_at: c.expires_at.to_rfc3339(),
            is_used: c.is_used,
            used_at: c.used_at.map(|t| t.to_rfc3339()),
            order_id: c.order_id,
        }
    }
}

impl IssueCouponRequest {
    fn into_draft(self) -> Result<CouponDraft, AppError> {
        let rule = match (&self.discount_amount, &self.discount_percent) {
            (Some(amount), None) => DiscountRule::Flat(parse_money("discount_amount", amount)?),
            (None, Some(percent)) => DiscountRule::Percent {
                percent: parse_money("discount_percent", percent)?,
                max_discount: self
                    .max_discount
                    .as_deref()
                    .map(|m| parse_money("max_discount", m))
                    .transpose()?,
            },
            _ => {
                return Err(AppError::InvalidArgument(
                    "exactly one of discount_amount or discount_percent is required".to_string(),
                ))
            }
        };
        if !(1..=3650).contains(&self.valid_days) {
            return Err(AppError::InvalidArgument(format!(
                "valid_days must be within 1..=3650, got {}",
                self.valid_days
            )));
        }

        Ok(CouponDraft {
            owner_id: self.owner_id,
            code: self.code,
            rule,
            min_purchase: match self.min_purchase.as_deref() {
                Some(m) => parse_money("min_purchase", m)?,
                None => Default::default(),
            },
            expires_at: Utc::now() + Duration::days(self.valid_days),
        })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /coupons/welcome
///
/// Issues the caller's welcome coupon, or returns the one already issued.
#[utoipa::path(
    post,
    path = "/coupons/welcome",
    responses(
        (status = 200, description = "Welcome coupon", body = CouponResponse),
    ),
    tag = "coupons"
)]
pub async fn issue_welcome(
    services: web::Data<Services>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let coupon = web::block(move || services.coupons.issue_welcome(actor.user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CouponResponse::from(coupon)))
}

/// POST /coupons
#[utoipa::path(
    post,
    path = "/coupons",
    request_body = IssueCouponRequest,
    responses(
        (status = 201, description = "Coupon issued", body = CouponResponse),
        (status = 400, description = "Invalid discount rule or code"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Code already taken"),
    ),
    tag = "coupons"
)]
pub async fn issue_coupon(
    services: web::Data<Services>,
    actor: Actor,
    body: web::Json<IssueCouponRequest>,
) -> Result<HttpResponse, AppError> {
    let draft = body.into_inner().into_draft()?;

    let coupon = web::block(move || services.coupons.issue(&actor, draft))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(CouponResponse::from(coupon)))
}

/// GET /coupons
///
/// The caller's coupons, newest first.
#[utoipa::path(
    get,
    path = "/coupons",
    responses(
        (status = 200, description = "Coupons owned by the caller", body = [CouponResponse]),
    ),
    tag = "coupons"
)]
pub async fn list_coupons(
    services: web::Data<Services>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let coupons = web::block(move || services.coupons.list(actor.user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let body: Vec<CouponResponse> = coupons.into_iter().map(CouponResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /coupons/validate
///
/// Runs the checkout coupon checks without consuming anything.
#[utoipa::path(
    post,
    path = "/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Validation result", body = ValidateCouponResponse),
        (status = 400, description = "Malformed code"),
    ),
    tag = "coupons"
)]
pub async fn validate_coupon(
    services: web::Data<Services>,
    actor: Actor,
    body: web::Json<ValidateCouponRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let cart_total = body
        .cart_total
        .as_deref()
        .map(|t| parse_money("cart_total", t))
        .transpose()?;

    let validation =
        web::block(move || services.coupons.validate(actor.user_id, &body.code, cart_total))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ValidateCouponResponse::from(validation)))
}
