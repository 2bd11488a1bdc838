use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::actor::Actor;
use crate::domain::payment::{CustomerInfo, Payment, PaymentMethod};
use crate::errors::AppError;

use super::money;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfoDto {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl From<CustomerInfoDto> for CustomerInfo {
    fn from(c: CustomerInfoDto) -> Self {
        CustomerInfo {
            name: c.name,
            email: c.email,
            phone: c.phone,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// cash, credit_card or qr_code
    pub method: String,
    pub customer_info: CustomerInfoDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadSlipRequest {
    pub slip_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookRequest {
    /// Only `failed` is accepted; settlement goes through slip upload.
    pub outcome: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: String,
    pub method: String,
    pub status: String,
    pub transaction_id: String,
    pub qr_payload: Option<String>,
    pub slip_url: Option<String>,
    pub customer_info: CustomerInfoDto,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        PaymentResponse {
            id: p.id,
            order_id: p.order_id,
            amount: money(&p.amount),
            method: p.method.as_str().to_string(),
            status: p.status.to_string(),
            transaction_id: p.transaction_id,
            qr_payload: p.qr_payload,
            slip_url: p.slip_url,
            customer_info: CustomerInfoDto {
                name: p.customer_info.name,
                email: p.customer_info.email,
                phone: p.customer_info.phone,
            },
            approved_by: p.approved_by,
            approved_at: p.approved_at.map(|t| t.to_rfc3339()),
            rejected_by: p.rejected_by,
            rejected_at: p.rejected_at.map(|t| t.to_rfc3339()),
            rejection_reason: p.rejection_reason,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders/{id}/payments
///
/// Opens a payment for the caller's order. Cash and card settle immediately
/// and move the order to `processing`; QR transfers start `pending` with a QR
/// payload.
#[utoipa::path(
    post,
    path = "/orders/{id}/payments",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentResponse),
        (status = 403, description = "Not the buyer"),
        (status = 409, description = "Order already has an active payment or cannot be paid"),
    ),
    tag = "payments"
)]
pub async fn create_payment(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let method: PaymentMethod = body.method.trim().parse()?;

    let payment = web::block(move || {
        services
            .payments
            .create_payment(&actor, order_id, method, body.customer_info.into())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(PaymentResponse::from(payment)))
}

/// GET /payments/{id}
#[utoipa::path(
    get,
    path = "/payments/{id}",
    params(
        ("id" = Uuid, Path, description = "Payment UUID"),
    ),
    responses(
        (status = 200, description = "Payment found", body = PaymentResponse),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Payment not found"),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payment_id = path.into_inner();

    let payment = web::block(move || services.payments.get_payment(&actor, payment_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /payments/{id}/slip
///
/// Attaches a bank-transfer slip URL to a pending QR payment.
#[utoipa::path(
    post,
    path = "/payments/{id}/slip",
    params(
        ("id" = Uuid, Path, description = "Payment UUID"),
    ),
    request_body = UploadSlipRequest,
    responses(
        (status = 200, description = "Slip accepted", body = PaymentResponse),
        (status = 400, description = "Malformed slip URL"),
        (status = 409, description = "Payment is not awaiting a slip"),
    ),
    tag = "payments"
)]
pub async fn upload_slip(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<UploadSlipRequest>,
) -> Result<HttpResponse, AppError> {
    let payment_id = path.into_inner();
    let body = body.into_inner();

    let payment =
        web::block(move || services.payments.upload_slip(&actor, payment_id, &body.slip_url))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /payments/{id}/approve
#[utoipa::path(
    post,
    path = "/payments/{id}/approve",
    params(
        ("id" = Uuid, Path, description = "Payment UUID"),
    ),
    responses(
        (status = 200, description = "Payment completed", body = PaymentResponse),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Payment is not waiting for approval"),
    ),
    tag = "payments"
)]
pub async fn approve_payment(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payment_id = path.into_inner();

    let payment = web::block(move || services.payments.approve(&actor, payment_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /payments/{id}/reject
///
/// Fails the payment and returns the order to `not_process` so the buyer can
/// pay again. The buyer is notified with the reason.
#[utoipa::path(
    post,
    path = "/payments/{id}/reject",
    params(
        ("id" = Uuid, Path, description = "Payment UUID"),
    ),
    request_body = RejectPaymentRequest,
    responses(
        (status = 200, description = "Payment rejected", body = PaymentResponse),
        (status = 400, description = "Reason missing"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Payment is not waiting for approval"),
    ),
    tag = "payments"
)]
pub async fn reject_payment(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<RejectPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let payment_id = path.into_inner();
    let body = body.into_inner();

    let payment = web::block(move || services.payments.reject(&actor, payment_id, &body.reason))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /payments/{id}/webhook
///
/// Failure callback from the simulated payment gateway. Requires the admin
/// role; the gateway cannot settle a payment.
#[utoipa::path(
    post,
    path = "/payments/{id}/webhook",
    params(
        ("id" = Uuid, Path, description = "Payment UUID"),
    ),
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Outcome applied", body = PaymentResponse),
        (status = 400, description = "Outcome other than failed"),
        (status = 401, description = "Missing identity"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Payment already settled"),
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<WebhookRequest>,
) -> Result<HttpResponse, AppError> {
    let payment_id = path.into_inner();
    let body = body.into_inner();
    if body.outcome.trim() != "failed" {
        return Err(AppError::InvalidArgument(format!(
            "unsupported webhook outcome '{}'",
            body.outcome.trim()
        )));
    }
    let reason = body.reason;

    let payment = web::block(move || services.payments.gateway_failure(&actor, payment_id, reason))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}
