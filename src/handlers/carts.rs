use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::actor::Actor;
use crate::domain::cart::Cart;
use crate::errors::AppError;

use super::money;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Selected options, e.g. {"size": "M", "color": "red"}
    #[schema(value_type = Option<Object>)]
    pub variant: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLineRequest {
    /// New quantity; 0 removes the line.
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: String,
    pub subtotal: String,
    #[schema(value_type = Option<Object>)]
    pub variant: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub lines: Vec<CartLineResponse>,
    pub total: String,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        CartResponse {
            id: cart.id,
            owner_id: cart.owner_id,
            total: money(&cart.total),
            lines: cart
                .lines
                .into_iter()
                .map(|l| CartLineResponse {
                    id: l.id,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    subtotal: money(&l.subtotal()),
                    unit_price: money(&l.unit_price),
                    variant: l.variant,
                })
                .collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /cart
///
/// Returns the caller's cart, creating an empty one on first use.
#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 401, description = "Missing identity headers"),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    services: web::Data<Services>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let cart = web::block(move || services.carts.get(actor.user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /cart/lines
///
/// Adds a product at its current catalog price. The same product and variant
/// added twice is merged into one line.
#[utoipa::path(
    post,
    path = "/cart/lines",
    request_body = AddLineRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Quantity must be positive"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Not enough stock"),
    ),
    tag = "cart"
)]
pub async fn add_line(
    services: web::Data<Services>,
    actor: Actor,
    body: web::Json<AddLineRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    let cart = web::block(move || {
        services
            .carts
            .add_line(actor.user_id, body.product_id, body.quantity, body.variant)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// PUT /cart/lines/{id}
#[utoipa::path(
    put,
    path = "/cart/lines/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart line UUID"),
    ),
    request_body = UpdateLineRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Negative quantity"),
        (status = 404, description = "Line not found"),
    ),
    tag = "cart"
)]
pub async fn update_line(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<UpdateLineRequest>,
) -> Result<HttpResponse, AppError> {
    let line_id = path.into_inner();
    let quantity = body.quantity;

    let cart = web::block(move || services.carts.set_quantity(actor.user_id, line_id, quantity))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// DELETE /cart/lines/{id}
#[utoipa::path(
    delete,
    path = "/cart/lines/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart line UUID"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Line not found"),
    ),
    tag = "cart"
)]
pub async fn remove_line(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let line_id = path.into_inner();

    let cart = web::block(move || services.carts.remove_line(actor.user_id, line_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// DELETE /cart
#[utoipa::path(
    delete,
    path = "/cart",
    responses(
        (status = 200, description = "Emptied cart", body = CartResponse),
    ),
    tag = "cart"
)]
pub async fn clear_cart(
    services: web::Data<Services>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let cart = web::block(move || services.carts.clear(actor.user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /cart/reconcile
///
/// Recomputes the cart total from its lines and repairs the stored value if
/// it drifted.
#[utoipa::path(
    post,
    path = "/cart/reconcile",
    responses(
        (status = 200, description = "Cart with a verified total", body = CartResponse),
    ),
    tag = "cart"
)]
pub async fn reconcile_cart(
    services: web::Data<Services>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let cart = web::block(move || services.carts.reconcile(actor.user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}
