use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::actor::Actor;
use crate::domain::inventory::Product;
use crate::errors::AppError;

use super::money;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestockRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: String,
    pub stock: i32,
    pub sold: i32,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        ProductResponse {
            id: p.id,
            seller_id: p.seller_id,
            name: p.name,
            price: money(&p.price),
            stock: p.stock,
            sold: p.sold,
        }
    }
}

/// POST /inventory/{product_id}/restock
#[utoipa::path(
    post,
    path = "/inventory/{product_id}/restock",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = RestockRequest,
    responses(
        (status = 200, description = "Updated stock", body = ProductResponse),
        (status = 400, description = "Quantity must be positive"),
        (status = 403, description = "Not the product's seller"),
        (status = 404, description = "Product not found"),
    ),
    tag = "inventory"
)]
pub async fn restock(
    services: web::Data<Services>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<RestockRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let quantity = body.quantity;

    let product = web::block(move || services.inventory.restock(&actor, product_id, quantity))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ProductResponse::from(product)))
}
