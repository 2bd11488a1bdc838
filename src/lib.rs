pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use std::error::Error;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::application::Services;
use crate::errors::AppError;
use crate::infrastructure::live::LiveConnections;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if !applied.is_empty() {
        log::info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::carts::get_cart,
        handlers::carts::add_line,
        handlers::carts::update_line,
        handlers::carts::remove_line,
        handlers::carts::clear_cart,
        handlers::carts::reconcile_cart,
        handlers::orders::checkout,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::update_status,
        handlers::payments::create_payment,
        handlers::payments::get_payment,
        handlers::payments::upload_slip,
        handlers::payments::approve_payment,
        handlers::payments::reject_payment,
        handlers::payments::payment_webhook,
        handlers::coupons::issue_welcome,
        handlers::coupons::issue_coupon,
        handlers::coupons::list_coupons,
        handlers::coupons::validate_coupon,
        handlers::inventory::restock,
        handlers::notifications::list_notifications,
        handlers::notifications::mark_read,
        handlers::notifications::stream_notifications,
    ),
    tags(
        (name = "cart", description = "Per-user shopping cart"),
        (name = "orders", description = "Checkout and the order lifecycle"),
        (name = "payments", description = "Payment workflow and slip review"),
        (name = "coupons", description = "Welcome and promotional coupons"),
        (name = "inventory", description = "Seller stock management"),
        (name = "notifications", description = "Stored and live notifications"),
    ),
    info(
        title = "Fulfillment Service",
        description = "Carts, checkout, payments and order tracking for a multi-seller marketplace. \
                       Callers identify themselves with the X-User-Id and X-User-Role headers."
    )
)]
pub struct ApiDoc;

/// Registers every route plus extractor error handlers that answer with the
/// service's JSON error body.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    )
    .service(
        web::scope("/cart")
            .route("", web::get().to(handlers::carts::get_cart))
            .route("", web::delete().to(handlers::carts::clear_cart))
            .route("/lines", web::post().to(handlers::carts::add_line))
            .route("/lines/{id}", web::put().to(handlers::carts::update_line))
            .route("/lines/{id}", web::delete().to(handlers::carts::remove_line))
            .route("/reconcile", web::post().to(handlers::carts::reconcile_cart)),
    )
    .route("/checkout", web::post().to(handlers::orders::checkout))
    .service(
        web::scope("/orders")
            .route("", web::get().to(handlers::orders::list_orders))
            .route("/{id}", web::get().to(handlers::orders::get_order))
            .route("/{id}/status", web::put().to(handlers::orders::update_status))
            .route("/{id}/payments", web::post().to(handlers::payments::create_payment)),
    )
    .service(
        web::scope("/payments")
            .route("/{id}", web::get().to(handlers::payments::get_payment))
            .route("/{id}/slip", web::post().to(handlers::payments::upload_slip))
            .route("/{id}/approve", web::post().to(handlers::payments::approve_payment))
            .route("/{id}/reject", web::post().to(handlers::payments::reject_payment))
            .route("/{id}/webhook", web::post().to(handlers::payments::payment_webhook)),
    )
    .service(
        web::scope("/coupons")
            .route("", web::get().to(handlers::coupons::list_coupons))
            .route("", web::post().to(handlers::coupons::issue_coupon))
            .route("/welcome", web::post().to(handlers::coupons::issue_welcome))
            .route("/validate", web::post().to(handlers::coupons::validate_coupon)),
    )
    .route(
        "/inventory/{product_id}/restock",
        web::post().to(handlers::inventory::restock),
    )
    .service(
        web::scope("/notifications")
            .route("", web::get().to(handlers::notifications::list_notifications))
            .route("/stream", web::get().to(handlers::notifications::stream_notifications))
            .route("/{id}/read", web::post().to(handlers::notifications::mark_read)),
    );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    services: web::Data<Services>,
    live: web::Data<LiveConnections>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(services.clone())
            .app_data(live.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
