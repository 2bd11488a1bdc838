use std::io;
use std::sync::Arc;

use actix_web::web;
use dotenvy::dotenv;
use fulfillment_service::application::Services;
use fulfillment_service::config::{read_product_seeds, AppConfig, StorageBackend};
use fulfillment_service::domain::inventory::Product;
use fulfillment_service::infrastructure::catalog_repo::DieselProductRepository;
use fulfillment_service::infrastructure::live::LiveConnections;
use fulfillment_service::infrastructure::memory::InMemoryStore;
use fulfillment_service::infrastructure::{memory_ports, postgres_ports};
use fulfillment_service::{build_server, create_pool, run_migrations};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(io::Error::other)?;
    let seeds: Vec<Product> = match &config.seed_products_file {
        Some(path) => read_product_seeds(path)
            .map_err(io::Error::other)?
            .into_iter()
            .map(Product::from)
            .collect(),
        None => Vec::new(),
    };

    let live = LiveConnections::new(config.live_channel_capacity);
    let ports = match &config.storage {
        StorageBackend::Postgres { database_url } => {
            let pool = create_pool(database_url).map_err(io::Error::other)?;
            run_migrations(&pool).map_err(io::Error::other)?;

            let products = DieselProductRepository::new(pool.clone());
            for product in &seeds {
                products.upsert(product).map_err(io::Error::other)?;
            }
            log::info!("Using Postgres storage");
            postgres_ports(pool, live.clone())
        }
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            for product in seeds.iter().cloned() {
                store.upsert_product(product).map_err(io::Error::other)?;
            }
            log::warn!("Using in-memory storage; nothing survives a restart");
            memory_ports(store, live.clone())
        }
    };
    if !seeds.is_empty() {
        log::info!("Seeded {} catalog product(s)", seeds.len());
    }

    let services = web::Data::new(Services::new(ports, config.settings.clone()));

    log::info!(
        "Starting server at http://{}:{} (slip review: {:?})",
        config.host,
        config.port,
        config.settings.slip_review
    );

    build_server(services, web::Data::new(live), &config.host, config.port)?.await
}
