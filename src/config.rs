use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::{ServiceSettings, WelcomeCouponSettings};
use crate::domain::inventory::Product;
use crate::domain::payment::SlipReviewPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}='{value}' is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub settings: ServiceSettings,
    pub live_channel_capacity: usize,
    /// JSON array of products loaded into the catalog at start-up.
    pub seed_products_file: Option<PathBuf>,
}

impl AppConfig {
    /// Reads the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StorageBackend::Postgres {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'postgres' or 'memory'".to_string(),
                })
            }
        };

        let welcome = WelcomeCouponSettings {
            amount: parse_or(&get, "WELCOME_COUPON_AMOUNT", BigDecimal::from(100))?,
            min_purchase: parse_or(&get, "WELCOME_COUPON_MIN_PURCHASE", BigDecimal::from(200))?,
            valid_days: parse_or(&get, "WELCOME_COUPON_VALID_DAYS", 30)?,
        };
        if welcome.valid_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "WELCOME_COUPON_VALID_DAYS",
                value: welcome.valid_days.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            storage,
            settings: ServiceSettings {
                slip_review: parse_or(&get, "SLIP_REVIEW", SlipReviewPolicy::Auto)?,
                welcome,
            },
            live_channel_capacity: parse_or(&get, "LIVE_CHANNEL_CAPACITY", 64)?,
            seed_products_file: get("SEED_PRODUCTS_FILE").map(PathBuf::from),
        })
    }
}

/// One entry of the `SEED_PRODUCTS_FILE` JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSeed {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

impl From<ProductSeed> for Product {
    fn from(seed: ProductSeed) -> Self {
        Product {
            id: seed.id,
            seller_id: seed.seller_id,
            name: seed.name,
            price: seed.price,
            stock: seed.stock,
            sold: 0,
        }
    }
}

pub fn read_product_seeds(path: &Path) -> Result<Vec<ProductSeed>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "SEED_PRODUCTS_FILE",
        value: path.display().to_string(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let seeds: Vec<ProductSeed> = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    if let Some(bad) = seeds.iter().find(|s| s.stock < 0) {
        return Err(invalid(format!("product '{}' has negative stock", bad.name)));
    }
    Ok(seeds)
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_for_the_memory_backend() {
        let cfg = config(&[("STORAGE_BACKEND", "memory")]).expect("config");
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.settings.slip_review, SlipReviewPolicy::Auto);
        assert_eq!(cfg.settings.welcome.amount, BigDecimal::from(100));
        assert_eq!(cfg.settings.welcome.valid_days, 30);
        assert_eq!(cfg.live_channel_capacity, 64);
        assert!(cfg.seed_products_file.is_none());
    }

    #[test]
    fn postgres_requires_a_database_url() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));

        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("SLIP_REVIEW", "manual"),
        ])
        .expect("config");
        assert_eq!(
            cfg.storage,
            StorageBackend::Postgres {
                database_url: "postgres://localhost/market".to_string()
            }
        );
        assert_eq!(cfg.settings.slip_review, SlipReviewPolicy::Manual);
    }

    #[test]
    fn malformed_values_are_reported_by_key() {
        let err = config(&[("STORAGE_BACKEND", "memory"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config(&[
            ("STORAGE_BACKEND", "memory"),
            ("WELCOME_COUPON_VALID_DAYS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "WELCOME_COUPON_VALID_DAYS",
                ..
            }
        ));

        let err = config(&[("STORAGE_BACKEND", "sqlite")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STORAGE_BACKEND", .. }));
    }

    #[test]
    fn seeds_get_generated_ids_and_zero_sold() {
        let seeds: Vec<ProductSeed> = serde_json::from_str(
            r#"[{"seller_id":"6f1c2a3e-0000-4000-8000-000000000001","name":"Mug","price":"125.50","stock":3}]"#,
        )
        .expect("seeds");
        let product = Product::from(seeds[0].clone());
        assert_eq!(product.name, "Mug");
        assert_eq!(product.price, "125.50".parse::<BigDecimal>().expect("price"));
        assert_eq!(product.stock, 3);
        assert_eq!(product.sold, 0);
    }

    #[test]
    fn unreadable_seed_file_is_a_config_error() {
        let err = read_product_seeds(Path::new("/nonexistent/seeds.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SEED_PRODUCTS_FILE", .. }));
    }
}
