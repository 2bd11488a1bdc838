use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::inventory::{ensure_positive_quantity, Product};
use crate::domain::ports::{Catalog, InventoryLedger};
use crate::schema::products;

use super::models::ProductRow;

// ── Guarded stock primitives (shared with the checkout transaction) ──────────

/// Takes `quantity` units in one guarded statement and returns the product's
/// seller. Nothing is written when stock would go negative.
pub(crate) fn take_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<Uuid, DomainError> {
    ensure_positive_quantity(quantity)?;
    let seller = diesel::update(
        products::table
            .filter(products::id.eq(product_id))
            .filter(products::stock.ge(quantity)),
    )
    .set((
        products::stock.eq(products::stock - quantity),
        products::sold.eq(products::sold + quantity),
        products::updated_at.eq(Utc::now()),
    ))
    .returning(products::seller_id)
    .get_result::<Uuid>(conn)
    .optional()?;

    if let Some(seller_id) = seller {
        return Ok(seller_id);
    }

    let available = products::table
        .find(product_id)
        .select(products::stock)
        .first::<i32>(conn)
        .optional()?;
    match available {
        None => Err(DomainError::not_found(format!("product {product_id}"))),
        Some(available) => Err(DomainError::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        }),
    }
}

/// Reverses a sale: units go back to stock and leave the sold counter.
pub(crate) fn return_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), DomainError> {
    ensure_positive_quantity(quantity)?;
    diesel::update(products::table.find(product_id))
        .set((
            products::stock.eq(products::stock + quantity),
            products::sold.eq(products::sold - quantity),
            products::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

// ── Repository ───────────────────────────────────────────────────────────────

pub struct DieselProductRepository {
    pool: DbPool,
}

impl DieselProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts a catalog row. The catalog service owns products; this exists
    /// for seeding and tests.
    pub fn upsert(&self, product: &Product) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let row = ProductRow::from(product);
        diesel::insert_into(products::table)
            .values(&row)
            .on_conflict(products::id)
            .do_update()
            .set((
                products::name.eq(&row.name),
                products::price.eq(&row.price),
                products::stock.eq(row.stock),
            ))
            .execute(&mut conn)?;
        Ok(())
    }
}

impl Catalog for DieselProductRepository {
    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let mut conn = self.pool.get()?;
        let row = products::table
            .find(id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Product::from))
    }
}

impl InventoryLedger for DieselProductRepository {
    fn restock(&self, product_id: Uuid, quantity: i32) -> Result<Product, DomainError> {
        ensure_positive_quantity(quantity)?;
        let mut conn = self.pool.get()?;
        let row = diesel::update(products::table.find(product_id))
            .set((
                products::stock.eq(products::stock + quantity),
                products::updated_at.eq(Utc::now()),
            ))
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)
            .optional()?;
        row.map(Product::from)
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))
    }
}
