use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{Cart, CartChange, CartMutation, CartOp};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::{cart_lines, carts};

use super::models::{cart_from_rows, CartLineRow, CartRow, NewCartLineRow, NewCartRow};

/// Creates the owner's cart if needed, then loads it under `FOR UPDATE` so
/// every writer to the same cart is serialized until the transaction ends.
pub(crate) fn lock_cart(conn: &mut PgConnection, owner_id: Uuid) -> Result<Cart, DomainError> {
    diesel::insert_into(carts::table)
        .values(&NewCartRow {
            id: Uuid::new_v4(),
            owner_id,
            total: BigDecimal::zero(),
        })
        .on_conflict(carts::owner_id)
        .do_nothing()
        .execute(conn)?;

    let row = carts::table
        .filter(carts::owner_id.eq(owner_id))
        .select(CartRow::as_select())
        .for_update()
        .first(conn)?;

    let lines = cart_lines::table
        .filter(cart_lines::cart_id.eq(row.id))
        .order(cart_lines::created_at.asc())
        .select(CartLineRow::as_select())
        .load(conn)?;

    cart_from_rows(row, lines)
}

/// Writes the line diff and shifts the stored total by the mutation's delta.
pub(crate) fn persist_mutation(
    conn: &mut PgConnection,
    cart_id: Uuid,
    mutation: &CartMutation,
) -> Result<(), DomainError> {
    match &mutation.change {
        CartChange::Inserted(line) => {
            diesel::insert_into(cart_lines::table)
                .values(&NewCartLineRow::from_line(cart_id, line)?)
                .execute(conn)?;
        }
        CartChange::QuantityChanged { line_id, quantity } => {
            diesel::update(cart_lines::table.find(*line_id))
                .set(cart_lines::quantity.eq(*quantity))
                .execute(conn)?;
        }
        CartChange::Removed { line_id } => {
            diesel::delete(cart_lines::table.find(*line_id)).execute(conn)?;
        }
        CartChange::Cleared => {
            diesel::delete(cart_lines::table.filter(cart_lines::cart_id.eq(cart_id)))
                .execute(conn)?;
        }
    }

    diesel::update(carts::table.find(cart_id))
        .set((
            carts::total.eq(carts::total + mutation.delta.clone()),
            carts::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

// ── Repository ───────────────────────────────────────────────────────────────

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CartRepository for DieselCartRepository {
    fn load(&self, owner_id: Uuid) -> Result<Cart, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| lock_cart(conn, owner_id))
    }

    fn mutate(&self, owner_id: Uuid, op: CartOp) -> Result<Cart, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let mut cart = lock_cart(conn, owner_id)?;
            let mutation = cart.apply(op)?;
            persist_mutation(conn, cart.id, &mutation)?;
            Ok(cart)
        })
    }

    fn reconcile(&self, owner_id: Uuid) -> Result<(Cart, Option<BigDecimal>), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let mut cart = lock_cart(conn, owner_id)?;
            let computed = cart.computed_total();
            if cart.total == computed {
                return Ok((cart, None));
            }
            diesel::update(carts::table.find(cart.id))
                .set((carts::total.eq(&computed), carts::updated_at.eq(Utc::now())))
                .execute(conn)?;
            let stale = std::mem::replace(&mut cart.total, computed);
            Ok((cart, Some(stale)))
        })
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::cart::NewCartLine;
    use crate::domain::inventory::Product;
    use crate::infrastructure::catalog_repo::DieselProductRepository;
    use crate::infrastructure::test_support::setup_db;

    fn seed(pool: &DbPool, price: i64) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Pad thai kit".to_string(),
            price: BigDecimal::from(price),
            stock: 50,
            sold: 0,
        };
        DieselProductRepository::new(pool.clone())
            .upsert(&product)
            .expect("seed product");
        product
    }

    fn add(product: &Product, quantity: i32) -> CartOp {
        CartOp::Add(NewCartLine {
            product_id: product.id,
            quantity,
            unit_price: product.price.clone(),
            variant: None,
            stock_on_hand: product.stock,
        })
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn mutations_keep_stored_total_in_step() {
        let (_container, pool) = setup_db().await;
        let repo = DieselCartRepository::new(pool.clone());
        let owner = Uuid::new_v4();
        let a = seed(&pool, 100);
        let b = seed(&pool, 50);

        repo.mutate(owner, add(&a, 2)).expect("add a");
        let cart = repo.mutate(owner, add(&b, 1)).expect("add b");
        assert_eq!(cart.total, BigDecimal::from(250));

        let line_id = cart.lines[0].id;
        repo.mutate(owner, CartOp::SetQuantity { line_id, quantity: 1 })
            .expect("set quantity");

        let reloaded = repo.load(owner).expect("load");
        assert_eq!(reloaded.total, BigDecimal::from(150));
        assert!(reloaded.is_consistent());

        let (_, drift) = repo.reconcile(owner).expect("reconcile");
        assert!(drift.is_none());
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn reconcile_repairs_a_drifted_total() {
        let (_container, pool) = setup_db().await;
        let repo = DieselCartRepository::new(pool.clone());
        let owner = Uuid::new_v4();
        let a = seed(&pool, 100);
        repo.mutate(owner, add(&a, 1)).expect("add");

        let mut conn = pool.get().expect("conn");
        diesel::update(carts::table.filter(carts::owner_id.eq(owner)))
            .set(carts::total.eq(BigDecimal::from(999)))
            .execute(&mut conn)
            .expect("corrupt total");

        let (cart, drift) = repo.reconcile(owner).expect("reconcile");
        assert_eq!(drift, Some(BigDecimal::from(999)));
        assert_eq!(cart.total, BigDecimal::from(100));
        assert_eq!(repo.load(owner).expect("load").total, BigDecimal::from(100));
    }
}
