use std::collections::HashMap;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::CartOp;
use crate::domain::errors::DomainError;
use crate::domain::order::{page_offset, plan_checkout, CheckoutRequest, Order, OrderPage};
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::OrderStatusChange;
use crate::domain::ports::OrderRepository;
use crate::schema::{order_lines, orders};

use super::cart_repo::{lock_cart, persist_mutation};
use super::catalog_repo::{return_stock, take_stock};
use super::coupon_repo;
use super::models::{order_from_rows, NewOrderLineRow, NewOrderRow, OrderLineRow, OrderRow};
use super::outbox;

pub(crate) fn load_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, DomainError> {
    let order = orders::table
        .filter(orders::id.eq(id))
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;

    let Some(order) = order else {
        return Ok(None);
    };

    let lines = OrderLineRow::belonging_to(&order)
        .order(order_lines::created_at.asc())
        .select(OrderLineRow::as_select())
        .load(conn)?;

    order_from_rows(order, lines).map(Some)
}

/// Compare-and-set of the order status plus its outbox row. A miss means the
/// order moved (or never existed) since it was read.
pub(crate) fn apply_status_change(
    conn: &mut PgConnection,
    change: &OrderStatusChange,
) -> Result<(), DomainError> {
    let updated = diesel::update(
        orders::table
            .filter(orders::id.eq(change.order_id))
            .filter(orders::status.eq(change.from.as_str())),
    )
    .set((
        orders::status.eq(change.to.as_str()),
        orders::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;

    if updated == 0 {
        let exists = orders::table
            .find(change.order_id)
            .select(orders::id)
            .first::<Uuid>(conn)
            .optional()?
            .is_some();
        return Err(if exists {
            DomainError::Conflict(format!(
                "order {} is no longer {}",
                change.order_id, change.from
            ))
        } else {
            DomainError::not_found(format!("order {}", change.order_id))
        });
    }

    outbox::write(conn, OutboxEvent::order_status_changed(change))
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderRepository for DieselOrderRepository {
    fn place_order(&self, request: &CheckoutRequest) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();

            // 1. Lock the cart (and the coupon, if any) and plan the order.
            let mut cart = lock_cart(conn, request.customer_id)?;
            let coupon = match &request.coupon_code {
                Some(code) => Some(coupon_repo::lock_by_code(conn, code)?),
                None => None,
            };
            let plan = plan_checkout(&cart, coupon.as_ref().map(Option::as_ref), request, now)?;
            let applied = plan.coupon.clone();

            // 2. Guarded stock decrements; any underflow aborts the transaction.
            // Product rows are locked in id order so overlapping checkouts
            // cannot deadlock.
            let mut takes: Vec<(Uuid, i32)> = plan
                .lines
                .iter()
                .map(|l| (l.product_id, l.quantity))
                .collect();
            takes.sort_by_key(|(product_id, _)| *product_id);
            let mut sellers = HashMap::new();
            for (product_id, quantity) in takes {
                let seller_id = take_stock(conn, product_id, quantity)?;
                sellers.insert(product_id, seller_id);
            }

            // 3. Insert the order and its lines.
            let order = plan.into_order(&sellers, now)?;
            diesel::insert_into(orders::table)
                .values(&NewOrderRow::from(&order))
                .execute(conn)?;
            let new_lines = order
                .lines
                .iter()
                .map(|l| NewOrderLineRow::from_line(order.id, l))
                .collect::<Result<Vec<_>, DomainError>>()?;
            diesel::insert_into(order_lines::table)
                .values(&new_lines)
                .execute(conn)?;

            // 4. Burn the coupon against the new order.
            if let Some(applied) = applied {
                coupon_repo::consume(conn, applied.coupon_id, order.id, now)?;
            }

            // 5. Empty the cart; the row stays for reuse.
            let cleared = cart.apply(CartOp::Clear)?;
            persist_mutation(conn, cart.id, &cleared)?;

            // 6. Outbox event in the same transaction.
            outbox::write(conn, OutboxEvent::order_placed(&order))?;

            Ok(order)
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        load_order(&mut conn, id)
    }

    fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError> {
        let offset = page_offset(page, limit)?;
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table
                .filter(orders::customer_id.eq(customer_id))
                .count()
                .get_result(conn)?;

            let rows = orders::table
                .filter(orders::customer_id.eq(customer_id))
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            let lines = OrderLineRow::belonging_to(&rows)
                .select(OrderLineRow::as_select())
                .load(conn)?;

            let items = lines
                .grouped_by(&rows)
                .into_iter()
                .zip(rows)
                .map(|(lines, row)| order_from_rows(row, lines))
                .collect::<Result<Vec<_>, DomainError>>()?;

            Ok(OrderPage { items, total })
        })
    }

    fn update_status(
        &self,
        change: OrderStatusChange,
        restock: bool,
    ) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            apply_status_change(conn, &change)?;
            let order = load_order(conn, change.order_id)?
                .ok_or_else(|| DomainError::not_found(format!("order {}", change.order_id)))?;
            if restock {
                let mut lines: Vec<_> = order.lines.iter().collect();
                lines.sort_by_key(|l| l.product_id);
                for line in lines {
                    return_stock(conn, line.product_id, line.quantity)?;
                }
            }
            Ok(order)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use bigdecimal::BigDecimal;
    use chrono::Duration;

    use super::*;
    use crate::domain::cart::NewCartLine;
    use crate::domain::coupon::{CouponKind, DiscountRule, NewCoupon};
    use crate::domain::errors::CouponRejection;
    use crate::domain::inventory::Product;
    use crate::domain::order::{OrderStatus, ShippingDetails};
    use crate::domain::ports::{Catalog, CartRepository, CouponRepository};
    use crate::infrastructure::cart_repo::DieselCartRepository;
    use crate::infrastructure::catalog_repo::DieselProductRepository;
    use crate::infrastructure::coupon_repo::DieselCouponRepository;
    use crate::infrastructure::test_support::setup_db;

    struct Fixture {
        pool: DbPool,
        products: DieselProductRepository,
        carts: DieselCartRepository,
        orders: DieselOrderRepository,
    }

    impl Fixture {
        fn new(pool: DbPool) -> Self {
            Self {
                products: DieselProductRepository::new(pool.clone()),
                carts: DieselCartRepository::new(pool.clone()),
                orders: DieselOrderRepository::new(pool.clone()),
                pool,
            }
        }

        fn product(&self, price: i64, stock: i32) -> Product {
            let p = Product {
                id: Uuid::new_v4(),
                seller_id: Uuid::new_v4(),
                name: "Jasmine rice 5kg".to_string(),
                price: BigDecimal::from(price),
                stock,
                sold: 0,
            };
            self.products.upsert(&p).expect("seed product");
            p
        }

        fn add(&self, owner: Uuid, p: &Product, quantity: i32) {
            self.carts
                .mutate(
                    owner,
                    CartOp::Add(NewCartLine {
                        product_id: p.id,
                        quantity,
                        unit_price: p.price.clone(),
                        variant: None,
                        stock_on_hand: p.stock,
                    }),
                )
                .expect("add to cart");
        }

        fn stock(&self, p: &Product) -> i32 {
            self.products
                .find_product(p.id)
                .expect("find")
                .expect("exists")
                .stock
        }
    }

    fn request(owner: Uuid, coupon_code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: owner,
            coupon_code: coupon_code.map(str::to_string),
            shipping: ShippingDetails::new("12 Ratchadamri Rd", "0898765432").expect("valid"),
        }
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn checkout_writes_order_takes_stock_and_empties_cart() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool);
        let owner = Uuid::new_v4();
        let p1 = f.product(100, 10);
        let p2 = f.product(50, 10);
        f.add(owner, &p1, 2);
        f.add(owner, &p2, 1);

        let order = f.orders.place_order(&request(owner, None)).expect("checkout");

        assert_eq!(order.total, BigDecimal::from(250));
        assert_eq!(order.status, OrderStatus::NotProcess);
        assert_eq!(f.stock(&p1), 8);
        assert_eq!(f.stock(&p2), 9);
        let cart = f.carts.load(owner).expect("cart");
        assert!(cart.is_empty());
        assert_eq!(cart.total, BigDecimal::from(0));

        let stored = f.orders.find_by_id(order.id).expect("find").expect("exists");
        assert_eq!(stored.lines.len(), 2);
        assert_eq!(stored.total, order.total);

        let mut conn = f.pool.get().expect("conn");
        let events = outbox::events_for(&mut conn, &order.id.to_string()).expect("outbox");
        assert_eq!(events.len(), 1, "exactly one outbox event per order");
        assert_eq!(events[0].aggregate_type, "Order");
        assert_eq!(events[0].event_type, "OrderPlaced");
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn stock_underflow_rolls_back_everything() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool.clone());
        let coupons = DieselCouponRepository::new(pool);
        let owner = Uuid::new_v4();
        let plenty = f.product(100, 10);
        let scarce = f.product(100, 1);
        f.add(owner, &plenty, 2);
        f.add(owner, &scarce, 1);
        // Someone else buys the last unit first.
        let other = Uuid::new_v4();
        f.add(other, &scarce, 1);
        f.orders.place_order(&request(other, None)).expect("first buyer");

        coupons
            .insert(NewCoupon {
                code: "SAVE50".to_string(),
                owner_id: owner,
                kind: CouponKind::Manual,
                rule: DiscountRule::Flat(BigDecimal::from(50)),
                min_purchase: BigDecimal::from(0),
                expires_at: Utc::now() + Duration::days(1),
            })
            .expect("coupon");

        let err = f
            .orders
            .place_order(&request(owner, Some("SAVE50")))
            .expect_err("out of stock");
        assert!(matches!(err, DomainError::InsufficientStock { .. }));

        assert_eq!(f.stock(&plenty), 10, "first line's decrement rolled back");
        assert_eq!(f.carts.load(owner).expect("cart").lines.len(), 2);
        let coupon = coupons.find_by_code("SAVE50").expect("find").expect("exists");
        assert!(!coupon.is_used);
        let page = f.orders.list_for_customer(owner, 1, 20).expect("list");
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn used_coupon_is_rejected_on_second_checkout() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool.clone());
        let coupons = DieselCouponRepository::new(pool);
        let owner = Uuid::new_v4();
        let p = f.product(100, 10);
        coupons
            .insert(NewCoupon {
                code: "FLAT100".to_string(),
                owner_id: owner,
                kind: CouponKind::Manual,
                rule: DiscountRule::Flat(BigDecimal::from(100)),
                min_purchase: BigDecimal::from(200),
                expires_at: Utc::now() + Duration::days(1),
            })
            .expect("coupon");

        f.add(owner, &p, 3);
        let order = f
            .orders
            .place_order(&request(owner, Some("FLAT100")))
            .expect("checkout");
        assert_eq!(order.total, BigDecimal::from(200));

        f.add(owner, &p, 3);
        let err = f
            .orders
            .place_order(&request(owner, Some("FLAT100")))
            .expect_err("already used");
        assert!(matches!(
            err,
            DomainError::CouponRejected(CouponRejection::AlreadyUsed)
        ));
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn stale_status_change_is_a_conflict() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool);
        let owner = Uuid::new_v4();
        let p = f.product(100, 10);
        f.add(owner, &p, 1);
        let order = f.orders.place_order(&request(owner, None)).expect("checkout");

        let cancel = OrderStatusChange {
            order_id: order.id,
            from: OrderStatus::NotProcess,
            to: OrderStatus::Cancelled,
        };
        let cancelled = f.orders.update_status(cancel, true).expect("cancel");
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.stock(&p), 10, "cancellation returns stock");

        let err = f.orders.update_status(cancel, true).expect_err("stale");
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn list_paginates_a_customers_orders() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool);
        let owner = Uuid::new_v4();
        let p = f.product(10, 100);

        for _ in 0..5 {
            f.add(owner, &p, 1);
            f.orders.place_order(&request(owner, None)).expect("checkout");
        }

        let page1 = f.orders.list_for_customer(owner, 1, 3).expect("list page 1");
        assert_eq!(page1.total, 5);
        assert_eq!(page1.items.len(), 3);
        assert!(page1.items.iter().all(|o| o.lines.len() == 1));

        let page2 = f.orders.list_for_customer(owner, 2, 3).expect("list page 2");
        assert_eq!(page2.total, 5);
        assert_eq!(page2.items.len(), 2);
    }

    /// Runs `checkout` for every owner on its own thread, released together.
    fn run_concurrently<F>(
        pool: &DbPool,
        owners: &[Uuid],
        checkout: F,
    ) -> Vec<Result<Order, DomainError>>
    where
        F: Fn(DieselOrderRepository, Uuid) -> Result<Order, DomainError> + Send + Copy + 'static,
    {
        let barrier = Arc::new(Barrier::new(owners.len()));
        let handles: Vec<_> = owners
            .iter()
            .map(|&owner| {
                let (repo, barrier) = (DieselOrderRepository::new(pool.clone()), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    checkout(repo, owner)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread")).collect()
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn concurrent_checkouts_never_oversell() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool.clone());
        let lamp = f.product(900, 3);
        let owners: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        for owner in &owners {
            f.add(*owner, &lamp, 1);
        }

        let results = run_concurrently(&pool, &owners, |repo, owner| {
            repo.place_order(&request(owner, None))
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err, DomainError::InsufficientStock { .. }),
                "unexpected {err:?}"
            );
        }
        let stored = f.products.find_product(lamp.id).expect("find").expect("exists");
        assert_eq!(stored.stock, 0);
        assert_eq!(stored.sold, 3);
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn concurrent_checkouts_spend_a_coupon_once() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool.clone());
        let coupons = DieselCouponRepository::new(pool.clone());
        let owner = Uuid::new_v4();
        let p = f.product(100, 50);
        coupons
            .insert(NewCoupon {
                code: "ONCE100".to_string(),
                owner_id: owner,
                kind: CouponKind::Manual,
                rule: DiscountRule::Flat(BigDecimal::from(100)),
                min_purchase: BigDecimal::from(0),
                expires_at: Utc::now() + Duration::days(1),
            })
            .expect("coupon");
        f.add(owner, &p, 3);

        let results = run_concurrently(&pool, &[owner; 4], |repo, owner| {
            repo.place_order(&request(owner, Some("ONCE100")))
        });

        let placed: Vec<&Order> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].total, BigDecimal::from(200));
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(
                    err,
                    DomainError::EmptyCart
                        | DomainError::CouponRejected(CouponRejection::AlreadyUsed)
                ),
                "unexpected {err:?}"
            );
        }
        assert_eq!(f.stock(&p), 47);
        let coupon = coupons.find_by_code("ONCE100").expect("find").expect("exists");
        assert_eq!(coupon.order_id, Some(placed[0].id));
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn overlapping_carts_check_out_without_deadlock() {
        let (_container, pool) = setup_db().await;
        let f = Fixture::new(pool.clone());
        let a = f.product(10, 100);
        let b = f.product(20, 100);
        let owners: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        for (i, owner) in owners.iter().enumerate() {
            // Half the carts list A first, the other half B first.
            let (first, second) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
            f.add(*owner, first, 1);
            f.add(*owner, second, 1);
        }

        let results = run_concurrently(&pool, &owners, |repo, owner| {
            repo.place_order(&request(owner, None))
        });

        for result in &results {
            assert!(result.is_ok(), "checkout failed: {result:?}");
        }
        assert_eq!(f.stock(&a), 92);
        assert_eq!(f.stock(&b), 92);
    }
}
