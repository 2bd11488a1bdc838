use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::{OrderStatusChange, Payment, PaymentStatus, PaymentTransition};
use crate::domain::ports::PaymentRepository;
use crate::schema::payments;

use super::models::PaymentRow;
use super::order_repo::apply_status_change;
use super::outbox;

pub struct DieselPaymentRepository {
    pool: DbPool,
}

impl DieselPaymentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl PaymentRepository for DieselPaymentRepository {
    fn create(
        &self,
        payment: Payment,
        order_change: Option<OrderStatusChange>,
    ) -> Result<Payment, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // The partial unique index backs this up under concurrency.
            let live = payments::table
                .filter(payments::order_id.eq(payment.order_id))
                .filter(payments::status.ne(PaymentStatus::Failed.as_str()))
                .count()
                .get_result::<i64>(conn)?;
            if live > 0 {
                return Err(active_payment_conflict(payment.order_id));
            }

            let row = diesel::insert_into(payments::table)
                .values(&PaymentRow::try_from(&payment)?)
                .returning(PaymentRow::as_returning())
                .get_result(conn)
                .map_err(|e| match DomainError::from(e) {
                    DomainError::Conflict(_) => active_payment_conflict(payment.order_id),
                    other => other,
                })?;

            if let Some(change) = &order_change {
                apply_status_change(conn, change)?;
            }
            outbox::write(conn, OutboxEvent::payment_status_changed(&payment))?;

            Payment::try_from(row)
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError> {
        let mut conn = self.pool.get()?;
        payments::table
            .find(id)
            .select(PaymentRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Payment::try_from)
            .transpose()
    }

    fn apply(&self, transition: PaymentTransition) -> Result<Payment, DomainError> {
        let mut conn = self.pool.get()?;
        let PaymentTransition {
            payment,
            expected,
            order_change,
        } = transition;

        conn.transaction::<_, DomainError, _>(|conn| {
            let row = diesel::update(
                payments::table
                    .filter(payments::id.eq(payment.id))
                    .filter(payments::status.eq(expected.as_str())),
            )
            .set(&PaymentRow::try_from(&payment)?)
            .returning(PaymentRow::as_returning())
            .get_result(conn)
            .optional()?;

            let Some(row) = row else {
                let exists = payments::table
                    .find(payment.id)
                    .select(payments::id)
                    .first::<Uuid>(conn)
                    .optional()?
                    .is_some();
                return Err(if exists {
                    DomainError::Conflict(format!(
                        "payment {} is no longer {}",
                        payment.id, expected
                    ))
                } else {
                    DomainError::not_found(format!("payment {}", payment.id))
                });
            };

            if let Some(change) = &order_change {
                apply_status_change(conn, change)?;
            }
            outbox::write(conn, OutboxEvent::payment_status_changed(&payment))?;

            Payment::try_from(row)
        })
    }
}

fn active_payment_conflict(order_id: Uuid) -> DomainError {
    DomainError::Conflict(format!("order {order_id} already has an active payment"))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use bigdecimal::BigDecimal;
    use chrono::Utc;

    use super::*;
    use crate::domain::cart::{CartOp, NewCartLine};
    use crate::domain::inventory::Product;
    use crate::domain::order::{CheckoutRequest, Order, OrderStatus, ShippingDetails};
    use crate::domain::payment::{CustomerInfo, PaymentAction, PaymentMethod, SlipReviewPolicy};
    use crate::domain::ports::{CartRepository, OrderRepository};
    use crate::infrastructure::cart_repo::DieselCartRepository;
    use crate::infrastructure::catalog_repo::DieselProductRepository;
    use crate::infrastructure::order_repo::DieselOrderRepository;
    use crate::infrastructure::test_support::setup_db;

    fn place_order(pool: &DbPool) -> Order {
        let product = Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Mango sticky rice".to_string(),
            price: BigDecimal::from(120),
            stock: 5,
            sold: 0,
        };
        DieselProductRepository::new(pool.clone())
            .upsert(&product)
            .expect("seed product");

        let owner = Uuid::new_v4();
        DieselCartRepository::new(pool.clone())
            .mutate(
                owner,
                CartOp::Add(NewCartLine {
                    product_id: product.id,
                    quantity: 1,
                    unit_price: product.price.clone(),
                    variant: None,
                    stock_on_hand: product.stock,
                }),
            )
            .expect("add");

        DieselOrderRepository::new(pool.clone())
            .place_order(&CheckoutRequest {
                customer_id: owner,
                coupon_code: None,
                shipping: ShippingDetails::new("1 Sukhumvit Rd", "0812345678").expect("valid"),
            })
            .expect("checkout")
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Somchai".to_string(),
            email: None,
            phone: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn second_live_payment_for_order_conflicts() {
        let (_container, pool) = setup_db().await;
        let repo = DieselPaymentRepository::new(pool.clone());
        let order = place_order(&pool);

        let (first, change) =
            Payment::initiate(&order, PaymentMethod::QrCode, customer(), Utc::now())
                .expect("initiate");
        repo.create(first, change).expect("first payment");

        let (second, change) =
            Payment::initiate(&order, PaymentMethod::QrCode, customer(), Utc::now())
                .expect("initiate");
        let err = repo.create(second, change).expect_err("one live payment");
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn slip_upload_moves_payment_and_order_together() {
        let (_container, pool) = setup_db().await;
        let repo = DieselPaymentRepository::new(pool.clone());
        let orders = DieselOrderRepository::new(pool.clone());
        let order = place_order(&pool);

        let (payment, change) =
            Payment::initiate(&order, PaymentMethod::QrCode, customer(), Utc::now())
                .expect("initiate");
        let payment = repo.create(payment, change).expect("create");
        assert_eq!(payment.status, PaymentStatus::Pending);

        let transition = payment
            .plan(
                PaymentAction::UploadSlip {
                    slip_url: "https://cdn.example.test/slip.jpg".to_string(),
                    policy: SlipReviewPolicy::Manual,
                },
                order.status,
                Utc::now(),
            )
            .expect("plan");
        let updated = repo.apply(transition.clone()).expect("apply");
        assert_eq!(updated.status, PaymentStatus::WaitingApproval);

        let stored = orders.find_by_id(order.id).expect("find").expect("exists");
        assert_eq!(stored.status, OrderStatus::Processing);

        // Replaying the same transition loses the status race.
        let err = repo.apply(transition).expect_err("stale");
        assert!(matches!(err, DomainError::Conflict(_)));

        let mut conn = pool.get().expect("conn");
        let events = outbox::events_for(&mut conn, &payment.id.to_string()).expect("outbox");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    #[ignore = "requires docker for the postgres testcontainer"]
    async fn concurrent_payments_leave_one_live_payment() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let order = place_order(&pool);

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (repo, barrier) = (DieselPaymentRepository::new(pool.clone()), barrier.clone());
                let order = order.clone();
                thread::spawn(move || {
                    let (payment, change) =
                        Payment::initiate(&order, PaymentMethod::Cash, customer(), Utc::now())?;
                    barrier.wait();
                    repo.create(payment, change)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread")).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, DomainError::Conflict(_)), "unexpected {err:?}");
        }

        let mut conn = pool.get().expect("conn");
        let live = payments::table
            .filter(payments::order_id.eq(order.id))
            .filter(payments::status.ne(PaymentStatus::Failed.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .expect("count");
        assert_eq!(live, 1);
        let stored = orders.find_by_id(order.id).expect("find").expect("exists");
        assert_eq!(stored.status, OrderStatus::Processing);
    }
}
