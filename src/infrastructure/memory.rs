//! Single-process store behind one mutex. Every port call takes the lock for
//! its whole read-check-write, which gives the same all-or-nothing behaviour
//! as the Postgres transactions.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::cart::{Cart, CartOp};
use crate::domain::coupon::{Coupon, CouponKind, NewCoupon};
use crate::domain::errors::{CouponRejection, DomainError};
use crate::domain::inventory::Product;
use crate::domain::notification::{Notification, NotificationTarget};
use crate::domain::order::{page_offset, plan_checkout, CheckoutRequest, Order, OrderPage};
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::{OrderStatusChange, Payment, PaymentTransition};
use crate::domain::ports::{
    CartRepository, Catalog, CouponRepository, InventoryLedger, NotificationRepository,
    OrderRepository, PaymentRepository,
};

#[derive(Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    /// Insertion order, oldest first.
    orders: Vec<Order>,
    payments: HashMap<Uuid, Payment>,
    notifications: Vec<Notification>,
    /// (notification, reader) pairs for role-wide notifications.
    role_reads: HashSet<(Uuid, Uuid)>,
    outbox: Vec<OutboxEvent>,
}

impl MemoryState {
    fn cart_mut(&mut self, owner_id: Uuid) -> &mut Cart {
        self.carts
            .entry(owner_id)
            .or_insert_with(|| Cart::empty(Uuid::new_v4(), owner_id))
    }

    fn coupon_by_code(&self, code: &str) -> Option<&Coupon> {
        self.coupons.values().find(|c| c.code == code)
    }

    fn order_mut(&mut self, id: Uuid) -> Result<&mut Order, DomainError> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))
    }

    fn product_mut(&mut self, id: Uuid) -> Result<&mut Product, DomainError> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))
    }

    /// Checks the expected status before touching anything.
    fn apply_status_change(&mut self, change: &OrderStatusChange) -> Result<(), DomainError> {
        let order = self.order_mut(change.order_id)?;
        if order.status != change.from {
            return Err(DomainError::Conflict(format!(
                "order {} is no longer {}",
                change.order_id, change.from
            )));
        }
        order.status = change.to;
        order.updated_at = Utc::now();
        self.outbox.push(OutboxEvent::order_status_changed(change));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Internal("in-memory store lock poisoned".to_string()))
    }

    /// Inserts or replaces a catalog product.
    pub fn upsert_product(&self, product: Product) -> Result<(), DomainError> {
        self.state()?.products.insert(product.id, product);
        Ok(())
    }

    /// Outbox rows recorded so far, oldest first.
    pub fn outbox_events(&self) -> Result<Vec<OutboxEvent>, DomainError> {
        Ok(self.state()?.outbox.clone())
    }
}

impl Catalog for InMemoryStore {
    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        Ok(self.state()?.products.get(&id).cloned())
    }
}

impl InventoryLedger for InMemoryStore {
    fn restock(&self, product_id: Uuid, quantity: i32) -> Result<Product, DomainError> {
        let mut state = self.state()?;
        let product = state.product_mut(product_id)?;
        product.restock(quantity)?;
        Ok(product.clone())
    }
}

impl CartRepository for InMemoryStore {
    fn load(&self, owner_id: Uuid) -> Result<Cart, DomainError> {
        Ok(self.state()?.cart_mut(owner_id).clone())
    }

    fn mutate(&self, owner_id: Uuid, op: CartOp) -> Result<Cart, DomainError> {
        let mut state = self.state()?;
        let cart = state.cart_mut(owner_id);
        cart.apply(op)?;
        Ok(cart.clone())
    }

    fn reconcile(&self, owner_id: Uuid) -> Result<(Cart, Option<BigDecimal>), DomainError> {
        let mut state = self.state()?;
        let cart = state.cart_mut(owner_id);
        let computed = cart.computed_total();
        if cart.total == computed {
            return Ok((cart.clone(), None));
        }
        let stale = std::mem::replace(&mut cart.total, computed);
        Ok((cart.clone(), Some(stale)))
    }
}

impl CouponRepository for InMemoryStore {
    fn insert(&self, coupon: NewCoupon) -> Result<Coupon, DomainError> {
        let mut state = self.state()?;
        if state.coupon_by_code(&coupon.code).is_some() {
            return Err(DomainError::Conflict(format!(
                "coupon code {} already exists",
                coupon.code
            )));
        }
        if coupon.kind == CouponKind::Welcome
            && state
                .coupons
                .values()
                .any(|c| c.kind == CouponKind::Welcome && c.owner_id == coupon.owner_id)
        {
            return Err(DomainError::Conflict(format!(
                "user {} already has a welcome coupon",
                coupon.owner_id
            )));
        }

        let stored = Coupon {
            id: Uuid::new_v4(),
            code: coupon.code,
            owner_id: coupon.owner_id,
            kind: coupon.kind,
            rule: coupon.rule,
            min_purchase: coupon.min_purchase,
            expires_at: coupon.expires_at,
            is_used: false,
            used_at: None,
            order_id: None,
            created_at: Utc::now(),
        };
        state.coupons.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DomainError> {
        Ok(self.state()?.coupon_by_code(code).cloned())
    }

    fn find_welcome(&self, owner_id: Uuid) -> Result<Option<Coupon>, DomainError> {
        Ok(self
            .state()?
            .coupons
            .values()
            .find(|c| c.kind == CouponKind::Welcome && c.owner_id == owner_id)
            .cloned())
    }

    fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Coupon>, DomainError> {
        let mut coupons: Vec<Coupon> = self
            .state()?
            .coupons
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }
}

impl OrderRepository for InMemoryStore {
    fn place_order(&self, request: &CheckoutRequest) -> Result<Order, DomainError> {
        let mut state = self.state()?;
        let now = Utc::now();

        let cart = state.cart_mut(request.customer_id).clone();
        let coupon = request
            .coupon_code
            .as_deref()
            .map(|code| state.coupon_by_code(code).cloned());
        let plan = plan_checkout(&cart, coupon.as_ref().map(Option::as_ref), request, now)?;

        // Stage every decrement on copies; nothing is written until all pass.
        let mut staged: HashMap<Uuid, Product> = HashMap::new();
        let mut sellers = HashMap::new();
        for line in &plan.lines {
            let product = match staged.remove(&line.product_id) {
                Some(p) => p,
                None => state
                    .products
                    .get(&line.product_id)
                    .cloned()
                    .ok_or_else(|| DomainError::not_found(format!("product {}", line.product_id)))?,
            };
            let mut product = product;
            product.take_stock(line.quantity)?;
            sellers.insert(product.id, product.seller_id);
            staged.insert(product.id, product);
        }

        if let Some(applied) = &plan.coupon {
            let used = state
                .coupons
                .get(&applied.coupon_id)
                .map_or(true, |c| c.is_used);
            if used {
                return Err(DomainError::CouponRejected(CouponRejection::AlreadyUsed));
            }
        }

        let applied = plan.coupon.clone();
        let order = plan.into_order(&sellers, now)?;

        // Commit.
        state.products.extend(staged);
        if let Some(applied) = applied {
            if let Some(coupon) = state.coupons.get_mut(&applied.coupon_id) {
                coupon.is_used = true;
                coupon.used_at = Some(now);
                coupon.order_id = Some(order.id);
            }
        }
        state.cart_mut(request.customer_id).apply(CartOp::Clear)?;
        state.outbox.push(OutboxEvent::order_placed(&order));
        state.orders.push(order.clone());

        Ok(order)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.state()?.orders.iter().find(|o| o.id == id).cloned())
    }

    fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, DomainError> {
        let skip = usize::try_from(page_offset(page, limit)?).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(0);
        let state = self.state()?;
        let mine: Vec<&Order> = state
            .orders
            .iter()
            .rev()
            .filter(|o| o.customer_id == customer_id)
            .collect();

        Ok(OrderPage {
            total: mine.len() as i64,
            items: mine.into_iter().skip(skip).take(take).cloned().collect(),
        })
    }

    fn update_status(
        &self,
        change: OrderStatusChange,
        restock: bool,
    ) -> Result<Order, DomainError> {
        let mut state = self.state()?;

        let order = state
            .orders
            .iter()
            .find(|o| o.id == change.order_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("order {}", change.order_id)))?;
        if order.status != change.from {
            return Err(DomainError::Conflict(format!(
                "order {} is no longer {}",
                change.order_id, change.from
            )));
        }

        if restock {
            let mut staged = Vec::with_capacity(order.lines.len());
            for line in &order.lines {
                let staged_at = staged.iter().rposition(|p: &Product| p.id == line.product_id);
                let mut product = match staged_at {
                    Some(i) => staged.remove(i),
                    None => state
                        .products
                        .get(&line.product_id)
                        .cloned()
                        .ok_or_else(|| {
                            DomainError::not_found(format!("product {}", line.product_id))
                        })?,
                };
                product.return_stock(line.quantity)?;
                staged.push(product);
            }
            for product in staged {
                state.products.insert(product.id, product);
            }
        }

        state.apply_status_change(&change)?;
        let order = state.order_mut(change.order_id)?;
        Ok(order.clone())
    }
}

impl PaymentRepository for InMemoryStore {
    fn create(
        &self,
        payment: Payment,
        order_change: Option<OrderStatusChange>,
    ) -> Result<Payment, DomainError> {
        let mut state = self.state()?;
        if state
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id && p.status.blocks_new_payment())
        {
            return Err(DomainError::Conflict(format!(
                "order {} already has an active payment",
                payment.order_id
            )));
        }
        if let Some(change) = &order_change {
            state.apply_status_change(change)?;
        }
        state.outbox.push(OutboxEvent::payment_status_changed(&payment));
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError> {
        Ok(self.state()?.payments.get(&id).cloned())
    }

    fn apply(&self, transition: PaymentTransition) -> Result<Payment, DomainError> {
        let mut state = self.state()?;
        let PaymentTransition {
            payment,
            expected,
            order_change,
        } = transition;

        let current = state
            .payments
            .get(&payment.id)
            .ok_or_else(|| DomainError::not_found(format!("payment {}", payment.id)))?;
        if current.status != expected {
            return Err(DomainError::Conflict(format!(
                "payment {} is no longer {}",
                payment.id, expected
            )));
        }

        if let Some(change) = &order_change {
            state.apply_status_change(change)?;
        }
        state.outbox.push(OutboxEvent::payment_status_changed(&payment));
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }
}

impl NotificationRepository for InMemoryStore {
    fn insert(&self, notification: &Notification) -> Result<(), DomainError> {
        self.state()?.notifications.push(notification.clone());
        Ok(())
    }

    fn list_for(&self, actor: &Actor, limit: i64) -> Result<Vec<Notification>, DomainError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state()?;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.target.includes(actor))
            .take(limit)
            .map(|n| {
                let mut n = n.clone();
                n.is_read |= state.role_reads.contains(&(n.id, actor.user_id));
                n
            })
            .collect())
    }

    fn mark_read(&self, actor: &Actor, id: Uuid) -> Result<Notification, DomainError> {
        let mut state = self.state()?;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.target.includes(actor))
            .ok_or_else(|| DomainError::not_found(format!("notification {id}")))?;
        if notification.target == NotificationTarget::User(actor.user_id) {
            notification.is_read = true;
            return Ok(notification.clone());
        }
        let mut read = notification.clone();
        read.is_read = true;
        state.role_reads.insert((id, actor.user_id));
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::cart::NewCartLine;
    use crate::domain::coupon::DiscountRule;
    use crate::domain::order::{OrderStatus, ShippingDetails};

    fn product(store: &InMemoryStore, price: i64, stock: i32) -> Product {
        let p = Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Thai iced tea mix".to_string(),
            price: BigDecimal::from(price),
            stock,
            sold: 0,
        };
        store.upsert_product(p.clone()).expect("seed");
        p
    }

    fn add(store: &InMemoryStore, owner: Uuid, p: &Product, quantity: i32) {
        store
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
            .expect("add");
    }

    fn request(owner: Uuid, code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: owner,
            coupon_code: code.map(str::to_string),
            shipping: ShippingDetails::new("99 Silom Rd", "0801112222").expect("valid"),
        }
    }

    fn stock(store: &InMemoryStore, p: &Product) -> i32 {
        store.find_product(p.id).expect("find").expect("exists").stock
    }

    #[test]
    fn failed_checkout_leaves_no_trace() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let plenty = product(&store, 100, 10);
        let scarce = product(&store, 100, 1);
        add(&store, owner, &plenty, 3);
        add(&store, owner, &scarce, 1);
        // The last unit disappears before checkout.
        store
            .upsert_product(Product { stock: 0, ..scarce.clone() })
            .expect("drain");

        let err = store.place_order(&request(owner, None)).expect_err("no stock");
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(stock(&store, &plenty), 10);
        assert_eq!(store.load(owner).expect("cart").lines.len(), 2);
        assert!(store.outbox_events().expect("outbox").is_empty());
    }

    #[test]
    fn coupon_is_burned_by_the_order_that_used_it() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let p = product(&store, 100, 10);
        CouponRepository::insert(
            &store,
            NewCoupon {
                code: "WELCOME-1234ABCD".to_string(),
                owner_id: owner,
                kind: CouponKind::Welcome,
                rule: DiscountRule::Flat(BigDecimal::from(100)),
                min_purchase: BigDecimal::from(200),
                expires_at: Utc::now() + Duration::days(30),
            },
        )
        .expect("coupon");

        add(&store, owner, &p, 2);
        add(&store, owner, &p, 1);
        let order = store
            .place_order(&request(owner, Some("WELCOME-1234ABCD")))
            .expect("checkout");
        assert_eq!(order.total, BigDecimal::from(200));

        let coupon = store
            .find_by_code("WELCOME-1234ABCD")
            .expect("find")
            .expect("exists");
        assert!(coupon.is_used);
        assert_eq!(coupon.order_id, Some(order.id));
    }

    #[test]
    fn second_welcome_coupon_conflicts() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let welcome = |code: &str| NewCoupon {
            code: code.to_string(),
            owner_id: owner,
            kind: CouponKind::Welcome,
            rule: DiscountRule::Flat(BigDecimal::from(100)),
            min_purchase: BigDecimal::from(200),
            expires_at: Utc::now() + Duration::days(30),
        };
        CouponRepository::insert(&store, welcome("WELCOME-A")).expect("first");
        let err = CouponRepository::insert(&store, welcome("WELCOME-B")).expect_err("second");
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn cancellation_returns_stock_once() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let p = product(&store, 40, 5);
        add(&store, owner, &p, 2);
        let order = store.place_order(&request(owner, None)).expect("checkout");
        assert_eq!(stock(&store, &p), 3);

        let cancel = OrderStatusChange {
            order_id: order.id,
            from: OrderStatus::NotProcess,
            to: OrderStatus::Cancelled,
        };
        store.update_status(cancel, true).expect("cancel");
        assert_eq!(stock(&store, &p), 5);

        let err = store.update_status(cancel, true).expect_err("stale");
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(stock(&store, &p), 5);
    }

    #[test]
    fn role_notification_read_state_is_per_recipient() {
        use crate::domain::actor::Role;
        use crate::domain::notification::NotificationEvent;

        let store = InMemoryStore::new();
        let (first, second) = (
            Actor::new(Uuid::new_v4(), Role::Admin),
            Actor::new(Uuid::new_v4(), Role::Admin),
        );
        let event = NotificationEvent::OrderPlaced {
            order_id: Uuid::new_v4(),
            total: "100.00".to_string(),
        };
        let n = Notification::from_event(NotificationTarget::Role(Role::Admin), &event, Utc::now());
        NotificationRepository::insert(&store, &n).expect("insert");

        assert!(store.mark_read(&first, n.id).expect("mark").is_read);
        assert!(store.list_for(&first, 10).expect("list")[0].is_read);
        assert!(!store.list_for(&second, 10).expect("list")[0].is_read);
    }
}
