use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::actor::{Actor, Role};
use super::cart::{Cart, Variant};
use super::coupon::Coupon;
use super::errors::{CouponRejection, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    NotProcess,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Return,
    PaymentFailed,
}

/// What is asking an order to change status. Automatic triggers come from the
/// payment workflow; `Manual` is a seller or admin action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    PaymentSettled,
    PaymentRejected,
    PaymentFailed,
    Manual,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::NotProcess,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Return,
        OrderStatus::PaymentFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::NotProcess => "not_process",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Return => "return",
            OrderStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Return
        )
    }

    fn allows(self, to: OrderStatus, trigger: StatusTrigger) -> bool {
        use OrderStatus::*;
        match trigger {
            StatusTrigger::PaymentSettled => {
                matches!(self, NotProcess | PaymentFailed) && to == Processing
            }
            StatusTrigger::PaymentRejected => self == Processing && to == NotProcess,
            StatusTrigger::PaymentFailed => {
                matches!(self, NotProcess | Processing) && to == PaymentFailed
            }
            StatusTrigger::Manual => match to {
                Shipped => self == Processing,
                Delivered => self == Shipped,
                Cancelled => !self.is_terminal(),
                Return => matches!(self, NotProcess | Processing),
                _ => false,
            },
        }
    }

    /// Checks the edge `self -> to` for `trigger` and returns `to` if allowed.
    pub fn transition(
        self,
        to: OrderStatus,
        trigger: StatusTrigger,
    ) -> Result<OrderStatus, DomainError> {
        if self.allows(to, trigger) {
            Ok(to)
        } else {
            Err(DomainError::InvalidState(format!(
                "order cannot move from {self} to {to}"
            )))
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::InvalidInput(format!("unknown order status '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingDetails {
    pub address: String,
    pub phone: String,
}

impl ShippingDetails {
    pub fn new(address: &str, phone: &str) -> Result<Self, DomainError> {
        let address = address.trim();
        let phone = phone.trim();
        if address.is_empty() || address.len() > 500 {
            return Err(DomainError::InvalidInput(
                "shipping address must be 1-500 characters".to_string(),
            ));
        }
        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(6..=15).contains(&digits)
            || !phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(DomainError::InvalidInput(format!(
                "malformed phone number '{phone}'"
            )));
        }
        Ok(Self {
            address: address.to_string(),
            phone: phone.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub coupon_id: Option<Uuid>,
    pub total: BigDecimal,
    pub shipping: ShippingDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn sells(&self, seller_id: Uuid) -> bool {
        self.lines.iter().any(|l| l.seller_id == seller_id)
    }

    pub fn can_view(&self, actor: &Actor) -> bool {
        actor.is_admin() || actor.user_id == self.customer_id || self.sells(actor.user_id)
    }

    /// Manual status changes are reserved for admins and sellers with a line in the order.
    pub fn can_manage(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Seller => self.sells(actor.user_id),
            Role::Buyer => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub items: Vec<Order>,
    pub total: i64,
}

/// Rows to skip for 1-based `page`. Pages far enough out to overflow are
/// rejected rather than wrapped.
pub fn page_offset(page: i64, limit: i64) -> Result<i64, DomainError> {
    page.checked_sub(1)
        .filter(|p| *p >= 0)
        .and_then(|p| p.checked_mul(limit))
        .ok_or_else(|| DomainError::InvalidInput(format!("page {page} is out of range")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub discount_amount: BigDecimal,
}

/// Everything a store needs to write an order, derived from a locked cart.
#[derive(Debug, Clone)]
pub struct CheckoutPlan {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub cart_id: Uuid,
    pub lines: Vec<PlannedLine>,
    pub subtotal: BigDecimal,
    pub coupon: Option<AppliedCoupon>,
    pub total: BigDecimal,
    pub shipping: ShippingDetails,
}

#[derive(Debug, Clone)]
pub struct PlannedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Variant>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: Uuid,
    pub coupon_code: Option<String>,
    pub shipping: ShippingDetails,
}

/// Turns a locked cart (and the coupon looked up by code, if one was given)
/// into a checkout plan. `coupon` is `Some(None)` when a code was supplied
/// but no coupon matched.
pub fn plan_checkout(
    cart: &Cart,
    coupon: Option<Option<&Coupon>>,
    request: &CheckoutRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutPlan, DomainError> {
    if cart.is_empty() {
        return Err(DomainError::EmptyCart);
    }

    let subtotal = cart.total.clone();
    let applied = match coupon {
        None => None,
        Some(None) => return Err(DomainError::CouponRejected(CouponRejection::NotFound)),
        Some(Some(coupon)) => {
            let discount_amount = coupon
                .evaluate(request.customer_id, &subtotal, now)
                .map_err(DomainError::CouponRejected)?;
            Some(AppliedCoupon {
                coupon_id: coupon.id,
                discount_amount,
            })
        }
    };

    let discount = applied
        .as_ref()
        .map(|c| c.discount_amount.clone())
        .unwrap_or_else(BigDecimal::zero);
    let mut total = &subtotal - &discount;
    if total < BigDecimal::zero() {
        total = BigDecimal::zero();
    }

    Ok(CheckoutPlan {
        order_id: Uuid::new_v4(),
        customer_id: request.customer_id,
        cart_id: cart.id,
        lines: cart
            .lines
            .iter()
            .map(|l| PlannedLine {
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price.clone(),
                variant: l.variant.clone(),
            })
            .collect(),
        subtotal,
        coupon: applied,
        total,
        shipping: request.shipping.clone(),
    })
}

impl CheckoutPlan {
    /// Builds the immutable order once stock has been taken. `sellers` maps
    /// each product to the seller recorded by the inventory ledger.
    pub fn into_order(
        self,
        sellers: &HashMap<Uuid, Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Order, DomainError> {
        let lines = self
            .lines
            .into_iter()
            .map(|l| {
                let seller_id = *sellers.get(&l.product_id).ok_or_else(|| {
                    DomainError::Internal(format!(
                        "no seller recorded for product {}",
                        l.product_id
                    ))
                })?;
                Ok(OrderLine {
                    id: Uuid::new_v4(),
                    product_id: l.product_id,
                    seller_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    variant: l.variant,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let discount_amount = self
            .coupon
            .as_ref()
            .map(|c| c.discount_amount.clone())
            .unwrap_or_else(BigDecimal::zero);

        Ok(Order {
            id: self.order_id,
            customer_id: self.customer_id,
            status: OrderStatus::NotProcess,
            lines,
            subtotal: self.subtotal,
            discount_amount,
            coupon_id: self.coupon.map(|c| c.coupon_id),
            total: self.total,
            shipping: self.shipping,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::cart::{CartOp, NewCartLine};
    use crate::domain::coupon::{CouponKind, DiscountRule};

    #[test]
    fn page_offset_skips_whole_pages() {
        assert_eq!(page_offset(1, 20).expect("first"), 0);
        assert_eq!(page_offset(3, 20).expect("third"), 40);
    }

    #[test]
    fn page_offset_rejects_overflowing_pages() {
        let err = page_offset(i64::MAX, 100).expect_err("overflow");
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert!(page_offset(0, 20).is_err());
    }

    fn shipping() -> ShippingDetails {
        ShippingDetails::new("99 Sukhumvit Rd, Bangkok", "+66 81 234 5678").expect("valid")
    }

    fn cart_with(lines: &[(i32, i64)]) -> Cart {
        let mut cart = Cart::empty(Uuid::new_v4(), Uuid::new_v4());
        for (quantity, price) in lines {
            cart.apply(CartOp::Add(NewCartLine {
                product_id: Uuid::new_v4(),
                quantity: *quantity,
                unit_price: BigDecimal::from(*price),
                variant: None,
                stock_on_hand: 100,
            }))
            .expect("add");
        }
        cart
    }

    fn request(cart: &Cart, coupon_code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: cart.owner_id,
            coupon_code: coupon_code.map(str::to_string),
            shipping: shipping(),
        }
    }

    #[test]
    fn manual_edges_follow_the_fulfilment_path() {
        use OrderStatus::*;
        assert!(Processing.transition(Shipped, StatusTrigger::Manual).is_ok());
        assert!(Shipped.transition(Delivered, StatusTrigger::Manual).is_ok());
        assert!(NotProcess.transition(Shipped, StatusTrigger::Manual).is_err());
        assert!(Processing.transition(Processing, StatusTrigger::Manual).is_err());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in OrderStatus::ALL {
                for trigger in [
                    StatusTrigger::Manual,
                    StatusTrigger::PaymentSettled,
                    StatusTrigger::PaymentRejected,
                    StatusTrigger::PaymentFailed,
                ] {
                    assert!(
                        from.transition(to, trigger).is_err(),
                        "{from} -> {to} via {trigger:?} should be refused"
                    );
                }
            }
        }
    }

    #[test]
    fn payment_triggers_drive_only_their_edges() {
        use OrderStatus::*;
        assert!(NotProcess.transition(Processing, StatusTrigger::PaymentSettled).is_ok());
        assert!(PaymentFailed.transition(Processing, StatusTrigger::PaymentSettled).is_ok());
        assert!(Processing.transition(NotProcess, StatusTrigger::PaymentRejected).is_ok());
        assert!(Processing.transition(PaymentFailed, StatusTrigger::PaymentFailed).is_ok());
        assert!(Shipped.transition(PaymentFailed, StatusTrigger::PaymentFailed).is_err());
        assert!(NotProcess.transition(Processing, StatusTrigger::Manual).is_err());
    }

    #[test]
    fn return_only_from_not_process_or_processing() {
        use OrderStatus::*;
        assert!(NotProcess.transition(Return, StatusTrigger::Manual).is_ok());
        assert!(Processing.transition(Return, StatusTrigger::Manual).is_ok());
        assert!(Shipped.transition(Return, StatusTrigger::Manual).is_err());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().expect("parse"), status);
        }
        assert!("archived".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn plan_without_coupon_keeps_cart_total() {
        let cart = cart_with(&[(2, 100), (1, 50)]);
        let plan = plan_checkout(&cart, None, &request(&cart, None), Utc::now()).expect("plan");
        assert_eq!(plan.total, BigDecimal::from(250));
        assert_eq!(plan.lines.len(), 2);
        assert!(plan.coupon.is_none());
    }

    #[test]
    fn plan_applies_coupon_discount() {
        let cart = cart_with(&[(2, 100), (1, 50)]);
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: "FLAT100".to_string(),
            owner_id: cart.owner_id,
            kind: CouponKind::Manual,
            rule: DiscountRule::Flat(BigDecimal::from(100)),
            min_purchase: BigDecimal::from(200),
            expires_at: Utc::now() + Duration::days(1),
            is_used: false,
            used_at: None,
            order_id: None,
            created_at: Utc::now(),
        };
        let plan = plan_checkout(
            &cart,
            Some(Some(&coupon)),
            &request(&cart, Some("FLAT100")),
            Utc::now(),
        )
        .expect("plan");
        assert_eq!(plan.total, BigDecimal::from(150));
        assert_eq!(
            plan.coupon.map(|c| c.discount_amount),
            Some(BigDecimal::from(100))
        );
    }

    #[test]
    fn plan_rejects_empty_cart_before_coupon() {
        let cart = cart_with(&[]);
        let err = plan_checkout(&cart, Some(None), &request(&cart, Some("X")), Utc::now())
            .expect_err("empty");
        assert!(matches!(err, DomainError::EmptyCart));
    }

    #[test]
    fn plan_reports_unknown_coupon() {
        let cart = cart_with(&[(1, 10)]);
        let err = plan_checkout(&cart, Some(None), &request(&cart, Some("NOPE")), Utc::now())
            .expect_err("unknown coupon");
        assert!(matches!(
            err,
            DomainError::CouponRejected(CouponRejection::NotFound)
        ));
    }

    #[test]
    fn into_order_requires_a_seller_for_every_line() {
        let cart = cart_with(&[(1, 10)]);
        let plan = plan_checkout(&cart, None, &request(&cart, None), Utc::now()).expect("plan");
        let err = plan
            .into_order(&HashMap::new(), Utc::now())
            .expect_err("missing seller");
        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[test]
    fn shipping_details_are_validated() {
        assert!(ShippingDetails::new("  ", "0812345678").is_err());
        assert!(ShippingDetails::new("Somewhere", "call me").is_err());
        assert!(ShippingDetails::new("Somewhere", "081-234-5678").is_ok());
    }

    #[test]
    fn sellers_manage_only_orders_they_supply() {
        let cart = cart_with(&[(1, 10)]);
        let product_id = cart.lines[0].product_id;
        let seller = Uuid::new_v4();
        let plan = plan_checkout(&cart, None, &request(&cart, None), Utc::now()).expect("plan");
        let sellers = HashMap::from([(product_id, seller)]);
        let order = plan.into_order(&sellers, Utc::now()).expect("order");

        assert!(order.can_manage(&Actor::new(seller, Role::Seller)));
        assert!(!order.can_manage(&Actor::new(Uuid::new_v4(), Role::Seller)));
        assert!(!order.can_manage(&Actor::new(order.customer_id, Role::Buyer)));
        assert!(order.can_view(&Actor::new(order.customer_id, Role::Buyer)));
    }
}
