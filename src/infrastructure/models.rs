use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::actor::Role;
use crate::domain::cart::{Cart, CartLine, Variant};
use crate::domain::coupon::{Coupon, CouponKind, DiscountRule, NewCoupon};
use crate::domain::errors::DomainError;
use crate::domain::inventory::Product;
use crate::domain::notification::{Notification, NotificationTarget};
use crate::domain::order::{Order, OrderLine, ShippingDetails};
use crate::domain::outbox::OutboxEvent;
use crate::domain::payment::{CustomerInfo, Payment};
use crate::schema::{
    cart_lines, carts, coupons, marketplace_outbox, notifications, order_lines, orders, payments,
    products,
};

// ── Catalog ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
    pub sold: i32,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            seller_id: row.seller_id,
            name: row.name,
            price: row.price,
            stock: row.stock,
            sold: row.sold,
        }
    }
}

impl From<&Product> for ProductRow {
    fn from(p: &Product) -> Self {
        ProductRow {
            id: p.id,
            seller_id: p.seller_id,
            name: p.name.clone(),
            price: p.price.clone(),
            stock: p.stock,
            sold: p.sold,
        }
    }
}

// ── Carts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub total: BigDecimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = carts)]
pub struct NewCartRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = cart_lines)]
#[diesel(belongs_to(CartRow, foreign_key = cart_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartLineRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Value>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cart_lines)]
pub struct NewCartLineRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Value>,
}

impl NewCartLineRow {
    pub fn from_line(cart_id: Uuid, line: &CartLine) -> Result<Self, DomainError> {
        Ok(NewCartLineRow {
            id: line.id,
            cart_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price.clone(),
            variant: variant_to_json(&line.variant)?,
        })
    }
}

pub fn cart_from_rows(row: CartRow, lines: Vec<CartLineRow>) -> Result<Cart, DomainError> {
    let lines = lines
        .into_iter()
        .map(|l| {
            Ok(CartLine {
                id: l.id,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                variant: variant_from_json(l.variant)?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;
    Ok(Cart {
        id: row.id,
        owner_id: row.owner_id,
        lines,
        total: row.total,
    })
}

pub fn variant_to_json(variant: &Option<Variant>) -> Result<Option<Value>, DomainError> {
    variant
        .as_ref()
        .map(|v| serde_json::to_value(v).map_err(|e| DomainError::Internal(e.to_string())))
        .transpose()
}

pub fn variant_from_json(value: Option<Value>) -> Result<Option<Variant>, DomainError> {
    value
        .map(|v| serde_json::from_value(v).map_err(|e| DomainError::Internal(e.to_string())))
        .transpose()
}

// ── Coupons ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = coupons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    pub owner_id: Uuid,
    pub kind: String,
    pub discount_amount: Option<BigDecimal>,
    pub discount_percent: Option<BigDecimal>,
    pub max_discount: Option<BigDecimal>,
    pub min_purchase: BigDecimal,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coupons)]
pub struct NewCouponRow {
    pub id: Uuid,
    pub code: String,
    pub owner_id: Uuid,
    pub kind: String,
    pub discount_amount: Option<BigDecimal>,
    pub discount_percent: Option<BigDecimal>,
    pub max_discount: Option<BigDecimal>,
    pub min_purchase: BigDecimal,
    pub expires_at: DateTime<Utc>,
}

impl From<NewCoupon> for NewCouponRow {
    fn from(c: NewCoupon) -> Self {
        let (discount_amount, discount_percent, max_discount) = match c.rule {
            DiscountRule::Flat(amount) => (Some(amount), None, None),
            DiscountRule::Percent {
                percent,
                max_discount,
            } => (None, Some(percent), max_discount),
        };
        NewCouponRow {
            id: Uuid::new_v4(),
            code: c.code,
            owner_id: c.owner_id,
            kind: c.kind.as_str().to_string(),
            discount_amount,
            discount_percent,
            max_discount,
            min_purchase: c.min_purchase,
            expires_at: c.expires_at,
        }
    }
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DomainError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let rule = match (row.discount_amount, row.discount_percent) {
            (Some(amount), _) => DiscountRule::Flat(amount),
            (None, Some(percent)) => DiscountRule::Percent {
                percent,
                max_discount: row.max_discount,
            },
            (None, None) => {
                return Err(DomainError::Internal(format!(
                    "coupon {} has no discount rule",
                    row.id
                )))
            }
        };
        Ok(Coupon {
            id: row.id,
            code: row.code,
            owner_id: row.owner_id,
            kind: row.kind.parse::<CouponKind>()?,
            rule,
            min_purchase: row.min_purchase,
            expires_at: row.expires_at,
            is_used: row.is_used,
            used_at: row.used_at,
            order_id: row.order_id,
            created_at: row.created_at,
        })
    }
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub coupon_id: Option<Uuid>,
    pub total: BigDecimal,
    pub shipping_address: String,
    pub shipping_phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub coupon_id: Option<Uuid>,
    pub total: BigDecimal,
    pub shipping_address: String,
    pub shipping_phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for NewOrderRow {
    fn from(o: &Order) -> Self {
        NewOrderRow {
            id: o.id,
            customer_id: o.customer_id,
            status: o.status.as_str().to_string(),
            subtotal: o.subtotal.clone(),
            discount_amount: o.discount_amount.clone(),
            coupon_id: o.coupon_id,
            total: o.total.clone(),
            shipping_address: o.shipping.address.clone(),
            shipping_phone: o.shipping.phone.clone(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Associations,
)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Value>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<Value>,
}

impl NewOrderLineRow {
    pub fn from_line(order_id: Uuid, line: &OrderLine) -> Result<Self, DomainError> {
        Ok(NewOrderLineRow {
            id: line.id,
            order_id,
            product_id: line.product_id,
            seller_id: line.seller_id,
            quantity: line.quantity,
            unit_price: line.unit_price.clone(),
            variant: variant_to_json(&line.variant)?,
        })
    }
}

pub fn order_from_rows(row: OrderRow, lines: Vec<OrderLineRow>) -> Result<Order, DomainError> {
    let lines = lines
        .into_iter()
        .map(|l| {
            Ok(OrderLine {
                id: l.id,
                product_id: l.product_id,
                seller_id: l.seller_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                variant: variant_from_json(l.variant)?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;
    Ok(Order {
        id: row.id,
        customer_id: row.customer_id,
        status: row.status.parse().map_err(|_| {
            DomainError::Internal(format!("order {} has unknown status '{}'", row.id, row.status))
        })?,
        lines,
        subtotal: row.subtotal,
        discount_amount: row.discount_amount,
        coupon_id: row.coupon_id,
        total: row.total,
        shipping: ShippingDetails {
            address: row.shipping_address,
            phone: row.shipping_phone,
        },
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = payments)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub method: String,
    pub status: String,
    pub transaction_id: String,
    pub qr_payload: Option<String>,
    pub slip_url: Option<String>,
    pub customer_info: Value,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Payment> for PaymentRow {
    type Error = DomainError;

    fn try_from(p: &Payment) -> Result<Self, Self::Error> {
        Ok(PaymentRow {
            id: p.id,
            order_id: p.order_id,
            amount: p.amount.clone(),
            method: p.method.as_str().to_string(),
            status: p.status.as_str().to_string(),
            transaction_id: p.transaction_id.clone(),
            qr_payload: p.qr_payload.clone(),
            slip_url: p.slip_url.clone(),
            customer_info: serde_json::to_value(&p.customer_info)
                .map_err(|e| DomainError::Internal(e.to_string()))?,
            approved_by: p.approved_by,
            approved_at: p.approved_at,
            rejected_by: p.rejected_by,
            rejected_at: p.rejected_at,
            rejection_reason: p.rejection_reason.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt =
            |what: &str| DomainError::Internal(format!("payment {id} has unknown {what}"));
        Ok(Payment {
            id,
            order_id: row.order_id,
            amount: row.amount,
            method: row.method.parse().map_err(|_| corrupt("method"))?,
            status: row.status.parse().map_err(|_| corrupt("status"))?,
            transaction_id: row.transaction_id,
            qr_payload: row.qr_payload,
            slip_url: row.slip_url,
            customer_info: serde_json::from_value::<CustomerInfo>(row.customer_info)
                .map_err(|_| corrupt("customer info"))?,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejected_by: row.rejected_by,
            rejected_at: row.rejected_at,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ── Notifications ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationRow {
    pub id: Uuid,
    pub target_user_id: Option<Uuid>,
    pub target_role: Option<String>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub payload: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        let (target_user_id, target_role) = match n.target {
            NotificationTarget::User(id) => (Some(id), None),
            NotificationTarget::Role(role) => (None, Some(role.as_str().to_string())),
        };
        NotificationRow {
            id: n.id,
            target_user_id,
            target_role,
            kind: n.kind.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
            order_id: n.order_id,
            payment_id: n.payment_id,
            payload: n.payload.clone(),
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let target = match (row.target_user_id, row.target_role.as_deref()) {
            (Some(id), _) => NotificationTarget::User(id),
            (None, Some(role)) => NotificationTarget::Role(role.parse::<Role>()?),
            (None, None) => {
                return Err(DomainError::Internal(format!(
                    "notification {} has no target",
                    row.id
                )))
            }
        };
        Ok(Notification {
            id: row.id,
            target,
            kind: row.kind,
            title: row.title,
            message: row.message,
            order_id: row.order_id,
            payment_id: row.payment_id,
            payload: row.payload,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

// ── Outbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = marketplace_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = marketplace_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

impl From<OutboxEvent> for NewOutboxEventRow {
    fn from(e: OutboxEvent) -> Self {
        NewOutboxEventRow {
            id: e.id,
            aggregate_type: e.aggregate_type,
            aggregate_id: e.aggregate_id,
            event_type: e.event_type,
            payload: e.payload,
        }
    }
}
