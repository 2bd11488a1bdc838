pub mod cart_service;
pub mod checkout_service;
pub mod coupon_service;
pub mod inventory_service;
pub mod notification_dispatcher;
pub mod order_service;
pub mod payment_service;

use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::domain::payment::SlipReviewPolicy;
use crate::domain::ports::{
    CartRepository, Catalog, CouponRepository, InventoryLedger, LivePush, NotificationRepository,
    OrderRepository, PaymentRepository,
};

use self::cart_service::CartService;
use self::checkout_service::CheckoutService;
use self::coupon_service::CouponService;
use self::inventory_service::InventoryService;
use self::notification_dispatcher::NotificationDispatcher;
use self::order_service::OrderService;
use self::payment_service::PaymentService;

/// Storage and push adapters the services run against.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn Catalog>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub carts: Arc<dyn CartRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub live: Arc<dyn LivePush>,
}

#[derive(Debug, Clone)]
pub struct WelcomeCouponSettings {
    pub amount: BigDecimal,
    pub min_purchase: BigDecimal,
    pub valid_days: i64,
}

impl Default for WelcomeCouponSettings {
    fn default() -> Self {
        Self {
            amount: BigDecimal::from(100),
            min_purchase: BigDecimal::from(200),
            valid_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub slip_review: SlipReviewPolicy,
    pub welcome: WelcomeCouponSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            slip_review: SlipReviewPolicy::Auto,
            welcome: WelcomeCouponSettings::default(),
        }
    }
}

/// Everything the HTTP layer calls into. Cheap to share behind `web::Data`.
pub struct Services {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub coupons: CouponService,
    pub inventory: InventoryService,
    pub notifications: Arc<NotificationDispatcher>,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl Services {
    pub fn new(ports: Ports, settings: ServiceSettings) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            ports.notifications.clone(),
            ports.live.clone(),
        ));

        Self {
            carts: CartService::new(ports.carts.clone(), ports.catalog.clone()),
            checkout: CheckoutService::new(ports.orders.clone(), dispatcher.clone()),
            coupons: CouponService::new(
                ports.coupons.clone(),
                ports.carts.clone(),
                settings.welcome,
            ),
            inventory: InventoryService::new(ports.catalog.clone(), ports.inventory.clone()),
            orders: OrderService::new(ports.orders.clone(), dispatcher.clone()),
            payments: PaymentService::new(
                ports.payments.clone(),
                ports.orders.clone(),
                dispatcher.clone(),
                settings.slip_review,
            ),
            notifications: dispatcher,
        }
    }
}
