use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::coupon::{
    generate_code, normalize_code, Coupon, CouponKind, CouponValidation, DiscountRule, NewCoupon,
};
use crate::domain::errors::{CouponRejection, DomainError};
use crate::domain::ports::{CartRepository, CouponRepository};

use super::WelcomeCouponSettings;

/// Admin request for an arbitrary coupon. A missing code is generated.
#[derive(Debug, Clone)]
pub struct CouponDraft {
    pub owner_id: Uuid,
    pub code: Option<String>,
    pub rule: DiscountRule,
    pub min_purchase: BigDecimal,
    pub expires_at: DateTime<Utc>,
}

pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
    carts: Arc<dyn CartRepository>,
    welcome: WelcomeCouponSettings,
}

impl CouponService {
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        carts: Arc<dyn CartRepository>,
        welcome: WelcomeCouponSettings,
    ) -> Self {
        Self {
            coupons,
            carts,
            welcome,
        }
    }

    /// Returns the user's welcome coupon, issuing it on first call.
    pub fn issue_welcome(&self, user_id: Uuid) -> Result<Coupon, DomainError> {
        if let Some(existing) = self.coupons.find_welcome(user_id)? {
            return Ok(existing);
        }

        let issued = self.coupons.insert(NewCoupon {
            code: generate_code("WELCOME"),
            owner_id: user_id,
            kind: CouponKind::Welcome,
            rule: DiscountRule::Flat(self.welcome.amount.clone()),
            min_purchase: self.welcome.min_purchase.clone(),
            expires_at: Utc::now() + Duration::days(self.welcome.valid_days),
        });

        match issued {
            Ok(coupon) => {
                log::info!("Issued welcome coupon {} to {}", coupon.code, user_id);
                Ok(coupon)
            }
            // A concurrent request won the race; hand back its coupon.
            Err(DomainError::Conflict(_)) => self
                .coupons
                .find_welcome(user_id)?
                .ok_or_else(|| {
                    DomainError::Internal(format!("welcome coupon for {user_id} vanished"))
                }),
            Err(e) => Err(e),
        }
    }

    pub fn issue(&self, actor: &Actor, draft: CouponDraft) -> Result<Coupon, DomainError> {
        actor.require_admin()?;
        draft.rule.check()?;
        if draft.min_purchase < BigDecimal::zero() {
            return Err(DomainError::InvalidInput(
                "minimum purchase cannot be negative".to_string(),
            ));
        }
        if draft.expires_at <= Utc::now() {
            return Err(DomainError::InvalidInput(
                "expiry must be in the future".to_string(),
            ));
        }
        let code = match draft.code.as_deref() {
            Some(code) => normalize_code(code)?,
            None => generate_code("PROMO"),
        };

        let coupon = self.coupons.insert(NewCoupon {
            code,
            owner_id: draft.owner_id,
            kind: CouponKind::Manual,
            rule: draft.rule,
            min_purchase: draft.min_purchase,
            expires_at: draft.expires_at,
        })?;
        log::info!(
            "Admin {} issued coupon {} to {}",
            actor.user_id,
            coupon.code,
            coupon.owner_id
        );
        Ok(coupon)
    }

    /// Dry-run of the checkout coupon checks. Without `cart_total` the user's
    /// current cart total is used.
    pub fn validate(
        &self,
        user_id: Uuid,
        code: &str,
        cart_total: Option<BigDecimal>,
    ) -> Result<CouponValidation, DomainError> {
        let code = normalize_code(code)?;
        let cart_total = match cart_total {
            Some(total) => total,
            None => self.carts.load(user_id)?.total,
        };

        let Some(coupon) = self.coupons.find_by_code(&code)? else {
            return Ok(CouponValidation::rejected(CouponRejection::NotFound));
        };
        Ok(match coupon.evaluate(user_id, &cart_total, Utc::now()) {
            Ok(discount) => CouponValidation::accepted(discount),
            Err(reason) => CouponValidation::rejected(reason),
        })
    }

    pub fn list(&self, user_id: Uuid) -> Result<Vec<Coupon>, DomainError> {
        self.coupons.list_for_owner(user_id)
    }
}
