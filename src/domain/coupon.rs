use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::{CouponRejection, DomainError};

const MAX_CODE_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponKind {
    Welcome,
    Manual,
}

impl CouponKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CouponKind::Welcome => "welcome",
            CouponKind::Manual => "manual",
        }
    }
}

impl FromStr for CouponKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(CouponKind::Welcome),
            "manual" => Ok(CouponKind::Manual),
            other => Err(DomainError::Internal(format!("unknown coupon kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscountRule {
    Flat(BigDecimal),
    Percent {
        percent: BigDecimal,
        max_discount: Option<BigDecimal>,
    },
}

impl DiscountRule {
    pub fn check(&self) -> Result<(), DomainError> {
        let hundred = BigDecimal::from(100);
        match self {
            DiscountRule::Flat(amount) if amount <= &BigDecimal::zero() => Err(
                DomainError::InvalidInput("flat discount must be positive".to_string()),
            ),
            DiscountRule::Percent { percent, .. }
                if percent <= &BigDecimal::zero() || percent > &hundred =>
            {
                Err(DomainError::InvalidInput(
                    "discount percent must be within (0, 100]".to_string(),
                ))
            }
            DiscountRule::Percent {
                max_discount: Some(max),
                ..
            } if max <= &BigDecimal::zero() => Err(DomainError::InvalidInput(
                "max discount must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Discount granted on `cart_total`, never more than the total itself.
    pub fn discount_for(&self, cart_total: &BigDecimal) -> BigDecimal {
        let raw = match self {
            DiscountRule::Flat(amount) => amount.clone(),
            DiscountRule::Percent {
                percent,
                max_discount,
            } => {
                let pct = (cart_total * percent / BigDecimal::from(100)).with_scale(2);
                match max_discount {
                    Some(max) if &pct > max => max.clone(),
                    _ => pct,
                }
            }
        };
        if &raw > cart_total {
            cart_total.clone()
        } else {
            raw
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub owner_id: Uuid,
    pub kind: CouponKind,
    pub rule: DiscountRule,
    pub min_purchase: BigDecimal,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Runs the ownership, usage, expiry and minimum-purchase checks in that
    /// order and returns the discount the coupon would grant.
    pub fn evaluate(
        &self,
        user_id: Uuid,
        cart_total: &BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<BigDecimal, CouponRejection> {
        if self.owner_id != user_id {
            return Err(CouponRejection::NotOwner);
        }
        if self.is_used {
            return Err(CouponRejection::AlreadyUsed);
        }
        if self.expires_at <= now {
            return Err(CouponRejection::Expired);
        }
        if cart_total < &self.min_purchase {
            return Err(CouponRejection::BelowMinimumPurchase {
                minimum: self.min_purchase.clone(),
            });
        }
        Ok(self.rule.discount_for(cart_total))
    }
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub owner_id: Uuid,
    pub kind: CouponKind,
    pub rule: DiscountRule,
    pub min_purchase: BigDecimal,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount_amount: BigDecimal,
    pub rejection: Option<CouponRejection>,
}

impl CouponValidation {
    pub fn accepted(discount_amount: BigDecimal) -> Self {
        Self {
            valid: true,
            discount_amount,
            rejection: None,
        }
    }

    pub fn rejected(reason: CouponRejection) -> Self {
        Self {
            valid: false,
            discount_amount: BigDecimal::zero(),
            rejection: Some(reason),
        }
    }
}

/// Validates the shape of a code and returns it upper-cased.
pub fn normalize_code(code: &str) -> Result<String, DomainError> {
    let code = code.trim();
    if code.is_empty()
        || code.len() > MAX_CODE_LEN
        || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(DomainError::InvalidInput(format!(
            "malformed coupon code '{code}'"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

pub fn generate_code(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..8]).to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).expect("valid decimal")
    }

    fn flat_coupon(owner_id: Uuid) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "WELCOME-1".to_string(),
            owner_id,
            kind: CouponKind::Welcome,
            rule: DiscountRule::Flat(dec("100")),
            min_purchase: dec("200"),
            expires_at: Utc::now() + Duration::days(30),
            is_used: false,
            used_at: None,
            order_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn flat_discount_applies_when_minimum_met() {
        let owner = Uuid::new_v4();
        let discount = flat_coupon(owner)
            .evaluate(owner, &dec("250"), Utc::now())
            .expect("valid");
        assert_eq!(discount, dec("100"));
    }

    #[test]
    fn ownership_is_checked_before_usage() {
        let owner = Uuid::new_v4();
        let mut coupon = flat_coupon(owner);
        coupon.is_used = true;
        let err = coupon
            .evaluate(Uuid::new_v4(), &dec("250"), Utc::now())
            .expect_err("foreign coupon");
        assert_eq!(err, CouponRejection::NotOwner);
    }

    #[test]
    fn usage_is_checked_before_expiry() {
        let owner = Uuid::new_v4();
        let mut coupon = flat_coupon(owner);
        coupon.is_used = true;
        coupon.expires_at = Utc::now() - Duration::days(1);
        let err = coupon
            .evaluate(owner, &dec("250"), Utc::now())
            .expect_err("used");
        assert_eq!(err, CouponRejection::AlreadyUsed);
    }

    #[test]
    fn expired_coupon_is_rejected() {
        let owner = Uuid::new_v4();
        let mut coupon = flat_coupon(owner);
        coupon.expires_at = Utc::now() - Duration::seconds(1);
        assert_eq!(
            coupon.evaluate(owner, &dec("250"), Utc::now()),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn below_minimum_reports_the_minimum() {
        let owner = Uuid::new_v4();
        assert_eq!(
            flat_coupon(owner).evaluate(owner, &dec("199.99"), Utc::now()),
            Err(CouponRejection::BelowMinimumPurchase {
                minimum: dec("200")
            })
        );
    }

    #[test]
    fn percent_discount_is_capped_by_max_discount() {
        let rule = DiscountRule::Percent {
            percent: dec("10"),
            max_discount: Some(dec("30")),
        };
        assert_eq!(rule.discount_for(&dec("250")), dec("25"));
        assert_eq!(rule.discount_for(&dec("1000")), dec("30"));
    }

    #[test]
    fn discount_never_exceeds_cart_total() {
        let rule = DiscountRule::Flat(dec("100"));
        assert_eq!(rule.discount_for(&dec("60")), dec("60"));
    }

    #[test]
    fn percent_discount_keeps_two_decimals() {
        let rule = DiscountRule::Percent {
            percent: dec("7.5"),
            max_discount: None,
        };
        assert_eq!(rule.discount_for(&dec("33.33")), dec("2.49"));
    }

    #[test]
    fn rule_check_rejects_out_of_range_percent() {
        let rule = DiscountRule::Percent {
            percent: dec("120"),
            max_discount: None,
        };
        assert!(matches!(rule.check(), Err(DomainError::InvalidInput(_))));
        assert!(DiscountRule::Flat(dec("0")).check().is_err());
        assert!(DiscountRule::Flat(dec("5")).check().is_ok());
    }

    #[test]
    fn codes_are_normalized_and_validated() {
        assert_eq!(normalize_code(" welcome-ab12 ").expect("ok"), "WELCOME-AB12");
        assert!(normalize_code("").is_err());
        assert!(normalize_code("drop table;").is_err());
        assert!(normalize_code(&"A".repeat(33)).is_err());
    }

    #[test]
    fn generated_codes_are_well_formed() {
        let code = generate_code("welcome");
        assert!(code.starts_with("WELCOME-"));
        assert_eq!(normalize_code(&code).expect("valid"), code);
    }
}
