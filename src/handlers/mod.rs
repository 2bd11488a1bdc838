pub mod carts;
pub mod coupons;
pub mod identity;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::errors::AppError;

/// Money arrives as a decimal string, e.g. "9.99", to avoid floating-point issues.
pub(crate) fn parse_money(field: &str, value: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(value.trim())
        .map_err(|e| AppError::InvalidArgument(format!("invalid {field} '{value}': {e}")))
}

/// Fixed two-decimal rendering for amounts in responses. Built from the
/// scaled integer because `Display` drops the scale of zero.
pub(crate) fn money(value: &BigDecimal) -> String {
    let (cents, _) = value.with_scale(2).as_bigint_and_exponent();
    let cents = cents.to_string();
    let (sign, digits) = match cents.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", cents.as_str()),
    };
    let digits = format!("{digits:0>3}");
    let (units, fraction) = digits.split_at(digits.len() - 2);
    format!("{sign}{units}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: &str) -> String {
        money(&BigDecimal::from_str(value).expect("decimal"))
    }

    #[test]
    fn money_always_has_two_decimals() {
        assert_eq!(render("0"), "0.00");
        assert_eq!(render("250"), "250.00");
        assert_eq!(render("9.9"), "9.90");
        assert_eq!(render("0.05"), "0.05");
        assert_eq!(render("-1.5"), "-1.50");
        assert_eq!(render("1234.567"), "1234.56");
    }

    #[test]
    fn parse_money_rejects_garbage() {
        assert!(parse_money("price", " 12.50 ").is_ok());
        assert!(matches!(
            parse_money("price", "twelve"),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
