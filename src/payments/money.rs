//! Conversion between major-unit amounts (what the storefront shows) and the
//! minor units (kobo, pesewas, cents) the gateway charges in.
//!
//! Every amount forwarded to the gateway goes through [`to_minor_units`]; a
//! missed scaling step would undercharge by a factor of 100 without any error.

use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};

/// Currencies the gateway accepts, with their minor-unit exponent.
const CURRENCY_EXPONENTS: &[(&str, u32)] = &[
    ("NGN", 2),
    ("GHS", 2),
    ("ZAR", 2),
    ("USD", 2),
    ("KES", 2),
];

pub fn normalize_currency(currency: &str) -> String {
    currency.trim().to_uppercase()
}

/// Minor-unit exponent for a currency code, or a validation error when the
/// gateway cannot charge in it.
pub fn minor_unit_exponent(currency: &str) -> PaymentResult<u32> {
    let code = normalize_currency(currency);
    CURRENCY_EXPONENTS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, exp)| *exp)
        .ok_or_else(|| {
            PaymentError::validation(format!("unsupported currency: {}", currency), "currency")
        })
}

pub fn is_supported_currency(currency: &str) -> bool {
    minor_unit_exponent(currency).is_ok()
}

/// Converts a positive major-unit amount to integer minor units.
///
/// `100 NGN` becomes `10000`. Amounts finer than the currency allows
/// (`10.005 NGN`) are rejected rather than rounded.
pub fn to_minor_units(amount: &BigDecimal, currency: &str) -> PaymentResult<i64> {
    let exponent = minor_unit_exponent(currency)?;
    if amount <= &BigDecimal::zero() {
        return Err(PaymentError::validation(
            "amount must be greater than zero",
            "amount",
        ));
    }

    let scaled = amount.clone() * BigDecimal::from(10_i64.pow(exponent));
    if !scaled.is_integer() {
        return Err(PaymentError::validation(
            format!(
                "amount {} has more than {} decimal places for {}",
                amount,
                exponent,
                normalize_currency(currency)
            ),
            "amount",
        ));
    }

    scaled.to_i64().ok_or_else(|| {
        PaymentError::validation(format!("amount {} is too large", amount), "amount")
    })
}

/// Inverse of [`to_minor_units`], used when comparing gateway-reported amounts.
pub fn from_minor_units(minor: i64, currency: &str) -> PaymentResult<BigDecimal> {
    let exponent = minor_unit_exponent(currency)?;
    Ok(BigDecimal::new(minor.into(), exponent as i64))
}
