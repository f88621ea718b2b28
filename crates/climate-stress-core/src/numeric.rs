//! Checked decimal arithmetic.
//!
//! `Decimal` cannot hold NaN or infinity, so the failure mode that stands in
//! for a non-finite result is overflow. Every product and sum on the stress,
//! loss and VaR paths goes through these helpers and fails with
//! `NumericInstability` instead of panicking.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::ClimateStressError;
use crate::ClimateStressResult;

pub fn checked_mul(a: Decimal, b: Decimal, context: &str) -> ClimateStressResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| ClimateStressError::numeric(format!("{context}: {a} * {b} overflows")))
}

pub fn checked_add(a: Decimal, b: Decimal, context: &str) -> ClimateStressResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| ClimateStressError::numeric(format!("{context}: {a} + {b} overflows")))
}

/// Sum a sequence, failing on the first overflow.
pub fn checked_sum<I>(values: I, context: &str) -> ClimateStressResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| checked_add(acc, v, context))
}

pub fn checked_div(a: Decimal, b: Decimal, context: &str) -> ClimateStressResult<Decimal> {
    a.checked_div(b)
        .ok_or_else(|| ClimateStressError::numeric(format!("{context}: {a} / {b} is undefined")))
}

/// Clamp into `[lo, hi]`.
pub fn clamp(x: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    x.max(lo).min(hi)
}

/// Lossy conversion for parameterising `f64` samplers. Rejects values that do
/// not convert to a finite float.
pub fn to_finite_f64(x: Decimal, context: &str) -> ClimateStressResult<f64> {
    match x.to_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ClimateStressError::numeric(format!(
            "{context}: {x} has no finite f64 representation"
        ))),
    }
}
