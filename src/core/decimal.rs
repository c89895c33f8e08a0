use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::str::FromStr;

/// Lots at or below this remaining quantity are treated as exhausted.
pub const EPSILON: Decimal = dec!(0.0000000001);

/// Decimal places for asset quantities
pub const QTY_DP: u32 = 8;

/// Decimal places for fiat amounts
pub const FIAT_DP: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid decimal in '{field}': {value:?}")]
pub struct ParseDecimalError {
    pub field: String,
    pub value: String,
}

/// Quantize to 8 places, round half up, always carrying exactly 8 places.
pub fn round_qty(value: Decimal) -> Decimal {
    quantize(value, QTY_DP)
}

/// Quantize to 2 places, round half up, always carrying exactly 2 places.
pub fn round_fiat(value: Decimal) -> Decimal {
    quantize(value, FIAT_DP)
}

fn quantize(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

pub fn format_qty(value: Decimal) -> String {
    round_qty(value).to_string()
}

pub fn format_fiat(value: Decimal) -> String {
    round_fiat(value).to_string()
}

/// `num / den`, or zero when the denominator is zero.
pub fn ratio(num: Decimal, den: Decimal) -> Decimal {
    if den.is_zero() {
        Decimal::ZERO
    } else {
        num / den
    }
}

/// Parse a numeric ledger field. Blank fields read as zero.
pub fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ParseDecimalError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ParseDecimalError {
            field: field.to_string(),
            value: raw.to_string(),
        })
}
