use alloy::primitives::I256;
use holdscore_core::{AppError, Result};

/// Fractional decimals of the tracked token.
pub const TOKEN_DECIMALS: f64 = 1e18;

/// Parse a persisted base-10 amount into a signed big integer.
pub fn parse_amount(value: &str) -> Result<I256> {
    I256::from_dec_str(value).map_err(|e| AppError::Decode(format!("invalid amount {value}: {e}")))
}

/// Convert a base-unit balance into whole tokens as an IEEE-754 double.
///
/// The base quantity is exact; the conversion is the documented lossy step
/// before multiplying by the hourly rate.
pub fn whole_tokens(balance: &I256) -> f64 {
    balance.to_string().parse::<f64>().unwrap_or(0.0) / TOKEN_DECIMALS
}
