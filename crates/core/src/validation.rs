//! Input validation for balance adjustment requests.
//!
//! Everything here runs before an adjustment is queued: a request that
//! fails validation never touches the ledger.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::CoreError;
use crate::types::{Amount, DbId};

/// Maximum number of fractional digits an amount may carry.
///
/// Matches the `NUMERIC(20, 4)` columns used for balances and deltas.
pub const MAX_AMOUNT_SCALE: u32 = 4;

/// Upper bound for a single adjustment (exclusive).
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

// ---------------------------------------------------------------------------
// Account identity
// ---------------------------------------------------------------------------

/// Validate an account id that has already been parsed.
pub fn validate_account_id(id: DbId) -> Result<DbId, CoreError> {
    if id <= 0 {
        return Err(CoreError::Validation("invalid id".to_string()));
    }
    Ok(id)
}

/// Parse an account id from a raw path segment.
pub fn parse_account_id(raw: &str) -> Result<DbId, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::Validation("id is empty".to_string()));
    }
    let id: DbId = raw
        .parse()
        .map_err(|_| CoreError::Validation("invalid id".to_string()))?;
    validate_account_id(id)
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Validate an unsigned request amount.
///
/// Rules:
/// - Must be strictly positive (direction comes from the operation).
/// - Must be below [`MAX_AMOUNT`].
/// - Must not carry more than [`MAX_AMOUNT_SCALE`] fractional digits.
pub fn validate_amount(amount: Amount) -> Result<Amount, CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(
            "sum must be greater than zero".to_string(),
        ));
    }
    if amount >= MAX_AMOUNT {
        return Err(CoreError::Validation(format!(
            "sum must be less than {MAX_AMOUNT}"
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(CoreError::Validation(format!(
            "sum must not have more than {MAX_AMOUNT_SCALE} decimal places"
        )));
    }
    Ok(amount.normalize())
}

/// Parse and validate an amount from a raw path segment.
pub fn parse_amount(raw: &str) -> Result<Amount, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::Validation("sum is empty".to_string()));
    }
    let amount =
        Decimal::from_str(raw).map_err(|_| CoreError::Validation("invalid sum".to_string()))?;
    validate_amount(amount)
}
