//! Fixed-point currency helpers.
//!
//! Amounts are carried as integer cents end to end; floats only appear at
//! the JSON boundary, where the legacy frontend sends and expects plain
//! decimal numbers.

/// Convert a JSON-boundary decimal amount to cents.
///
/// Returns `None` for NaN, infinities, and values outside the DECIMAL(12,2)
/// range the ledger schema was designed around.
pub fn cents_from_amount(amount: f64) -> Option<i64> {
    if !amount.is_finite() {
        return None;
    }
    let cents = (amount * 100.0).round();
    if cents.abs() > 999_999_999_999.0 {
        return None;
    }
    Some(cents as i64)
}

/// Convert cents back to the decimal number the frontend expects.
pub fn amount_from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Render cents as a `1234.56`-style string for concepts and log lines.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
