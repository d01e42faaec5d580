//! Integer money helpers. Amounts are cents, rates are basis points.

pub type Cents = i64;
pub type BasisPoints = i32;

pub const BPS_DENOMINATOR: i64 = 10_000;

/// `floor(amount * rate / 10_000)` for non-negative inputs.
///
/// Returns `None` on overflow or when either input is negative.
pub fn apply_rate(amount: Cents, rate: BasisPoints) -> Option<Cents> {
    if amount < 0 || rate < 0 {
        return None;
    }
    amount
        .checked_mul(rate as i64)
        .map(|scaled| scaled / BPS_DENOMINATOR)
}

/// Renders cents as a decimal string, e.g. `-1050` -> `-10.50`.
pub fn format_cents(amount: Cents) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_rate_floors() {
        assert_eq!(apply_rate(10_000, 1_000), Some(1_000));
        assert_eq!(apply_rate(999, 150), Some(14)); // 14.985
        assert_eq!(apply_rate(1, 1), Some(0));
    }

    #[test]
    fn test_apply_rate_rejects_negative_and_overflow() {
        assert_eq!(apply_rate(-1, 100), None);
        assert_eq!(apply_rate(100, -1), None);
        assert_eq!(apply_rate(i64::MAX, 2), None);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(1050), "10.50");
        assert_eq!(format_cents(-7), "-0.07");
    }
}
