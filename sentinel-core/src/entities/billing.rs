use super::WalletAddress;
use rust_decimal::Decimal;
use time::OffsetDateTime;

/// One append-only billing history entry.
///
/// Keyed by transaction hash so that re-delivered payment events cannot
/// produce duplicate entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEntry {
    pub tx_hash: String,
    pub wallet: WalletAddress,
    /// "month" or "year", matching the purchased plan.
    pub plan: &'static str,
    pub months: u32,
    /// Human-readable price, e.g. "12.00 USDC".
    pub price: String,
    pub date: OffsetDateTime,
}

/// Format a raw 6-decimal USDC amount as a display price.
pub fn format_usdc(amount: u128) -> String {
    match i128::try_from(amount)
        .ok()
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, 6).ok())
    {
        Some(value) => format!("{} USDC", value.round_dp(2)),
        // Beyond Decimal's 96-bit mantissa; format the fixed-point value
        // directly, truncating to two decimals.
        None => format!("{}.{:02} USDC", amount / 1_000_000, amount % 1_000_000 / 10_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_usdc_with_two_decimals() {
        assert_eq!(format_usdc(12_000_000), "12.00 USDC");
        assert_eq!(format_usdc(5_500_000), "5.50 USDC");
        assert_eq!(format_usdc(0), "0.00 USDC");
        assert_eq!(format_usdc(1_234_567), "1.23 USDC");
    }

    #[test]
    fn formats_amounts_beyond_decimal_range() {
        assert_eq!(
            format_usdc(u128::MAX),
            "340282366920938463463374607431768.21 USDC"
        );
    }
}
