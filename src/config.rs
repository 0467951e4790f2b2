//! Ledger configuration
//!
//! One deployment runs one currency. Amounts are fixed-point decimals with
//! at most `scale` fractional digits; the engine never converts between
//! currencies.

use rust_decimal::Decimal;
use tracing::warn;

/// Configuration for the balance engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Currency code of every balance in this deployment
    pub currency: String,
    /// Maximum number of fractional digits an amount may carry
    pub scale: u32,
    /// Upper bound for the `limit` of a history page
    pub max_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "USDC".to_string(),
            scale: 6,
            max_page_size: 500,
        }
    }
}

impl LedgerConfig {
    /// Largest scale `rust_decimal` can represent
    pub const MAX_SCALE: u32 = 28;

    /// Create a new LedgerConfig with custom values
    ///
    /// Invalid values fall back to the defaults with a warning.
    pub fn new(currency: &str, scale: u32, max_page_size: usize) -> Self {
        let default = Self::default();

        let currency = if currency.trim().is_empty() {
            warn!(
                "Invalid currency ({:?}), using default ({})",
                currency, default.currency
            );
            default.currency
        } else {
            currency.trim().to_uppercase()
        };

        let scale = if scale > Self::MAX_SCALE {
            warn!("Invalid scale ({}), using default ({})", scale, default.scale);
            default.scale
        } else {
            scale
        };

        let max_page_size = if max_page_size == 0 {
            warn!(
                "Invalid max_page_size ({}), using default ({})",
                max_page_size, default.max_page_size
            );
            default.max_page_size
        } else {
            max_page_size
        };

        Self {
            currency,
            scale,
            max_page_size,
        }
    }

    /// Whether `amount` fits the configured precision
    pub fn fits_scale(&self, amount: Decimal) -> bool {
        amount.normalize().scale() <= self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.currency, "USDC");
        assert_eq!(config.scale, 6);
        assert_eq!(config.max_page_size, 500);
    }

    #[rstest]
    #[case::valid("eurc", 2, 50, "EURC", 2, 50)]
    #[case::empty_currency("  ", 2, 50, "USDC", 2, 50)]
    #[case::scale_too_large("USDC", 40, 50, "USDC", 6, 50)]
    #[case::zero_page_size("USDC", 4, 0, "USDC", 4, 500)]
    fn test_new_falls_back_to_defaults(
        #[case] currency: &str,
        #[case] scale: u32,
        #[case] max_page_size: usize,
        #[case] expected_currency: &str,
        #[case] expected_scale: u32,
        #[case] expected_page_size: usize,
    ) {
        let config = LedgerConfig::new(currency, scale, max_page_size);
        assert_eq!(config.currency, expected_currency);
        assert_eq!(config.scale, expected_scale);
        assert_eq!(config.max_page_size, expected_page_size);
    }

    #[rstest]
    #[case(dec!(1.123456), true)]
    #[case(dec!(1.1234567), false)]
    #[case(dec!(100.000000000), true)]
    fn test_fits_scale(#[case] amount: Decimal, #[case] expected: bool) {
        assert_eq!(LedgerConfig::default().fits_scale(amount), expected);
    }
}
