//! Externally visible balance view
//!
//! `AccountBalance` is the shape consumed by the HTTP layer. It is always
//! built from a single read of the account row.

use super::account::{Account, AccountId};
use rust_decimal::Decimal;
use serde::Serialize;

/// Breakdown of the funds reserved against streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InStreamsBalance {
    /// Everything currently reserved
    pub total: Decimal,
    /// Reserved as a safety margin
    pub buffer: Decimal,
    /// Reserved and actively streaming (`total - buffer`)
    pub streaming: Decimal,
}

/// Balance of one account as presented to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub total: Decimal,
    pub available: Decimal,
    pub in_streams: InStreamsBalance,
}

impl From<&Account> for AccountBalance {
    fn from(account: &Account) -> Self {
        AccountBalance {
            account_id: account.id.clone(),
            total: account.total,
            available: account.available,
            in_streams: InStreamsBalance {
                total: account.in_streams,
                buffer: account.buffer,
                streaming: account.streaming(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_view_from_account() {
        let account = Account {
            id: "acc".to_string(),
            total: dec!(1000),
            available: dec!(700),
            in_streams: dec!(300),
            buffer: dec!(50),
        };

        let balance = AccountBalance::from(&account);

        assert_eq!(balance.account_id, "acc");
        assert_eq!(balance.total, dec!(1000));
        assert_eq!(balance.available, dec!(700));
        assert_eq!(balance.in_streams.total, dec!(300));
        assert_eq!(balance.in_streams.buffer, dec!(50));
        assert_eq!(balance.in_streams.streaming, dec!(250));
    }
}
