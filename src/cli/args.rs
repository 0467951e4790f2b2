use crate::config::LedgerConfig;
use clap::Parser;
use std::path::PathBuf;

/// Replay a ledger command file and report balances
#[derive(Parser, Debug)]
#[command(name = "stream-ledger")]
#[command(about = "Replay a ledger command file and report balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Currency code of every balance
    #[arg(
        long = "currency",
        value_name = "CODE",
        help = "Currency code of the ledger (default: USDC)"
    )]
    pub currency: Option<String>,

    /// Maximum number of decimal places an amount may carry
    #[arg(
        long = "scale",
        value_name = "DIGITS",
        help = "Maximum decimal places per amount (default: 6, max: 28)"
    )]
    pub scale: Option<u32>,

    /// Upper bound for one history page
    #[arg(
        long = "max-page-size",
        value_name = "COUNT",
        help = "Maximum entries per history page (default: 500)"
    )]
    pub max_page_size: Option<usize>,

    /// Print this account's ledger history instead of balances
    #[arg(long = "history", value_name = "ACCOUNT")]
    pub history: Option<String>,

    /// Number of history entries to print, most recent first
    #[arg(long = "limit", value_name = "COUNT", default_value_t = 100)]
    pub limit: usize,

    /// Replay every account's ledger after processing and fail on divergence
    #[arg(long = "verify")]
    pub verify: bool,
}

impl CliArgs {
    /// Create a LedgerConfig from CLI arguments
    ///
    /// Missing values use the defaults; invalid ones fall back to the
    /// defaults with a warning.
    pub fn to_ledger_config(&self) -> LedgerConfig {
        if self.currency.is_none() && self.scale.is_none() && self.max_page_size.is_none() {
            return LedgerConfig::default();
        }

        let default = LedgerConfig::default();
        LedgerConfig::new(
            self.currency.as_deref().unwrap_or(&default.currency),
            self.scale.unwrap_or(default.scale),
            self.max_page_size.unwrap_or(default.max_page_size),
        )
    }
}
