//! CLI argument definitions for tickwatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search` | Search stocks and crypto assets |
//! | `quote` | Fetch details and latest price for one asset |
//! | `chart` | Fetch candlesticks for one asset and timeframe |
//! | `watchlist` | Manage the local watchlist |
//! | `usage` | Show provider quota usage |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON config file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! tickwatch search apple --pretty
//! tickwatch quote bitcoin --crypto
//! tickwatch chart AAPL --timeframe 3M
//! tickwatch watchlist add NVDA
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tickwatch_core::{AssetType, Timeframe};

/// Stock and crypto market data from the command line.
#[derive(Debug, Parser)]
#[command(name = "tickwatch", author, version, about = "Stock and crypto market dashboard CLI")]
pub struct Cli {
    /// JSON configuration file. `TICKWATCH_*` environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search stocks and crypto assets by symbol or name.
    Search(SearchArgs),
    /// Fetch details and the latest price for one asset.
    Quote(AssetArgs),
    /// Fetch candlestick data for one asset.
    Chart(ChartArgs),
    /// Manage the local watchlist.
    Watchlist(WatchlistArgs),
    /// Show quota usage for every provider.
    Usage,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Debug, Clone, Args)]
pub struct AssetArgs {
    /// Ticker for stocks, coin id for crypto (e.g. `bitcoin`).
    pub symbol: String,

    /// Treat the symbol as a crypto asset.
    #[arg(long, default_value_t = false)]
    pub crypto: bool,
}

impl AssetArgs {
    pub fn asset_type(&self) -> AssetType {
        if self.crypto {
            AssetType::Crypto
        } else {
            AssetType::Stock
        }
    }
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[command(flatten)]
    pub asset: AssetArgs,

    /// One of 1D, 1W, 1M, 3M, 1Y.
    #[arg(long, default_value = "1D")]
    pub timeframe: Timeframe,
}

#[derive(Debug, Args)]
pub struct WatchlistArgs {
    #[command(subcommand)]
    pub command: WatchlistCommand,
}

#[derive(Debug, Subcommand)]
pub enum WatchlistCommand {
    /// Look up an asset and start tracking it.
    Add(AssetArgs),
    /// Stop tracking a symbol.
    Remove { symbol: String },
    /// Print the tracked assets.
    List,
    /// Remove every tracked asset.
    Clear,
    /// Fetch the latest price for every tracked asset.
    Refresh,
}
