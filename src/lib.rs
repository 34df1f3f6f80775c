//! # REXB - Rally EXhaustion Backtester
//!
//! Scans daily price histories for a four-day accelerating rally, simulates a
//! one-day trade on every signal, keeps the strongest signals per day and rolls
//! the outcome up into monthly and yearly percentages.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, NaiveDate};
//! use rexb::prelude::*;
//!
//! // Five days, oldest first: closes 100, 101, 103, 106, then a 110 open
//! let start = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
//! let bars = [100.0, 101.0, 103.0, 106.0, 110.0]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &p)| Bar::new(start + Duration::days(i as i64), p, p, p, p))
//!     .collect();
//! let source = MemorySource::new().with_series(PriceSeries::from_unordered("ACME", bars));
//!
//! let backtest = BacktestBuilder::new()
//!     .universe(["ACME"])
//!     .build()
//!     .unwrap();
//!
//! let report = backtest.run(&source, 2021).unwrap();
//! assert_eq!(report.rollup.stats.trade_count, 1);
//! println!("{}", export_csv(&report.export));
//! ```

pub mod aggregate;
pub mod detectors;
pub mod rollup;
pub mod scanner;
pub mod series;

pub mod prelude {
    pub use crate::{
        // Pipeline stages
        aggregate::{group_by_date, select_top, DateBucket},
        // Detector
        detectors::{pct_change, round2, Candidates, RallyExhaustionDetector},
        rollup::{export_csv, export_rows, rollup, ExportRow, RollupResult, RollupStats},
        scanner::{scan_parallel, MemorySource, PriceSource, ScanError, ScanResult, Universe},
        series::{Bar, DailyBar, PriceSeries, SignalDate},
        // Engine
        Backtest,
        BacktestBuilder,
        BacktestConfig,
        // Errors
        BacktestError,
        BacktestReport,
        // Types
        CandidateTrade,
        PositionCap,
        Result,
        SelectedTrade,
        Slippage,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, BacktestError>;

/// Errors that can occur while running a backtest
#[derive(Debug, Clone, thiserror::Error)]
pub enum BacktestError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("No price data for {symbol} in {year}")]
    MissingData { symbol: String, year: i32 },

    #[error("Malformed series {symbol} at bar {index}: {reason}")]
    MalformedSeries {
        symbol: String,
        index: usize,
        reason: &'static str,
    },

    #[error("Universe has no symbols")]
    EmptyUniverse,

    #[error("Invalid rollup: {0}")]
    InvalidRollup(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Entry price multiplier applied to the signal close (>= 1.0).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Slippage(f64);

impl Slippage {
    /// Create a new Slippage, validating the value is finite and in [1.0, 2.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(BacktestError::InvalidValue(
                "Slippage cannot be NaN or infinite",
            ));
        }
        if !(1.0..=2.0).contains(&value) {
            return Err(BacktestError::OutOfRange {
                field: "Slippage",
                value,
                min: 1.0,
                max: 2.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for Slippage {
    fn default() -> Self {
        Self::new_const(detectors::DEFAULT_SLIPPAGE)
    }
}

impl serde::Serialize for Slippage {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Slippage {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Slippage::new(value).map_err(serde::de::Error::custom)
    }
}

/// Maximum trades kept per signal date (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PositionCap(usize);

impl PositionCap {
    /// Create a new PositionCap, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(BacktestError::InvalidValue("PositionCap must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for PositionCap {
    fn default() -> Self {
        Self::new_const(detectors::DEFAULT_MAX_TRADES_PER_DAY)
    }
}

impl serde::Serialize for PositionCap {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for PositionCap {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        PositionCap::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// CANDIDATE TRADE
// ============================================================

/// A simulated one-day trade emitted by the detector.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTrade {
    pub symbol: String,
    /// Date of the last rally bar (d1)
    pub date: series::SignalDate,
    /// d1 close with slippage, rounded to 2 decimals
    pub entry_price: f64,
    /// Open of the following bar (d0)
    pub exit_price: f64,
    /// Last daily gain in percent; the ranking key
    pub change_percent: f64,
    /// Percent change from entry to exit
    pub pnl_percent: f64,
}

/// A candidate that survived per-date selection.
pub type SelectedTrade = CandidateTrade;

// ============================================================
// CONFIG
// ============================================================

fn default_validate_data() -> bool {
    true
}

/// Run settings
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BacktestConfig {
    pub universe: scanner::Universe,
    #[serde(default)]
    pub slippage: Slippage,
    #[serde(default)]
    pub max_trades_per_day: PositionCap,
    #[serde(default = "default_validate_data")]
    pub validate_data: bool,
}

// ============================================================
// BACKTEST
// ============================================================

/// Everything one run produces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BacktestReport {
    pub year: i32,
    pub rollup: rollup::RollupResult,
    pub export: Vec<rollup::ExportRow>,
    /// Instruments left out because their data was missing or malformed
    pub skipped: Vec<scanner::ScanError>,
}

/// Scan, select and roll up a year of signals over a fixed universe.
#[derive(Debug, Clone)]
pub struct Backtest {
    detector: detectors::RallyExhaustionDetector,
    universe: scanner::Universe,
    cap: PositionCap,
    validate_data: bool,
}

impl Backtest {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            detector: detectors::RallyExhaustionDetector::new(config.slippage),
            universe: config.universe,
            cap: config.max_trades_per_day,
            validate_data: config.validate_data,
        }
    }

    #[inline]
    pub fn universe(&self) -> &scanner::Universe {
        &self.universe
    }

    #[inline]
    pub fn detector(&self) -> &detectors::RallyExhaustionDetector {
        &self.detector
    }

    /// Run every stage for `year`.
    pub fn run<P: scanner::PriceSource + ?Sized>(
        &self,
        source: &P,
        year: i32,
    ) -> Result<BacktestReport> {
        let (results, skipped) = scanner::scan_parallel(
            &self.detector,
            source,
            &self.universe,
            year,
            self.validate_data,
        );
        let candidates = scanner::flatten(results);
        tracing::debug!(year, candidates = candidates.len(), "scan complete");

        let bucket = aggregate::group_by_date(candidates);
        let selected = aggregate::select_top(bucket, self.cap);
        let export = rollup::export_rows(&selected);
        let rollup = rollup::rollup(selected);
        rollup.validate()?;

        tracing::info!(
            year,
            instruments = self.universe.len(),
            skipped = skipped.len(),
            trades = rollup.stats.trade_count,
            yearly_percent = rollup.yearly_percent,
            "backtest finished"
        );

        Ok(BacktestReport {
            year,
            rollup,
            export,
            skipped,
        })
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Backtest instances
#[derive(Debug, Clone)]
pub struct BacktestBuilder {
    symbols: Vec<String>,
    slippage: f64,
    max_trades_per_day: usize,
    validate_data: bool,
}

impl Default for BacktestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BacktestBuilder {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            slippage: detectors::DEFAULT_SLIPPAGE,
            max_trades_per_day: detectors::DEFAULT_MAX_TRADES_PER_DAY,
            validate_data: true,
        }
    }

    /// Start from a deserialized config
    pub fn from_config(config: BacktestConfig) -> Self {
        Self {
            symbols: config.universe.symbols().to_vec(),
            slippage: config.slippage.get(),
            max_trades_per_day: config.max_trades_per_day.get(),
            validate_data: config.validate_data,
        }
    }

    /// Replace the symbol list
    pub fn universe<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Add one symbol
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    /// Set entry slippage multiplier
    pub fn slippage(mut self, multiplier: f64) -> Self {
        self.slippage = multiplier;
        self
    }

    /// Set per-date trade cap
    pub fn max_trades_per_day(mut self, cap: usize) -> Self {
        self.max_trades_per_day = cap;
        self
    }

    /// Enable/disable series validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.validate_data = enable;
        self
    }

    /// Validate settings and build
    pub fn build(self) -> Result<Backtest> {
        let config = BacktestConfig {
            universe: scanner::Universe::new(self.symbols)?,
            slippage: Slippage::new(self.slippage)?,
            max_trades_per_day: PositionCap::new(self.max_trades_per_day)?,
            validate_data: self.validate_data,
        };
        Ok(Backtest::new(config))
    }
}

// ============================================================
// TESTS
// ============================================================
