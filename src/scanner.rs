//! Multi-instrument scanning
//!
//! Every symbol of a [`Universe`] is loaded from a [`PriceSource`] and scanned
//! independently on the rayon pool. Per-symbol failures are collected, not
//! propagated.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    detectors::RallyExhaustionDetector,
    series::PriceSeries,
    BacktestError, CandidateTrade, Result,
};

// ============================================================
// UNIVERSE
// ============================================================

/// Immutable snapshot of the symbols scanned on a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Universe(Vec<String>);

impl Universe {
    /// Create a universe; duplicates are dropped keeping first occurrence.
    pub fn new<I, S>(symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.trim().is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        if symbols.is_empty() {
            return Err(BacktestError::EmptyUniverse);
        }
        Ok(Self(symbols))
    }

    #[inline]
    pub fn symbols(&self) -> &[String] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'de> serde::Deserialize<'de> for Universe {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let symbols = Vec::<String>::deserialize(d)?;
        Universe::new(symbols).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE SOURCE
// ============================================================

/// Supplies one instrument's bars for a year. Called concurrently.
pub trait PriceSource: Sync {
    fn load(&self, symbol: &str, year: i32) -> Result<PriceSeries>;
}

impl<F> PriceSource for F
where
    F: Fn(&str, i32) -> Result<PriceSeries> + Sync,
{
    fn load(&self, symbol: &str, year: i32) -> Result<PriceSeries> {
        self(symbol, year)
    }
}

/// In-memory price histories keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<String, PriceSeries>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a symbol's full history.
    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol.clone(), series);
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }
}

impl FromIterator<PriceSeries> for MemorySource {
    fn from_iter<I: IntoIterator<Item = PriceSeries>>(iter: I) -> Self {
        let mut source = Self::new();
        for series in iter {
            source.insert(series);
        }
        source
    }
}

impl PriceSource for MemorySource {
    fn load(&self, symbol: &str, year: i32) -> Result<PriceSeries> {
        let missing = || BacktestError::MissingData {
            symbol: symbol.to_string(),
            year,
        };
        let scoped = self.series.get(symbol).ok_or_else(missing)?.for_year(year);
        if scoped.is_empty() {
            return Err(missing());
        }
        Ok(scoped)
    }
}

// ============================================================
// PARALLEL SCAN
// ============================================================

/// Candidates found for a single instrument
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub symbol: String,
    pub candidates: Vec<CandidateTrade>,
}

/// An instrument left out of the run
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanError {
    pub symbol: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: BacktestError,
}

fn serialize_display<S: serde::Serializer>(
    error: &BacktestError,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Load and scan one instrument.
pub fn scan_symbol<P: PriceSource + ?Sized>(
    detector: &RallyExhaustionDetector,
    source: &P,
    symbol: &str,
    year: i32,
    validate: bool,
) -> Result<ScanResult> {
    let series = source.load(symbol, year)?;
    if validate {
        series.validate()?;
    }
    let candidates: Vec<_> = detector.scan(&series).collect();
    debug!(symbol, bars = series.len(), candidates = candidates.len(), "scanned");
    Ok(ScanResult {
        symbol: symbol.to_string(),
        candidates,
    })
}

/// Scan every symbol in parallel. Results keep universe order.
pub fn scan_parallel<P: PriceSource + ?Sized>(
    detector: &RallyExhaustionDetector,
    source: &P,
    universe: &Universe,
    year: i32,
    validate: bool,
) -> (Vec<ScanResult>, Vec<ScanError>) {
    let results: Vec<_> = universe
        .symbols()
        .par_iter()
        .map(|symbol| {
            scan_symbol(detector, source, symbol, year, validate).map_err(|error| ScanError {
                symbol: symbol.clone(),
                error,
            })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => {
                warn!(symbol = %e.symbol, error = %e.error, "skipping instrument");
                errors.push(e);
            }
        }
    }

    (successes, errors)
}

/// Flatten per-instrument results into one candidate list, universe order.
pub fn flatten(results: Vec<ScanResult>) -> Vec<CandidateTrade> {
    results.into_iter().flat_map(|r| r.candidates).collect()
}
