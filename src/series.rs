//! Daily price data: bars, series and signal dates.
//!
//! Series are ordered most-recent-first: index 0 is the latest trading day.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::{BacktestError, Result};

/// Display/serialization format of a [`SignalDate`] (day-month-year).
pub const DATE_FORMAT: &str = "%d-%m-%Y";

// ============================================================
// BAR TRAIT
// ============================================================

/// Minimal daily bar needed by the detector.
///
/// Implement this for your own bar type to scan it without copying into [`Bar`].
pub trait DailyBar {
    fn date(&self) -> NaiveDate;
    fn open(&self) -> f64;
    fn close(&self) -> f64;

    /// Check prices are usable numbers
    fn validate(&self) -> Result<()> {
        if self.open().is_nan() || self.close().is_nan() {
            return Err(BacktestError::MalformedSeries {
                symbol: String::new(),
                index: 0,
                reason: "NaN price",
            });
        }
        if self.open().is_infinite() || self.close().is_infinite() {
            return Err(BacktestError::MalformedSeries {
                symbol: String::new(),
                index: 0,
                reason: "Infinite price",
            });
        }
        Ok(())
    }
}

impl<B: DailyBar> DailyBar for &B {
    fn date(&self) -> NaiveDate {
        (*self).date()
    }

    fn open(&self) -> f64 {
        (*self).open()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }
}

// ============================================================
// BAR
// ============================================================

/// One trading day. High and low are carried but unused by the detector.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
        }
    }
}

impl DailyBar for Bar {
    #[inline]
    fn date(&self) -> NaiveDate {
        self.date
    }

    #[inline]
    fn open(&self) -> f64 {
        self.open
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }
}

// ============================================================
// PRICE SERIES
// ============================================================

/// Price history of one instrument, most-recent-first.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    /// Build from bars in any order; sorts them most-recent-first.
    pub fn from_unordered(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by(|a, b| b.date.cmp(&a.date));
        Self::new(symbol, bars)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bars dated within `year`, order preserved.
    pub fn for_year(&self, year: i32) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date.year() == year)
                .copied()
                .collect(),
        }
    }

    /// Validate prices and ordering (strictly descending dates).
    pub fn validate(&self) -> Result<()> {
        let malformed = |index, reason| BacktestError::MalformedSeries {
            symbol: self.symbol.clone(),
            index,
            reason,
        };

        for (i, bar) in self.bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                BacktestError::MalformedSeries { reason, .. } => malformed(i, reason),
                other => other,
            })?;
        }

        if let Some(i) = self
            .bars
            .windows(2)
            .position(|pair| pair[0].date <= pair[1].date)
        {
            return Err(malformed(i + 1, "dates not strictly descending"));
        }

        Ok(())
    }
}

// ============================================================
// SIGNAL DATE
// ============================================================

/// Calendar date of a signal. Orders chronologically, prints as `DD-MM-YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalDate(NaiveDate);

impl SignalDate {
    #[inline]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse a `DD-MM-YYYY` string.
    pub fn parse(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Self)
            .map_err(|_| BacktestError::InvalidValue("date must be DD-MM-YYYY"))
    }

    #[inline]
    pub fn get(self) -> NaiveDate {
        self.0
    }

    /// Three-letter English month label, e.g. "Jan".
    pub fn month_label(self) -> &'static str {
        MONTH_LABELS[self.0.month0() as usize]
    }
}

/// Month labels in calendar order.
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl From<NaiveDate> for SignalDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for SignalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl serde::Serialize for SignalDate {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SignalDate {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(d)?;
        SignalDate::parse(&value).map_err(serde::de::Error::custom)
    }
}
