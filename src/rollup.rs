//! Per-month and per-year rollups of selected trades, plus the flat export table.
//!
//! Monthly and yearly totals are rounded after every addition, so they can
//! drift from a single rounding of the full sum. Export rows are rounded once
//! per date from a fresh accumulator.

use std::fmt;

use indexmap::IndexMap;

use crate::{
    aggregate::DateBucket,
    detectors::helpers::{add_round2, round2},
    series::{SignalDate, MONTH_LABELS},
    BacktestError, Result, SelectedTrade,
};

/// Header of the two-column export table.
pub const EXPORT_HEADER: &str = "date,percentPnL";

// ============================================================
// RESULT SCHEMA
// ============================================================

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupResult {
    /// Sum of monthly totals
    pub yearly_percent: f64,
    /// Month label ("Jan".."Dec") to total, chronological
    pub monthly_percent: IndexMap<String, f64>,
    /// Selected trades per signal date, chronological
    pub trades: DateBucket,
    #[serde(default)]
    pub stats: RollupStats,
}

/// Summary figures over the selected trades.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupStats {
    pub trade_count: usize,
    pub winning_trades: usize,
    /// Percent of trades with positive pnl
    pub win_rate: f64,
    pub trading_days: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_day: Option<ExportRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_day: Option<ExportRow>,
}

impl RollupResult {
    /// Check the result is fit to hand to a persistence layer.
    pub fn validate(&self) -> Result<()> {
        if !self.yearly_percent.is_finite() {
            return Err(BacktestError::InvalidRollup("yearly total is not finite".into()));
        }
        for (label, value) in &self.monthly_percent {
            if !MONTH_LABELS.contains(&label.as_str()) {
                return Err(BacktestError::InvalidRollup(format!("unknown month {label}")));
            }
            if !value.is_finite() {
                return Err(BacktestError::InvalidRollup(format!("{label} total is not finite")));
            }
        }
        for (date, trades) in &self.trades {
            if let Some(t) = trades.iter().find(|t| t.date != *date) {
                return Err(BacktestError::InvalidRollup(format!(
                    "{} trade dated {} filed under {date}",
                    t.symbol, t.date
                )));
            }
            if trades
                .iter()
                .any(|t| !t.pnl_percent.is_finite() || !t.change_percent.is_finite())
            {
                return Err(BacktestError::InvalidRollup(format!("non-finite trade on {date}")));
            }
        }
        Ok(())
    }
}

// ============================================================
// EXPORT ROWS
// ============================================================

/// One line of the export table: a date and its summed pnl.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub date: SignalDate,
    #[serde(rename = "percentPnL")]
    pub pnl_percent: f64,
}

impl fmt::Display for ExportRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.date, self.pnl_percent)
    }
}

/// Rows for every date with at least one selected trade, chronological.
pub fn export_rows(selected: &DateBucket) -> Vec<ExportRow> {
    selected
        .iter()
        .filter(|(_, trades)| !trades.is_empty())
        .map(|(date, trades)| ExportRow {
            date: *date,
            pnl_percent: round2(trades.iter().fold(0.0, |acc, t| acc + t.pnl_percent)),
        })
        .collect()
}

/// Render rows as `date,percentPnL` text with a header line.
pub fn export_csv(rows: &[ExportRow]) -> String {
    let mut out = String::with_capacity(EXPORT_HEADER.len() + 1 + rows.len() * 20);
    out.push_str(EXPORT_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out
}

// ============================================================
// ROLLUP
// ============================================================

/// Sum of a date's selected trades, unrounded.
fn day_total(trades: &[SelectedTrade]) -> f64 {
    trades.iter().map(|t| t.pnl_percent).sum()
}

/// Roll the selected trades up into monthly and yearly totals.
pub fn rollup(selected: DateBucket) -> RollupResult {
    let mut monthly_percent: IndexMap<String, f64> = IndexMap::new();

    // BTreeMap iteration is chronological
    for (date, trades) in &selected {
        if trades.is_empty() {
            continue;
        }
        let month = monthly_percent
            .entry(date.month_label().to_string())
            .or_insert(0.0);
        *month = add_round2(*month, day_total(trades));
    }

    let yearly_percent = monthly_percent
        .values()
        .fold(0.0, |acc, &month| add_round2(acc, month));

    let stats = stats(&selected);

    RollupResult {
        yearly_percent,
        monthly_percent,
        trades: selected,
        stats,
    }
}

fn stats(selected: &DateBucket) -> RollupStats {
    let trades = selected.values().flatten();
    let trade_count = trades.clone().count();
    let winning_trades = trades.filter(|t| t.pnl_percent > 0.0).count();
    let win_rate = if trade_count == 0 {
        0.0
    } else {
        round2(winning_trades as f64 / trade_count as f64 * 100.0)
    };

    let rows = export_rows(selected);
    // strict comparisons keep the earliest date on ties
    let best_day = rows.iter().copied().reduce(|best, row| {
        if row.pnl_percent > best.pnl_percent {
            row
        } else {
            best
        }
    });
    let worst_day = rows.iter().copied().reduce(|worst, row| {
        if row.pnl_percent < worst.pnl_percent {
            row
        } else {
            worst
        }
    });

    RollupStats {
        trade_count,
        winning_trades,
        win_rate,
        trading_days: rows.len(),
        best_day,
        worst_day,
    }
}
