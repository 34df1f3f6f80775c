//! Rally exhaustion detector (5-bar window, most-recent-first)
//!
//! Window bars are named d0 (most recent) to d4 (oldest). d1..d4 carry the
//! pattern, d0 only supplies the next-day exit price.

use std::iter::FusedIterator;

use super::helpers::{pct_change, round2, WINDOW};
use crate::{
    series::{Bar, DailyBar, PriceSeries, SignalDate},
    CandidateTrade, Slippage,
};

// ============================================================
// DETECTOR
// ============================================================

/// Detects a four-day rally with growing daily gains, entering on the last
/// rally close and exiting at the next open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RallyExhaustionDetector {
    pub slippage: Slippage,
}

impl RallyExhaustionDetector {
    pub fn new(slippage: Slippage) -> Self {
        Self { slippage }
    }

    /// Bars needed for one window.
    #[inline]
    pub fn min_bars(&self) -> usize {
        WINDOW
    }

    /// Evaluate the window starting at `index` (d0 = `bars[index]`).
    pub fn detect_at<B: DailyBar>(
        &self,
        symbol: &str,
        bars: &[B],
        index: usize,
    ) -> Option<CandidateTrade> {
        let window = bars.get(index..index.checked_add(WINDOW)?)?;
        let (d0, d1) = (&window[0], &window[1]);
        let (c1, c2, c3, c4) = (
            d1.close(),
            window[2].close(),
            window[3].close(),
            window[4].close(),
        );

        // Daily gains ordered newest to oldest must strictly shrink going back
        if !((c1 - c2) > (c2 - c3) && (c2 - c3) > (c3 - c4)) {
            return None;
        }

        if !(c1 > c2 && c2 > c3 && c3 > c4) {
            return None;
        }

        let inc1 = pct_change(c2, c1)?;
        let inc2 = pct_change(c3, c2)?;
        // Always 0 (or None on a zero close); kept as the reference threshold.
        let inc3 = pct_change(c4, c4)?;
        if !(inc1 > inc2 && inc2 > inc3) {
            return None;
        }

        let entry_price = round2(c1 * self.slippage.get());
        let exit_price = d0.open();
        let pnl_percent = pct_change(entry_price, exit_price)?;

        Some(CandidateTrade {
            symbol: symbol.to_string(),
            date: SignalDate::new(d1.date()),
            entry_price,
            exit_price,
            change_percent: inc1,
            pnl_percent,
        })
    }

    /// Lazily scan a whole series.
    pub fn scan<'a>(&self, series: &'a PriceSeries) -> Candidates<'a, Bar> {
        self.scan_bars(&series.symbol, &series.bars)
    }

    /// Lazily scan any most-recent-first bar slice.
    pub fn scan_bars<'a, B: DailyBar>(&self, symbol: &'a str, bars: &'a [B]) -> Candidates<'a, B> {
        Candidates {
            detector: *self,
            symbol,
            bars,
            current: 0,
        }
    }
}

// ============================================================
// CANDIDATE ITERATOR
// ============================================================

/// Iterator over the candidates of one series. Consumed once.
#[derive(Debug, Clone)]
pub struct Candidates<'a, B: DailyBar> {
    detector: RallyExhaustionDetector,
    symbol: &'a str,
    bars: &'a [B],
    current: usize,
}

impl<'a, B: DailyBar> Candidates<'a, B> {
    fn last_start(&self) -> Option<usize> {
        self.bars.len().checked_sub(WINDOW)
    }
}

impl<'a, B: DailyBar> Iterator for Candidates<'a, B> {
    type Item = CandidateTrade;

    fn next(&mut self) -> Option<Self::Item> {
        let last = self.last_start()?;
        while self.current <= last {
            let index = self.current;
            self.current += 1;
            if let Some(trade) = self.detector.detect_at(self.symbol, self.bars, index) {
                return Some(trade);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .last_start()
            .map_or(0, |last| (last + 1).saturating_sub(self.current));
        (0, Some(remaining))
    }
}

impl<'a, B: DailyBar> FusedIterator for Candidates<'a, B> {}
