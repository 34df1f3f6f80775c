//! End-to-end tests for the backtest pipeline.

use chrono::{Duration, NaiveDate};
use rexb::prelude::*;

/// Series from closes given oldest-first, starting at `start`; each bar opens at its close.
fn series(symbol: &str, start: NaiveDate, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c))
        .collect();
    PriceSeries::from_unordered(symbol, bars)
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, day).unwrap()
}

/// Three instruments signalling on 04-03-2021 with strengths C > A > B.
fn three_way_source() -> MemorySource {
    [
        series("AAA", march(1), &[100.0, 101.0, 103.0, 106.0, 110.0]),
        series("BBB", march(1), &[100.0, 101.0, 102.5, 105.0, 108.0]),
        series("CCC", march(1), &[100.0, 102.0, 105.0, 109.0, 114.0]),
    ]
    .into_iter()
    .collect()
}

// ============================================================
// DETECTOR SCENARIOS
// ============================================================

#[test]
fn test_shrinking_gains_with_strong_open_still_vetoed() {
    // passes the price ordering but inc1 (0.95) < inc2 (1.94)
    let s = series("X", march(1), &[100.0, 103.0, 105.0, 106.0, 110.0]);
    assert_eq!(RallyExhaustionDetector::default().scan(&s).count(), 0);
}

#[test]
fn test_detector_on_custom_bar_type() {
    struct Tick {
        day: NaiveDate,
        px: f64,
    }

    impl DailyBar for Tick {
        fn date(&self) -> NaiveDate {
            self.day
        }

        fn open(&self) -> f64 {
            self.px
        }

        fn close(&self) -> f64 {
            self.px
        }
    }

    let ticks: Vec<Tick> = [110.0, 106.0, 103.0, 101.0, 100.0]
        .iter()
        .enumerate()
        .map(|(i, &px)| Tick {
            day: march(5) - Duration::days(i as i64),
            px,
        })
        .collect();

    let found: Vec<_> = RallyExhaustionDetector::default()
        .scan_bars("TICK", &ticks)
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].date.to_string(), "04-03-2021");
}

// ============================================================
// PIPELINE
// ============================================================

#[test]
fn test_full_run_caps_trades_per_day() {
    let backtest = BacktestBuilder::new()
        .universe(["AAA", "BBB", "CCC"])
        .build()
        .unwrap();
    let report = backtest.run(&three_way_source(), 2021).unwrap();

    assert!(report.skipped.is_empty());
    let rollup = &report.rollup;
    assert_eq!(rollup.trades.len(), 1);

    let day = SignalDate::parse("04-03-2021").unwrap();
    let picked: Vec<_> = rollup.trades[&day].iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(picked, vec!["CCC", "AAA"]);

    // CCC: 109.11 -> 114 = 4.48, AAA: 106.11 -> 110 = 3.67
    assert_eq!(rollup.trades[&day][0].pnl_percent, 4.48);
    assert_eq!(rollup.trades[&day][1].pnl_percent, 3.67);
    assert_eq!(rollup.monthly_percent["Mar"], 8.15);
    assert_eq!(rollup.yearly_percent, 8.15);
    assert_eq!(rollup.stats.trade_count, 2);

    assert_eq!(export_csv(&report.export), "date,percentPnL\n04-03-2021,8.15\n");
}

#[test]
fn test_cap_of_three_keeps_all() {
    let backtest = BacktestBuilder::new()
        .universe(["AAA", "BBB", "CCC"])
        .max_trades_per_day(3)
        .build()
        .unwrap();
    let report = backtest.run(&three_way_source(), 2021).unwrap();
    assert_eq!(report.rollup.stats.trade_count, 3);
}

#[test]
fn test_missing_instrument_does_not_abort() {
    let backtest = BacktestBuilder::new()
        .universe(["AAA", "GHOST", "CCC"])
        .build()
        .unwrap();
    let report = backtest.run(&three_way_source(), 2021).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].symbol, "GHOST");
    assert!(matches!(
        report.skipped[0].error,
        BacktestError::MissingData { year: 2021, .. }
    ));
    assert_eq!(report.rollup.stats.trade_count, 2);
}

#[test]
fn test_other_year_has_no_data() {
    let backtest = BacktestBuilder::new()
        .universe(["AAA", "BBB", "CCC"])
        .build()
        .unwrap();
    let report = backtest.run(&three_way_source(), 2020).unwrap();
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(report.rollup.yearly_percent, 0.0);
    assert!(report.rollup.monthly_percent.is_empty());
}

#[test]
fn test_run_is_repeatable() {
    let source = three_way_source();
    let backtest = BacktestBuilder::new()
        .universe(["CCC", "BBB", "AAA"])
        .build()
        .unwrap();

    let first = backtest.run(&source, 2021).unwrap();
    let second = backtest.run(&source, 2021).unwrap();
    assert_eq!(first.rollup, second.rollup);
    assert_eq!(first.export, second.export);
}

#[test]
fn test_months_and_year_across_dates() {
    let source: MemorySource = [
        series("AAA", march(1), &[100.0, 101.0, 103.0, 106.0, 110.0]),
        series(
            "BBB",
            NaiveDate::from_ymd_opt(2021, 5, 10).unwrap(),
            &[100.0, 102.0, 105.0, 109.0, 108.0],
        ),
    ]
    .into_iter()
    .collect();

    let backtest = BacktestBuilder::new().universe(["AAA", "BBB"]).build().unwrap();
    let report = backtest.run(&source, 2021).unwrap();
    let rollup = &report.rollup;

    let months: Vec<_> = rollup.monthly_percent.keys().map(String::as_str).collect();
    assert_eq!(months, vec!["Mar", "May"]);
    assert_eq!(rollup.monthly_percent["Mar"], 3.67);
    // 109.11 -> 108 = -1.02
    assert_eq!(rollup.monthly_percent["May"], -1.02);
    assert_eq!(rollup.yearly_percent, 2.65);
    assert_eq!(report.export.len(), 2);
    assert_eq!(rollup.stats.worst_day.unwrap().date.to_string(), "13-05-2021");
}

#[test]
fn test_report_serializes() {
    let backtest = BacktestBuilder::new()
        .universe(["AAA", "GHOST"])
        .build()
        .unwrap();
    let report = backtest.run(&three_way_source(), 2021).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["year"], 2021);
    assert_eq!(json["rollup"]["monthlyPercent"]["Mar"], 3.67);
    assert_eq!(json["export"][0]["date"], "04-03-2021");
    assert_eq!(json["skipped"][0]["symbol"], "GHOST");
    assert!(json["skipped"][0]["error"].as_str().unwrap().contains("GHOST"));
}
