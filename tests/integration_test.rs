//! Integration tests for the load, aggregate, backtest and optimize pipeline.
//!
//! Tests cover:
//! - Archive loading through an in-memory RecordSource (encoding, columns,
//!   exclusion, duplicate resolution, per-file error collection)
//! - Bar aggregation and volatility tables over loaded data
//! - Backtest scenarios on hand-built series
//! - Grid search selection and per-year sweeps

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use fxsweep::domain::bar::{BarInterval, aggregate};
use fxsweep::domain::engine::run_strategy;
use fxsweep::domain::error::FxsweepError;
use fxsweep::domain::loader::{LoadOptions, available_prefixes, available_years, load_series};
use fxsweep::domain::optimizer::{
    GridOutcome, Metric, OptimizeOptions, ParameterGrid, YearOutcome, optimize, optimize_by_year,
};
use fxsweep::domain::position::ExitReason;
use fxsweep::domain::series::NormalizedSeries;
use fxsweep::domain::stats::{GroupKey, KeyValue, volatility_stats};
use std::sync::atomic::AtomicBool;

fn grid(entry: &[i64], tp: &[f64], sl: &[f64], close: &[i64]) -> ParameterGrid {
    ParameterGrid {
        entry_times: entry.to_vec(),
        take_profits: tp.to_vec(),
        stop_losses: sl.to_vec(),
        close_times: close.to_vec(),
    }
}

mod loading {
    use super::*;

    #[test]
    fn loads_shift_jis_day_files() {
        let ticks = minute_ticks(ny(2024, 1, 15, 16, 30), &[100.0, 100.1, 100.2]);
        let source = MockSource::new().with_archive(
            "USDJPY_202401.zip",
            zip_bytes(&[("USDJPY_20240116.csv", day_file(&ticks))]),
        );

        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.archives_read, 1);
        assert_eq!(outcome.files_read, 1);
        assert_eq!(outcome.series.len(), 3);
        assert_eq!(outcome.series.first_timestamp(), Some(ny(2024, 1, 15, 16, 30)));
    }

    #[test]
    fn bid_only_rows_mirror_ask() {
        let ticks = minute_ticks(ny(2024, 1, 15, 16, 30), &[100.0]);
        let source = MockSource::new().with_archive(
            "USDJPY_a.zip",
            zip_bytes(&[("USDJPY_20240116.csv", day_file(&ticks))]),
        );
        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        let record = &outcome.series.records()[0];
        assert_eq!(record.bid, record.ask);
    }

    #[test]
    fn nine_column_rows_carry_ask() {
        let text = format!(
            "{HEADER_9}\n20240116063000,100.0,100.2,99.9,100.1,100.01,100.21,99.91,100.11\n"
        );
        let source = MockSource::new().with_archive(
            "USDJPY_a.zip",
            zip_bytes(&[("USDJPY_20240116.csv", shift_jis(&text))]),
        );
        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        let record = &outcome.series.records()[0];
        assert_eq!(record.timestamp, ny(2024, 1, 15, 16, 30));
        assert_abs_diff_eq!(record.bid.close, 100.1);
        assert_abs_diff_eq!(record.ask.close, 100.11);
    }

    #[test]
    fn duplicate_instant_keeps_first_seen_archive() {
        let at = ny(2024, 1, 15, 16, 30);
        let source = MockSource::new()
            .with_archive(
                "USDJPY_1.zip",
                zip_bytes(&[("USDJPY_20240116.csv", day_file(&[(at, 100.0)]))]),
            )
            .with_archive(
                "USDJPY_2.zip",
                zip_bytes(&[("USDJPY_20240116.csv", day_file(&[(at, 101.0)]))]),
            );

        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert_eq!(outcome.series.len(), 1);
        assert_abs_diff_eq!(outcome.series.records()[0].bid.close, 100.0);
    }

    #[test]
    fn duplicate_resolution_follows_listing_order() {
        let at = ny(2024, 1, 15, 16, 30);
        let source = MockSource::new()
            .with_archive(
                "USDJPY_2.zip",
                zip_bytes(&[("USDJPY_20240116.csv", day_file(&[(at, 101.0)]))]),
            )
            .with_archive(
                "USDJPY_1.zip",
                zip_bytes(&[("USDJPY_20240116.csv", day_file(&[(at, 100.0)]))]),
            );
        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert_abs_diff_eq!(outcome.series.records()[0].bid.close, 101.0);
    }

    #[test]
    fn bad_files_are_collected_and_skipped() {
        let good = minute_ticks(ny(2024, 1, 15, 16, 30), &[100.0, 100.1]);
        let wrong_columns = shift_jis(&format!("{HEADER_5}\n2024/01/17 06:30:00,1,2,3\n"));
        let bad_stamp = shift_jis(&format!("{HEADER_5}\n2024-01-17,1,1,1,1\n"));

        let source = MockSource::new()
            .with_archive(
                "USDJPY_a.zip",
                zip_bytes(&[
                    ("USDJPY_20240116.csv", day_file(&good)),
                    ("USDJPY_20240117.csv", wrong_columns),
                    ("USDJPY_20240118.csv", bad_stamp),
                ]),
            )
            .with_archive("USDJPY_b.zip", b"not a zip".to_vec())
            .with_unreadable("USDJPY_c.zip");

        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert_eq!(outcome.series.len(), 2);
        assert_eq!(outcome.files_read, 1);
        assert_eq!(outcome.archives_read, 1);
        assert_eq!(outcome.errors.len(), 4);

        assert!(matches!(
            outcome.errors[0].error,
            FxsweepError::RecordParse { line: 2, .. }
        ));
        assert!(matches!(outcome.errors[1].error, FxsweepError::TimestampParse { .. }));
        assert!(matches!(outcome.errors[2].error, FxsweepError::Archive { .. }));
        assert_eq!(outcome.errors[3].file, "USDJPY_c.zip");
    }

    #[test]
    fn excluded_directories_are_skipped() {
        let at = ny(2024, 1, 15, 16, 30);
        let source = MockSource::new().with_archive(
            "USDJPY_a.zip",
            zip_bytes(&[
                ("USDJPY_EX/USDJPY_20240116.csv", day_file(&[(at, 1.0)])),
                ("daily/USDJPY_20240117.csv", day_file(&[(ny(2024, 1, 16, 16, 30), 2.0)])),
                ("daily/readme.txt", b"notes".to_vec()),
            ]),
        );
        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert_eq!(outcome.files_read, 1);
        assert_eq!(outcome.series.len(), 1);
        assert_abs_diff_eq!(outcome.series.records()[0].bid.close, 2.0);
    }

    #[test]
    fn year_bounds_filter_on_destination_clock() {
        // 2024-01-01 08:00 Tokyo is still 2023 in New York.
        let source = MockSource::new().with_archive(
            "USDJPY_a.zip",
            zip_bytes(&[(
                "USDJPY_20240101.csv",
                day_file(&[(ny(2023, 12, 31, 18, 0), 1.0), (ny(2024, 1, 2, 18, 0), 2.0)]),
            )]),
        );
        let mut options = LoadOptions::new("USDJPY");
        options.start_year = Some(2024);
        let outcome = load_series(&source, &options).unwrap();
        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series.years(), vec![2024]);
    }

    #[test]
    fn other_prefixes_are_ignored() {
        let at = ny(2024, 1, 15, 16, 30);
        let source = MockSource::new()
            .with_archive("EURUSD_a.zip", zip_bytes(&[("EURUSD_20240116.csv", day_file(&[(at, 1.0)]))]));
        let outcome = load_series(&source, &LoadOptions::new("USDJPY")).unwrap();
        assert!(outcome.series.is_empty());
        assert_eq!(outcome.archives_read, 0);
    }

    #[test]
    fn available_years_from_entry_names() {
        let source = MockSource::new()
            .with_archive(
                "USDJPY_2022.zip",
                zip_bytes(&[
                    ("USDJPY_20221230.csv", Vec::new()),
                    ("USDJPY_EX/USDJPY_20191230.csv", Vec::new()),
                ]),
            )
            .with_archive("USDJPY_2024.zip", zip_bytes(&[("x/USDJPY_20240105.csv", Vec::new())]))
            .with_unreadable("USDJPY_broken.zip");
        assert_eq!(available_years(&source, "USDJPY", "_EX").unwrap(), vec![2022, 2024]);
    }

    #[test]
    fn available_prefixes_from_archive_names() {
        let source = MockSource::new()
            .with_archive("USDJPY_202401.zip", Vec::new())
            .with_archive("EURUSD_202401.zip", Vec::new())
            .with_archive("USDJPY_202402.zip", Vec::new())
            .with_archive("notes.zip", Vec::new());
        assert_eq!(available_prefixes(&source).unwrap(), vec!["EURUSD", "USDJPY"]);
    }
}

mod analysis {
    use super::*;

    #[test]
    fn aggregation_is_idempotent() {
        let ticks = minute_ticks(
            ny(2024, 1, 15, 16, 0),
            &[1.0, 1.4, 0.8, 1.1, 1.2, 1.0, 2.0, 2.5, 1.9, 2.2, 2.1, 2.0],
        );
        let series = make_series(&ticks);
        let first = aggregate(&series, BarInterval::default()).unwrap();
        let second = aggregate(&series, BarInterval::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_abs_diff_eq!(first[0].volatility, 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(first[1].volatility, 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(first[1].bid.open, 2.0);
        assert_abs_diff_eq!(first[1].bid.close, 2.0);
    }

    #[test]
    fn single_record_bar_is_flat() {
        let series = make_series(&[(ny(2024, 1, 15, 16, 0), 1.5), (ny(2024, 1, 15, 16, 7), 1.7)]);
        let bars = aggregate(&series, BarInterval::default()).unwrap();
        assert_eq!(bars.len(), 2);
        for bar in &bars {
            assert_eq!(bar.bid.open, bar.bid.close);
            assert_eq!(bar.bid.high, bar.bid.low);
            assert_eq!(bar.volatility, 0.0);
        }
        assert_eq!(bars[1].period_start, ny(2024, 1, 15, 16, 6));
    }

    #[test]
    fn empty_series_has_no_bars_or_stats() {
        let bars = aggregate(&NormalizedSeries::empty(), BarInterval::default()).unwrap();
        assert!(bars.is_empty());
        assert!(volatility_stats(&bars, &[GroupKey::Year, GroupKey::Hour]).is_empty());
    }

    #[test]
    fn stats_group_loaded_bars_by_year_and_hour() {
        let mut ticks = minute_ticks(ny(2023, 6, 1, 9, 0), &[1.0, 1.2]);
        ticks.extend(minute_ticks(ny(2024, 6, 3, 9, 0), &[1.0, 1.4]));
        ticks.extend(minute_ticks(ny(2024, 6, 4, 9, 0), &[1.0, 1.2]));
        let bars = aggregate(&make_series(&ticks), BarInterval::default()).unwrap();

        let stats = volatility_stats(&bars, &[GroupKey::Year, GroupKey::Hour]);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].key, vec![KeyValue::Year(2023), KeyValue::Hour(9)]);
        assert_eq!(stats[1].count, 2);
        assert_abs_diff_eq!(stats[1].mean, 0.3, epsilon = 1e-9);
    }
}

mod backtest_scenarios {
    use super::*;

    #[test]
    fn entry_time_outside_window_opens_nothing() {
        let ticks = minute_ticks(
            ny(2024, 1, 15, 16, 0),
            &[100.0, 100.12, 100.24, 100.36, 100.48, 100.6],
        );
        let result = run_strategy(&make_series(&ticks), &params(1630, 0.5, 0.05, 30), &any_day_config());
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.total_trades, 0);
        assert_eq!(result.records_processed, 6);
    }

    #[test]
    fn take_profit_crossed_on_next_tick() {
        let series = make_series(&[(ny(2024, 1, 15, 16, 30), 100.0), (ny(2024, 1, 15, 16, 31), 100.6)]);
        let result = run_strategy(&series, &params(1630, 0.5, 0.05, 30), &any_day_config());

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_abs_diff_eq!(trade.entry_price, 100.0);
        assert_abs_diff_eq!(trade.pnl, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(result.metrics.win_rate, 1.0);
    }

    #[test]
    fn loaded_series_runs_end_to_end() {
        let ticks = minute_ticks(ny(2024, 1, 15, 16, 30), &[100.0, 99.9, 99.94]);
        let source = MockSource::new().with_archive(
            "USDJPY_a.zip",
            zip_bytes(&[("USDJPY_20240116.csv", day_file(&ticks))]),
        );
        let series = load_series(&source, &LoadOptions::new("USDJPY")).unwrap().series;
        let result = run_strategy(&series, &params(1630, 0.5, 0.05, 30), &any_day_config());

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(result.trades[0].exit_time, ny(2024, 1, 15, 16, 31));
        assert_abs_diff_eq!(result.trades[0].pnl, -0.05, epsilon = 1e-9);
    }

    #[test]
    fn friday_entries_skipped_by_default() {
        // 2024-01-19 is a Friday.
        let series = make_series(&[(ny(2024, 1, 19, 16, 30), 100.0), (ny(2024, 1, 19, 16, 31), 100.6)]);
        let result = run_strategy(&series, &params(1630, 0.5, 0.05, 30), &Default::default());
        assert!(result.trades.is_empty());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut ticks = Vec::new();
        for day in 15..=18 {
            ticks.extend(minute_ticks(
                ny(2024, 1, day, 16, 29),
                &[100.0, 100.0, 100.2, 99.9, 100.7, 100.1],
            ));
        }
        let series = make_series(&ticks);
        let p = params(1630, 0.5, 0.05, 30);
        let a = run_strategy(&series, &p, &any_day_config());
        let b = run_strategy(&series, &p, &any_day_config());
        assert_eq!(a, b);
        assert_eq!(a.trades.len(), 4);
    }
}

mod optimization {
    use super::*;

    fn winner_or_loser_series() -> NormalizedSeries {
        // tp 0.5 exits at 16:31, tp 1.0 rides into the 16:32 stop.
        make_series(&minute_ticks(ny(2024, 1, 15, 16, 30), &[100.0, 100.6, 99.0]))
    }

    #[test]
    fn strictly_better_point_wins() {
        let cancel = AtomicBool::new(false);
        let result = optimize(
            &winner_or_loser_series(),
            &grid(&[1630], &[1.0, 0.5], &[0.05], &[30]),
            &any_day_config(),
            &OptimizeOptions::default(),
            &cancel,
        );
        assert_eq!(result.points.len(), 2);
        assert_eq!(result.points[0].score(), Some(0.0));
        assert_eq!(result.points[1].score(), Some(1.0));
        assert_eq!(result.best, Some(1));
        assert_abs_diff_eq!(result.best_point().unwrap().point.take_profit, 0.5);
    }

    #[test]
    fn ties_go_to_first_point() {
        let cancel = AtomicBool::new(false);
        let result = optimize(
            &winner_or_loser_series(),
            &grid(&[1630], &[0.5, 0.4], &[0.05], &[30]),
            &any_day_config(),
            &OptimizeOptions::default(),
            &cancel,
        );
        assert_eq!(result.points[0].score(), result.points[1].score());
        assert_eq!(result.best, Some(0));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let cancel = AtomicBool::new(false);
        let g = grid(&[1629, 1630, 1631], &[0.3, 0.5, 1.0], &[0.05, 2.0], &[30, 1632]);
        let series = winner_or_loser_series();
        let seq = optimize(
            &series,
            &g,
            &any_day_config(),
            &OptimizeOptions {
                metric: Metric::TotalReturn,
                parallel: false,
            },
            &cancel,
        );
        let par = optimize(
            &series,
            &g,
            &any_day_config(),
            &OptimizeOptions {
                metric: Metric::TotalReturn,
                parallel: true,
            },
            &cancel,
        );
        assert_eq!(seq, par);
        assert_eq!(seq.total_points, 36);
        assert!(seq.infeasible_count() > 0);
    }

    #[test]
    fn no_trades_anywhere_has_no_best() {
        let cancel = AtomicBool::new(false);
        let result = optimize(
            &winner_or_loser_series(),
            &grid(&[900, 1000], &[0.5], &[0.05], &[30]),
            &any_day_config(),
            &OptimizeOptions::default(),
            &cancel,
        );
        assert!(result.best.is_none());
        assert!(result
            .points
            .iter()
            .all(|p| matches!(p.outcome, GridOutcome::Infeasible { .. })));
    }

    #[test]
    fn per_year_sweep_reports_missing_years() {
        let mut ticks = minute_ticks(ny(2022, 3, 7, 16, 30), &[100.0, 100.6]);
        ticks.extend(minute_ticks(ny(2024, 3, 4, 16, 30), &[100.0, 99.0]));
        let series = make_series(&ticks);
        let cancel = AtomicBool::new(false);

        let by_year = optimize_by_year(
            &series,
            &[2022, 2023, 2024],
            &grid(&[1630], &[0.5], &[0.05], &[30]),
            &any_day_config(),
            &OptimizeOptions::default(),
            &cancel,
        );
        assert_eq!(by_year.len(), 3);
        assert_eq!(by_year[&2023], YearOutcome::NoData);
        match (&by_year[&2022], &by_year[&2024]) {
            (YearOutcome::Optimized(a), YearOutcome::Optimized(b)) => {
                assert_eq!(a.points[0].score(), Some(1.0));
                assert_eq!(b.points[0].score(), Some(0.0));
            }
            other => panic!("expected two optimized years, got {other:?}"),
        }
    }
}
