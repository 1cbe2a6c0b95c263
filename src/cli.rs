//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use chrono::Datelike;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::TextReportAdapter;
use crate::adapters::zip_dir_source::ZipDirSource;
use crate::domain::bar::{BarInterval, DEFAULT_INTERVAL_MINUTES, aggregate};
use crate::domain::config_validation::{
    backtest_params, optimize_grid, read_or, read_parsed, validate_analysis_config,
    validate_backtest_config, validate_config, validate_data_config, validate_optimize_config,
    validate_year_bounds,
};
use crate::domain::engine::{BacktestResult, run_strategy};
use crate::domain::error::{FileError, FxsweepError};
use crate::domain::loader::{
    ArchiveOrder, DEFAULT_EXCLUDED_SUFFIX, LoadOptions, LoadOutcome, available_prefixes, available_years,
    load_series,
};
use crate::domain::optimizer::{
    GridOutcome, Metric, OptimizationResult, OptimizeOptions, ParameterGrid, YearOutcome, optimize,
    optimize_by_year,
};
use crate::domain::series::{NormalizedSeries, ProcessMode, requested_years};
use crate::domain::stats::{GroupKey, parse_grouping, volatility_stats};
use crate::domain::strategy::{EngineConfig, StrategyParams, parse_weekdays};
use crate::obs;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::{ReportLabel, ReportSink};

const DEFAULT_DATA_DIR: &str = "download_file";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_GROUPINGS: &str = "year+hour, month+hour";

#[derive(Parser, Debug)]
#[command(
    name = "fxsweep",
    about = "Intraday FX record analysis, backtests and parameter sweeps"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// INI configuration file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Instrument prefix, overriding [data] prefix
    #[arg(long)]
    pub prefix: Option<String>,
    /// First year to include, overriding [data] start_year
    #[arg(long)]
    pub start_year: Option<i32>,
    /// Last year to include, overriding [data] end_year
    #[arg(long)]
    pub end_year: Option<i32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate bars and write volatility tables
    Analyze(RunArgs),
    /// Run the configured strategy once per period
    Backtest(RunArgs),
    /// Grid-search strategy parameters per period
    Optimize(RunArgs),
    /// List the years present in the archives
    Years(RunArgs),
    /// List the instrument prefixes present in the data directory
    Pairs(RunArgs),
    /// Check a configuration without loading data
    Validate(RunArgs),
}

impl Command {
    pub fn args(&self) -> &RunArgs {
        match self {
            Command::Analyze(a)
            | Command::Backtest(a)
            | Command::Optimize(a)
            | Command::Years(a)
            | Command::Pairs(a)
            | Command::Validate(a) => a,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let args = cli.command.args();
    let adapter = match load_config(&args.config) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let level = adapter
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    let format = adapter
        .get_string("logging", "format")
        .unwrap_or_else(|| "text".to_string());
    if let Err(e) = obs::init_tracing(&level, &format) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let result = match &cli.command {
        Command::Analyze(args) => run_analyze(&adapter, args),
        Command::Backtest(args) => run_backtest(&adapter, args),
        Command::Optimize(args) => run_optimize(&adapter, args),
        Command::Years(args) => run_years(&adapter, args),
        Command::Pairs(_) => run_pairs(&adapter),
        Command::Validate(args) => run_validate(&adapter, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Where and what to load.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub dir: PathBuf,
    pub order: ArchiveOrder,
    pub load: LoadOptions,
}

impl DataSettings {
    pub fn source(&self) -> ZipDirSource {
        ZipDirSource::new(self.dir.clone(), self.order)
    }
}

pub fn build_data_settings(
    config: &dyn ConfigPort,
    args: &RunArgs,
) -> Result<DataSettings, FxsweepError> {
    let prefix = args
        .prefix
        .clone()
        .or_else(|| config.get_string("data", "prefix"))
        .ok_or_else(|| FxsweepError::ConfigMissing {
            section: "data".into(),
            key: "prefix".into(),
        })?;

    let start_year = match args.start_year {
        Some(y) => Some(y),
        None => read_parsed(config, "data", "start_year")?,
    };
    let end_year = match args.end_year {
        Some(y) => Some(y),
        None => read_parsed(config, "data", "end_year")?,
    };
    validate_year_bounds(start_year, end_year)?;

    let order = match config.get_string("data", "archive_order") {
        Some(s) => s.parse()?,
        None => ArchiveOrder::default(),
    };
    let excluded_suffix = match config.get_string("data", "excluded_suffix") {
        Some(s) if s.eq_ignore_ascii_case("none") => String::new(),
        Some(s) => s,
        None => DEFAULT_EXCLUDED_SUFFIX.to_string(),
    };

    let mut load = LoadOptions::new(prefix);
    load.start_year = start_year;
    load.end_year = end_year;
    load.excluded_suffix = excluded_suffix;

    Ok(DataSettings {
        dir: data_dir(config),
        order,
        load,
    })
}

fn data_dir(config: &dyn ConfigPort) -> PathBuf {
    config
        .get_string("data", "dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// A named volatility table, e.g. `year_hour`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub name: String,
    pub keys: Vec<GroupKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub interval: BarInterval,
    pub groupings: Vec<Grouping>,
}

pub fn build_analysis_settings(config: &dyn ConfigPort) -> Result<AnalysisSettings, FxsweepError> {
    let minutes = read_or(config, "analysis", "interval_minutes", DEFAULT_INTERVAL_MINUTES)?;
    let spec = config
        .get_string("analysis", "groupings")
        .unwrap_or_else(|| DEFAULT_GROUPINGS.to_string());

    let mut groupings = Vec::new();
    for part in spec.split(',').filter(|g| !g.trim().is_empty()) {
        let keys = parse_grouping(part)?;
        let name = keys.iter().map(GroupKey::name).collect::<Vec<_>>().join("_");
        groupings.push(Grouping { name, keys });
    }
    if groupings.is_empty() {
        return Err(FxsweepError::invalid("analysis", "groupings", "no groupings configured"));
    }

    Ok(AnalysisSettings {
        interval: BarInterval::minutes(minutes)?,
        groupings,
    })
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, FxsweepError> {
    let defaults = EngineConfig::default();
    let excluded_weekdays = match config.get_string("backtest", "excluded_weekdays") {
        Some(days) => parse_weekdays(&days)?,
        None => defaults.excluded_weekdays.clone(),
    };
    Ok(EngineConfig {
        size: read_or(config, "backtest", "size", defaults.size)?,
        commission_rate: read_or(config, "backtest", "commission", defaults.commission_rate)?,
        initial_cash: read_or(config, "backtest", "initial_cash", defaults.initial_cash)?,
        close_tolerance_minutes: read_or(
            config,
            "backtest",
            "close_tolerance_minutes",
            defaults.close_tolerance_minutes,
        )?,
        excluded_weekdays,
    })
}

pub fn build_process_mode(config: &dyn ConfigPort) -> Result<ProcessMode, FxsweepError> {
    match config.get_string("backtest", "process_mode") {
        Some(s) => s.parse(),
        None => Ok(ProcessMode::default()),
    }
}

pub fn build_optimize_settings(
    config: &dyn ConfigPort,
    fallback: StrategyParams,
) -> Result<(ParameterGrid, OptimizeOptions), FxsweepError> {
    let grid = optimize_grid(config, fallback)?;
    let metric = match config.get_string("optimize", "maximize") {
        Some(s) => s.parse()?,
        None => Metric::default(),
    };
    let options = OptimizeOptions {
        metric,
        parallel: config.get_bool("optimize", "parallel", true),
    };
    Ok((grid, options))
}

fn output_sink(config: &dyn ConfigPort) -> TextReportAdapter {
    let dir = config
        .get_string("output", "dir")
        .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
    TextReportAdapter::new(PathBuf::from(dir))
}

fn load(data: &DataSettings) -> Result<LoadOutcome, FxsweepError> {
    eprintln!(
        "Loading {} archives from {}",
        data.load.prefix,
        data.dir.display()
    );
    let outcome = load_series(&data.source(), &data.load)?;
    report_file_errors(&outcome.errors);
    eprintln!(
        "  Loaded: {} records from {} files in {} archives",
        outcome.series.len(),
        outcome.files_read,
        outcome.archives_read
    );
    Ok(outcome)
}

/// Print the aggregated end-of-run report of skipped files.
fn report_file_errors(errors: &[FileError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!("\n=== Skipped Files ({}) ===", errors.len());
    for err in errors {
        eprintln!("  {err}");
    }
    eprintln!();
}

/// `START-END` for whole-range runs, from the bounds or else the data.
fn whole_period_label(data: &DataSettings, series: &NormalizedSeries) -> String {
    let first = data
        .load
        .start_year
        .or_else(|| series.first_timestamp().map(|t| t.year()));
    let last = data
        .load
        .end_year
        .or_else(|| series.last_timestamp().map(|t| t.year()));
    match (first, last) {
        (Some(s), Some(e)) => format!("{s}-{e}"),
        _ => data.load.period_label(),
    }
}

fn require_records(data: &DataSettings, series: &NormalizedSeries) -> Result<(), FxsweepError> {
    if series.is_empty() {
        return Err(FxsweepError::EmptyDataset {
            prefix: data.load.prefix.clone(),
            period: data.load.period_label(),
        });
    }
    Ok(())
}

fn run_analyze(config: &dyn ConfigPort, args: &RunArgs) -> Result<(), FxsweepError> {
    validate_data_config(config)?;
    validate_analysis_config(config)?;
    let data = build_data_settings(config, args)?;
    let analysis = build_analysis_settings(config)?;

    let outcome = load(&data)?;
    require_records(&data, &outcome.series)?;

    let bars = aggregate(&outcome.series, analysis.interval)?;
    eprintln!(
        "  Aggregated: {} bars of {} minutes",
        bars.len(),
        analysis.interval.as_minutes()
    );

    let sink = output_sink(config);
    let label = ReportLabel::new(&data.load.prefix, whole_period_label(&data, &outcome.series));
    eprintln!("\n=== Volatility Tables ===");
    for grouping in &analysis.groupings {
        let stats = volatility_stats(&bars, &grouping.keys);
        sink.write_stats(&label, &grouping.name, &grouping.keys, &stats)?;
        eprintln!("  {}: {} groups", grouping.name, stats.len());
    }
    eprintln!("\nTables written to: {}", sink.dir().display());
    Ok(())
}

fn print_backtest_summary(label: &ReportLabel, result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== {label} ===");
    eprintln!("{}", result.params);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Total Return:     {:.4}%", m.total_return * 100.0);
    eprintln!("Max Drawdown:     -{:.4}%", m.max_drawdown * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
}

fn run_backtest(config: &dyn ConfigPort, args: &RunArgs) -> Result<(), FxsweepError> {
    validate_data_config(config)?;
    validate_backtest_config(config)?;
    let data = build_data_settings(config, args)?;
    let params = backtest_params(config)?;
    let engine = build_engine_config(config)?;
    let mode = build_process_mode(config)?;

    let outcome = load(&data)?;
    require_records(&data, &outcome.series)?;
    let sink = output_sink(config);

    match mode {
        ProcessMode::All => {
            let label = ReportLabel::new(&data.load.prefix, whole_period_label(&data, &outcome.series));
            let result = run_strategy(&outcome.series, &params, &engine);
            sink.write_backtest(&label, &result)?;
            print_backtest_summary(&label, &result);
        }
        ProcessMode::Yearly => {
            let partitions = outcome.series.partition_by_year();
            for year in requested_years(&outcome.series, data.load.start_year, data.load.end_year) {
                let label = ReportLabel::new(&data.load.prefix, year.to_string());
                let Some(partition) = partitions.get(&year) else {
                    eprintln!("\n=== {label} ===\nNo data");
                    continue;
                };
                let result = run_strategy(partition, &params, &engine);
                sink.write_backtest(&label, &result)?;
                print_backtest_summary(&label, &result);
            }
        }
    }
    eprintln!("\nResults written to: {}", sink.dir().display());
    Ok(())
}

fn print_optimization_summary(label: &ReportLabel, result: &OptimizationResult) {
    eprintln!("\n=== {label} ===");
    eprintln!(
        "Evaluated {} of {} grid points ({} infeasible)",
        result.points.len(),
        result.total_points,
        result.infeasible_count()
    );
    match result.best_point() {
        Some(best) => {
            eprintln!("Best: {}", best.point);
            if let GridOutcome::Evaluated { result: run, score } = &best.outcome {
                eprintln!(
                    "  {}: {:.4}, trades: {}, return: {:.4}%",
                    result.metric.name(),
                    score,
                    run.metrics.total_trades,
                    run.metrics.total_return * 100.0
                );
            }
        }
        None => eprintln!("Best: none (no feasible grid point)"),
    }
}

fn run_optimize(config: &dyn ConfigPort, args: &RunArgs) -> Result<(), FxsweepError> {
    validate_data_config(config)?;
    validate_backtest_config(config)?;
    validate_optimize_config(config)?;
    let data = build_data_settings(config, args)?;
    let engine = build_engine_config(config)?;
    let mode = build_process_mode(config)?;
    let (grid, options) = build_optimize_settings(config, backtest_params(config)?)?;
    eprintln!(
        "Grid: {} points, maximizing {}",
        grid.len(),
        options.metric.name()
    );

    let outcome = load(&data)?;
    require_records(&data, &outcome.series)?;
    let sink = output_sink(config);
    let cancel = AtomicBool::new(false);

    let mut results: Vec<(ReportLabel, OptimizationResult)> = Vec::new();
    match mode {
        ProcessMode::All => {
            let label = ReportLabel::new(&data.load.prefix, whole_period_label(&data, &outcome.series));
            let result = optimize(&outcome.series, &grid, &engine, &options, &cancel);
            results.push((label, result));
        }
        ProcessMode::Yearly => {
            let years = requested_years(&outcome.series, data.load.start_year, data.load.end_year);
            let by_year = optimize_by_year(&outcome.series, &years, &grid, &engine, &options, &cancel);
            for (year, year_outcome) in by_year {
                let label = ReportLabel::new(&data.load.prefix, year.to_string());
                match year_outcome {
                    YearOutcome::NoData => {
                        eprintln!("\n=== {label} ===\nNo data");
                    }
                    YearOutcome::Optimized(result) => results.push((label, result)),
                }
            }
        }
    }

    for (label, result) in &results {
        sink.write_optimization(label, result)?;
        print_optimization_summary(label, result);
    }
    eprintln!("\nResults written to: {}", sink.dir().display());

    if results.iter().all(|(_, r)| r.best.is_none()) {
        return Err(FxsweepError::OptimizationInfeasible {
            reason: "no grid point produced a trade in any period".to_string(),
        });
    }
    Ok(())
}

fn run_years(config: &dyn ConfigPort, args: &RunArgs) -> Result<(), FxsweepError> {
    validate_data_config(config)?;
    let data = build_data_settings(config, args)?;
    let years = available_years(&data.source(), &data.load.prefix, &data.load.excluded_suffix)?;
    if years.is_empty() {
        return Err(FxsweepError::EmptyDataset {
            prefix: data.load.prefix.clone(),
            period: "any year".to_string(),
        });
    }
    eprintln!("Available years for {}:", data.load.prefix);
    for year in years {
        println!("{year}");
    }
    Ok(())
}

fn run_pairs(config: &dyn ConfigPort) -> Result<(), FxsweepError> {
    let dir = data_dir(config);
    let source = ZipDirSource::new(dir.clone(), ArchiveOrder::Name);
    let prefixes = available_prefixes(&source)?;
    if prefixes.is_empty() {
        return Err(FxsweepError::EmptyDataset {
            prefix: dir.display().to_string(),
            period: "any instrument".to_string(),
        });
    }
    eprintln!("Available instruments in {}:", dir.display());
    for prefix in prefixes {
        println!("{prefix}");
    }
    Ok(())
}

fn run_validate(config: &dyn ConfigPort, args: &RunArgs) -> Result<(), FxsweepError> {
    eprintln!("Validating {}", args.config.display());
    validate_config(config)?;
    let data = build_data_settings(config, args)?;
    let analysis = build_analysis_settings(config)?;
    let params = backtest_params(config)?;
    build_engine_config(config)?;
    let mode = build_process_mode(config)?;
    let (grid, options) = build_optimize_settings(config, params)?;

    eprintln!("  Instrument:   {} ({})", data.load.prefix, data.load.period_label());
    eprintln!("  Archives:     {}", data.dir.display());
    eprintln!(
        "  Bars:         {} minutes, {} tables",
        analysis.interval.as_minutes(),
        analysis.groupings.len()
    );
    eprintln!("  Backtest:     {params}");
    eprintln!("  Process mode: {mode:?}");
    eprintln!(
        "  Grid:         {} points, maximizing {}",
        grid.len(),
        options.metric.name()
    );
    println!("Configuration OK");
    Ok(())
}
