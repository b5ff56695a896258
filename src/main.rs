use anyhow::{Context, Result};
use candlebench::data::load_csv_records;
use candlebench::prelude::*;
use clap::{Args, Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "candlebench")]
#[command(about = "Bar-by-bar backtesting and parameter optimization for crypto strategies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

//options shared by every subcommand
#[derive(Args)]
struct Common {
    //path to csv data file
    #[arg(long)]
    data: PathBuf,

    //backtest configuration (json); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    //symbol to trade (eg BTCUSDT)
    #[arg(long)]
    symbol: Option<String>,

    //strategy name (sma_crossover, rsi_reversion)
    #[arg(long)]
    strategy: Option<String>,

    //strategy parameter override, repeatable (eg --param fast_period=12)
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,

    //initial account capital
    #[arg(long)]
    initial_capital: Option<f64>,

    //use every bar in the file instead of the configured date range
    #[arg(long)]
    full_range: bool,
}

#[derive(Subcommand)]
enum Commands {
    //run a backtest
    Run {
        #[command(flatten)]
        common: Common,

        //output path for the full result (json)
        #[arg(long)]
        output_json: Option<PathBuf>,

        //output path for equity curve csv
        #[arg(long)]
        output_equity_csv: Option<PathBuf>,

        //output path for trades csv
        #[arg(long)]
        output_trades_csv: Option<PathBuf>,
    },

    //search strategy parameters
    Optimize {
        #[command(flatten)]
        common: Common,

        //optimization configuration (json)
        #[arg(long)]
        optimization: PathBuf,

        //number of ranked runs to print
        #[arg(long, default_value = "10")]
        top: usize,

        //output path for the optimization result (json)
        #[arg(long)]
        output_json: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            output_json,
            output_equity_csv,
            output_trades_csv,
        } => run(
            common,
            output_json.as_deref(),
            output_equity_csv.as_deref(),
            output_trades_csv.as_deref(),
        ),
        Commands::Optimize {
            common,
            optimization,
            top,
            output_json,
        } => optimize(common, &optimization, top, output_json.as_deref()),
    }
}

//merges the config file with command line overrides
fn load_config(common: &Common) -> Result<BacktestConfig> {
    let mut config = match &common.config {
        Some(path) => BacktestConfig::from_json_file(path)
            .context(format!("Failed to load config from {:?}", path))?,
        None => BacktestConfig::default(),
    };

    if let Some(symbol) = &common.symbol {
        config.symbol = symbol.clone();
    }
    if let Some(strategy) = &common.strategy {
        config.strategy.name = strategy.clone();
    }
    if let Some(capital) = common.initial_capital {
        config.initial_capital = capital;
    }
    for (name, value) in &common.params {
        config.strategy.parameters.insert(name.clone(), *value);
    }

    config.validate().context("Invalid backtest configuration")?;
    Ok(config)
}

fn load_bars(common: &Common, config: &BacktestConfig) -> Result<Vec<Bar>> {
    info!("Loading data from {:?}", common.data);
    let records = load_csv_records(&common.data)
        .context(format!("Failed to load data from {:?}", common.data))?;

    let mut bars = filter_by_symbol(&records, &config.symbol);
    if !common.full_range {
        bars = filter_by_range(&bars, config.start_date, config.end_date);
    }

    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        anyhow::bail!(
            "No data found for {} between {} and {} (use --full-range to ignore the dates)",
            config.symbol,
            config.start_date,
            config.end_date
        );
    };

    info!(
        "Loaded {} bars for {} ({} to {})",
        bars.len(),
        config.symbol,
        first.timestamp,
        last.timestamp
    );
    Ok(bars)
}

fn run(
    common: Common,
    output_json: Option<&Path>,
    output_equity_csv: Option<&Path>,
    output_trades_csv: Option<&Path>,
) -> Result<()> {
    let config = load_config(&common)?;
    let bars = load_bars(&common, &config)?;

    let mut strategy = BuiltinStrategies
        .create(&config.strategy)
        .context(format!("Failed to build strategy {}", config.strategy.name))?;

    let mut engine = BacktestEngine::new(config)?;
    let result = engine.run(&bars, strategy.as_mut());

    println!("\n{} on {} {}", result.strategy_name, result.symbol, result.timeframe);
    if let Some(error) = &result.error {
        println!("Backtest failed: {}", error);
    }
    if result.halted_by_kill_switch {
        println!("Halted by the max drawdown kill switch");
    }
    result.metrics.pretty_print_table();
    result.statistics.pretty_print_table();
    println!(
        "{} bars in {:.1}ms ({:.0} bars/s), {} warnings",
        result.bars_processed,
        result.execution_time_ms,
        result.bars_per_second,
        result.warnings.len()
    );

    if let Some(path) = output_json {
        write_json(&result, path)?;
        println!("Result saved to {:?}", path);
    }

    if let Some(path) = output_equity_csv {
        write_csv(&result.equity_curve, path)?;
        println!("Equity curve saved to {:?}", path);
    }

    if let Some(path) = output_trades_csv {
        write_csv(&result.trades, path)?;
        println!("Trades saved to {:?}", path);
    }

    Ok(())
}

fn optimize(common: Common, optimization: &Path, top: usize, output_json: Option<&Path>) -> Result<()> {
    let config = load_config(&common)?;
    let bars = load_bars(&common, &config)?;
    let opt_config = OptimizationConfig::from_json_file(optimization)
        .context(format!("Failed to load optimization config from {:?}", optimization))?;

    let engine = OptimizationEngine::new();
    let mut last_logged = 0.0;
    let mut log_progress = |percent: f64| {
        if percent - last_logged >= 10.0 || percent >= 100.0 {
            info!("Progress: {:.0}%", percent);
            last_logged = percent;
        }
    };
    let progress: &mut dyn FnMut(f64) = &mut log_progress;

    let result = engine.optimize(&bars, &config, &opt_config, &BuiltinStrategies, Some(progress))?;

    println!(
        "\n{} search, {} {}: best {:.4} with {:?}",
        result.method,
        if result.maximize { "maximizing" } else { "minimizing" },
        result.objective,
        result.best_objective,
        result.best_parameters
    );
    print_runs(&result, top);
    println!(
        "{}/{} valid runs in {:.1}ms",
        result.valid_runs, result.total_runs, result.execution_time_ms
    );

    if let Some(path) = output_json {
        write_json(&result, path)?;
        println!("Result saved to {:?}", path);
    }

    Ok(())
}

fn print_runs(result: &OptimizationResult, top: usize) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Rank"),
        Cell::new("Parameters"),
        Cell::new(result.objective.as_str()),
        Cell::new("Return"),
        Cell::new("Sharpe"),
        Cell::new("Max DD"),
        Cell::new("Trades"),
    ]));

    for (rank, run) in result.top(top).iter().enumerate() {
        let parameters = run
            .parameters
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(Row::new(vec![
            Cell::new(&(rank + 1).to_string()),
            Cell::new(&parameters),
            Cell::new(&format!("{:.4}", run.objective)),
            Cell::new(&format!("{:.2}%", run.metrics.total_return_percent)),
            Cell::new(&format!("{:.3}", run.metrics.sharpe_ratio)),
            Cell::new(&format!("{:.2}%", run.metrics.max_drawdown_percent)),
            Cell::new(&run.metrics.total_trades.to_string()),
        ]));
    }

    table.printstd();
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).context(format!("Failed to write {:?}", path))?;
    Ok(())
}

fn write_csv<T: serde::Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).context(format!("Failed to create {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
