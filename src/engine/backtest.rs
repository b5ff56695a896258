use crate::config::BacktestConfig;
use crate::data::{validate_series, Bar};
use crate::engine::execution::ExecutionModel;
use crate::error::ConfigError;
use crate::metrics::performance::safe_div;
use crate::metrics::{
    calculate_metrics, calculate_trade_statistics, drawdown_periods, DrawdownPeriod,
    EquityPoint, EquityTracker, PerformanceMetrics, TradeStatistics,
};
use crate::portfolio::{Account, ExitReason, Trade};
use crate::strategy::{RunJournal, Strategy, StrategyContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BacktestStatus {
    Completed,
    Failed,
}

//lifecycle of the engine across a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Running,
    Finalizing,
    Closed,
}

//result of a backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub symbol: String,
    pub timeframe: String,
    pub config: BacktestConfig,

    pub status: BacktestStatus,
    pub error: Option<String>,

    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_periods: Vec<DrawdownPeriod>,
    pub metrics: PerformanceMetrics,
    pub statistics: TradeStatistics,

    //strategy log lines and soft order rejections
    pub logs: Vec<String>,
    pub warnings: Vec<String>,

    pub bars_processed: usize,
    pub halted_by_kill_switch: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub final_capital: f64,
    pub total_fees: f64,

    pub execution_time_ms: f64,
    pub bars_per_second: f64,
}

impl BacktestResult {
    pub fn is_completed(&self) -> bool {
        self.status == BacktestStatus::Completed
    }
}

//mutable state of one run
struct Session<'a> {
    config: &'a BacktestConfig,
    bars: &'a [Bar],
    account: Account,
    journal: RunJournal,
    equity: EquityTracker,
    last_index: Option<usize>,
    halted: bool,
}

impl<'a> Session<'a> {
    fn new(config: &'a BacktestConfig, bars: &'a [Bar]) -> Self {
        Session {
            config,
            bars,
            account: Account::new(
                config.initial_capital,
                ExecutionModel::new(config.commission_rate, config.slippage_rate),
            ),
            journal: RunJournal::default(),
            equity: EquityTracker::with_capacity(
                config.initial_capital,
                bars.len().saturating_sub(config.warmup_bars),
            ),
            last_index: None,
            halted: false,
        }
    }

    fn context(&mut self, index: usize) -> StrategyContext<'_> {
        StrategyContext::new(
            self.bars,
            index,
            self.config,
            &mut self.account,
            &mut self.journal,
        )
    }

    //intrabar stop-loss and take-profit
    fn check_exits(&mut self, bar: &Bar) {
        let triggered = self
            .account
            .position
            .as_ref()
            .and_then(|position| position.triggered_exit(bar));

        if let Some((reason, price)) = triggered {
            self.account.close(price, bar.timestamp, reason);
        }
    }

    fn run(&mut self, strategy: &mut dyn Strategy) -> anyhow::Result<()> {
        strategy.initialize(self.config)?;

        let bars = self.bars;
        for (index, bar) in bars.iter().enumerate().skip(self.config.warmup_bars) {
            self.check_exits(bar);

            strategy.on_bar(&mut self.context(index), bar)?;
            self.last_index = Some(index);

            let equity = self.account.equity(bar.close);
            self.equity.record(bar.timestamp, equity);

            if let Some(limit) = self.config.max_drawdown {
                let drawdown = self.equity.current_drawdown();
                if drawdown >= limit {
                    warn!(
                        "Kill switch at bar {}: drawdown {:.2}% >= {:.2}%",
                        index,
                        drawdown * 100.0,
                        limit * 100.0
                    );
                    self.halted = true;
                    break;
                }
            }
        }

        Ok(())
    }

    //finalize callback, then settle whatever is still open
    fn finish(&mut self, strategy: &mut dyn Strategy) -> anyhow::Result<()> {
        let Some(index) = self.last_index else {
            return Ok(());
        };

        strategy.finalize(&mut self.context(index))?;

        let bar = &self.bars[index];
        if self
            .account
            .close(bar.close, bar.timestamp, ExitReason::Eod)
            .is_some()
        {
            self.equity.restate_last(self.account.cash);
        }

        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//runs a strategy callback, turning errors and panics into a message
fn guarded<F>(step: F) -> Result<(), String>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(payload) => Err(format!("strategy panicked: {}", panic_message(payload))),
    }
}

//main backtest engine
pub struct BacktestEngine {
    config: BacktestConfig,
    state: RunState,
}

impl BacktestEngine {
    //validates the configuration up front
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(BacktestEngine {
            config,
            state: RunState::Idle,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    //runs the backtest with the given strategy
    //never fails: strategy errors come back as a failed result
    pub fn run(&mut self, bars: &[Bar], strategy: &mut dyn Strategy) -> BacktestResult {
        let started = Instant::now();
        let strategy_name = strategy.name().to_string();

        info!(
            "Starting backtest: {} on {} {} ({} bars)",
            strategy_name,
            self.config.symbol,
            self.config.timeframe,
            bars.len()
        );

        self.state = RunState::Initializing;
        let mut session = Session::new(&self.config, bars);

        let mut outcome = validate_series(bars).map_err(|err| format!("invalid bar series: {}", err));
        if outcome.is_ok() {
            self.state = RunState::Running;
            outcome = guarded(|| session.run(strategy));
        }
        if outcome.is_ok() {
            self.state = RunState::Finalizing;
            outcome = guarded(|| session.finish(strategy));
        }
        self.state = RunState::Closed;

        let (status, error) = match outcome {
            Ok(()) => (BacktestStatus::Completed, None),
            Err(message) => {
                warn!("Backtest {} failed: {}", strategy_name, message);
                (BacktestStatus::Failed, Some(message))
            }
        };

        let halted = session.halted;
        let Session {
            account,
            journal,
            equity,
            ..
        } = session;
        let trades = account.trades;
        let equity_curve = equity.into_points();

        let metrics = calculate_metrics(
            &trades,
            &equity_curve,
            self.config.initial_capital,
            &self.config,
        );
        let statistics = calculate_trade_statistics(&trades);
        let periods = drawdown_periods(&equity_curve, self.config.initial_capital);

        let elapsed = started.elapsed().as_secs_f64();
        let bars_processed = equity_curve.len();

        let result = BacktestResult {
            strategy_name,
            symbol: self.config.symbol.clone(),
            timeframe: self.config.timeframe.clone(),
            config: self.config.clone(),
            status,
            error,
            start_time: equity_curve.first().map(|p| p.timestamp),
            end_time: equity_curve.last().map(|p| p.timestamp),
            final_capital: metrics.final_equity,
            total_fees: metrics.total_fees,
            trades,
            equity_curve,
            drawdown_periods: periods,
            metrics,
            statistics,
            logs: journal.logs,
            warnings: journal.warnings,
            bars_processed,
            halted_by_kill_switch: halted,
            execution_time_ms: elapsed * 1000.0,
            bars_per_second: safe_div(bars_processed as f64, elapsed),
        };

        info!(
            "Backtest complete: {} trades, return {:.2}%, {} bars in {:.1}ms",
            result.trades.len(),
            result.metrics.total_return_percent,
            result.bars_processed,
            result.execution_time_ms
        );
        debug!(
            "Sharpe {:.3}, max drawdown {:.2}%",
            result.metrics.sharpe_ratio, result.metrics.max_drawdown_percent
        );

        result
    }
}

//one-shot convenience wrapper around BacktestEngine
pub fn run_backtest(
    bars: &[Bar],
    config: BacktestConfig,
    strategy: &mut dyn Strategy,
) -> Result<BacktestResult, ConfigError> {
    let mut engine = BacktestEngine::new(config)?;
    Ok(engine.run(bars, strategy))
}
