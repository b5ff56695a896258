use approx::assert_relative_eq;
use candlebench::prelude::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;

fn t(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn bar(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new(t(hour), open, high, low, close, 10.0).unwrap()
}

fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
    (0..n)
        .map(|i| bar(i as i64, price, price + 1.0, price - 1.0, price))
        .collect()
}

fn closes(prices: &[f64]) -> Vec<Bar> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| bar(i as i64, p, p + 0.5, p - 0.5, p))
        .collect()
}

fn frictionless() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 10_000.0,
        commission_rate: 0.0,
        slippage_rate: 0.0,
        position_sizing: PositionSizing::fixed(1.0),
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
enum Action {
    Buy {
        quantity: Option<f64>,
        stop: Option<f64>,
        target: Option<f64>,
    },
    Sell {
        quantity: Option<f64>,
        stop: Option<f64>,
        target: Option<f64>,
    },
    Close,
    Fail,
    Panic,
}

//replays a fixed action per bar index
#[derive(Default)]
struct Scripted {
    actions: HashMap<usize, Action>,
}

impl Scripted {
    fn at(mut self, index: usize, action: Action) -> Self {
        self.actions.insert(index, action);
        self
    }
}

impl Strategy for Scripted {
    fn on_bar(&mut self, ctx: &mut StrategyContext, _bar: &Bar) -> anyhow::Result<()> {
        ctx.log(format!("history {}", ctx.history().len()));
        match self.actions.get(&ctx.index()).cloned() {
            Some(Action::Buy {
                quantity,
                stop,
                target,
            }) => {
                ctx.buy(quantity, stop, target);
            }
            Some(Action::Sell {
                quantity,
                stop,
                target,
            }) => {
                ctx.sell(quantity, stop, target);
            }
            Some(Action::Close) => {
                ctx.close_position(None);
            }
            Some(Action::Fail) => anyhow::bail!("indicator blew up"),
            Some(Action::Panic) => panic!("division by zero in signal"),
            None => {}
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut StrategyContext) -> anyhow::Result<()> {
        ctx.log(format!("finalize {}", ctx.index()));
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn buy(quantity: f64, stop: Option<f64>, target: Option<f64>) -> Action {
    Action::Buy {
        quantity: Some(quantity),
        stop,
        target,
    }
}

fn sell(quantity: f64, stop: Option<f64>, target: Option<f64>) -> Action {
    Action::Sell {
        quantity: Some(quantity),
        stop,
        target,
    }
}

#[test]
fn idle_strategy_keeps_equity_flat() {
    let config = BacktestConfig {
        warmup_bars: 3,
        ..frictionless()
    };
    let result = run_backtest(&flat_bars(10, 100.0), config, &mut Scripted::default()).unwrap();

    assert!(result.is_completed());
    assert_eq!(result.equity_curve.len(), 7);
    assert_eq!(result.bars_processed, 7);
    assert!(result
        .equity_curve
        .iter()
        .all(|p| p.equity == 10_000.0 && p.drawdown == 0.0));
    assert!(result.trades.is_empty());
    assert_eq!(result.metrics.total_return, 0.0);
    assert_eq!(result.metrics.sharpe_ratio, 0.0);
    assert_eq!(result.metrics.profit_factor, 0.0);
    assert_eq!(result.final_capital, 10_000.0);
}

#[test]
fn warmup_bars_stay_visible_in_history() {
    let config = BacktestConfig {
        warmup_bars: 5,
        ..frictionless()
    };
    let result = run_backtest(&flat_bars(8, 100.0), config, &mut Scripted::default()).unwrap();

    assert_eq!(result.logs[0], "history 6");
    assert_eq!(result.logs.last().map(String::as_str), Some("finalize 7"));
    assert_eq!(result.start_time, Some(t(5)));
    assert_eq!(result.end_time, Some(t(7)));
}

#[test]
fn warmup_covering_every_bar_skips_finalize() {
    let config = BacktestConfig {
        warmup_bars: 10,
        ..frictionless()
    };
    let result = run_backtest(&flat_bars(4, 100.0), config, &mut Scripted::default()).unwrap();

    assert!(result.is_completed());
    assert!(result.equity_curve.is_empty());
    assert!(result.logs.is_empty());
}

#[test]
fn long_stop_loss_is_hit_intrabar() {
    let bars = vec![
        bar(0, 100.0, 105.0, 95.0, 102.0),
        bar(1, 105.0, 110.0, 100.0, 104.0),
        bar(2, 98.0, 99.0, 90.0, 92.0),
    ];
    let mut strategy = Scripted::default().at(0, buy(1.0, Some(97.0), Some(115.0)));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.direction, Direction::Long);
    assert_relative_eq!(trade.entry_price, 102.0, epsilon = 1e-9);
    assert_relative_eq!(trade.exit_price, 97.0, epsilon = 1e-9);
    assert_relative_eq!(trade.pnl, -5.0, epsilon = 1e-9);
    assert_eq!(trade.exit_time, t(2));

    assert_eq!(result.equity_curve.len(), 3);
    assert_relative_eq!(result.equity_curve[1].equity, 10_002.0, epsilon = 1e-9);
    assert_relative_eq!(result.equity_curve[2].equity, 9_995.0, epsilon = 1e-9);
    assert_eq!(result.statistics.exit_reasons.stop_loss, 1);
}

#[test]
fn short_take_profit_uses_the_low() {
    let bars = vec![
        bar(0, 100.0, 101.0, 99.0, 100.0),
        bar(1, 100.0, 100.5, 94.0, 96.0),
        bar(2, 96.0, 97.0, 95.0, 96.0),
    ];
    let mut strategy = Scripted::default().at(0, sell(2.0, Some(104.0), Some(95.0)));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Short);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_relative_eq!(trade.exit_price, 95.0, epsilon = 1e-9);
    assert_relative_eq!(trade.pnl, 10.0, epsilon = 1e-9);
    assert_eq!(trade.exit_time, t(1));
}

#[test]
fn stop_wins_when_both_levels_are_touched() {
    let bars = vec![
        bar(0, 100.0, 101.0, 99.0, 100.0),
        bar(1, 100.0, 120.0, 80.0, 100.0),
    ];
    let mut strategy = Scripted::default().at(0, buy(1.0, Some(90.0), Some(110.0)));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    assert_relative_eq!(result.trades[0].exit_price, 90.0, epsilon = 1e-9);
}

#[test]
fn fees_are_charged_on_both_legs() {
    let bars = vec![
        bar(0, 100.0, 101.0, 99.0, 100.0),
        bar(1, 100.0, 100.0, 96.0, 98.0),
    ];
    let config = BacktestConfig {
        commission_rate: 0.001,
        slippage_rate: 0.0005,
        ..frictionless()
    };
    let mut strategy = Scripted::default().at(0, buy(1.0, Some(97.0), None));
    let result = run_backtest(&bars, config, &mut strategy).unwrap();

    let trade = &result.trades[0];
    let entry = 100.0 * 1.0005;
    let exit = 97.0 * 0.9995;
    let commission = entry * 0.001 + exit * 0.001;
    assert_relative_eq!(trade.entry_price, entry, epsilon = 1e-9);
    assert_relative_eq!(trade.exit_price, exit, epsilon = 1e-9);
    assert_relative_eq!(trade.commission, commission, epsilon = 1e-9);
    assert_relative_eq!(trade.pnl, exit - entry - commission, epsilon = 1e-9);
    assert_relative_eq!(result.final_capital, 10_000.0 + trade.pnl, epsilon = 1e-9);
    assert_relative_eq!(
        result.total_fees,
        commission + (entry - 100.0) + (97.0 - exit),
        epsilon = 1e-9
    );
}

#[test]
fn open_position_is_closed_at_end_of_data() {
    let bars = closes(&[100.0, 101.0, 103.0, 106.0]);
    let mut strategy = Scripted::default().at(1, buy(10.0, None, None));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Eod);
    assert_eq!(trade.exit_time, t(3));
    assert_relative_eq!(trade.pnl, 50.0, epsilon = 1e-9);

    //last point restated to realized cash
    let last = result.equity_curve.last().unwrap();
    assert_relative_eq!(last.equity, 10_050.0, epsilon = 1e-9);
    assert_relative_eq!(result.final_capital, 10_050.0, epsilon = 1e-9);
    assert_eq!(result.statistics.exit_reasons.stop_loss, 0);
    assert_eq!(result.statistics.exit_reasons.signal, 0);
}

#[test]
fn signal_close_uses_the_bar_close() {
    let bars = closes(&[100.0, 104.0, 108.0]);
    let mut strategy = Scripted::default()
        .at(0, buy(1.0, None, None))
        .at(1, Action::Close);
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.trades[0].exit_reason, ExitReason::Signal);
    assert_relative_eq!(result.trades[0].exit_price, 104.0, epsilon = 1e-9);
    assert_relative_eq!(result.equity_curve[2].equity, 10_004.0, epsilon = 1e-9);
}

#[test]
fn opening_on_the_last_bar_round_trips_within_that_bar() {
    let bars = closes(&[100.0, 101.0]);
    let mut strategy = Scripted::default().at(1, buy(2.0, None, None));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Eod);
    assert_eq!(trade.entry_time, t(1));
    assert_eq!(trade.exit_time, t(1));
    assert_eq!(trade.duration_secs, 0);
    assert_relative_eq!(trade.pnl, 0.0, epsilon = 1e-9);
    assert_relative_eq!(result.final_capital, 10_000.0, epsilon = 1e-9);
}

#[test]
fn trades_spanning_bars_exit_strictly_after_entry() {
    let bars = vec![
        bar(0, 100.0, 100.5, 99.5, 100.0),
        bar(1, 100.0, 101.5, 100.0, 101.0),
        bar(2, 101.0, 102.5, 101.0, 102.0),
        bar(3, 102.0, 103.5, 102.0, 103.0),
        bar(4, 101.0, 101.5, 99.0, 100.5),
        bar(5, 100.5, 101.0, 100.0, 100.5),
        bar(6, 100.5, 102.0, 100.5, 101.5),
    ];
    let mut strategy = Scripted::default()
        .at(0, buy(1.0, None, None))
        .at(2, Action::Close)
        .at(3, sell(1.0, None, Some(100.0)))
        .at(5, buy(1.0, None, None));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    let reasons: Vec<ExitReason> = result.trades.iter().map(|trade| trade.exit_reason).collect();
    assert_eq!(
        reasons,
        vec![ExitReason::Signal, ExitReason::TakeProfit, ExitReason::Eod]
    );
    assert!(result
        .trades
        .iter()
        .all(|trade| trade.exit_time > trade.entry_time && trade.duration_secs > 0));
}

#[test]
fn stop_gapped_through_fills_at_the_open() {
    let bars = vec![
        bar(0, 100.0, 105.0, 95.0, 102.0),
        bar(1, 80.0, 85.0, 78.0, 82.0),
    ];
    let mut strategy = Scripted::default().at(0, buy(1.0, Some(97.0), None));
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_relative_eq!(trade.exit_price, 80.0, epsilon = 1e-9);
    assert_relative_eq!(trade.pnl, -22.0, epsilon = 1e-9);
}

#[test]
fn soft_rejections_become_warnings() {
    let bars = closes(&[100.0, 100.0, 100.0]);
    //the commission pushes the capped quantity past available cash
    let config = BacktestConfig {
        allow_short: false,
        commission_rate: 0.001,
        ..frictionless()
    };
    let mut strategy = Scripted::default()
        .at(0, sell(1.0, None, None))
        .at(1, buy(1_000.0, None, None))
        .at(2, buy(1.0, None, None));
    let result = run_backtest(&bars, config, &mut strategy).unwrap();

    assert!(result.is_completed());
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings[0].contains("short selling is disabled"));
    assert!(result.warnings[1].contains("insufficient cash"));
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Eod);
}

#[test]
fn percent_sizing_is_capped_by_max_position_size() {
    let bars = closes(&[100.0, 100.0]);
    let config = BacktestConfig {
        position_sizing: PositionSizing::percent(100.0),
        max_position_size: 0.25,
        ..frictionless()
    };
    let mut strategy = Scripted::default().at(
        0,
        Action::Buy {
            quantity: None,
            stop: None,
            target: None,
        },
    );
    let result = run_backtest(&bars, config, &mut strategy).unwrap();

    assert_relative_eq!(result.trades[0].quantity, 25.0, epsilon = 1e-9);
}

#[test]
fn kill_switch_halts_the_loop() {
    let bars = closes(&[100.0, 90.0, 75.0, 80.0, 120.0]);
    let config = BacktestConfig {
        position_sizing: PositionSizing::percent(100.0),
        max_drawdown: Some(0.2),
        ..frictionless()
    };
    let mut strategy = Scripted::default().at(
        0,
        Action::Buy {
            quantity: None,
            stop: None,
            target: None,
        },
    );
    let result = run_backtest(&bars, config, &mut strategy).unwrap();

    assert!(result.is_completed());
    assert!(result.halted_by_kill_switch);
    assert_eq!(result.bars_processed, 3);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Eod);
    assert_relative_eq!(result.final_capital, 7_500.0, epsilon = 1e-9);
    assert_relative_eq!(result.metrics.max_drawdown_percent, 25.0, epsilon = 1e-9);
}

#[test]
fn strategy_error_fails_the_run_and_keeps_partial_state() {
    let bars = closes(&[100.0, 102.0, 104.0, 106.0]);
    let mut strategy = Scripted::default()
        .at(0, buy(1.0, None, None))
        .at(1, Action::Close)
        .at(2, Action::Fail);
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.status, BacktestStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("indicator blew up"));
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.equity_curve.len(), 2);
    assert!(!result.logs.iter().any(|l| l.starts_with("finalize")));
}

#[test]
fn strategy_panic_fails_the_run() {
    let bars = closes(&[100.0, 102.0, 104.0]);
    let mut strategy = Scripted::default()
        .at(0, buy(1.0, None, None))
        .at(1, Action::Panic);
    let result = run_backtest(&bars, frictionless(), &mut strategy).unwrap();

    assert_eq!(result.status, BacktestStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.contains("panicked"));
    assert!(error.contains("division by zero"));
    assert_eq!(result.equity_curve.len(), 1);
}

#[test]
fn repeated_runs_are_identical() {
    let bars: Vec<Bar> = (0..300)
        .map(|i| {
            let price = 100.0 + 10.0 * (i as f64 / 9.0).sin() + i as f64 * 0.05;
            bar(i, price, price + 1.5, price - 1.5, price)
        })
        .collect();
    let config = BacktestConfig {
        strategy: StrategyConfig::new("sma_crossover")
            .with_parameter("fast_period", 5.0)
            .with_parameter("slow_period", 20.0),
        ..Default::default()
    };

    let run = || {
        let mut strategy = BuiltinStrategies.create(&config.strategy).unwrap();
        run_backtest(&bars, config.clone(), strategy.as_mut()).unwrap()
    };
    let first = run();
    let second = run();

    assert!(!first.trades.is_empty());
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.statistics, second.statistics);
}

#[test]
fn invalid_configuration_is_reported_up_front() {
    let config = BacktestConfig {
        end_date: t(0),
        start_date: t(10),
        ..frictionless()
    };
    let err = run_backtest(&flat_bars(2, 100.0), config, &mut Scripted::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDateRange { .. }));
}
