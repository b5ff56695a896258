use crate::config::BacktestConfig;
use crate::metrics::timeseries::{
    calculate_returns, drawdown_periods, max_drawdown_percent, EquityPoint,
};
use crate::portfolio::Trade;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

//trading periods per year used to annualize per-bar statistics
pub const PERIODS_PER_YEAR: f64 = 252.0;

//risk and return statistics of one run
//every ratio with an undefined denominator is reported as 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceMetrics {
    //returns
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
    pub annualized_return_percent: f64,
    pub cagr_percent: f64,
    pub best_return: f64,
    pub worst_return: f64,
    pub positive_periods: usize,
    pub negative_periods: usize,

    //risk-adjusted
    pub volatility: f64,
    pub annualized_volatility_percent: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub k_ratio: f64,
    pub gain_to_pain: f64,
    pub omega_ratio: f64,
    pub stability: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub tail_ratio: f64,

    //drawdown
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub max_drawdown_duration_secs: i64,
    pub avg_drawdown_percent: f64,
    pub avg_drawdown_duration_secs: f64,
    pub drawdown_periods: usize,
    pub recovery_factor: f64,
    pub ulcer_index: f64,

    //tail risk on per-period returns
    pub var_95: f64,
    pub cvar_95: f64,
    pub var_99: f64,
    pub cvar_99: f64,

    //trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub loss_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade: f64,
    pub avg_trade_percent: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub payoff_ratio: f64,
    pub avg_trade_duration_secs: f64,
    pub exposure_percent: f64,

    //costs
    pub total_commission: f64,
    pub total_slippage: f64,
    pub total_fees: f64,
}

//ratio that maps undefined results to the neutral value 0
pub(crate) fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.mean()
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        values.population_std_dev()
    }
}

//value at the empirical quantile of an ascending slice
fn quantile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((fraction * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

//historical var and the mean of the tail below it
pub fn value_at_risk(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let index = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    let var = sorted[index];
    let tail = &sorted[..index];
    let cvar = if tail.is_empty() { var } else { mean(tail) };

    (var, cvar)
}

//slope of equity regressed on bar index divided by its standard error
pub fn k_ratio(equity: &[f64]) -> f64 {
    let n = equity.len();
    if n < 3 {
        return 0.0;
    }

    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = mean(&xs);
    let y_mean = mean(equity);

    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(equity)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();

    let slope = safe_div(sxy, sxx);
    let intercept = y_mean - slope * x_mean;

    let sse: f64 = xs
        .iter()
        .zip(equity)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();

    let standard_error = (sse / (n as f64 - 2.0) / sxx).sqrt();
    safe_div(slope, standard_error)
}

//root mean square of percent drawdowns
pub fn ulcer_index(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = equity_curve
        .iter()
        .map(|p| p.drawdown_percent.powi(2))
        .sum();
    (sum_sq / equity_curve.len() as f64).sqrt()
}

fn sharpe_ratio(returns: &[f64]) -> f64 {
    safe_div(mean(returns), population_std(returns)) * PERIODS_PER_YEAR.sqrt()
}

fn sortino_ratio(returns: &[f64]) -> f64 {
    let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negative.is_empty() {
        return 0.0;
    }
    safe_div(mean(returns), population_std(&negative)) * PERIODS_PER_YEAR.sqrt()
}

//standardized third and excess fourth moments
fn higher_moments(returns: &[f64]) -> (f64, f64) {
    let std = population_std(returns);
    if std == 0.0 {
        return (0.0, 0.0);
    }
    let m = mean(returns);
    let n = returns.len() as f64;
    let m3 = returns.iter().map(|r| (r - m).powi(3)).sum::<f64>() / n;
    let m4 = returns.iter().map(|r| (r - m).powi(4)).sum::<f64>() / n;
    (m3 / std.powi(3), m4 / std.powi(4) - 3.0)
}

fn annualized_return_percent(final_equity: f64, initial_capital: f64, years: f64) -> f64 {
    if years <= 0.0 || initial_capital <= 0.0 || final_equity <= 0.0 {
        return 0.0;
    }
    let value = ((final_equity / initial_capital).powf(1.0 / years) - 1.0) * 100.0;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

//computes every metric from the trade log and equity curve
pub fn calculate_metrics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    config: &BacktestConfig,
) -> PerformanceMetrics {
    let mut m = PerformanceMetrics {
        initial_capital,
        ..Default::default()
    };

    m.final_equity = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(initial_capital);
    m.total_return = m.final_equity - initial_capital;
    m.total_return_percent = safe_div(m.total_return, initial_capital) * 100.0;
    m.annualized_return_percent =
        annualized_return_percent(m.final_equity, initial_capital, config.years());

    if let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) {
        let span_years =
            (last.timestamp - first.timestamp).num_seconds() as f64 / (365.25 * 86_400.0);
        m.cagr_percent = annualized_return_percent(m.final_equity, initial_capital, span_years);
    }

    //per-period returns
    let returns = calculate_returns(equity_curve, initial_capital);
    let std = population_std(&returns);

    m.volatility = std;
    m.annualized_volatility_percent = std * PERIODS_PER_YEAR.sqrt() * 100.0;
    m.sharpe_ratio = sharpe_ratio(&returns);
    m.sortino_ratio = sortino_ratio(&returns);
    m.stability = safe_div(mean(&returns), std);
    (m.skewness, m.kurtosis) = higher_moments(&returns);

    m.best_return = returns.iter().copied().reduce(f64::max).unwrap_or(0.0);
    m.worst_return = returns.iter().copied().reduce(f64::min).unwrap_or(0.0);
    m.positive_periods = returns.iter().filter(|r| **r > 0.0).count();
    m.negative_periods = returns.iter().filter(|r| **r < 0.0).count();

    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let pains: f64 = returns.iter().filter(|r| **r < 0.0).sum::<f64>().abs();
    m.gain_to_pain = safe_div(returns.iter().sum(), pains);
    m.omega_ratio = safe_div(gains, pains);

    let mut sorted = returns.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    m.tail_ratio = safe_div(quantile(&sorted, 0.95).abs(), quantile(&sorted, 0.05).abs());

    (m.var_95, m.cvar_95) = value_at_risk(&returns, 0.95);
    (m.var_99, m.cvar_99) = value_at_risk(&returns, 0.99);

    //drawdown
    m.max_drawdown = equity_curve.iter().map(|p| p.drawdown).fold(0.0, f64::max);
    m.max_drawdown_percent = max_drawdown_percent(equity_curve);
    m.calmar_ratio = safe_div(m.annualized_return_percent, m.max_drawdown_percent);
    m.ulcer_index = ulcer_index(equity_curve);

    let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    m.k_ratio = k_ratio(&equity);

    let periods = drawdown_periods(equity_curve, initial_capital);
    m.drawdown_periods = periods.len();
    m.max_drawdown_duration_secs = periods.iter().map(|p| p.duration_secs).max().unwrap_or(0);
    if !periods.is_empty() {
        let depths: Vec<f64> = periods.iter().map(|p| p.depth_percent).collect();
        let durations: Vec<f64> = periods.iter().map(|p| p.duration_secs as f64).collect();
        m.avg_drawdown_percent = mean(&depths);
        m.avg_drawdown_duration_secs = mean(&durations);
    }

    apply_trade_metrics(&mut m, trades, equity_curve);
    m.recovery_factor = safe_div(m.net_profit, m.max_drawdown);

    m
}

fn apply_trade_metrics(m: &mut PerformanceMetrics, trades: &[Trade], equity_curve: &[EquityPoint]) {
    m.total_commission = trades.iter().map(|t| t.commission).sum();
    m.total_slippage = trades.iter().map(|t| t.slippage).sum();
    m.total_fees = m.total_commission + m.total_slippage;

    if trades.is_empty() {
        return;
    }

    let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();
    let total = trades.len() as f64;

    m.total_trades = trades.len();
    m.winning_trades = wins.len();
    m.losing_trades = losses.len();
    m.win_rate = wins.len() as f64 / total * 100.0;
    m.loss_rate = 100.0 - m.win_rate;

    m.gross_profit = wins.iter().sum();
    m.gross_loss = losses.iter().sum::<f64>().abs();
    m.net_profit = trades.iter().map(|t| t.pnl).sum();
    m.profit_factor = safe_div(m.gross_profit, m.gross_loss);

    m.avg_win = mean(&wins);
    m.avg_loss = mean(&losses);
    m.largest_win = wins.iter().copied().fold(0.0, f64::max);
    m.largest_loss = losses.iter().copied().fold(0.0, f64::min);
    m.avg_trade = m.net_profit / total;
    m.avg_trade_percent = trades.iter().map(|t| t.pnl_percent).sum::<f64>() / total;
    m.expectancy = m.win_rate / 100.0 * m.avg_win + m.loss_rate / 100.0 * m.avg_loss;
    m.payoff_ratio = safe_div(m.avg_win, m.avg_loss.abs());

    let held_secs: i64 = trades.iter().map(|t| t.duration_secs).sum();
    m.avg_trade_duration_secs = held_secs as f64 / total;

    m.exposure_percent = exposure_percent(trades, equity_curve);
}

//share of equity points taken while a position was open
fn exposure_percent(trades: &[Trade], equity_curve: &[EquityPoint]) -> f64 {
    let mut in_market = 0usize;
    let mut idx = 0;

    for point in equity_curve {
        while idx < trades.len() && trades[idx].exit_time <= point.timestamp {
            idx += 1;
        }
        if idx < trades.len() && trades[idx].entry_time <= point.timestamp {
            in_market += 1;
        }
    }

    safe_div(in_market as f64, equity_curve.len() as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::timeseries::EquityTracker;
    use crate::portfolio::{Direction, ExitReason};
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn curve(values: &[f64], initial: f64) -> Vec<EquityPoint> {
        let mut tracker = EquityTracker::new(initial);
        for (i, &value) in values.iter().enumerate() {
            tracker.record(start() + Duration::days(i as i64), value);
        }
        tracker.into_points()
    }

    fn trade(pnl: f64, hours: i64) -> Trade {
        Trade {
            entry_time: start(),
            exit_time: start() + Duration::hours(hours),
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            direction: Direction::Long,
            quantity: 1.0,
            commission: 0.5,
            slippage: 0.25,
            gross_pnl: pnl + 0.5,
            pnl,
            pnl_percent: pnl,
            duration_secs: hours * 3600,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn flat_equity_yields_neutral_ratios() {
        let config = BacktestConfig::default();
        let points = curve(&[1000.0; 10], 1000.0);
        let m = calculate_metrics(&[], &points, 1000.0, &config);

        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.calmar_ratio, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.k_ratio, 0.0);
        assert_eq!(m.omega_ratio, 0.0);
        assert_eq!(m.recovery_factor, 0.0);
        assert_eq!(m.ulcer_index, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.loss_rate, 0.0);
    }

    #[test]
    fn sharpe_uses_population_std() {
        let config = BacktestConfig::default();
        let points = curve(&[110.0, 99.0, 108.9], 100.0);
        let returns = calculate_returns(&points, 100.0);
        let m = calculate_metrics(&[], &points, 100.0, &config);

        let mu = returns.iter().sum::<f64>() / 3.0;
        let var = returns.iter().map(|r| (r - mu).powi(2)).sum::<f64>() / 3.0;
        assert_relative_eq!(m.sharpe_ratio, mu / var.sqrt() * 252f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn sortino_is_zero_without_losing_periods() {
        let config = BacktestConfig::default();
        let points = curve(&[101.0, 102.0, 104.0], 100.0);
        let m = calculate_metrics(&[], &points, 100.0, &config);

        assert!(m.sharpe_ratio > 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.max_drawdown_percent, 0.0);
        assert_eq!(m.calmar_ratio, 0.0);
    }

    #[test]
    fn win_and_loss_rates_cover_all_trades() {
        let config = BacktestConfig::default();
        let trades = vec![trade(10.0, 1), trade(-5.0, 2), trade(0.0, 3)];
        let points = curve(&[1000.0, 1005.0], 1000.0);
        let m = calculate_metrics(&trades, &points, 1000.0, &config);

        assert_eq!(m.winning_trades, 1);
        assert_eq!(m.losing_trades, 2);
        assert_relative_eq!(m.win_rate + m.loss_rate, 100.0, epsilon = 1e-9);
        assert_relative_eq!(m.profit_factor, 2.0, epsilon = 1e-9);
        assert_relative_eq!(m.net_profit, 5.0, epsilon = 1e-9);
        assert_relative_eq!(m.largest_loss, -5.0, epsilon = 1e-9);
        assert_relative_eq!(m.total_commission, 1.5, epsilon = 1e-9);
        assert_relative_eq!(m.total_fees, 2.25, epsilon = 1e-9);
        assert_relative_eq!(m.avg_trade_duration_secs, 7200.0, epsilon = 1e-9);
    }

    #[test]
    fn exposure_counts_points_with_an_open_position() {
        let config = BacktestConfig::default();
        let points = curve(&[1000.0, 1000.0, 1000.0, 1000.0], 1000.0);
        //entered at day 0, exited at day 2
        let mut held = trade(1.0, 48);
        held.duration_secs = 2 * 86_400;
        let m = calculate_metrics(&[held], &points, 1000.0, &config);
        assert_relative_eq!(m.exposure_percent, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let config = BacktestConfig::default();
        let trades = vec![trade(10.0, 1), trade(4.0, 1)];
        let m = calculate_metrics(&trades, &curve(&[1014.0], 1000.0), 1000.0, &config);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.payoff_ratio, 0.0);
    }

    #[test]
    fn var_picks_the_empirical_quantile() {
        let returns: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0 - 0.5).collect();
        let (var, cvar) = value_at_risk(&returns, 0.95);

        //sorted index 5 -> -0.44, tail is the five values below
        assert_relative_eq!(var, -0.44, epsilon = 1e-12);
        assert_relative_eq!(cvar, -0.47, epsilon = 1e-12);
        assert_eq!(value_at_risk(&[], 0.95), (0.0, 0.0));
    }

    #[test]
    fn k_ratio_rewards_steady_growth() {
        let noisy = [100.0, 104.0, 101.0, 107.0, 104.0, 110.0];
        let steady = [100.0, 102.1, 103.9, 106.2, 107.9, 110.1];
        assert!(k_ratio(&steady) > k_ratio(&noisy));
        assert!(k_ratio(&noisy) > 0.0);
        assert_eq!(k_ratio(&[1.0, 2.0]), 0.0);
    }

    #[test]
    fn ulcer_index_is_rms_of_drawdowns() {
        let points = curve(&[100.0, 90.0, 100.0, 80.0], 100.0);
        //drawdowns 0, 10, 0, 20 percent
        assert_relative_eq!(ulcer_index(&points), (500.0f64 / 4.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn annualized_return_uses_config_range() {
        let mut config = BacktestConfig::default();
        config.start_date = start();
        config.end_date = start() + Duration::seconds((2.0 * 365.25 * 86_400.0) as i64);
        let points = curve(&[121.0], 100.0);
        let m = calculate_metrics(&[], &points, 100.0, &config);
        assert_relative_eq!(m.annualized_return_percent, 10.0, epsilon = 1e-9);

        config.end_date = config.start_date;
        let m = calculate_metrics(&[], &points, 100.0, &config);
        assert_eq!(m.annualized_return_percent, 0.0);
    }
}
