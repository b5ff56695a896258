use crate::metrics::performance::safe_div;
use crate::portfolio::{Direction, ExitReason, Trade};
use serde::{Deserialize, Serialize};

//win rate and profit factor for one side of the book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SideStatistics {
    pub trades: usize,
    pub winners: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_pnl: f64,
}

impl SideStatistics {
    fn from_trades<'a>(trades: impl Iterator<Item = &'a Trade>) -> Self {
        let mut stats = SideStatistics::default();
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;

        for trade in trades {
            stats.trades += 1;
            stats.net_pnl += trade.pnl;
            if trade.pnl > 0.0 {
                stats.winners += 1;
                gross_profit += trade.pnl;
            } else if trade.pnl < 0.0 {
                gross_loss += trade.pnl.abs();
            }
        }

        stats.win_rate = safe_div(stats.winners as f64, stats.trades as f64) * 100.0;
        stats.profit_factor = safe_div(gross_profit, gross_loss);
        stats
    }
}

//exits by cause; end-of-data exits are not tallied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExitReasonCounts {
    pub stop_loss: usize,
    pub take_profit: usize,
    pub signal: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub long: SideStatistics,
    pub short: SideStatistics,

    //holding periods, seconds
    pub min_holding_secs: i64,
    pub avg_holding_secs: f64,
    pub max_holding_secs: i64,

    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    pub trades_per_day: f64,
    pub trades_per_week: f64,
    pub trades_per_month: f64,

    pub exit_reasons: ExitReasonCounts,
}

//longest runs of wins (pnl >= 0) and losses (pnl < 0)
fn streaks(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut current = 0;
    let mut last_was_loss: Option<bool> = None;

    for trade in trades {
        let is_loss = trade.pnl < 0.0;
        current = if last_was_loss == Some(is_loss) {
            current + 1
        } else {
            1
        };
        last_was_loss = Some(is_loss);

        if is_loss {
            max_losses = max_losses.max(current);
        } else {
            max_wins = max_wins.max(current);
        }
    }

    (max_wins, max_losses)
}

pub fn calculate_trade_statistics(trades: &[Trade]) -> TradeStatistics {
    if trades.is_empty() {
        return TradeStatistics::default();
    }

    let mut stats = TradeStatistics {
        total_trades: trades.len(),
        long: SideStatistics::from_trades(
            trades.iter().filter(|t| t.direction == Direction::Long),
        ),
        short: SideStatistics::from_trades(
            trades.iter().filter(|t| t.direction == Direction::Short),
        ),
        ..Default::default()
    };

    let durations = trades.iter().map(|t| t.duration_secs);
    stats.min_holding_secs = durations.clone().min().unwrap_or(0);
    stats.max_holding_secs = durations.clone().max().unwrap_or(0);
    stats.avg_holding_secs = durations.sum::<i64>() as f64 / trades.len() as f64;

    (stats.max_consecutive_wins, stats.max_consecutive_losses) = streaks(trades);

    let first_entry = trades.iter().map(|t| t.entry_time).min();
    let last_exit = trades.iter().map(|t| t.exit_time).max();
    if let (Some(first), Some(last)) = (first_entry, last_exit) {
        let days = (last - first).num_seconds() as f64 / 86_400.0;
        let count = trades.len() as f64;
        stats.trades_per_day = safe_div(count, days);
        stats.trades_per_week = safe_div(count, days / 7.0);
        stats.trades_per_month = safe_div(count, days / 30.0);
    }

    for trade in trades {
        match trade.exit_reason {
            ExitReason::StopLoss => stats.exit_reasons.stop_loss += 1,
            ExitReason::TakeProfit => stats.exit_reasons.take_profit += 1,
            ExitReason::Signal => stats.exit_reasons.signal += 1,
            ExitReason::Eod => {}
        }
    }

    stats
}
