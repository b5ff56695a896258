use crate::data::Bar;
use crate::engine::execution::OrderSide;
use crate::portfolio::trade::ExitReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    //side of the fill that opens a position in this direction
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    //side of the fill that closes it
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

//the single open position of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,

    //slippage-adjusted fill price
    pub entry_price: f64,

    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,

    //costs paid on entry, carried into the trade record
    pub entry_commission: f64,
    pub entry_slippage: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    //price pnl at a given price, before exit costs
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => (price - self.entry_price) * self.quantity,
            Direction::Short => (self.entry_price - price) * self.quantity,
        }
    }

    //cash locked when the position was opened
    pub fn committed_capital(&self) -> f64 {
        self.quantity * self.entry_price
    }

    //mark-to-market value counted towards equity
    pub fn market_value(&self, price: f64) -> f64 {
        self.committed_capital() + self.unrealized_pnl(price)
    }

    //checks the bar's range against stop and target
    //the stop is evaluated first and wins when both are touched
    //a bar that opens beyond a level fills at the open
    pub fn triggered_exit(&self, bar: &Bar) -> Option<(ExitReason, f64)> {
        let (stop_hit, target_hit) = match self.direction {
            Direction::Long => (
                self.stop_loss
                    .filter(|&stop| bar.low <= stop)
                    .map(|stop| stop.min(bar.open)),
                self.take_profit
                    .filter(|&target| bar.high >= target)
                    .map(|target| target.max(bar.open)),
            ),
            Direction::Short => (
                self.stop_loss
                    .filter(|&stop| bar.high >= stop)
                    .map(|stop| stop.max(bar.open)),
                self.take_profit
                    .filter(|&target| bar.low <= target)
                    .map(|target| target.min(bar.open)),
            ),
        };

        stop_hit
            .map(|price| (ExitReason::StopLoss, price))
            .or_else(|| target_hit.map(|price| (ExitReason::TakeProfit, price)))
    }
}
