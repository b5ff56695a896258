use crate::portfolio::position::{Direction, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    //forced close at the end of data
    Eod,
}

//a closed round trip, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub direction: Direction,
    pub quantity: f64,

    //entry + exit commission
    pub commission: f64,
    //entry + exit slippage cost
    pub slippage: f64,

    pub gross_pnl: f64,
    //after round-trip commission
    pub pnl: f64,
    //pnl relative to entry notional, in percent
    pub pnl_percent: f64,

    pub duration_secs: i64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn close(
        position: &Position,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        exit_commission: f64,
        exit_slippage: f64,
        exit_reason: ExitReason,
    ) -> Self {
        let gross_pnl = position.unrealized_pnl(exit_price);
        let commission = position.entry_commission + exit_commission;
        let pnl = gross_pnl - commission;
        let notional = position.committed_capital();
        let pnl_percent = if notional > 0.0 {
            pnl / notional * 100.0
        } else {
            0.0
        };

        Trade {
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            direction: position.direction,
            quantity: position.quantity,
            commission,
            slippage: position.entry_slippage + exit_slippage,
            gross_pnl,
            pnl,
            pnl_percent,
            duration_secs: (exit_time - position.entry_time).num_seconds(),
            exit_reason,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    //commission plus slippage cost
    pub fn fees(&self) -> f64 {
        self.commission + self.slippage
    }
}
