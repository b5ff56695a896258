use crate::engine::execution::ExecutionModel;
use crate::portfolio::position::{Direction, Position};
use crate::portfolio::trade::{ExitReason, Trade};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

//reasons an open request is turned into a no-op
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpenRejection {
    #[error("a {0:?} position is already open")]
    PositionAlreadyOpen(Direction),
    #[error("short selling is disabled")]
    ShortingDisabled,
    #[error("computed quantity {0} is not positive")]
    NonPositiveQuantity(f64),
    #[error("insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },
}

//an open request resolved to a quantity and reference price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenRequest {
    pub direction: Direction,
    pub quantity: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

//cash, the single position slot and the trade log of one run
#[derive(Debug, Clone)]
pub struct Account {
    pub initial_capital: f64,

    //cash not committed to the open position
    pub cash: f64,

    pub position: Option<Position>,

    //complete trade log
    pub trades: Vec<Trade>,

    execution: ExecutionModel,
}

impl Account {
    pub fn new(initial_capital: f64, execution: ExecutionModel) -> Self {
        Account {
            initial_capital,
            cash: initial_capital,
            position: None,
            trades: Vec::new(),
            execution,
        }
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    //cash plus mark-to-market value of the open position
    pub fn equity(&self, price: f64) -> f64 {
        self.cash
            + self
                .position
                .as_ref()
                .map(|p| p.market_value(price))
                .unwrap_or(0.0)
    }

    //opens the slot, deducting notional and entry commission from cash
    pub fn open(&mut self, request: OpenRequest) -> Result<&Position, OpenRejection> {
        if let Some(position) = &self.position {
            return Err(OpenRejection::PositionAlreadyOpen(position.direction));
        }

        if !(request.quantity > 0.0) || !request.quantity.is_finite() {
            return Err(OpenRejection::NonPositiveQuantity(request.quantity));
        }

        let fill = self.execution.fill(
            request.direction.entry_side(),
            request.price,
            request.quantity,
        );
        let required = fill.notional_value() + fill.commission;

        if required > self.cash {
            return Err(OpenRejection::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        self.cash -= required;

        debug!(
            "Opened {:?} {} @ {:.4} (commission {:.4})",
            request.direction, fill.quantity, fill.price, fill.commission
        );

        Ok(&*self.position.insert(Position {
            direction: request.direction,
            entry_price: fill.price,
            quantity: fill.quantity,
            entry_time: request.time,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            entry_commission: fill.commission,
            entry_slippage: fill.slippage_cost,
        }))
    }

    //closes the slot at `price` and records the trade; none if flat
    pub fn close(
        &mut self,
        price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<&Trade> {
        let position = self.position.take()?;

        let fill = self
            .execution
            .fill(position.direction.exit_side(), price, position.quantity);

        let trade = Trade::close(
            &position,
            time,
            fill.price,
            fill.commission,
            fill.slippage_cost,
            reason,
        );

        //release the committed capital plus the pnl net of exit commission
        self.cash += position.committed_capital() + trade.gross_pnl - fill.commission;

        debug!(
            "Closed {:?} {} @ {:.4} ({:?}, pnl {:.4})",
            trade.direction, trade.quantity, trade.exit_price, reason, trade.pnl
        );

        self.trades.push(trade);
        self.trades.last()
    }
}
