pub mod backtest;
pub mod execution;

pub use backtest::{run_backtest, BacktestEngine, BacktestResult, BacktestStatus, RunState};
pub use execution::{max_quantity, position_size, ExecutionModel, Fill, OrderSide};
