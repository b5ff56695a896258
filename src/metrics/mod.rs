pub mod performance;
pub mod summary;
pub mod timeseries;
pub mod trade_statistics;

pub use performance::{calculate_metrics, PerformanceMetrics, PERIODS_PER_YEAR};
pub use timeseries::{
    calculate_returns, drawdown_periods, DrawdownPeriod, EquityPoint, EquityTracker,
};
pub use trade_statistics::{
    calculate_trade_statistics, ExitReasonCounts, SideStatistics, TradeStatistics,
};
