//a bar-by-bar backtesting and parameter optimization engine for crypto strategies

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod optimization;
pub mod portfolio;
pub mod strategy;

//prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        BacktestConfig, GeneticSettings, ObjectiveMetric, OptimizationConfig,
        OptimizationConstraints, OptimizationMethod, OptimizationParameter, ParameterKind,
        PositionSizing, SizingMethod, StrategyConfig,
    };
    pub use crate::data::{filter_by_range, filter_by_symbol, load_csv, Bar};
    pub use crate::engine::{run_backtest, BacktestEngine, BacktestResult, BacktestStatus};
    pub use crate::error::{ConfigError, OptimizationError};
    pub use crate::metrics::{
        calculate_metrics, calculate_trade_statistics, EquityPoint, PerformanceMetrics,
        TradeStatistics,
    };
    pub use crate::optimization::{OptimizationEngine, OptimizationResult, ParameterSet};
    pub use crate::portfolio::{Direction, ExitReason, Position, Trade};
    pub use crate::strategy::{
        rsi_reversion::RsiReversionStrategy, sma_crossover::SmaCrossoverStrategy,
        BuiltinStrategies, Strategy, StrategyContext, StrategyFactory,
    };
}
