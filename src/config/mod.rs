pub mod backtest_config;
pub mod optimization_config;

pub use backtest_config::{BacktestConfig, PositionSizing, SizingMethod, StrategyConfig};
pub use optimization_config::{
    GeneticSettings, ObjectiveMetric, OptimizationConfig, OptimizationConstraints,
    OptimizationMethod, OptimizationParameter, ParameterKind,
};
