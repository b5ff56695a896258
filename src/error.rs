use thiserror::Error;

//configuration problems surfaced to the caller at call time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("{name} must be non-negative, got {value}")]
    NegativeRate { name: &'static str, value: f64 },
    #[error("End date {end} is before start date {start}")]
    InvalidDateRange { start: String, end: String },
    #[error("Max position size must be positive, got {0}")]
    NonPositiveMaxPosition(f64),
    #[error("Max drawdown must be within (0, 1], got {0}")]
    InvalidMaxDrawdown(f64),
    #[error("Position sizing value must be positive, got {0}")]
    NonPositiveSizing(f64),
    #[error("Unsupported optimization method: {0}")]
    UnsupportedMethod(String),
    #[error("Unknown objective metric: {0}")]
    UnknownObjective(String),
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("Invalid optimization parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Invalid optimization setting: {0}")]
    InvalidOptimization(String),
}

//hard failures of an optimization run
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No valid results: all {runs} runs failed or violated the constraints")]
    NoValidResults { runs: usize },
    #[error("Optimization cancelled before any valid result")]
    Cancelled,
    #[error("Failed to build strategy: {0}")]
    Strategy(#[source] anyhow::Error),
}
