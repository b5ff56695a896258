use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

//how the engine turns a buy/sell intent into a quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingMethod {
    //literal quantity
    Fixed,
    //percent of cash
    Percent,
    //percent of cash at risk over a fixed stop distance
    Risk,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    pub method: SizingMethod,
    //quantity for Fixed, percentage (10.0 = 10%) for Percent and Risk
    pub value: f64,
}

impl PositionSizing {
    pub fn fixed(quantity: f64) -> Self {
        PositionSizing {
            method: SizingMethod::Fixed,
            value: quantity,
        }
    }

    pub fn percent(percent: f64) -> Self {
        PositionSizing {
            method: SizingMethod::Percent,
            value: percent,
        }
    }

    pub fn risk(percent: f64) -> Self {
        PositionSizing {
            method: SizingMethod::Risk,
            value: percent,
        }
    }
}

impl Default for PositionSizing {
    fn default() -> Self {
        PositionSizing::percent(95.0)
    }
}

//strategy name plus its tunable numeric parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: IndexMap<String, f64>,
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        StrategyConfig {
            name: name.into(),
            parameters: IndexMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    //returns the parameter or the given default
    pub fn parameter_or(&self, name: &str, default: f64) -> f64 {
        self.parameter(name).unwrap_or(default)
    }
}

//complete configuration of one backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,

    //account settings
    pub initial_capital: f64,
    //fraction of notional per side
    pub commission_rate: f64,
    //fraction of price per side
    pub slippage_rate: f64,

    //risk settings
    pub position_sizing: PositionSizing,
    //fraction of equity
    pub max_position_size: f64,
    //kill switch, fraction of peak equity
    pub max_drawdown: Option<f64>,
    pub allow_short: bool,
    pub warmup_bars: usize,

    pub strategy: StrategyConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            start_date: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
            end_date: DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default(),
            initial_capital: 10_000.0,
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            position_sizing: PositionSizing::default(),
            max_position_size: 1.0,
            max_drawdown: None,
            allow_short: true,
            warmup_bars: 0,
            strategy: StrategyConfig::new("sma_crossover"),
        }
    }
}

impl BacktestConfig {
    //checks the invariants the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital > 0.0) {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }

        for (name, value) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NegativeRate { name, value });
            }
        }

        if self.end_date < self.start_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date.to_rfc3339(),
                end: self.end_date.to_rfc3339(),
            });
        }

        if !(self.max_position_size > 0.0) {
            return Err(ConfigError::NonPositiveMaxPosition(self.max_position_size));
        }

        if let Some(max_drawdown) = self.max_drawdown {
            if !(max_drawdown > 0.0 && max_drawdown <= 1.0) {
                return Err(ConfigError::InvalidMaxDrawdown(max_drawdown));
            }
        }

        if !(self.position_sizing.value > 0.0) {
            return Err(ConfigError::NonPositiveSizing(self.position_sizing.value));
        }

        Ok(())
    }

    //span of the configured date range in julian years
    pub fn years(&self) -> f64 {
        let seconds = (self.end_date - self.start_date).num_seconds() as f64;
        seconds / (365.25 * 24.0 * 3600.0)
    }

    //load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BacktestConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
