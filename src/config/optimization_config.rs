use crate::error::ConfigError;
use crate::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizationMethod {
    Grid,
    Genetic,
    //relabelled grid search, no train/test split
    WalkForward,
}

impl OptimizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMethod::Grid => "grid",
            OptimizationMethod::Genetic => "genetic",
            OptimizationMethod::WalkForward => "walk_forward",
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "grid" | "grid_search" => Ok(OptimizationMethod::Grid),
            "genetic" | "ga" | "genetic_algorithm" => Ok(OptimizationMethod::Genetic),
            "walk_forward" | "walkforward" => Ok(OptimizationMethod::WalkForward),
            _ => Err(ConfigError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for OptimizationMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OptimizationMethod> for String {
    fn from(method: OptimizationMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//the performance metric an optimization ranks runs by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectiveMetric {
    TotalReturn,
    TotalReturnPercent,
    AnnualizedReturn,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    MaxDrawdownPercent,
    ProfitFactor,
    WinRate,
    Expectancy,
    NetProfit,
    RecoveryFactor,
    UlcerIndex,
    KRatio,
    OmegaRatio,
    GainToPain,
    FinalEquity,
}

impl ObjectiveMetric {
    pub const ALL: [ObjectiveMetric; 17] = [
        ObjectiveMetric::TotalReturn,
        ObjectiveMetric::TotalReturnPercent,
        ObjectiveMetric::AnnualizedReturn,
        ObjectiveMetric::SharpeRatio,
        ObjectiveMetric::SortinoRatio,
        ObjectiveMetric::CalmarRatio,
        ObjectiveMetric::MaxDrawdownPercent,
        ObjectiveMetric::ProfitFactor,
        ObjectiveMetric::WinRate,
        ObjectiveMetric::Expectancy,
        ObjectiveMetric::NetProfit,
        ObjectiveMetric::RecoveryFactor,
        ObjectiveMetric::UlcerIndex,
        ObjectiveMetric::KRatio,
        ObjectiveMetric::OmegaRatio,
        ObjectiveMetric::GainToPain,
        ObjectiveMetric::FinalEquity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveMetric::TotalReturn => "total_return",
            ObjectiveMetric::TotalReturnPercent => "total_return_percent",
            ObjectiveMetric::AnnualizedReturn => "annualized_return_percent",
            ObjectiveMetric::SharpeRatio => "sharpe_ratio",
            ObjectiveMetric::SortinoRatio => "sortino_ratio",
            ObjectiveMetric::CalmarRatio => "calmar_ratio",
            ObjectiveMetric::MaxDrawdownPercent => "max_drawdown_percent",
            ObjectiveMetric::ProfitFactor => "profit_factor",
            ObjectiveMetric::WinRate => "win_rate",
            ObjectiveMetric::Expectancy => "expectancy",
            ObjectiveMetric::NetProfit => "net_profit",
            ObjectiveMetric::RecoveryFactor => "recovery_factor",
            ObjectiveMetric::UlcerIndex => "ulcer_index",
            ObjectiveMetric::KRatio => "k_ratio",
            ObjectiveMetric::OmegaRatio => "omega_ratio",
            ObjectiveMetric::GainToPain => "gain_to_pain",
            ObjectiveMetric::FinalEquity => "final_equity",
        }
    }

    //reads the metric from a computed metrics set
    pub fn value(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            ObjectiveMetric::TotalReturn => metrics.total_return,
            ObjectiveMetric::TotalReturnPercent => metrics.total_return_percent,
            ObjectiveMetric::AnnualizedReturn => metrics.annualized_return_percent,
            ObjectiveMetric::SharpeRatio => metrics.sharpe_ratio,
            ObjectiveMetric::SortinoRatio => metrics.sortino_ratio,
            ObjectiveMetric::CalmarRatio => metrics.calmar_ratio,
            ObjectiveMetric::MaxDrawdownPercent => metrics.max_drawdown_percent,
            ObjectiveMetric::ProfitFactor => metrics.profit_factor,
            ObjectiveMetric::WinRate => metrics.win_rate,
            ObjectiveMetric::Expectancy => metrics.expectancy,
            ObjectiveMetric::NetProfit => metrics.net_profit,
            ObjectiveMetric::RecoveryFactor => metrics.recovery_factor,
            ObjectiveMetric::UlcerIndex => metrics.ulcer_index,
            ObjectiveMetric::KRatio => metrics.k_ratio,
            ObjectiveMetric::OmegaRatio => metrics.omega_ratio,
            ObjectiveMetric::GainToPain => metrics.gain_to_pain,
            ObjectiveMetric::FinalEquity => metrics.final_equity,
        }
    }
}

impl FromStr for ObjectiveMetric {
    type Err = ConfigError;

    //accepts snake_case and camelCase names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        let alias = match normalized.as_str() {
            "annualizedreturn" => Some(ObjectiveMetric::AnnualizedReturn),
            "sharpe" => Some(ObjectiveMetric::SharpeRatio),
            "sortino" => Some(ObjectiveMetric::SortinoRatio),
            "calmar" => Some(ObjectiveMetric::CalmarRatio),
            "maxdrawdown" => Some(ObjectiveMetric::MaxDrawdownPercent),
            _ => None,
        };

        alias
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|metric| metric.as_str().replace('_', "") == normalized)
            })
            .ok_or_else(|| ConfigError::UnknownObjective(s.to_string()))
    }
}

impl TryFrom<String> for ObjectiveMetric {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectiveMetric> for String {
    fn from(metric: ObjectiveMetric) -> Self {
        metric.as_str().to_string()
    }
}

impl fmt::Display for ObjectiveMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Integer,
    #[default]
    Float,
}

//one axis of the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameter {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    #[serde(default)]
    pub kind: ParameterKind,
}

impl OptimizationParameter {
    pub fn integer(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        OptimizationParameter {
            name: name.into(),
            min,
            max,
            step,
            kind: ParameterKind::Integer,
        }
    }

    pub fn float(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        OptimizationParameter {
            name: name.into(),
            min,
            max,
            step,
            kind: ParameterKind::Float,
        }
    }

    //rounds integer parameters, leaves floats untouched
    pub fn normalize(&self, value: f64) -> f64 {
        match self.kind {
            ParameterKind::Integer => value.round(),
            ParameterKind::Float => value,
        }
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidParameter {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(invalid("bounds must be finite"));
        }
        if self.max < self.min {
            return Err(invalid("max is below min"));
        }
        if !(self.step > 0.0) {
            return Err(invalid("step must be positive"));
        }
        //rounding keeps integer values inside whole-number bounds only
        if self.kind == ParameterKind::Integer
            && (self.min.fract() != 0.0 || self.max.fract() != 0.0)
        {
            return Err(invalid("integer bounds must be whole numbers"));
        }
        Ok(())
    }
}

//runs violating any of these are discarded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OptimizationConstraints {
    pub min_trades: Option<usize>,
    pub max_drawdown_percent: Option<f64>,
    pub min_sharpe: Option<f64>,
}

impl OptimizationConstraints {
    pub fn is_satisfied_by(&self, metrics: &PerformanceMetrics) -> bool {
        if let Some(min_trades) = self.min_trades {
            if metrics.total_trades < min_trades {
                return false;
            }
        }
        if let Some(max_dd) = self.max_drawdown_percent {
            if metrics.max_drawdown_percent > max_dd {
                return false;
            }
        }
        if let Some(min_sharpe) = self.min_sharpe {
            if metrics.sharpe_ratio < min_sharpe {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticSettings {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    //fixed seed for reproducible searches
    pub seed: Option<u64>,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        GeneticSettings {
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub method: OptimizationMethod,
    pub parameters: Vec<OptimizationParameter>,
    pub objective: ObjectiveMetric,
    #[serde(default = "default_maximize")]
    pub maximize: bool,
    #[serde(default)]
    pub genetic: GeneticSettings,
    #[serde(default)]
    pub constraints: OptimizationConstraints,
}

fn default_maximize() -> bool {
    true
}

impl OptimizationConfig {
    pub fn new(
        method: OptimizationMethod,
        parameters: Vec<OptimizationParameter>,
        objective: ObjectiveMetric,
    ) -> Self {
        OptimizationConfig {
            method,
            parameters,
            objective,
            maximize: true,
            genetic: GeneticSettings::default(),
            constraints: OptimizationConstraints::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameters.is_empty() {
            return Err(ConfigError::InvalidOptimization(
                "at least one parameter is required".to_string(),
            ));
        }

        for parameter in &self.parameters {
            parameter.validate()?;
        }

        if self.method == OptimizationMethod::Genetic {
            let ga = &self.genetic;
            if ga.population_size < 2 {
                return Err(ConfigError::InvalidOptimization(format!(
                    "population size must be at least 2, got {}",
                    ga.population_size
                )));
            }
            if ga.generations == 0 {
                return Err(ConfigError::InvalidOptimization(
                    "generations must be at least 1".to_string(),
                ));
            }
            for (name, rate) in [
                ("mutation rate", ga.mutation_rate),
                ("crossover rate", ga.crossover_rate),
            ] {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(ConfigError::InvalidOptimization(format!(
                        "{} must be within [0, 1], got {}",
                        name, rate
                    )));
                }
            }
        }

        Ok(())
    }

    //true if `candidate` ranks ahead of `incumbent`
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        if self.maximize {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: OptimizationConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }
}
