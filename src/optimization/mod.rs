pub mod engine;
pub mod genetic;
pub mod grid;

use indexmap::IndexMap;

//parameter name to value, in declaration order
pub type ParameterSet = IndexMap<String, f64>;

pub use engine::{GenerationSummary, OptimizationEngine, OptimizationResult, OptimizationRun};
pub use grid::{combinations, grid_size};
