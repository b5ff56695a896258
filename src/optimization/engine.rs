use crate::config::{BacktestConfig, ObjectiveMetric, OptimizationConfig, OptimizationMethod};
use crate::data::Bar;
use crate::engine::{BacktestEngine, BacktestResult};
use crate::error::OptimizationError;
use crate::metrics::PerformanceMetrics;
use crate::optimization::genetic::{self, Genes};
use crate::optimization::grid;
use crate::optimization::ParameterSet;
use crate::strategy::StrategyFactory;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

//one accepted parameter set and how it scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub parameters: ParameterSet,
    pub objective: f64,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_objective: Option<f64>,
    pub mean_objective: Option<f64>,
    pub valid_individuals: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: OptimizationMethod,
    pub objective: ObjectiveMetric,
    pub maximize: bool,
    pub best_parameters: ParameterSet,
    pub best_objective: f64,
    pub best_result: BacktestResult,
    //accepted runs, best first
    pub runs: Vec<OptimizationRun>,
    pub total_runs: usize,
    pub valid_runs: usize,
    pub cancelled: bool,
    pub generations: Vec<GenerationSummary>,
    pub execution_time_ms: f64,
}

impl OptimizationResult {
    pub fn top(&self, n: usize) -> &[OptimizationRun] {
        &self.runs[..n.min(self.runs.len())]
    }
}

type Progress<'p> = Option<&'p mut dyn FnMut(f64)>;

fn report(progress: &mut Progress<'_>, percent: f64) {
    if let Some(callback) = progress.as_deref_mut() {
        callback(percent.clamp(0.0, 100.0));
    }
}

//runs backtests for parameter sets and keeps the running best
struct Evaluator<'a> {
    bars: &'a [Bar],
    base: &'a BacktestConfig,
    config: &'a OptimizationConfig,
    factory: &'a dyn StrategyFactory,
    runs: Vec<OptimizationRun>,
    best: Option<(ParameterSet, f64, BacktestResult)>,
    total_runs: usize,
    factory_failures: usize,
    last_factory_error: Option<anyhow::Error>,
    //fitness by parameter bits, so repeated genomes are not re-run
    cache: HashMap<Vec<u64>, Option<f64>>,
}

impl<'a> Evaluator<'a> {
    fn new(
        bars: &'a [Bar],
        base: &'a BacktestConfig,
        config: &'a OptimizationConfig,
        factory: &'a dyn StrategyFactory,
    ) -> Self {
        Evaluator {
            bars,
            base,
            config,
            factory,
            runs: Vec::new(),
            best: None,
            total_runs: 0,
            factory_failures: 0,
            last_factory_error: None,
            cache: HashMap::new(),
        }
    }

    //objective of the run, none when it failed or broke a constraint
    fn evaluate(&mut self, parameters: &ParameterSet) -> Result<Option<f64>, OptimizationError> {
        let key: Vec<u64> = parameters.values().map(|v| v.to_bits()).collect();
        if let Some(cached) = self.cache.get(&key) {
            return Ok(*cached);
        }

        let score = self.run(parameters)?;
        self.cache.insert(key, score);
        Ok(score)
    }

    fn run(&mut self, parameters: &ParameterSet) -> Result<Option<f64>, OptimizationError> {
        self.total_runs += 1;

        let mut config = self.base.clone();
        for (name, value) in parameters {
            config.strategy.parameters.insert(name.clone(), *value);
        }

        let mut strategy = match self.factory.create(&config.strategy) {
            Ok(strategy) => strategy,
            Err(err) => {
                warn!("Skipping {:?}: {:#}", parameters, err);
                self.factory_failures += 1;
                self.last_factory_error = Some(err);
                return Ok(None);
            }
        };

        let mut engine = BacktestEngine::new(config)?;
        let result = engine.run(self.bars, strategy.as_mut());

        if !result.is_completed() {
            warn!(
                "Run {:?} failed: {}",
                parameters,
                result.error.as_deref().unwrap_or("unknown error")
            );
            return Ok(None);
        }

        if !self.config.constraints.is_satisfied_by(&result.metrics) {
            debug!("Run {:?} rejected by constraints", parameters);
            return Ok(None);
        }

        let objective = self.config.objective.value(&result.metrics);
        debug!("Run {:?}: {} = {:.4}", parameters, self.config.objective, objective);

        self.runs.push(OptimizationRun {
            parameters: parameters.clone(),
            objective,
            metrics: result.metrics.clone(),
        });

        let improves = match &self.best {
            Some((_, best, _)) => self.config.is_better(objective, *best),
            None => true,
        };
        if improves {
            self.best = Some((parameters.clone(), objective, result));
        }

        Ok(Some(objective))
    }

    fn genes_to_parameters(&self, genes: &Genes) -> ParameterSet {
        self.config
            .parameters
            .iter()
            .zip(genes)
            .map(|(p, v)| (p.name.clone(), *v))
            .collect()
    }

    fn finish(
        mut self,
        method: OptimizationMethod,
        cancelled: bool,
        generations: Vec<GenerationSummary>,
        started: Instant,
    ) -> Result<OptimizationResult, OptimizationError> {
        let Some((best_parameters, best_objective, best_result)) = self.best.take() else {
            if cancelled {
                return Err(OptimizationError::Cancelled);
            }
            if self.factory_failures == self.total_runs {
                if let Some(err) = self.last_factory_error.take() {
                    return Err(OptimizationError::Strategy(err));
                }
            }
            return Err(OptimizationError::NoValidResults {
                runs: self.total_runs,
            });
        };

        let maximize = self.config.maximize;
        self.runs.sort_by(|a, b| {
            if maximize {
                b.objective.total_cmp(&a.objective)
            } else {
                a.objective.total_cmp(&b.objective)
            }
        });

        let result = OptimizationResult {
            method,
            objective: self.config.objective,
            maximize,
            best_parameters,
            best_objective,
            best_result,
            valid_runs: self.runs.len(),
            runs: self.runs,
            total_runs: self.total_runs,
            cancelled,
            generations,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        info!(
            "Optimization complete: best {} = {:.4} with {:?} ({}/{} valid runs{})",
            result.objective,
            result.best_objective,
            result.best_parameters,
            result.valid_runs,
            result.total_runs,
            if cancelled { ", cancelled" } else { "" }
        );

        Ok(result)
    }
}

//drives repeated backtests over a parameter space
#[derive(Debug, Default)]
pub struct OptimizationEngine {
    cancelled: Arc<AtomicBool>,
}

impl OptimizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    //requests a stop at the next combination or generation boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    //shared flag for cancelling from another thread
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn optimize(
        &self,
        bars: &[Bar],
        base_config: &BacktestConfig,
        config: &OptimizationConfig,
        factory: &dyn StrategyFactory,
        mut on_progress: Progress<'_>,
    ) -> Result<OptimizationResult, OptimizationError> {
        self.cancelled.store(false, Ordering::SeqCst);
        base_config.validate()?;
        config.validate()?;

        info!(
            "Starting {} optimization of {} over {} parameters ({} {})",
            config.method,
            base_config.strategy.name,
            config.parameters.len(),
            if config.maximize { "maximize" } else { "minimize" },
            config.objective
        );

        let started = Instant::now();
        let evaluator = Evaluator::new(bars, base_config, config, factory);

        match config.method {
            OptimizationMethod::Grid => self.grid_search(evaluator, &mut on_progress, started),
            OptimizationMethod::WalkForward => {
                let mut result = self.grid_search(evaluator, &mut on_progress, started)?;
                result.method = OptimizationMethod::WalkForward;
                Ok(result)
            }
            OptimizationMethod::Genetic => {
                self.genetic_search(evaluator, &mut on_progress, started)
            }
        }
    }

    fn grid_search(
        &self,
        mut evaluator: Evaluator<'_>,
        progress: &mut Progress<'_>,
        started: Instant,
    ) -> Result<OptimizationResult, OptimizationError> {
        let combinations = grid::combinations(&evaluator.config.parameters);
        let total = combinations.len();
        info!("Grid search: {} combinations", total);

        let mut cancelled = false;
        for (i, parameters) in combinations.iter().enumerate() {
            if self.is_cancelled() {
                info!("Grid search cancelled after {} of {} combinations", i, total);
                cancelled = true;
                break;
            }

            evaluator.evaluate(parameters)?;
            report(progress, (i + 1) as f64 / total as f64 * 100.0);
        }

        evaluator.finish(OptimizationMethod::Grid, cancelled, Vec::new(), started)
    }

    fn genetic_search(
        &self,
        mut evaluator: Evaluator<'_>,
        progress: &mut Progress<'_>,
        started: Instant,
    ) -> Result<OptimizationResult, OptimizationError> {
        let config = evaluator.config;
        let settings = &config.genetic;
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut population: Vec<Genes> = (0..settings.population_size)
            .map(|_| genetic::random_genes(&mut rng, &config.parameters))
            .collect();
        let mut summaries = Vec::with_capacity(settings.generations);
        let mut cancelled = false;

        for generation in 0..settings.generations {
            if self.is_cancelled() {
                info!("Genetic search cancelled at generation {}", generation);
                cancelled = true;
                break;
            }

            let mut scored: Vec<(Genes, Option<f64>)> = Vec::with_capacity(population.len());
            for genes in population {
                let parameters = evaluator.genes_to_parameters(&genes);
                let score = evaluator.evaluate(&parameters)?;
                scored.push((genes, score));
            }

            //best first, failed individuals last
            scored.sort_by(|(_, a), (_, b)| match (a, b) {
                (Some(a), Some(b)) if config.maximize => b.total_cmp(a),
                (Some(a), Some(b)) => a.total_cmp(b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });

            let scores: Vec<f64> = scored.iter().filter_map(|(_, s)| *s).collect();
            let summary = GenerationSummary {
                generation,
                best_objective: scores.first().copied(),
                mean_objective: if scores.is_empty() {
                    None
                } else {
                    Some(scores.iter().sum::<f64>() / scores.len() as f64)
                },
                valid_individuals: scores.len(),
            };
            debug!(
                "Generation {}: best {:?}, mean {:?}, {} valid",
                generation, summary.best_objective, summary.mean_objective, summary.valid_individuals
            );
            summaries.push(summary);

            report(
                progress,
                (generation + 1) as f64 / settings.generations as f64 * 100.0,
            );

            let ranked: Vec<Genes> = scored.into_iter().map(|(genes, _)| genes).collect();
            population = genetic::next_generation(&mut rng, &ranked, &config.parameters, settings);
        }

        evaluator.finish(OptimizationMethod::Genetic, cancelled, summaries, started)
    }
}
