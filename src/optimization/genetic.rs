use crate::config::{GeneticSettings, OptimizationParameter};
use rand::Rng;

//share of each generation carried over unchanged
pub const ELITE_FRACTION: f64 = 0.1;
pub const TOURNAMENT_SIZE: usize = 3;
//largest mutation step, as a fraction of the parameter range
pub const MUTATION_SCALE: f64 = 0.1;

pub type Genes = Vec<f64>;

pub fn elite_count(population_size: usize) -> usize {
    ((population_size as f64 * ELITE_FRACTION).floor() as usize)
        .max(1)
        .min(population_size)
}

fn clamp_gene(parameter: &OptimizationParameter, value: f64) -> f64 {
    parameter.normalize(value.clamp(parameter.min, parameter.max))
}

//uniformly random genes within each parameter's bounds
pub fn random_genes<R: Rng>(rng: &mut R, parameters: &[OptimizationParameter]) -> Genes {
    parameters
        .iter()
        .map(|p| {
            let value = if p.max > p.min {
                rng.gen_range(p.min..=p.max)
            } else {
                p.min
            };
            clamp_gene(p, value)
        })
        .collect()
}

//best of TOURNAMENT_SIZE random picks from a best-first ranking
pub fn tournament_select<'a, R: Rng>(rng: &mut R, ranked: &'a [Genes]) -> &'a Genes {
    let winner = (0..TOURNAMENT_SIZE)
        .map(|_| rng.gen_range(0..ranked.len()))
        .min()
        .unwrap_or(0);
    &ranked[winner]
}

//each gene taken from either parent with equal probability
pub fn uniform_crossover<R: Rng>(rng: &mut R, first: &Genes, second: &Genes) -> Genes {
    first
        .iter()
        .zip(second)
        .map(|(a, b)| if rng.gen::<bool>() { *a } else { *b })
        .collect()
}

//shifts one gene by up to MUTATION_SCALE of its range
pub fn mutate<R: Rng>(rng: &mut R, genes: &mut Genes, parameters: &[OptimizationParameter]) {
    if genes.is_empty() {
        return;
    }
    let index = rng.gen_range(0..genes.len());
    let parameter = &parameters[index];
    let delta = rng.gen_range(-MUTATION_SCALE..=MUTATION_SCALE) * parameter.range();
    genes[index] = clamp_gene(parameter, genes[index] + delta);
}

//breeds the next population from a best-first ranking of the current one
pub fn next_generation<R: Rng>(
    rng: &mut R,
    ranked: &[Genes],
    parameters: &[OptimizationParameter],
    settings: &GeneticSettings,
) -> Vec<Genes> {
    let size = settings.population_size;
    if ranked.is_empty() {
        return (0..size).map(|_| random_genes(rng, parameters)).collect();
    }

    let mut next: Vec<Genes> = ranked.iter().take(elite_count(size)).cloned().collect();

    while next.len() < size {
        let first = tournament_select(rng, ranked);
        let second = tournament_select(rng, ranked);

        let mut child = if rng.gen::<f64>() < settings.crossover_rate {
            uniform_crossover(rng, first, second)
        } else {
            first.clone()
        };

        if rng.gen::<f64>() < settings.mutation_rate {
            mutate(rng, &mut child, parameters);
        }

        next.push(child);
    }

    next
}
