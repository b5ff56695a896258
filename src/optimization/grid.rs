use crate::config::OptimizationParameter;
use crate::optimization::ParameterSet;

//every value of one axis, min..=max by step
pub fn parameter_values(parameter: &OptimizationParameter) -> Vec<f64> {
    if !(parameter.step > 0.0) || parameter.max < parameter.min {
        return vec![parameter.normalize(parameter.min)];
    }

    //tolerance keeps max reachable despite float steps
    let steps = ((parameter.max - parameter.min) / parameter.step + 1e-9).floor() as usize;
    let mut values: Vec<f64> = (0..=steps)
        .map(|i| parameter.normalize(parameter.min + i as f64 * parameter.step))
        .collect();
    values.dedup();
    values
}

//number of combinations without materializing them
pub fn grid_size(parameters: &[OptimizationParameter]) -> usize {
    parameters
        .iter()
        .map(|p| parameter_values(p).len())
        .product()
}

//cartesian product of all axes, first parameter varying slowest
pub fn combinations(parameters: &[OptimizationParameter]) -> Vec<ParameterSet> {
    let mut out = Vec::with_capacity(grid_size(parameters));
    let mut current = ParameterSet::new();
    expand(parameters, &mut current, &mut out);
    out
}

fn expand(parameters: &[OptimizationParameter], current: &mut ParameterSet, out: &mut Vec<ParameterSet>) {
    let Some((first, rest)) = parameters.split_first() else {
        out.push(current.clone());
        return;
    };

    for value in parameter_values(first) {
        current.insert(first.name.clone(), value);
        expand(rest, current, out);
    }
    current.shift_remove(&first.name);
}
