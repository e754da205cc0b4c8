use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How far repeated observations are lifted above the curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JitterParams {
    /// Added to a value's counter every time the value recurs.
    pub step: f64,
    /// Density units per counter unit.
    pub increment: f64,
}

impl Default for JitterParams {
    fn default() -> Self {
        Self {
            step: 0.5,
            increment: 0.02,
        }
    }
}

// 0.0 and -0.0 compare equal, so they share a counter.
fn value_key(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Vertical marker positions for `values` plotted on `density_fn`.
///
/// The first occurrence of a value sits on the curve; each later occurrence
/// of the exact same value is lifted by another `step * increment`. Values
/// that are merely close are not grouped.
pub fn layout_offsets<F>(values: &[f64], density_fn: F, params: JitterParams) -> Vec<f64>
where
    F: Fn(f64) -> f64,
{
    let mut counters: HashMap<u64, f64> = HashMap::new();
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        let count = match counters.get_mut(&value_key(v)) {
            Some(c) => {
                *c += params.step;
                *c
            }
            None => {
                counters.insert(value_key(v), 0.0);
                0.0
            }
        };
        out.push(density_fn(v) + params.increment * count);
    }
    out
}
