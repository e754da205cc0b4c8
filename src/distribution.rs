use crate::jitter::{layout_offsets, JitterParams};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

const CURVE_POINTS: usize = 100;
const CURVE_HALF_WIDTH_SIGMAS: f64 = 4.0;
const SIGMA_MARKERS: std::ops::RangeInclusive<i32> = -3..=3;
const Y_RANGE_FLOOR: f64 = -0.05;
const Y_RANGE_HEADROOM: f64 = 1.2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("no observations to estimate a distribution from")]
    Empty,

    #[error("standard deviation is zero or undefined (mean {mean}, std dev {std_dev})")]
    Degenerate { mean: f64, std_dev: f64 },
}

impl DistributionError {
    pub fn code(&self) -> &'static str {
        match self {
            DistributionError::Empty => "empty_observations",
            DistributionError::Degenerate { .. } => "degenerate_distribution",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gaussian {
    mean: f64,
    std_dev: f64,
}

impl Gaussian {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, DistributionError> {
        if !mean.is_finite() || !std_dev.is_finite() || std_dev <= 0.0 {
            return Err(DistributionError::Degenerate { mean, std_dev });
        }
        Ok(Self { mean, std_dev })
    }

    /// Mean and sample (n - 1) standard deviation of `values`.
    pub fn from_observations(values: &[f64]) -> Result<Self, DistributionError> {
        let mean = mean(values).ok_or(DistributionError::Empty)?;
        let std_dev = sample_std_dev(values).unwrap_or(0.0);
        Self::new(mean, std_dev)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std_dev;
        (-0.5 * z * z).exp() / (self.std_dev * (2.0 * PI).sqrt())
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `None` below two observations.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Where the backdrop curve's parameters come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReferencePolicy {
    /// Mean and standard deviation of the plotted values.
    #[default]
    Observed,
    #[serde(rename_all = "camelCase")]
    Fixed { mean: f64, std_dev: f64 },
    /// Constant mean, standard deviation from the plotted values.
    FixedMean { mean: f64 },
}

impl ReferencePolicy {
    pub fn resolve(&self, values: &[f64]) -> Result<Gaussian, DistributionError> {
        match *self {
            ReferencePolicy::Observed => Gaussian::from_observations(values),
            ReferencePolicy::Fixed { mean, std_dev } => Gaussian::new(mean, std_dev),
            ReferencePolicy::FixedMean { mean } => {
                if values.is_empty() {
                    return Err(DistributionError::Empty);
                }
                Gaussian::new(mean, sample_std_dev(values).unwrap_or(0.0))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigmaMarker {
    pub k: i32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPoint {
    pub label: String,
    pub value: f64,
    pub y: f64,
    pub deviation: f64,
}

/// Everything a chart needs to draw a density backdrop with one marker per
/// observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionView {
    pub mean: f64,
    pub std_dev: f64,
    pub curve: Vec<[f64; 2]>,
    pub sigma_markers: Vec<SigmaMarker>,
    pub y_range: [f64; 2],
    pub points: Vec<DistributionPoint>,
}

pub fn distribution_view(
    observations: &[(String, f64)],
    policy: ReferencePolicy,
    jitter: JitterParams,
) -> Result<DistributionView, DistributionError> {
    let values: Vec<f64> = observations.iter().map(|(_, v)| *v).collect();
    let g = policy.resolve(&values)?;

    let lo = g.mean() - CURVE_HALF_WIDTH_SIGMAS * g.std_dev();
    let hi = g.mean() + CURVE_HALF_WIDTH_SIGMAS * g.std_dev();
    let step = (hi - lo) / (CURVE_POINTS - 1) as f64;
    let curve: Vec<[f64; 2]> = (0..CURVE_POINTS)
        .map(|i| {
            let x = lo + step * i as f64;
            [x, g.pdf(x)]
        })
        .collect();
    let peak = curve.iter().map(|p| p[1]).fold(0.0_f64, f64::max);

    let sigma_markers = SIGMA_MARKERS
        .map(|k| {
            let x = g.mean() + k as f64 * g.std_dev();
            SigmaMarker { k, x, y: g.pdf(x) }
        })
        .collect();

    let ys = layout_offsets(&values, |x| g.pdf(x), jitter);
    let points = observations
        .iter()
        .zip(ys)
        .map(|((label, value), y)| DistributionPoint {
            label: label.clone(),
            value: *value,
            y,
            deviation: value - g.mean(),
        })
        .collect();

    Ok(DistributionView {
        mean: g.mean(),
        std_dev: g.std_dev(),
        curve,
        sigma_markers,
        y_range: [Y_RANGE_FLOOR, peak * Y_RANGE_HEADROOM],
        points,
    })
}
