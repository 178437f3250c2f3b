//! Prediction quality report.
//!
//! Metrics are evaluation helpers (they do not participate in backprop).

use crate::{Error, Matrix, Model, Result};

#[derive(Debug, Clone, PartialEq)]
/// Mean absolute deviation between predictions and targets, per sample and overall.
pub struct DeviationReport {
    /// `mean(|target - prediction|)` for every sample, in input order.
    pub per_sample: Vec<f64>,
    /// Mean of `per_sample`.
    pub mean: f64,
    /// Index and value of the smallest deviation.
    pub min: (usize, f64),
    /// Index and value of the largest deviation.
    pub max: (usize, f64),
}

impl DeviationReport {
    /// Build a report from per-sample deviations. Fails on an empty input.
    pub fn from_deviations(per_sample: Vec<f64>) -> Result<Self> {
        let Some(&first) = per_sample.first() else {
            return Err(Error::InvalidData(
                "deviation report needs at least one sample".to_owned(),
            ));
        };

        let mut min = (0, first);
        let mut max = (0, first);
        for (i, &d) in per_sample.iter().enumerate().skip(1) {
            if d < min.1 {
                min = (i, d);
            }
            if d > max.1 {
                max = (i, d);
            }
        }
        let mean = per_sample.iter().sum::<f64>() / per_sample.len() as f64;

        Ok(Self {
            per_sample,
            mean,
            min,
            max,
        })
    }

    /// `1 - mean`.
    #[inline]
    pub fn accuracy(&self) -> f64 {
        1.0 - self.mean
    }
}

/// Mean absolute deviation of one prediction from its target.
pub fn deviation(prediction: &Matrix, target: &Matrix) -> Result<f64> {
    let diff = target.sub(prediction)?.map(f64::abs);
    Ok(diff.sum()? / diff.rows() as f64)
}

/// Predict every input and compare it with its target.
pub fn deviation_report(
    model: &Model,
    inputs: &[Matrix],
    targets: &[Matrix],
) -> Result<DeviationReport> {
    if inputs.len() != targets.len() {
        return Err(Error::InvalidData(format!(
            "{} inputs but {} targets",
            inputs.len(),
            targets.len()
        )));
    }

    let per_sample = inputs
        .iter()
        .zip(targets)
        .map(|(x, y)| deviation(&model.predict(x)?, y))
        .collect::<Result<Vec<_>>>()?;
    DeviationReport::from_deviations(per_sample)
}
