//! Loss functions.
//!
//! A [`LossFunction`] scores a prediction vector against a target vector and provides
//! the per-element derivative that seeds backpropagation:
//!
//! - run `model.predict(...)`
//! - compare with `loss.loss(prediction, target)`
//! - the model calls `loss.derivative(p_i, t_i)` for every output neuron
//!
//! Derivatives are "descent oriented": they are expressed as `target - prediction`, so
//! the gradient accumulated from them already points downhill.
//!
//! Both variants carry an optional L2 term `lambda * sum(w^2)` that is folded into
//! every derivative. The model refreshes the squared-weight sum from the output layer
//! before computing output deltas.

use crate::{Error, Matrix, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Supported loss functions.
pub enum Loss {
    /// Mean squared error.
    #[default]
    Mse,
    /// Mean absolute error.
    Mae,
}

impl Loss {
    pub fn name(self) -> &'static str {
        match self {
            Loss::Mse => "mse",
            Loss::Mae => "mae",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A loss kind together with its L2 regularization state.
pub struct LossFunction {
    kind: Loss,
    lambda: f64,
    weights_squared_sum: f64,
}

impl LossFunction {
    /// Create a loss with L2 strength `lambda` (`0.0` disables regularization).
    pub fn new(kind: Loss, lambda: f64) -> Result<Self> {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "L2 lambda must be finite and >= 0, got {lambda}"
            )));
        }
        Ok(Self {
            kind,
            lambda,
            weights_squared_sum: 0.0,
        })
    }

    pub fn mse(lambda: f64) -> Result<Self> {
        Self::new(Loss::Mse, lambda)
    }

    pub fn mae(lambda: f64) -> Result<Self> {
        Self::new(Loss::Mae, lambda)
    }

    #[inline]
    pub fn kind(&self) -> Loss {
        self.kind
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Scalar loss over two equally long column vectors.
    pub fn loss(&self, predicted: &Matrix, target: &Matrix) -> Result<f64> {
        if !predicted.is_vector() || !target.is_vector() || predicted.rows() != target.rows() {
            return Err(Error::InvalidShape(format!(
                "loss expects two column vectors of equal length, got {}x{} and {}x{}",
                predicted.rows(),
                predicted.cols(),
                target.rows(),
                target.cols()
            )));
        }

        let n = predicted.rows() as f64;
        let pairs = predicted.as_slice().iter().zip(target.as_slice());
        let total: f64 = match self.kind {
            Loss::Mse => pairs.map(|(p, t)| (p - t) * (p - t)).sum(),
            Loss::Mae => pairs.map(|(p, t)| (p - t).abs()).sum(),
        };
        Ok(total / n)
    }

    /// Descent-oriented derivative for a single output element, L2 term included.
    ///
    /// MAE has no derivative at `predicted == target`; it contributes `0` there.
    #[inline]
    pub fn derivative(&self, predicted: f64, target: f64) -> f64 {
        let diff = target - predicted;
        let base = match self.kind {
            Loss::Mse => 2.0 * diff,
            Loss::Mae => {
                if diff == 0.0 {
                    0.0
                } else {
                    diff.signum()
                }
            }
        };
        base + self.l2_penalty()
    }

    /// `lambda * sum(w^2)` over the weights last passed to
    /// [`LossFunction::set_weights_squared_sum`].
    #[inline]
    pub fn l2_penalty(&self) -> f64 {
        self.lambda * self.weights_squared_sum
    }

    pub fn set_weights_squared_sum(&mut self, weights: &[f64]) {
        self.weights_squared_sum = weights.iter().map(|w| w * w).sum();
    }
}

impl Default for LossFunction {
    fn default() -> Self {
        Self {
            kind: Loss::Mse,
            lambda: 0.0,
            weights_squared_sum: 0.0,
        }
    }
}
