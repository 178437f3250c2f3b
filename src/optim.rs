//! Optimizers.
//!
//! An optimizer turns an accumulated gradient into an in-place update of a weight or
//! bias matrix. Each layer owns its own optimizer instance, so running statistics
//! never leak across layers; [`Optimizer::clone_box`] hands out a copy with the same
//! hyperparameters and fresh state.
//!
//! Design notes:
//! - State (moments, squared-gradient caches) is allocated lazily on the first update
//!   and shaped like the target matrix.
//! - Weights and biases keep separate caches.
//! - A later update whose target or gradient shape differs from the cache is rejected
//!   with [`Error::InvalidShape`].

use std::fmt;

use crate::{Error, Matrix, Result};

const RMS_DECAY: f64 = 0.9;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADADELTA_DECAY: f64 = 0.9;
const EPS: f64 = 1e-8;
const ADADELTA_EPS: f64 = 1e-6;

/// Update rule applied to one layer's parameters.
pub trait Optimizer: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Update `weights` in place from `gradients`.
    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()>;

    /// Update `biases` in place from `gradients`.
    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()>;

    /// Drop all running statistics.
    fn reset(&mut self);

    /// Same hyperparameters, fresh state.
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

impl Clone for Box<dyn Optimizer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn check_gradient(target: &Matrix, gradients: &Matrix) -> Result<()> {
    if target.shape() != gradients.shape() {
        return Err(Error::InvalidShape(format!(
            "gradient shape {:?} does not match parameter shape {:?}",
            gradients.shape(),
            target.shape()
        )));
    }
    Ok(())
}

/// Borrow the cache in `slot`, allocating it shaped like `target` on first use.
fn cache<'a>(slot: &'a mut Option<Matrix>, target: &Matrix) -> Result<&'a mut Matrix> {
    let cache = slot.get_or_insert_with(|| Matrix::zeros(target.rows(), target.cols()));
    if cache.shape() != target.shape() {
        return Err(Error::InvalidShape(format!(
            "optimizer state was shaped {:?} but the parameter is {:?}",
            cache.shape(),
            target.shape()
        )));
    }
    Ok(cache)
}

fn validate_lr(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

/// `param -= lr * grad`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    lr: f64,
}

impl GradientDescent {
    pub fn new(lr: f64) -> Result<Self> {
        validate_lr(lr)?;
        Ok(Self { lr })
    }

    fn step(&self, param: &mut Matrix, grad: &Matrix) -> Result<()> {
        check_gradient(param, grad)?;
        for (p, &g) in param.as_mut_slice().iter_mut().zip(grad.as_slice()) {
            *p -= self.lr * g;
        }
        Ok(())
    }
}

impl Optimizer for GradientDescent {
    fn name(&self) -> &'static str {
        "gradient-descent"
    }

    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()> {
        self.step(weights, gradients)
    }

    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()> {
        self.step(biases, gradients)
    }

    fn reset(&mut self) {}

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(*self)
    }
}

/// Scales each step by a decaying average of squared gradients.
#[derive(Debug, Clone)]
pub struct RmsProp {
    lr: f64,
    cache_w: Option<Matrix>,
    cache_b: Option<Matrix>,
}

impl RmsProp {
    pub fn new(lr: f64) -> Result<Self> {
        validate_lr(lr)?;
        Ok(Self {
            lr,
            cache_w: None,
            cache_b: None,
        })
    }

    fn step(lr: f64, slot: &mut Option<Matrix>, param: &mut Matrix, grad: &Matrix) -> Result<()> {
        check_gradient(param, grad)?;
        let cache = cache(slot, param)?;
        let it = param
            .as_mut_slice()
            .iter_mut()
            .zip(cache.as_mut_slice())
            .zip(grad.as_slice());
        for ((p, c), &g) in it {
            *c = RMS_DECAY * *c + (1.0 - RMS_DECAY) * g * g;
            *p -= lr * g / (c.sqrt() + EPS);
        }
        Ok(())
    }
}

impl Optimizer for RmsProp {
    fn name(&self) -> &'static str {
        "rmsprop"
    }

    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.cache_w, weights, gradients)
    }

    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.cache_b, biases, gradients)
    }

    fn reset(&mut self) {
        self.cache_w = None;
        self.cache_b = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(Self {
            lr: self.lr,
            cache_w: None,
            cache_b: None,
        })
    }
}

/// Adam step counter and moments for one parameter matrix.
#[derive(Debug, Clone, Default)]
struct Moments {
    t: i32,
    m: Option<Matrix>,
    v: Option<Matrix>,
}

/// Adam (bias-corrected).
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    weights: Moments,
    biases: Moments,
}

impl Adam {
    pub fn new(lr: f64) -> Result<Self> {
        validate_lr(lr)?;
        Ok(Self {
            lr,
            weights: Moments::default(),
            biases: Moments::default(),
        })
    }

    fn step(lr: f64, state: &mut Moments, param: &mut Matrix, grad: &Matrix) -> Result<()> {
        check_gradient(param, grad)?;
        // Shape both caches before advancing `t`, so a rejected call leaves no trace.
        cache(&mut state.m, param)?;
        cache(&mut state.v, param)?;
        let (Some(m), Some(v)) = (state.m.as_mut(), state.v.as_mut()) else {
            return Err(Error::InvalidConfig("adam state missing".to_owned()));
        };

        state.t += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(state.t);
        let bc2 = 1.0 - ADAM_BETA2.powi(state.t);

        let it = param
            .as_mut_slice()
            .iter_mut()
            .zip(m.as_mut_slice())
            .zip(v.as_mut_slice())
            .zip(grad.as_slice());
        for (((p, m), v), &g) in it {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + EPS);
        }
        Ok(())
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.weights, weights, gradients)
    }

    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.biases, biases, gradients)
    }

    fn reset(&mut self) {
        self.weights = Moments::default();
        self.biases = Moments::default();
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(Self {
            lr: self.lr,
            weights: Moments::default(),
            biases: Moments::default(),
        })
    }
}

/// Accumulates squared gradients for the lifetime of the instance.
#[derive(Debug, Clone)]
pub struct Adagrad {
    lr: f64,
    cache_w: Option<Matrix>,
    cache_b: Option<Matrix>,
}

impl Adagrad {
    pub fn new(lr: f64) -> Result<Self> {
        validate_lr(lr)?;
        Ok(Self {
            lr,
            cache_w: None,
            cache_b: None,
        })
    }

    fn step(lr: f64, slot: &mut Option<Matrix>, param: &mut Matrix, grad: &Matrix) -> Result<()> {
        check_gradient(param, grad)?;
        let cache = cache(slot, param)?;
        let it = param
            .as_mut_slice()
            .iter_mut()
            .zip(cache.as_mut_slice())
            .zip(grad.as_slice());
        for ((p, c), &g) in it {
            *c += g * g;
            *p -= lr * g / (c.sqrt() + EPS);
        }
        Ok(())
    }
}

impl Optimizer for Adagrad {
    fn name(&self) -> &'static str {
        "adagrad"
    }

    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.cache_w, weights, gradients)
    }

    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(self.lr, &mut self.cache_b, biases, gradients)
    }

    fn reset(&mut self) {
        self.cache_w = None;
        self.cache_b = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(Self {
            lr: self.lr,
            cache_w: None,
            cache_b: None,
        })
    }
}

/// Gradient and update accumulators for one parameter matrix.
#[derive(Debug, Clone, Default)]
struct Accumulators {
    grad: Option<Matrix>,
    update: Option<Matrix>,
}

/// Adadelta: no learning rate, step size comes from the ratio of the two running
/// averages. The computed update is added to the parameter as is.
#[derive(Debug, Clone, Default)]
pub struct Adadelta {
    weights: Accumulators,
    biases: Accumulators,
}

impl Adadelta {
    pub fn new() -> Self {
        Self::default()
    }

    fn step(state: &mut Accumulators, param: &mut Matrix, grad: &Matrix) -> Result<()> {
        check_gradient(param, grad)?;
        cache(&mut state.grad, param)?;
        cache(&mut state.update, param)?;
        let (Some(grad_acc), Some(update_acc)) = (state.grad.as_mut(), state.update.as_mut())
        else {
            return Err(Error::InvalidConfig("adadelta state missing".to_owned()));
        };

        let it = param
            .as_mut_slice()
            .iter_mut()
            .zip(grad_acc.as_mut_slice())
            .zip(update_acc.as_mut_slice())
            .zip(grad.as_slice());
        for (((p, ga), ua), &g) in it {
            *ga = ADADELTA_DECAY * *ga + (1.0 - ADADELTA_DECAY) * g * g;
            let update = -((*ua + ADADELTA_EPS).sqrt() / (*ga + ADADELTA_EPS).sqrt()) * g;
            *ua = ADADELTA_DECAY * *ua + (1.0 - ADADELTA_DECAY) * update * update;
            *p += update;
        }
        Ok(())
    }
}

impl Optimizer for Adadelta {
    fn name(&self) -> &'static str {
        "adadelta"
    }

    fn update_weights(&mut self, weights: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(&mut self.weights, weights, gradients)
    }

    fn update_biases(&mut self, biases: &mut Matrix, gradients: &Matrix) -> Result<()> {
        Self::step(&mut self.biases, biases, gradients)
    }

    fn reset(&mut self) {
        self.weights = Accumulators::default();
        self.biases = Accumulators::default();
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(Self::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Optimizer choice, as used by configuration surfaces.
pub enum OptimizerKind {
    GradientDescent { lr: f64 },
    RmsProp { lr: f64 },
    Adam { lr: f64 },
    Adagrad { lr: f64 },
    /// Deliberately rate-free. Gradients reach every optimizer unscaled, so there is
    /// no outer learning rate to fold in either; a CLI `--lr` has no effect here.
    Adadelta,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::GradientDescent { lr: 0.01 }
    }
}

impl OptimizerKind {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            OptimizerKind::GradientDescent { lr }
            | OptimizerKind::RmsProp { lr }
            | OptimizerKind::Adam { lr }
            | OptimizerKind::Adagrad { lr } => validate_lr(lr),
            OptimizerKind::Adadelta => Ok(()),
        }
    }

    /// Instantiate an optimizer with fresh state.
    pub fn build(self) -> Result<Box<dyn Optimizer>> {
        Ok(match self {
            OptimizerKind::GradientDescent { lr } => Box::new(GradientDescent::new(lr)?),
            OptimizerKind::RmsProp { lr } => Box::new(RmsProp::new(lr)?),
            OptimizerKind::Adam { lr } => Box::new(Adam::new(lr)?),
            OptimizerKind::Adagrad { lr } => Box::new(Adagrad::new(lr)?),
            OptimizerKind::Adadelta => Box::new(Adadelta::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tol={tol})");
    }

    fn scalar(v: f64) -> Matrix {
        Matrix::from_flat(vec![v], 1, 1).unwrap()
    }

    #[test]
    fn gradient_descent_steps_against_the_gradient() {
        let mut opt = GradientDescent::new(0.5).unwrap();
        let mut w = Matrix::from_flat(vec![1.0, 2.0], 1, 2).unwrap();
        let g = Matrix::from_flat(vec![2.0, -2.0], 1, 2).unwrap();
        opt.update_weights(&mut w, &g).unwrap();
        assert_eq!(w.as_slice(), &[0.0, 3.0]);
    }

    #[test]
    fn rmsprop_first_step() {
        let mut opt = RmsProp::new(0.1).unwrap();
        let mut w = scalar(0.0);
        opt.update_weights(&mut w, &scalar(2.0)).unwrap();
        // cache = 0.1 * 4 = 0.4
        assert_close(w.get(0, 0), -0.1 * 2.0 / (0.4_f64.sqrt() + 1e-8), 1e-12);
    }

    #[test]
    fn adagrad_accumulates_squares() {
        let mut opt = Adagrad::new(1.0).unwrap();
        let mut b = scalar(0.0);
        opt.update_biases(&mut b, &scalar(3.0)).unwrap();
        opt.update_biases(&mut b, &scalar(4.0)).unwrap();
        let expected = -3.0 / (3.0 + 1e-8) - 4.0 / (5.0 + 1e-8);
        assert_close(b.get(0, 0), expected, 1e-12);
    }

    #[test]
    fn adam_first_moment_is_unbiased_after_one_step() {
        let mut opt = Adam::new(0.01).unwrap();
        let mut w = Matrix::from_flat(vec![0.5, -0.5, 1.0], 3, 1).unwrap();
        let g = Matrix::from_flat(vec![0.3, -1.2, 4.0], 3, 1).unwrap();
        opt.update_weights(&mut w, &g).unwrap();

        assert_eq!(opt.weights.t, 1);
        let m = opt.weights.m.as_ref().unwrap();
        let bc1 = 1.0 - ADAM_BETA1.powi(1);
        for (&m, &g) in m.as_slice().iter().zip(g.as_slice()) {
            assert_close(m / bc1, g, 1e-12);
        }
        // Biases keep their own counter.
        assert_eq!(opt.biases.t, 0);
    }

    #[test]
    fn adam_first_step_has_magnitude_lr() {
        let mut opt = Adam::new(0.01).unwrap();
        let mut w = scalar(1.0);
        opt.update_weights(&mut w, &scalar(5.0)).unwrap();
        assert_close(w.get(0, 0), 1.0 - 0.01, 1e-9);
    }

    #[test]
    fn adadelta_follows_reference_trajectory() {
        let mut opt = Adadelta::new();
        let mut w = scalar(0.0);

        opt.update_weights(&mut w, &scalar(1.0)).unwrap();
        let step1 = -(1e-6_f64).sqrt() / (0.1_f64 + 1e-6).sqrt();
        assert_close(w.get(0, 0), step1, 1e-15);

        opt.update_weights(&mut w, &scalar(1.0)).unwrap();
        let update_acc = 0.1 * step1 * step1;
        let grad_acc = 0.9 * 0.1 + 0.1;
        let step2 = -(update_acc + 1e-6_f64).sqrt() / (grad_acc + 1e-6_f64).sqrt();
        assert_close(w.get(0, 0), step1 + step2, 1e-15);

        // Positive gradients move the parameter down.
        assert!(w.get(0, 0) < step1);
    }

    #[test]
    fn cache_shape_mismatch_is_rejected() {
        let mut opt = RmsProp::new(0.1).unwrap();
        let mut w = Matrix::zeros(2, 2);
        opt.update_weights(&mut w, &Matrix::zeros(2, 2)).unwrap();

        let mut other = Matrix::zeros(3, 2);
        let err = opt
            .update_weights(&mut other, &Matrix::zeros(3, 2))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));

        let err = opt.update_biases(&mut w, &Matrix::zeros(1, 2)).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));
    }

    #[test]
    fn clone_box_starts_from_fresh_state() {
        let mut opt = Adam::new(0.01).unwrap();
        let mut w = Matrix::zeros(2, 2);
        opt.update_weights(&mut w, &Matrix::identity(2)).unwrap();

        // A fresh clone accepts a differently shaped target.
        let mut fresh = opt.clone_box();
        let mut other = Matrix::zeros(3, 1);
        assert!(fresh.update_weights(&mut other, &Matrix::zeros(3, 1)).is_ok());

        opt.reset();
        assert!(opt.update_weights(&mut other, &Matrix::zeros(3, 1)).is_ok());
    }

    #[test]
    fn optimizer_kind_validates_learning_rate() {
        assert!(OptimizerKind::Adam { lr: 0.0 }.validate().is_err());
        assert!(OptimizerKind::RmsProp { lr: f64::NAN }.build().is_err());
        assert!(OptimizerKind::Adadelta.validate().is_ok());
        assert_eq!(
            OptimizerKind::Adagrad { lr: 0.1 }.build().unwrap().name(),
            "adagrad"
        );
    }
}
