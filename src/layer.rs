//! A single dense layer.
//!
//! Layer `n` maps the `inputs`-wide output of layer `n - 1` to `neurons` values:
//!
//! - `z = W * x + b`
//! - `y = activation(z)`
//!
//! The input layer (ordinal 0) has no predecessor: its weights are the identity and its
//! biases are zero, so it only applies its activation.

use rand::Rng;

use crate::backend::BackendHandle;
use crate::optim::Optimizer;
use crate::{Activation, Error, Matrix, Result};

#[derive(Debug, Clone)]
pub struct Layer {
    ordinal: usize,
    neurons: usize,
    /// `0` for the input layer.
    inputs: usize,
    activation: Activation,
    /// Shape `(neurons, inputs)`; `(neurons, neurons)` identity for the input layer.
    weights: Matrix,
    /// Shape `(neurons, 1)`.
    biases: Matrix,
    /// Backprop error signal, shape `(neurons, 1)`.
    deltas: Matrix,
    optimizer: Option<Box<dyn Optimizer>>,
}

impl Layer {
    /// The input layer: identity weights and zero biases.
    ///
    /// Panics if `neurons == 0`.
    pub fn input(neurons: usize, activation: Activation) -> Self {
        Self {
            ordinal: 0,
            neurons,
            inputs: 0,
            activation,
            weights: Matrix::identity(neurons),
            biases: Matrix::zeros(neurons, 1),
            deltas: Matrix::zeros(neurons, 1),
            optimizer: None,
        }
    }

    /// A hidden or output layer with weights and biases drawn uniformly from `[-1, 1]`.
    ///
    /// Panics if `inputs == 0` or `neurons == 0`.
    pub fn dense<R: Rng + ?Sized>(
        ordinal: usize,
        inputs: usize,
        neurons: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        assert!(ordinal > 0, "ordinal 0 is reserved for the input layer");
        Self {
            ordinal,
            neurons,
            inputs,
            activation,
            weights: Matrix::random_with_rng(neurons, inputs, rng),
            biases: Matrix::random_with_rng(neurons, 1, rng),
            deltas: Matrix::zeros(neurons, 1),
            optimizer: None,
        }
    }

    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[inline]
    pub fn neurons(&self) -> usize {
        self.neurons
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.ordinal == 0
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &Matrix {
        &self.biases
    }

    #[inline]
    pub fn deltas(&self) -> &Matrix {
        &self.deltas
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    /// Width this layer expects from its predecessor.
    fn expected_input(&self) -> usize {
        if self.is_input() {
            self.neurons
        } else {
            self.inputs
        }
    }

    /// `W * x + b`.
    pub fn pre_activation(&self, input: &Matrix) -> Result<Matrix> {
        if input.shape() != (self.expected_input(), 1) {
            return Err(Error::InvalidShape(format!(
                "layer {} expects a {}x1 input, got {}x{}",
                self.ordinal,
                self.expected_input(),
                input.rows(),
                input.cols()
            )));
        }
        self.weights.matmul(input)?.add(&self.biases)
    }

    /// `activation(W * x + b)`.
    pub fn output(&self, input: &Matrix) -> Result<Matrix> {
        Ok(self.activation.apply(&self.pre_activation(input)?))
    }

    pub fn set_weights(&mut self, weights: Matrix) -> Result<()> {
        let expected = (self.neurons, self.expected_input());
        if weights.shape() != expected {
            return Err(Error::InvalidShape(format!(
                "layer {} weights must be {}x{}, got {}x{}",
                self.ordinal,
                expected.0,
                expected.1,
                weights.rows(),
                weights.cols()
            )));
        }
        self.weights = weights.with_backend(self.weights.backend().cloned());
        Ok(())
    }

    pub fn set_biases(&mut self, biases: Matrix) -> Result<()> {
        if biases.shape() != (self.neurons, 1) {
            return Err(Error::InvalidShape(format!(
                "layer {} biases must be {}x1, got {}x{}",
                self.ordinal,
                self.neurons,
                biases.rows(),
                biases.cols()
            )));
        }
        self.biases = biases.with_backend(self.biases.backend().cloned());
        Ok(())
    }

    pub fn set_activation(&mut self, activation: Activation) -> Result<()> {
        activation.validate()?;
        self.activation = activation;
        Ok(())
    }

    pub fn set_deltas(&mut self, deltas: Matrix) -> Result<()> {
        if deltas.shape() != (self.neurons, 1) {
            return Err(Error::InvalidShape(format!(
                "layer {} deltas must be {}x1, got {}x{}",
                self.ordinal,
                self.neurons,
                deltas.rows(),
                deltas.cols()
            )));
        }
        self.deltas = deltas.with_backend(self.deltas.backend().cloned());
        Ok(())
    }

    pub fn set_optimizer(&mut self, optimizer: Box<dyn Optimizer>) {
        self.optimizer = Some(optimizer);
    }

    pub fn set_backend(&mut self, backend: Option<BackendHandle>) {
        self.weights.set_backend(backend.clone());
        self.biases.set_backend(backend.clone());
        self.deltas.set_backend(backend);
    }

    /// Hand the gradients to this layer's optimizer.
    pub fn apply_gradients(&mut self, weight_grads: &Matrix, bias_grads: &Matrix) -> Result<()> {
        let Some(optimizer) = self.optimizer.as_mut() else {
            return Err(Error::InvalidConfig(format!(
                "layer {} has no optimizer; call select_optimizer first",
                self.ordinal
            )));
        };
        optimizer.update_weights(&mut self.weights, weight_grads)?;
        optimizer.update_biases(&mut self.biases, bias_grads)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::optim::GradientDescent;

    fn v(values: &[f64]) -> Matrix {
        Matrix::column_vector(values.to_vec()).unwrap()
    }

    #[test]
    fn input_layer_passes_values_through() {
        let layer = Layer::input(3, Activation::Identity);
        let x = v(&[0.5, -2.0, 7.25]);
        assert_eq!(layer.output(&x).unwrap(), x);
    }

    #[test]
    fn input_layer_still_applies_its_activation() {
        let layer = Layer::input(3, Activation::ReLU);
        let y = layer.output(&v(&[-1.0, 0.0, 2.0])).unwrap();
        assert_eq!(y.as_slice(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn dense_layer_computes_affine_then_activation() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Layer::dense(1, 2, 1, Activation::Identity, &mut rng);
        layer
            .set_weights(Matrix::from_rows(&[vec![2.0, -1.0]]).unwrap())
            .unwrap();
        layer.set_biases(v(&[0.5])).unwrap();

        let z = layer.pre_activation(&v(&[3.0, 4.0])).unwrap();
        assert_eq!(z.as_slice(), &[2.5]);

        layer.set_activation(Activation::ReLU).unwrap();
        assert_eq!(layer.output(&v(&[-3.0, 4.0])).unwrap().as_slice(), &[0.0]);
    }

    #[test]
    fn dense_init_is_in_unit_interval_and_seeded() {
        let a = Layer::dense(1, 4, 3, Activation::Sigmoid, &mut StdRng::seed_from_u64(9));
        let b = Layer::dense(1, 4, 3, Activation::Sigmoid, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.biases(), b.biases());
        assert_eq!(a.weights().shape(), (3, 4));
        assert!(
            a.weights()
                .as_slice()
                .iter()
                .chain(a.biases().as_slice())
                .all(|w| (-1.0..=1.0).contains(w))
        );
    }

    #[test]
    fn setters_reject_wrong_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Layer::dense(1, 2, 3, Activation::Identity, &mut rng);
        assert!(layer.set_weights(Matrix::zeros(2, 3)).is_err());
        assert!(layer.set_biases(Matrix::zeros(3, 2)).is_err());
        assert!(layer.set_deltas(Matrix::zeros(2, 1)).is_err());
        assert!(layer.pre_activation(&v(&[1.0, 2.0, 3.0])).is_err());
        assert!(
            layer
                .set_activation(Activation::Elu { alpha: f64::INFINITY })
                .is_err()
        );
    }

    #[test]
    fn applying_gradients_requires_an_optimizer() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Layer::dense(1, 1, 1, Activation::Identity, &mut rng);
        let g = Matrix::zeros(1, 1);
        assert!(matches!(
            layer.apply_gradients(&g, &g),
            Err(Error::InvalidConfig(_))
        ));

        layer.set_optimizer(Box::new(GradientDescent::new(1.0).unwrap()));
        layer.set_weights(v(&[1.0])).unwrap();
        layer.set_biases(v(&[1.0])).unwrap();
        layer.apply_gradients(&v(&[0.25]), &v(&[-0.5])).unwrap();
        assert_eq!(layer.weights().as_slice(), &[0.75]);
        assert_eq!(layer.biases().as_slice(), &[1.5]);
    }
}
