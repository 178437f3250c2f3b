//! A network paired with the loss that trains it.
//!
//! One training step moves through three states:
//!
//! 1. forward: every sample in the batch is traced through the chain
//! 2. deltas: error signals are computed from the tail back to layer 1 and stored on
//!    each layer (averaged over the batch when it has more than one sample)
//! 3. update: [`Network::gradient_descent`] turns the stored deltas into parameter
//!    updates through each layer's optimizer

use tracing::debug;

use crate::backend::{BackendHandle, BackendKind};
use crate::network::Trace;
use crate::optim::Optimizer;
use crate::{Activation, Error, LossFunction, Matrix, Network, Result};

#[derive(Debug, Clone)]
pub struct Model {
    network: Network,
    loss: LossFunction,
}

impl Model {
    /// A model with only an input layer of width `input_width`.
    pub fn new(input_width: usize, activation: Activation, loss: LossFunction) -> Result<Self> {
        Ok(Self {
            network: Network::new(input_width, activation)?,
            loss,
        })
    }

    /// Like [`Model::new`], with deterministic initialization.
    pub fn new_with_seed(
        input_width: usize,
        activation: Activation,
        loss: LossFunction,
        seed: u64,
    ) -> Result<Self> {
        Ok(Self {
            network: Network::new_with_seed(input_width, activation, seed)?,
            loss,
        })
    }

    pub fn from_network(network: Network, loss: LossFunction) -> Self {
        Self { network, loss }
    }

    /// Append a layer of `neurons` after the current output layer.
    pub fn add_layer(&mut self, activation: Activation, neurons: usize) -> Result<usize> {
        self.network.append(activation, neurons)
    }

    /// Give every trainable layer its own fresh copy of `optimizer`.
    pub fn select_optimizer(&mut self, optimizer: &dyn Optimizer) {
        debug!(optimizer = optimizer.name(), "selecting optimizer");
        self.network.set_optimizer(optimizer);
    }

    /// Route matrix products through `kind`. Fails if the backend is not compiled in.
    pub fn attach_backend(&mut self, kind: BackendKind) -> Result<()> {
        self.network.set_backend(Some(kind.handle()?));
        Ok(())
    }

    pub fn set_backend(&mut self, backend: Option<BackendHandle>) {
        self.network.set_backend(backend);
    }

    #[inline]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[inline]
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    #[inline]
    pub fn loss(&self) -> &LossFunction {
        &self.loss
    }

    pub fn set_loss(&mut self, loss: LossFunction) {
        self.loss = loss;
    }

    /// Run a single sample through the network.
    pub fn predict(&self, input: &Matrix) -> Result<Matrix> {
        self.network.forward(input)
    }

    /// Loss of the current prediction for one sample.
    pub fn evaluate(&self, input: &Matrix, target: &Matrix) -> Result<f64> {
        self.loss.loss(&self.predict(input)?, target)
    }

    /// Compute and store deltas for every trainable layer.
    ///
    /// Output layer: `delta_i = loss'(p_i, t_i) * f'(z_i)`, with the L2 term taken from
    /// the output layer's current weights. Upstream layers:
    /// `delta = (W_next^T * delta_next) * f'(z)` element-wise. With more than one
    /// sample the per-sample deltas are averaged.
    pub fn backpropagate(&mut self, inputs: &[Matrix], targets: &[Matrix]) -> Result<()> {
        check_batch(inputs, targets)?;

        let layers = self.network.len();
        if layers < 2 {
            return Err(Error::InvalidConfig(
                "model has no trainable layers".to_owned(),
            ));
        }
        self.loss
            .set_weights_squared_sum(self.network.tail().weights().as_slice());

        let mut sums: Vec<Option<Matrix>> = vec![None; layers];
        for (input, target) in inputs.iter().zip(targets) {
            let trace = self.network.trace(input)?;
            let deltas = self.sample_deltas(&trace, target)?;
            for (ordinal, delta) in deltas.into_iter().enumerate().skip(1) {
                match &mut sums[ordinal] {
                    Some(sum) => sum.add_assign(&delta)?,
                    slot @ None => *slot = Some(delta),
                }
            }
        }

        let k = inputs.len() as f64;
        for (ordinal, sum) in sums.into_iter().enumerate().skip(1) {
            let Some(sum) = sum else { continue };
            let delta = if inputs.len() > 1 { sum.scale(1.0 / k) } else { sum };
            if let Some(layer) = self.network.layer_mut(ordinal) {
                layer.set_deltas(delta)?;
            }
        }
        Ok(())
    }

    /// Deltas for one traced sample, indexed by ordinal. Index 0 is a placeholder.
    fn sample_deltas(&self, trace: &Trace, target: &Matrix) -> Result<Vec<Matrix>> {
        let layers = self.network.layers();
        let tail = layers.len() - 1;
        let prediction = trace.output();
        if target.shape() != prediction.shape() {
            return Err(Error::InvalidShape(format!(
                "target must be {}x1, got {}x{}",
                prediction.rows(),
                target.rows(),
                target.cols()
            )));
        }

        let mut deltas = vec![Matrix::zeros(1, 1); layers.len()];

        let act = layers[tail].activation();
        let loss_grad = prediction.zip_map(target, |p, t| self.loss.derivative(p, t))?;
        let act_grad = trace.pre_activations[tail].map(|z| act.derivative(z));
        deltas[tail] = loss_grad.zip_map(&act_grad, |a, b| a * b)?;

        for ordinal in (1..tail).rev() {
            let next = &layers[ordinal + 1];
            let act = layers[ordinal].activation();
            let back = next.weights().transpose().matmul(&deltas[ordinal + 1])?;
            let act_grad = trace.pre_activations[ordinal].map(|z| act.derivative(z));
            deltas[ordinal] = back.zip_map(&act_grad, |a, b| a * b)?;
        }
        Ok(deltas)
    }

    /// Backpropagate `inputs`/`targets` and apply one update.
    pub fn train_step(&mut self, inputs: &[Matrix], targets: &[Matrix]) -> Result<()> {
        self.backpropagate(inputs, targets)?;
        self.network.gradient_descent(inputs)
    }
}

fn check_batch(inputs: &[Matrix], targets: &[Matrix]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidData("batch must contain at least one sample".to_owned()));
    }
    if inputs.len() != targets.len() {
        return Err(Error::InvalidData(format!(
            "{} inputs but {} targets",
            inputs.len(),
            targets.len()
        )));
    }
    Ok(())
}
