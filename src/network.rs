//! The layer chain.
//!
//! Layers live in a `Vec` addressed by ordinal: layer `0` is the input layer, the last
//! element is the tail (output layer). The predecessor of layer `n` is `n - 1`, its
//! successor `n + 1`; the chain never branches.
//!
//! The network also owns the shared pieces every layer must agree on: the optional
//! matrix-multiply backend and the optimizer prototype that each layer clones.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::backend::BackendHandle;
use crate::optim::Optimizer;
use crate::{Activation, Error, Layer, Matrix, Result};

/// Per-layer intermediate values of one forward pass.
#[derive(Debug, Clone)]
pub struct Trace {
    /// `z` for every layer, indexed by ordinal.
    pub pre_activations: Vec<Matrix>,
    /// `activation(z)` for every layer, indexed by ordinal.
    pub activations: Vec<Matrix>,
}

impl Trace {
    /// Output of the tail layer.
    pub fn output(&self) -> &Matrix {
        // A trace always covers at least the input layer.
        &self.activations[self.activations.len() - 1]
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    backend: Option<BackendHandle>,
    optimizer: Option<Box<dyn Optimizer>>,
    rng: StdRng,
}

impl Network {
    /// A network holding only an input layer of width `input_width`.
    pub fn new(input_width: usize, activation: Activation) -> Result<Self> {
        Self::with_rng(input_width, activation, StdRng::from_entropy())
    }

    /// Like [`Network::new`], with deterministic initialization of appended layers.
    pub fn new_with_seed(input_width: usize, activation: Activation, seed: u64) -> Result<Self> {
        Self::with_rng(input_width, activation, StdRng::seed_from_u64(seed))
    }

    fn with_rng(input_width: usize, activation: Activation, rng: StdRng) -> Result<Self> {
        if input_width == 0 {
            return Err(Error::InvalidConfig("input width must be > 0".to_owned()));
        }
        activation.validate()?;
        Ok(Self {
            layers: vec![Layer::input(input_width, activation)],
            backend: None,
            optimizer: None,
            rng,
        })
    }

    /// Attach a new layer after the tail. Returns its ordinal.
    pub fn append(&mut self, activation: Activation, neurons: usize) -> Result<usize> {
        if neurons == 0 {
            return Err(Error::InvalidConfig("layer neurons must be > 0".to_owned()));
        }
        activation.validate()?;

        let ordinal = self.layers.len();
        let inputs = self.tail().neurons();
        let mut layer = Layer::dense(ordinal, inputs, neurons, activation, &mut self.rng);
        if let Some(optimizer) = &self.optimizer {
            layer.set_optimizer(optimizer.clone_box());
        }
        self.layers.push(layer);
        self.propagate_backend();

        debug!(ordinal, inputs, neurons, %activation, "appended layer");
        Ok(ordinal)
    }

    /// Number of layers, input layer included.
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Never true: the input layer always exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, ordinal: usize) -> Option<&Layer> {
        self.layers.get(ordinal)
    }

    pub fn layer_mut(&mut self, ordinal: usize) -> Option<&mut Layer> {
        self.layers.get_mut(ordinal)
    }

    pub fn predecessor(&self, ordinal: usize) -> Option<&Layer> {
        ordinal.checked_sub(1).and_then(|p| self.layers.get(p))
    }

    pub fn successor(&self, ordinal: usize) -> Option<&Layer> {
        self.layers.get(ordinal + 1)
    }

    pub fn tail(&self) -> &Layer {
        // Constructors guarantee a non-empty chain.
        &self.layers[self.layers.len() - 1]
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.layers[0].neurons()
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.tail().neurons()
    }

    pub fn backend(&self) -> Option<&BackendHandle> {
        self.backend.as_ref()
    }

    /// Share `backend` with every layer, current and future. `None` restores the
    /// sequential path.
    pub fn set_backend(&mut self, backend: Option<BackendHandle>) {
        debug!(backend = backend.as_ref().map(|b| b.name()), "attaching backend");
        self.backend = backend;
        self.propagate_backend();
    }

    fn propagate_backend(&mut self) {
        for layer in &mut self.layers {
            layer.set_backend(self.backend.clone());
        }
    }

    /// Give every trainable layer, current and future, a fresh copy of `optimizer`.
    pub fn set_optimizer(&mut self, optimizer: &dyn Optimizer) {
        for layer in self.layers.iter_mut().skip(1) {
            layer.set_optimizer(optimizer.clone_box());
        }
        self.optimizer = Some(optimizer.clone_box());
    }

    /// Output of the tail layer.
    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        self.forward_until(input, self.layers.len() - 1)
    }

    /// Output of layer `ordinal`, or of the tail if the chain is shorter.
    pub fn forward_until(&self, input: &Matrix, ordinal: usize) -> Result<Matrix> {
        let last = ordinal.min(self.layers.len() - 1);
        let mut current = self.layers[0].output(input)?;
        for layer in &self.layers[1..=last] {
            current = layer.output(&current)?;
        }
        Ok(current)
    }

    /// Full forward pass keeping every layer's `z` and `activation(z)`.
    pub fn trace(&self, input: &Matrix) -> Result<Trace> {
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activations: Vec<Matrix> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let x = activations.last().unwrap_or(input);
            let z = layer.pre_activation(x)?;
            activations.push(layer.activation().apply(&z));
            pre_activations.push(z);
        }
        Ok(Trace {
            pre_activations,
            activations,
        })
    }

    /// Update every trainable layer from its stored deltas.
    ///
    /// Walks from the tail towards the input layer (exclusive). For layer `l` the
    /// accumulated gradients are `sum(delta_l * a_{l-1}^T)` for the weights and
    /// `sum(delta_l)` for the biases, over every sample in `batch`. Deltas point
    /// downhill, so they are negated before being handed to the layer's optimizer,
    /// which applies its own learning rate.
    ///
    /// Activations are taken from a forward pass made before any update; updating
    /// layer `l` never changes what layers `< l` produce.
    ///
    /// Every gradient is computed before the first optimizer runs, so a failed
    /// multiply or a layer without an optimizer leaves all parameters untouched.
    #[instrument(level = "trace", skip_all, fields(batch = batch.len()))]
    pub fn gradient_descent(&mut self, batch: &[Matrix]) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::InvalidData("gradient descent needs at least one sample".to_owned()));
        }
        if let Some(layer) = self.layers[1..].iter().find(|l| l.optimizer().is_none()) {
            return Err(Error::InvalidConfig(format!(
                "layer {} has no optimizer; call select_optimizer first",
                layer.ordinal()
            )));
        }

        let upstream: Vec<Vec<Matrix>> = batch
            .iter()
            .map(|x| self.trace(x).map(|t| t.activations))
            .collect::<Result<_>>()?;

        let mut grads = Vec::with_capacity(self.layers.len() - 1);
        for ordinal in (1..self.layers.len()).rev() {
            let layer = &self.layers[ordinal];
            let deltas = layer.deltas();
            let mut weight_grads =
                Matrix::zeros(layer.neurons(), layer.inputs()).with_backend(self.backend.clone());
            let mut bias_grads = Matrix::zeros(layer.neurons(), 1);

            for activations in &upstream {
                let outer = deltas.matmul(&activations[ordinal - 1].transpose())?;
                weight_grads.add_assign(&outer)?;
                bias_grads.add_assign(deltas)?;
            }
            grads.push((ordinal, weight_grads.scale(-1.0), bias_grads.scale(-1.0)));
        }

        for (ordinal, weight_grads, bias_grads) in grads {
            self.layers[ordinal].apply_gradients(&weight_grads, &bias_grads)?;
        }
        Ok(())
    }
}
