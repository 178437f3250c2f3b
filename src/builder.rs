//! Model builder.
//!
//! `ModelBuilder` is the recommended way to define a model. It collects the topology
//! and training setup, validates each piece as it is added, and produces a ready to
//! train [`Model`]:
//!
//! - input width and the input layer's activation
//! - hidden/output layers (neurons + activation)
//! - loss (MSE without regularization unless set)
//! - optimizer, cloned into every trainable layer
//! - optional matrix-multiply backend

use crate::backend::BackendKind;
use crate::optim::OptimizerKind;
use crate::{Activation, Error, LossFunction, Model, Result};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    neurons: usize,
    activation: Activation,
}

#[derive(Debug, Clone)]
/// Builder for a [`Model`].
///
/// Example:
///
/// ```rust
/// use feedforward::{Activation, ModelBuilder, OptimizerKind};
///
/// # fn main() -> feedforward::Result<()> {
/// let model = ModelBuilder::new(2)?
///     .add_layer(4, Activation::TanH { alpha: 0.01 })?
///     .add_layer(1, Activation::Sigmoid)?
///     .optimizer(OptimizerKind::Adam { lr: 0.01 })?
///     .build_with_seed(0)?;
/// assert_eq!(model.network().len(), 3);
/// # Ok(())
/// # }
/// ```
pub struct ModelBuilder {
    input_width: usize,
    input_activation: Activation,
    layers: Vec<LayerSpec>,
    loss: LossFunction,
    optimizer: Option<OptimizerKind>,
    backend: Option<BackendKind>,
}

impl ModelBuilder {
    /// Start building a model that accepts inputs of length `input_width`.
    pub fn new(input_width: usize) -> Result<Self> {
        if input_width == 0 {
            return Err(Error::InvalidConfig("input width must be > 0".to_owned()));
        }
        Ok(Self {
            input_width,
            input_activation: Activation::Identity,
            layers: Vec::new(),
            loss: LossFunction::default(),
            optimizer: None,
            backend: None,
        })
    }

    /// Convenience constructor from a sizes list + activations.
    ///
    /// `sizes` includes the input width, so its length must be at least 2.
    /// `activations` must have length `sizes.len() - 1`.
    pub fn from_sizes(sizes: &[usize], activations: &[Activation]) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include the input width and at least one layer".to_owned(),
            ));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "activations length {} does not match sizes.len() - 1 ({})",
                activations.len(),
                sizes.len() - 1
            )));
        }

        let mut b = Self::new(sizes[0])?;
        for (&neurons, &act) in sizes[1..].iter().zip(activations) {
            b = b.add_layer(neurons, act)?;
        }
        Ok(b)
    }

    /// Activation applied by the input layer.
    pub fn input_activation(mut self, activation: Activation) -> Result<Self> {
        activation.validate()?;
        self.input_activation = activation;
        Ok(self)
    }

    /// Add a layer of `neurons` after the previous one.
    pub fn add_layer(mut self, neurons: usize, activation: Activation) -> Result<Self> {
        if neurons == 0 {
            return Err(Error::InvalidConfig("layer neurons must be > 0".to_owned()));
        }
        activation.validate()?;

        self.layers.push(LayerSpec {
            neurons,
            activation,
        });
        Ok(self)
    }

    pub fn loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerKind) -> Result<Self> {
        optimizer.validate()?;
        self.optimizer = Some(optimizer);
        Ok(self)
    }

    /// Fails if `backend` is not compiled in.
    pub fn backend(mut self, backend: BackendKind) -> Result<Self> {
        if !backend.is_available() {
            return Err(Error::Backend(format!(
                "backend {backend} is not available in this build"
            )));
        }
        self.backend = Some(backend);
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Model> {
        let model = Model::new_with_seed(
            self.input_width,
            self.input_activation,
            self.loss.clone(),
            seed,
        )?;
        self.finish(model)
    }

    /// Build with entropy-seeded initialization.
    pub fn build(self) -> Result<Model> {
        let model = Model::new(self.input_width, self.input_activation, self.loss.clone())?;
        self.finish(model)
    }

    fn finish(self, mut model: Model) -> Result<Model> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "model must have at least one layer after the input layer".to_owned(),
            ));
        }

        for spec in &self.layers {
            model.add_layer(spec.activation, spec.neurons)?;
        }
        if let Some(kind) = self.optimizer {
            model.select_optimizer(kind.build()?.as_ref());
        }
        if let Some(kind) = self.backend {
            model.attach_backend(kind)?;
        }
        Ok(model)
    }
}
