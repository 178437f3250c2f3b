//! A from-scratch feed-forward neural network.
//!
//! `feedforward` is a small-core implementation of a dense layer chain trained with
//! backpropagation. It is designed to be easy to read: every intermediate value is a
//! plain [`Matrix`], and every step of training is a public method.
//!
//! # Building blocks
//!
//! - [`Matrix`]: dense row-major `f64` matrix; products go through an optional
//!   [`backend::MatmulBackend`].
//! - [`Activation`]: element-wise transfer functions with textual descriptors.
//! - [`LossFunction`]: MSE / MAE with an optional L2 term.
//! - [`optim`]: gradient descent, RMSProp, Adam, Adagrad and Adadelta.
//! - [`Network`]: the ordered layer chain (input layer at ordinal 0).
//! - [`Model`]: network + loss; backpropagation, training, persistence.
//!
//! # Panics vs `Result`
//!
//! - Factories that take raw sizes ([`Matrix::zeros`], [`Matrix::identity`],
//!   [`Matrix::random`]) panic on zero dimensions: that is programmer error.
//! - Everything fed from data (matrix construction from rows, arithmetic, forward,
//!   training, loading) validates shapes and returns [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - Samples are column vectors: an input is `input_width x 1`.
//! - Layer weights have shape `(neurons, inputs)`, biases `(neurons, 1)`.
//!
//! # Logging
//!
//! The library emits [`tracing`] events (one `info` event per training epoch, `debug`
//! events for topology, persistence and backend changes). Installing a subscriber is
//! up to the application.

//! # Quick start
//!
//! ```rust
//! use feedforward::{Activation, FitConfig, Matrix, ModelBuilder, OptimizerKind, Shuffle};
//!
//! # fn main() -> feedforward::Result<()> {
//! let xs = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]
//!     .iter()
//!     .map(|x| Matrix::column_vector(x.to_vec()))
//!     .collect::<feedforward::Result<Vec<_>>>()?;
//! let ys = [0.0, 0.0, 0.0, 1.0]
//!     .iter()
//!     .map(|&y| Matrix::column_vector(vec![y]))
//!     .collect::<feedforward::Result<Vec<_>>>()?;
//!
//! let mut model = ModelBuilder::new(2)?
//!     .add_layer(4, Activation::TanH { alpha: 0.01 })?
//!     .add_layer(1, Activation::Sigmoid)?
//!     .optimizer(OptimizerKind::GradientDescent { lr: 0.1 })?
//!     .build_with_seed(0)?;
//!
//! let report = model.fit(
//!     &xs,
//!     &ys,
//!     FitConfig {
//!         epochs: 50,
//!         batch_size: 1,
//!         shuffle: Shuffle::None,
//!     },
//! )?;
//! assert_eq!(report.epochs.len(), 50);
//! let _y = model.predict(&xs[3])?;
//! # Ok(())
//! # }
//! ```

//! # Driving training yourself
//!
//! ```rust
//! use feedforward::{Activation, LossFunction, Matrix, Model};
//! use feedforward::optim::Adam;
//!
//! # fn main() -> feedforward::Result<()> {
//! let mut model = Model::new_with_seed(3, Activation::Identity, LossFunction::mse(0.0)?, 0)?;
//! model.add_layer(Activation::ReLU, 8)?;
//! model.add_layer(Activation::Identity, 2)?;
//! model.select_optimizer(&Adam::new(1e-2)?);
//!
//! let x = Matrix::column_vector(vec![0.1, -0.2, 0.3])?;
//! let t = Matrix::column_vector(vec![0.0, 1.0])?;
//!
//! model.backpropagate(std::slice::from_ref(&x), std::slice::from_ref(&t))?;
//! model.network_mut().gradient_descent(std::slice::from_ref(&x))?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod backend;
pub mod builder;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod matrix;
pub mod metrics;
pub mod model;
pub mod network;
pub mod optim;
pub mod persist;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use backend::{BackendHandle, BackendKind, MatmulBackend};
pub use builder::ModelBuilder;
pub use data::Samples;
pub use error::{Error, Result};
pub use layer::Layer;
pub use loss::{Loss, LossFunction};
pub use matrix::Matrix;
pub use metrics::{DeviationReport, deviation_report};
pub use model::Model;
pub use network::{Network, Trace};
pub use optim::{Optimizer, OptimizerKind};
pub use persist::ModelPaths;
pub use train::{EpochReport, FitConfig, FitReport, Shuffle};
