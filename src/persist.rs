//! Plain-text model files.
//!
//! A model saved under the base path `dir/name` is spread over three sibling files:
//!
//! - `dir/weights_name`: one weight matrix per layer
//! - `dir/biases_name`: one bias vector per layer
//! - `dir/activations_name`: one activation descriptor per layer
//!
//! Every file is a sequence of sections, one per layer in ordinal order:
//!
//! ```text
//! Layer #1:
//! [[0.5, -0.25],
//! [1, 0.125]]
//!
//! ```
//!
//! Activation sections hold the descriptor (`TanH, alpha = 0.01`) instead of a matrix.
//! Loading only relies on `[[` opening a matrix and a line ending in `]]` closing it;
//! header lines and blank lines outside matrices are ignored.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Activation, Error, LossFunction, Matrix, Model, Network, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
/// The three files backing a saved model.
pub struct ModelPaths {
    pub weights: PathBuf,
    pub biases: PathBuf,
    pub activations: PathBuf,
}

impl ModelPaths {
    /// Sibling paths for the base path `base`.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let name = base
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("{} has no usable file name", base.display()))
            })?;
        let dir = base.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self {
            weights: dir.join(format!("weights_{name}")),
            biases: dir.join(format!("biases_{name}")),
            activations: dir.join(format!("activations_{name}")),
        })
    }
}

impl Model {
    /// Write weights, biases and activations next to `base`.
    pub fn save(&self, base: impl AsRef<Path>) -> Result<()> {
        let paths = ModelPaths::new(base)?;
        let layers = self.network().layers();

        let mut weights = String::new();
        let mut biases = String::new();
        let mut activations = String::new();
        for layer in layers {
            let n = layer.ordinal();
            weights.push_str(&section(n, layer.weights()));
            biases.push_str(&section(n, layer.biases()));
            activations.push_str(&section(n, &layer.activation()));
        }

        write_file(&paths.weights, &weights)?;
        write_file(&paths.biases, &biases)?;
        write_file(&paths.activations, &activations)?;
        debug!(layers = layers.len(), weights = %paths.weights.display(), "saved model");
        Ok(())
    }

    /// Load a model saved with [`Model::save`], using MSE without regularization.
    pub fn load(base: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_loss(base, LossFunction::default())
    }

    /// Load a model saved with [`Model::save`] and train it with `loss`.
    pub fn load_with_loss(base: impl AsRef<Path>, loss: LossFunction) -> Result<Self> {
        let paths = ModelPaths::new(base)?;
        let weights = parse_matrices(&read_file(&paths.weights)?)?;
        let biases = parse_matrices(&read_file(&paths.biases)?)?;
        let activations = parse_activations(&read_file(&paths.activations)?)?;

        let network = assemble(weights, biases, activations)?;
        debug!(layers = network.len(), weights = %paths.weights.display(), "loaded model");
        Ok(Model::from_network(network, loss))
    }
}

/// `Layer #<n>:` header, the body, then a blank line.
fn section(ordinal: usize, body: &dyn fmt::Display) -> String {
    format!("Layer #{ordinal}:\n{body}\n\n")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::io(path, e))
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Rebuild a network: weights fix the topology, then biases and activations are
/// applied layer by layer.
pub(crate) fn assemble(
    weights: Vec<Matrix>,
    biases: Vec<Matrix>,
    activations: Vec<Activation>,
) -> Result<Network> {
    let Some(first) = weights.first() else {
        return Err(Error::InvalidData("model file holds no layers".to_owned()));
    };
    if biases.len() != weights.len() || activations.len() != weights.len() {
        return Err(Error::InvalidData(format!(
            "model files disagree: {} weight, {} bias and {} activation sections",
            weights.len(),
            biases.len(),
            activations.len()
        )));
    }
    if first.rows() != first.cols() {
        return Err(Error::InvalidData(format!(
            "input layer weights must be square, got {}x{}",
            first.rows(),
            first.cols()
        )));
    }

    let mut network = Network::new(first.rows(), Activation::Identity)?;
    let mut previous = first.rows();
    for (ordinal, w) in weights.iter().enumerate().skip(1) {
        if w.cols() != previous {
            return Err(Error::InvalidData(format!(
                "layer {ordinal} has {} inputs but layer {} has {previous} neurons",
                w.cols(),
                ordinal - 1
            )));
        }
        network.append(Activation::Identity, w.rows())?;
        previous = w.rows();
    }

    let sections = weights.into_iter().zip(biases).zip(activations);
    for (ordinal, ((w, b), act)) in sections.enumerate() {
        let layer = network
            .layer_mut(ordinal)
            .ok_or_else(|| Error::InvalidData(format!("layer {ordinal} missing")))?;
        layer.set_weights(w)?;
        layer.set_biases(b)?;
        layer.set_activation(act)?;
    }
    Ok(network)
}

/// Parse every bracketed matrix block in `text`, in order.
pub fn parse_matrices(text: &str) -> Result<Vec<Matrix>> {
    let mut matrices = Vec::new();
    let mut rows: Option<Vec<Vec<f64>>> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with("[[") {
            if rows.is_some() {
                return Err(Error::Parse(format!(
                    "line {}: matrix opened before the previous one was closed",
                    idx + 1
                )));
            }
            rows = Some(Vec::new());
        }
        let Some(current) = rows.as_mut() else {
            continue;
        };

        current.push(parse_row(line, idx + 1)?);
        if line.ends_with("]]") {
            let done = rows.take().unwrap_or_default();
            matrices.push(Matrix::from_rows(&done)?);
        }
    }

    if rows.is_some() {
        return Err(Error::Parse("matrix is missing its closing `]]`".to_owned()));
    }
    Ok(matrices)
}

fn parse_row(line: &str, line_no: usize) -> Result<Vec<f64>> {
    let cleaned: String = line
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ',') { ' ' } else { c })
        .collect();
    let row = cleaned
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                Error::Parse(format!("line {line_no}: invalid number {token:?}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if row.is_empty() {
        return Err(Error::Parse(format!("line {line_no}: empty matrix row")));
    }
    Ok(row)
}

/// Parse one activation descriptor per section, skipping headers and blank lines.
pub fn parse_activations(text: &str) -> Result<Vec<Activation>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Layer"))
        .map(str::parse)
        .collect()
}
