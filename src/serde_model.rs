//! JSON model snapshots (feature: `serde`).
//!
//! This module defines a versioned, single-file alternative to the three-file text
//! format in [`crate::persist`].
//!
//! Design notes:
//! - We do NOT directly serialize internal `Network`/`Layer` structs, to keep the
//!   file format stable even if internal representation changes.
//! - Activations are stored as their textual descriptors.
//! - All deserialization validates dimensions, parameter lengths, and that
//!   all parameters are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::persist::assemble;
use crate::{Activation, Error, Layer, LossFunction, Matrix, Model, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedModel {
    pub format_version: u32,
    /// Every layer, input layer first.
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub neurons: usize,
    /// `0` for the input layer.
    pub inputs: usize,
    /// Descriptor such as `"TanH, alpha = 0.01"`.
    pub activation: String,
    /// Row-major `(neurons, inputs)`; `(neurons, neurons)` for the input layer.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl SerializedModel {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            let expected_inputs = if i == 0 { 0 } else { self.layers[i - 1].neurons };
            if layer.inputs != expected_inputs {
                return Err(Error::InvalidData(format!(
                    "layer {i} inputs {} does not match expected {expected_inputs}",
                    layer.inputs
                )));
            }
            layer.validate()?;
        }

        Ok(())
    }
}

impl SerializedLayer {
    fn weight_cols(&self) -> usize {
        if self.inputs == 0 {
            self.neurons
        } else {
            self.inputs
        }
    }

    fn validate(&self) -> Result<()> {
        if self.neurons == 0 {
            return Err(Error::InvalidData("layer neurons must be > 0".to_owned()));
        }

        let expected_w = self
            .neurons
            .checked_mul(self.weight_cols())
            .ok_or_else(|| Error::InvalidData("layer weight shape overflow".to_owned()))?;
        if self.weights.len() != expected_w {
            return Err(Error::InvalidData(format!(
                "weights length {} does not match {} * {}",
                self.weights.len(),
                self.neurons,
                self.weight_cols()
            )));
        }
        if self.biases.len() != self.neurons {
            return Err(Error::InvalidData(format!(
                "biases length {} does not match neurons {}",
                self.biases.len(),
                self.neurons
            )));
        }

        self.activation
            .parse::<Activation>()
            .map_err(|e| Error::InvalidData(format!("invalid activation: {e}")))?;

        if self.weights.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "weights must contain only finite values".to_owned(),
            ));
        }
        if self.biases.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "biases must contain only finite values".to_owned(),
            ));
        }

        Ok(())
    }
}

impl From<&Model> for SerializedModel {
    fn from(model: &Model) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: model
                .network()
                .layers()
                .iter()
                .map(SerializedLayer::from)
                .collect(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            neurons: layer.neurons(),
            inputs: layer.inputs(),
            activation: layer.activation().to_string(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl TryFrom<SerializedModel> for Model {
    type Error = Error;

    fn try_from(value: SerializedModel) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut weights = Vec::with_capacity(value.layers.len());
        let mut biases = Vec::with_capacity(value.layers.len());
        let mut activations = Vec::with_capacity(value.layers.len());
        for layer in value.layers {
            let cols = layer.weight_cols();
            activations.push(layer.activation.parse::<Activation>()?);
            weights.push(Matrix::from_flat(layer.weights, layer.neurons, cols)?);
            biases.push(Matrix::column_vector(layer.biases)?);
        }

        let network = assemble(weights, biases, activations)?;
        Ok(Model::from_network(network, LossFunction::default()))
    }
}

impl Model {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedModel::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string. The loss defaults to MSE without
    /// regularization.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedModel = serde_json::from_str(s)
            .map_err(|e| Error::Parse(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s).map_err(|e| Error::io(p, e))
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        let mut m =
            Model::new_with_seed(2, Activation::Identity, LossFunction::default(), 5).unwrap();
        m.add_layer(Activation::LeakyReLU { alpha: 0.05 }, 3).unwrap();
        m.add_layer(Activation::Sigmoid, 1).unwrap();
        m
    }

    #[test]
    fn json_roundtrip_preserves_predictions() {
        let m = model();
        let json = m.to_json_string_pretty().unwrap();
        assert!(json.contains("\"LeakyReLU, alpha = 0.05\""));

        let loaded = Model::from_json_str(&json).unwrap();
        let x = Matrix::column_vector(vec![0.3, -0.7]).unwrap();
        assert_eq!(m.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert_eq!(loaded.to_json_string_pretty().unwrap(), json);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let m = model();
        m.save_json(&path).unwrap();
        let loaded = Model::load_json(&path).unwrap();
        assert_eq!(loaded.network().len(), 3);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = Model::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_inconsistent_layers() {
        let mut ser = SerializedModel::from(&model());
        ser.layers[2].inputs = 4;
        assert!(Model::try_from(ser.clone()).is_err());

        let mut ser = SerializedModel::from(&model());
        ser.layers[1].weights.pop();
        assert!(Model::try_from(ser).is_err());

        let mut ser = SerializedModel::from(&model());
        ser.layers[1].activation = "Softplus".to_owned();
        assert!(Model::try_from(ser).is_err());
    }
}
