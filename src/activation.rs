//! Activation functions.
//!
//! A layer computes a pre-activation value `z = W x + b` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! Derivatives are evaluated at the pre-activation `z`, which the model recovers
//! during backpropagation.
//!
//! Every variant has a canonical textual descriptor (see the `Display` impl). The
//! descriptor is what persistence writes and what [`str::parse`] reads back.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Matrix, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Element-wise activation function.
pub enum Activation {
    /// Pass-through, `NoActivation` in descriptors.
    Identity,
    ReLU,
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    /// `alpha` is carried for the descriptor only; the formula is plain `tanh`.
    TanH { alpha: f64 },
    Sigmoid,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha }
            | Activation::Elu { alpha }
            | Activation::TanH { alpha } => {
                if !alpha.is_finite() {
                    return Err(Error::InvalidConfig(format!(
                        "{} alpha must be finite, got {alpha}",
                        self.name()
                    )));
                }
            }
            Activation::Identity | Activation::ReLU | Activation::Sigmoid => {}
        }

        Ok(())
    }

    /// Canonical name used in descriptors.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "NoActivation",
            Activation::ReLU => "ReLU",
            Activation::LeakyReLU { .. } => "LeakyReLU",
            Activation::Elu { .. } => "ELU",
            Activation::TanH { .. } => "TanH",
            Activation::Sigmoid => "Sigmoid",
        }
    }

    fn alpha(self) -> Option<f64> {
        match self {
            Activation::LeakyReLU { alpha }
            | Activation::Elu { alpha }
            | Activation::TanH { alpha } => Some(alpha),
            Activation::Identity | Activation::ReLU | Activation::Sigmoid => None,
        }
    }

    /// Apply the activation to every element of `z`.
    pub fn apply(self, z: &Matrix) -> Matrix {
        z.map(|x| self.forward(x))
    }

    #[inline]
    pub fn forward(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Elu { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    alpha * (x.exp() - 1.0)
                }
            }
            Activation::TanH { .. } => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative with respect to the pre-activation input `x`.
    #[inline]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if x < 0.0 {
                    alpha
                } else if x == 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            Activation::Elu { alpha } => {
                if x < 0.0 {
                    alpha * x.exp()
                } else {
                    1.0
                }
            }
            Activation::TanH { .. } => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// `<Name>` or `<Name>, alpha = <value>`.
impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alpha() {
            Some(alpha) => write!(f, "{}, alpha = {alpha}", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, alpha) = match s.split_once(',') {
            Some((name, rest)) => {
                let value = rest
                    .trim()
                    .strip_prefix("alpha")
                    .map(str::trim_start)
                    .and_then(|v| v.strip_prefix('='))
                    .ok_or_else(|| {
                        Error::Parse(format!("malformed activation descriptor {s:?}"))
                    })?
                    .trim();
                let alpha = value.parse::<f64>().map_err(|_| {
                    Error::Parse(format!("invalid alpha {value:?} in descriptor {s:?}"))
                })?;
                (name.trim(), Some(alpha))
            }
            None => (s, None),
        };

        let activation = match (name, alpha) {
            ("NoActivation", None) => Activation::Identity,
            ("ReLU", None) => Activation::ReLU,
            ("Sigmoid", None) => Activation::Sigmoid,
            ("LeakyReLU", Some(alpha)) => Activation::LeakyReLU { alpha },
            ("ELU", Some(alpha)) => Activation::Elu { alpha },
            ("TanH", Some(alpha)) => Activation::TanH { alpha },
            ("NoActivation" | "ReLU" | "Sigmoid", Some(_)) => {
                return Err(Error::Parse(format!(
                    "{name} does not take an alpha parameter"
                )));
            }
            ("LeakyReLU" | "ELU" | "TanH", None) => {
                return Err(Error::Parse(format!("{name} requires an alpha parameter")));
            }
            _ => {
                return Err(Error::Parse(format!("unknown activation {name:?}")));
            }
        };
        activation.validate().map_err(|e| Error::Parse(e.to_string()))?;
        Ok(activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tol={tol})");
    }

    #[test]
    fn relu_clamps_negatives() {
        let z = Matrix::column_vector(vec![-1.0, 0.0, 2.0]).unwrap();
        let y = Activation::ReLU.apply(&z);
        assert_eq!(y.as_slice(), &[0.0, 0.0, 2.0]);
        assert_eq!(Activation::ReLU.derivative(0.0), 0.0);
        assert_eq!(Activation::ReLU.derivative(0.5), 1.0);
    }

    #[test]
    fn sigmoid_basic_values() {
        let z = Matrix::column_vector(vec![0.0]).unwrap();
        assert_eq!(Activation::Sigmoid.apply(&z).as_slice(), &[0.5]);
        assert_close(Activation::Sigmoid.derivative(0.0), 0.25, 1e-12);

        assert!(Activation::Sigmoid.forward(40.0) > 0.999);
        assert!(Activation::Sigmoid.forward(-40.0) < 0.001);
    }

    #[test]
    fn tanh_ignores_alpha() {
        let act = Activation::TanH { alpha: 0.01 };
        assert_eq!(act.derivative(0.0), 1.0);
        assert_close(act.forward(0.3), 0.3_f64.tanh(), 1e-15);
    }

    #[test]
    fn leaky_relu_and_elu_shapes() {
        let leaky = Activation::LeakyReLU { alpha: 0.1 };
        assert_close(leaky.forward(-2.0), -0.2, 1e-15);
        assert_eq!(leaky.forward(3.0), 3.0);
        assert_eq!(leaky.derivative(-2.0), 0.1);
        assert_eq!(leaky.derivative(0.0), 0.0);
        assert_eq!(leaky.derivative(3.0), 1.0);

        let elu = Activation::Elu { alpha: 2.0 };
        assert_close(elu.forward(-1.0), 2.0 * ((-1.0_f64).exp() - 1.0), 1e-15);
        assert_eq!(elu.forward(1.5), 1.5);
        assert_close(elu.derivative(-1.0), 2.0 * (-1.0_f64).exp(), 1e-15);
        assert_eq!(elu.derivative(1.0), 1.0);
    }

    #[test]
    fn identity_is_a_no_op() {
        assert_eq!(Activation::Identity.forward(-3.5), -3.5);
        assert_eq!(Activation::Identity.derivative(-3.5), 1.0);
    }

    #[test]
    fn descriptors_render_canonically() {
        assert_eq!(Activation::Identity.to_string(), "NoActivation");
        assert_eq!(Activation::Sigmoid.to_string(), "Sigmoid");
        assert_eq!(
            Activation::LeakyReLU { alpha: 0.01 }.to_string(),
            "LeakyReLU, alpha = 0.01"
        );
        assert_eq!(Activation::TanH { alpha: 1.0 }.to_string(), "TanH, alpha = 1");
    }

    #[test]
    fn descriptors_parse_back() {
        for act in [
            Activation::Identity,
            Activation::ReLU,
            Activation::LeakyReLU { alpha: 0.2 },
            Activation::Elu { alpha: 1.5 },
            Activation::TanH { alpha: 0.01 },
            Activation::Sigmoid,
        ] {
            assert_eq!(act.to_string().parse::<Activation>().unwrap(), act);
        }
        assert_eq!(
            "  ELU,alpha=3 ".parse::<Activation>().unwrap(),
            Activation::Elu { alpha: 3.0 }
        );
    }

    #[test]
    fn malformed_descriptors_are_parse_errors() {
        for bad in [
            "Softmax",
            "ReLU, alpha = 1",
            "ELU",
            "TanH, beta = 1",
            "LeakyReLU, alpha = abc",
            "LeakyReLU, alpha = NaN",
            "",
        ] {
            assert!(
                matches!(bad.parse::<Activation>(), Err(Error::Parse(_))),
                "{bad:?} should not parse"
            );
        }
    }
}
