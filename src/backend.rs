//! Matrix multiplication backends.
//!
//! A [`Matrix`](crate::Matrix) multiplies through an optional shared handle to a
//! [`MatmulBackend`]. Matrices without a handle use the sequential triple loop.
//!
//! - default: [`Sequential`], a simple, safe triple-loop implementation
//! - optional: [`Accelerated`], backed by the `matrixmultiply` crate (feature `matrixmultiply`)
//!
//! Every backend satisfies the same contract: `C = A * B` for row-major buffers, same
//! inputs give the same outputs up to floating-point rounding. A backend that fails
//! reports an [`Error::Backend`]; callers never fall back to another backend.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

/// Shared handle to a backend. Cloned into every matrix that
/// opts into acceleration.
pub type BackendHandle = Arc<dyn MatmulBackend>;

/// Capability contract: multiply two row-major matrices.
pub trait MatmulBackend: fmt::Debug + Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Computes `C (m x n) = A (m x k) * B (k x n)`.
    ///
    /// `a.len() == m * k` and `b.len() == k * n` are guaranteed by the caller.
    /// The call is blocking: it either returns the complete product or an error.
    fn gemm(&self, m: usize, k: usize, n: usize, a: &[f64], b: &[f64]) -> Result<Vec<f64>>;
}

/// Sequential CPU implementation (always available).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl MatmulBackend for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn gemm(&self, m: usize, k: usize, n: usize, a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
        Ok(gemm_sequential(m, k, n, a, b))
    }
}

#[inline]
pub(crate) fn gemm_sequential(m: usize, k: usize, n: usize, a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);

    let mut c = vec![0.0_f64; m * n];
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let mut acc = 0.0_f64;
            for p in 0..k {
                acc = a_row[p].mul_add(b[p * n + j], acc);
            }
            c[i * n + j] = acc;
        }
    }
    c
}

/// Blocked, vectorised GEMM from the `matrixmultiply` crate.
#[cfg(feature = "matrixmultiply")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Accelerated;

#[cfg(feature = "matrixmultiply")]
impl MatmulBackend for Accelerated {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn gemm(&self, m: usize, k: usize, n: usize, a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
        if a.len() != m * k || b.len() != k * n {
            return Err(Error::Backend(format!(
                "operand buffers do not match a {m}x{k} by {k}x{n} product"
            )));
        }

        let mut c = vec![0.0_f64; m * n];
        // Row-major strides: row stride = columns, column stride = 1.
        unsafe {
            matrixmultiply::dgemm(
                m,
                k,
                n,
                1.0,
                a.as_ptr(),
                k as isize,
                1,
                b.as_ptr(),
                n as isize,
                1,
                0.0,
                c.as_mut_ptr(),
                n as isize,
                1,
            );
        }
        Ok(c)
    }
}

/// Backend selector used by configuration surfaces (CLI, builder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Sequential,
    Accelerated,
}

impl BackendKind {
    /// Whether this backend was compiled in.
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::Sequential => true,
            BackendKind::Accelerated => cfg!(feature = "matrixmultiply"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Sequential => "sequential",
            BackendKind::Accelerated => "accelerated",
        }
    }

    /// Create a shared handle for this backend.
    ///
    /// Fails if the backend is not available in this build.
    pub fn handle(self) -> Result<BackendHandle> {
        match self {
            BackendKind::Sequential => Ok(Arc::new(Sequential)),
            BackendKind::Accelerated => {
                #[cfg(feature = "matrixmultiply")]
                {
                    Ok(Arc::new(Accelerated))
                }
                #[cfg(not(feature = "matrixmultiply"))]
                {
                    Err(Error::Backend(
                        "accelerated backend requires the `matrixmultiply` feature".to_owned(),
                    ))
                }
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "cpu" => Ok(BackendKind::Sequential),
            "accelerated" | "matrixmultiply" => Ok(BackendKind::Accelerated),
            other => Err(Error::Parse(format!("unknown backend {other:?}"))),
        }
    }
}
