//! Dense, row-major matrix.
//!
//! `Matrix` owns its storage exclusively; `clone` is a deep copy. Every arithmetic
//! operation returns a fresh matrix, except the explicitly in-place accumulation
//! [`Matrix::add_assign`].
//!
//! Shapes are validated on every operation and mismatches are reported as
//! [`Error::InvalidShape`]; a failed operation never yields a partial result.
//!
//! Multiplication goes through the attached [`BackendHandle`] when there is one and
//! through the sequential loop otherwise. Results inherit the left operand's handle.

use std::fmt;

use rand::Rng;

use crate::backend::{self, BackendHandle};
use crate::{Error, Result};

#[derive(Clone)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Row-major, `rows * cols` values.
    data: Vec<f64>,
    backend: Option<BackendHandle>,
}

impl Matrix {
    /// Build a matrix from nested rows.
    ///
    /// Fails if there are no rows, the first row is empty, or rows differ in length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::InvalidData(
                "matrix must have at least one row".to_owned(),
            ));
        };
        let cols = first.len();
        if cols == 0 {
            return Err(Error::InvalidData(
                "matrix must have at least one column".to_owned(),
            ));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
        }

        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
            backend: None,
        })
    }

    /// Reshape a flat row-major buffer into a `rows x cols` matrix.
    pub fn from_flat(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidData(format!(
                "matrix dims must be > 0, got {rows}x{cols}"
            )));
        }
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::InvalidData("matrix shape overflow".to_owned()))?;
        if data.len() != expected {
            return Err(Error::InvalidData(format!(
                "buffer of {} values cannot be reshaped to {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            backend: None,
        })
    }

    /// Build an `n x 1` column vector.
    pub fn column_vector(values: Vec<f64>) -> Result<Self> {
        let n = values.len();
        Self::from_flat(values, n, 1)
    }

    /// `size x size` identity matrix.
    ///
    /// Panics if `size == 0`.
    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size, size);
        for i in 0..size {
            m.data[i * size + i] = 1.0;
        }
        m
    }

    /// All-zero `rows x cols` matrix.
    ///
    /// Panics if either dimension is zero.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        assert!(
            rows > 0 && cols > 0,
            "matrix dims must be > 0, got {rows}x{cols}"
        );
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
            backend: None,
        }
    }

    /// Matrix with entries drawn uniformly from `[-1, 1]`.
    ///
    /// Panics if either dimension is zero.
    pub fn random_with_rng<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let mut m = Self::zeros(rows, cols);
        for v in &mut m.data {
            *v = rng.gen_range(-1.0..=1.0);
        }
        m
    }

    /// Like [`Matrix::random_with_rng`], using the thread-local RNG.
    pub fn random(rows: usize, cols: usize) -> Self {
        Self::random_with_rng(rows, cols, &mut rand::thread_rng())
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// A single-column matrix.
    #[inline]
    pub fn is_vector(&self) -> bool {
        self.cols == 1
    }

    /// Value at `(row, col)`. Panics if out of range.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of range for {}x{} matrix",
            self.rows,
            self.cols
        );
        self.data[row * self.cols + col]
    }

    /// The `row`-th row. Panics if out of range.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Row-major view of the values.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flatten into a row-major buffer.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    #[inline]
    pub fn backend(&self) -> Option<&BackendHandle> {
        self.backend.as_ref()
    }

    pub fn set_backend(&mut self, backend: Option<BackendHandle>) {
        self.backend = backend;
    }

    pub fn with_backend(mut self, backend: Option<BackendHandle>) -> Self {
        self.backend = backend;
        self
    }

    fn same_shape(&self, other: &Matrix, op: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::InvalidShape(format!(
                "cannot {op} a {}x{} matrix with a {}x{} matrix",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }

    fn derived(&self, data: Vec<f64>, rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data,
            backend: self.backend.clone(),
        }
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_map_named(other, "add", |a, b| a + b)
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_map_named(other, "subtract", |a, b| a - b)
    }

    /// In-place accumulation: `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<()> {
        self.same_shape(other, "accumulate")?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Multiply every element by `scalar`.
    pub fn scale(&self, scalar: f64) -> Matrix {
        self.map(|v| v * scalar)
    }

    /// Matrix product `self * other`.
    ///
    /// Requires `self.cols() == other.rows()`.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(Error::InvalidShape(format!(
                "cannot multiply a {}x{} matrix with a {}x{} matrix",
                self.rows, self.cols, other.rows, other.cols
            )));
        }

        let (m, k, n) = (self.rows, self.cols, other.cols);
        let data = match &self.backend {
            Some(backend) => {
                let c = backend.gemm(m, k, n, &self.data, &other.data)?;
                if c.len() != m * n {
                    return Err(Error::Backend(format!(
                        "{} returned {} values for a {m}x{n} product",
                        backend.name(),
                        c.len()
                    )));
                }
                c
            }
            None => backend::gemm_sequential(m, k, n, &self.data, &other.data),
        };
        Ok(self.derived(data, m, n))
    }

    pub fn transpose(&self) -> Matrix {
        let mut data = vec![0.0; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        self.derived(data, self.cols, self.rows)
    }

    /// Element-wise unary transform.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Matrix {
        let data = self.data.iter().map(|&v| f(v)).collect();
        self.derived(data, self.rows, self.cols)
    }

    /// Element-wise binary transform over two equally shaped matrices.
    pub fn zip_map<F: Fn(f64, f64) -> f64>(&self, other: &Matrix, f: F) -> Result<Matrix> {
        self.zip_map_named(other, "combine", f)
    }

    fn zip_map_named<F: Fn(f64, f64) -> f64>(
        &self,
        other: &Matrix,
        op: &str,
        f: F,
    ) -> Result<Matrix> {
        self.same_shape(other, op)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(self.derived(data, self.rows, self.cols))
    }

    /// Sum of a column vector.
    pub fn sum(&self) -> Result<f64> {
        if !self.is_vector() {
            return Err(Error::InvalidShape(format!(
                "sum requires a column vector, got a {}x{} matrix",
                self.rows, self.cols
            )));
        }
        Ok(self.data.iter().sum())
    }

    /// The `index`-th column as an `rows x 1` vector.
    pub fn column(&self, index: usize) -> Result<Matrix> {
        if index >= self.cols {
            return Err(Error::InvalidShape(format!(
                "column index {index} out of range for {} columns",
                self.cols
            )));
        }
        let data = (0..self.rows)
            .map(|r| self.data[r * self.cols + index])
            .collect();
        Ok(self.derived(data, self.rows, 1))
    }

    /// Sum of squared entries.
    pub fn squared_sum(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.data == other.data
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.data)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

/// Bracketed nested rows: `[[v, v],\n[v, v]]`.
impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for r in 0..self.rows {
            f.write_str("[")?;
            for (c, v) in self.row(r).iter().enumerate() {
                if c > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{v}")?;
            }
            f.write_str("]")?;
            if r + 1 != self.rows {
                f.write_str(",\n")?;
            }
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::backend::MatmulBackend;

    fn m(rows: &[&[f64]]) -> Matrix {
        let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.to_vec()).collect();
        Matrix::from_rows(&rows).unwrap()
    }

    fn assert_matrix_close(a: &Matrix, b: &Matrix, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() <= tol, "{a} != {b}");
        }
    }

    #[test]
    fn construction_rejects_empty_and_ragged_rows() {
        assert!(Matrix::from_rows(&[]).is_err());
        assert!(Matrix::from_rows(&[vec![]]).is_err());
        assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(Matrix::from_flat(vec![1.0, 2.0, 3.0], 2, 2).is_err());
    }

    #[test]
    fn addition_is_associative() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Matrix::random_with_rng(3, 4, &mut rng);
        let b = Matrix::random_with_rng(3, 4, &mut rng);
        let c = Matrix::random_with_rng(3, 4, &mut rng);

        let left = a.add(&b).unwrap().add(&c).unwrap();
        let right = a.add(&b.add(&c).unwrap()).unwrap();
        assert_matrix_close(&left, &right, 1e-12);
    }

    #[test]
    fn transpose_is_an_involution() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Matrix::random_with_rng(2, 5, &mut rng);
        assert_eq!(a.transpose().transpose(), a);
        assert_eq!(a.transpose().shape(), (5, 2));
    }

    #[test]
    fn identity_is_neutral_on_both_sides() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Matrix::random_with_rng(3, 2, &mut rng);
        assert_matrix_close(&Matrix::identity(3).matmul(&a).unwrap(), &a, 1e-12);
        assert_matrix_close(&a.matmul(&Matrix::identity(2)).unwrap(), &a, 1e-12);
    }

    #[test]
    fn matmul_matches_hand_computed_product() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let b = m(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        assert_eq!(a.matmul(&b).unwrap(), m(&[&[22.0, 28.0], &[49.0, 64.0]]));
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        let c = Matrix::zeros(3, 2);

        assert!(matches!(a.matmul(&b), Err(Error::InvalidShape(_))));
        assert!(matches!(a.add(&c), Err(Error::InvalidShape(_))));
        assert!(matches!(a.sub(&c), Err(Error::InvalidShape(_))));
        assert!(matches!(a.zip_map(&c, |x, y| x * y), Err(Error::InvalidShape(_))));
        assert!(matches!(a.sum(), Err(Error::InvalidShape(_))));
        assert!(matches!(a.column(3), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn sum_and_column_on_vectors() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let col = a.column(1).unwrap();
        assert_eq!(col.shape(), (2, 1));
        assert_eq!(col.sum().unwrap(), 6.0);
    }

    #[test]
    fn random_entries_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = Matrix::random_with_rng(10, 10, &mut rng);
        assert!(a.as_slice().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn flatten_and_reshape_are_row_major() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::from_flat(a.to_vec(), 3, 2).unwrap();
        assert_eq!(b.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn display_uses_bracketed_rows() {
        let a = m(&[&[1.0, 0.5], &[-2.0, 3.0]]);
        assert_eq!(a.to_string(), "[[1, 0.5],\n[-2, 3]]");
    }

    #[derive(Debug)]
    struct Broken;

    impl MatmulBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn gemm(&self, _: usize, _: usize, _: usize, _: &[f64], _: &[f64]) -> Result<Vec<f64>> {
            Err(Error::Backend("device lost".to_owned()))
        }
    }

    #[test]
    fn backend_failure_aborts_the_product() {
        let a = Matrix::identity(2).with_backend(Some(Arc::new(Broken)));
        let err = a.matmul(&Matrix::identity(2)).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn results_inherit_the_left_operand_backend() {
        let a = Matrix::identity(2).with_backend(Some(Arc::new(crate::backend::Sequential)));
        let b = a.add(&Matrix::zeros(2, 2)).unwrap();
        assert_eq!(b.backend().map(|h| h.name()), Some("sequential"));
        assert_eq!(a.matmul(&b).unwrap().backend().map(|h| h.name()), Some("sequential"));
    }
}
