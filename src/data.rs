//! CSV sample ingestion.
//!
//! The expected layout is a header row followed by numeric records. The header only
//! fixes the record width; its contents are ignored. All values are read into one flat
//! buffer, which must divide evenly into records of that width.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::{Error, Matrix, Result};

#[derive(Debug, Clone, PartialEq)]
/// Fixed-width numeric samples, stored contiguously in row-major layout.
pub struct Samples {
    values: Vec<f64>,
    columns: usize,
}

impl Samples {
    /// Load samples from a CSV file with a header row.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let samples = Self::from_reader(file)?;
        debug!(
            path = %path.display(),
            samples = samples.len(),
            columns = samples.columns,
            "loaded samples"
        );
        Ok(samples)
    }

    /// Read samples from any CSV source with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let columns = rdr
            .headers()
            .map_err(|e| Error::Parse(format!("CSV header: {e}")))?
            .len();

        let mut values = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| Error::Parse(format!("CSV record: {e}")))?;
            for field in record.iter() {
                let value = field.parse::<f64>().map_err(|_| {
                    Error::Parse(format!(
                        "non-numeric value {field:?} in record {}",
                        line + 1
                    ))
                })?;
                values.push(value);
            }
        }

        Self::from_flat(values, columns)
    }

    /// Wrap a flat row-major buffer of `columns`-wide samples.
    pub fn from_flat(values: Vec<f64>, columns: usize) -> Result<Self> {
        if columns == 0 {
            return Err(Error::InvalidData("samples need at least one column".to_owned()));
        }
        if !values.len().is_multiple_of(columns) {
            return Err(Error::InvalidData(format!(
                "{} values do not divide into records of {columns} columns",
                values.len()
            )));
        }
        Ok(Self { values, columns })
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len() / self.columns
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The `idx`-th sample. Panics if out of range.
    #[inline]
    pub fn sample(&self, idx: usize) -> &[f64] {
        let start = idx * self.columns;
        &self.values[start..start + self.columns]
    }

    /// Every sample as a `columns x 1` vector.
    pub fn to_vectors(&self) -> Result<Vec<Matrix>> {
        self.values
            .chunks(self.columns)
            .map(|chunk| Matrix::column_vector(chunk.to_vec()))
            .collect()
    }
}
