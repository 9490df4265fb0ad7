//! Batch generators consumed by `fit_generator`.

use ndarray::{Array2, ArrayD, Axis};

use crate::error::{ClassifierError, Result};
use crate::input::{Features, Labels};

/// A source of training batches. The generator owns its iteration position
/// and wrap-around semantics; the classifier contract only pulls batches.
pub trait DataGenerator {
    /// Total number of samples backing the generator.
    fn size(&self) -> usize;

    fn batch_size(&self) -> usize;

    /// Return the next `(x, y)` batch and advance the internal position,
    /// wrapping around as needed.
    fn get_batch(&mut self) -> Result<(Features, Labels)>;
}

/// In-memory generator over a feature array and one-hot labels, cycling
/// through the data in order with wrap-around.
pub struct ArrayDataGenerator {
    x: ArrayD<f32>,
    y: Array2<f32>,
    batch_size: usize,
    position: usize,
}

impl ArrayDataGenerator {
    pub fn new(x: ArrayD<f32>, y: Array2<f32>, batch_size: usize) -> Result<Self> {
        let n = x.shape().first().copied().unwrap_or(0);
        if n == 0 {
            return Err(ClassifierError::Config(
                "generator requires a non-empty feature array".to_string(),
            ));
        }
        if y.nrows() != n {
            return Err(ClassifierError::Config(format!(
                "generator has {} samples but {} label rows",
                n,
                y.nrows()
            )));
        }
        if batch_size == 0 || batch_size > n {
            return Err(ClassifierError::Config(format!(
                "batch_size {} is invalid for {} samples",
                batch_size, n
            )));
        }
        Ok(ArrayDataGenerator {
            x,
            y,
            batch_size,
            position: 0,
        })
    }
}

impl DataGenerator for ArrayDataGenerator {
    fn size(&self) -> usize {
        self.x.shape()[0]
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn get_batch(&mut self) -> Result<(Features, Labels)> {
        let n = self.size();
        let indices: Vec<usize> = (0..self.batch_size)
            .map(|i| (self.position + i) % n)
            .collect();
        self.position = (self.position + self.batch_size) % n;

        let xb = self.x.select(Axis(0), &indices);
        let yb = self.y.select(Axis(0), &indices);
        Ok((Features::new(xb), Labels::OneHot(yb)))
    }
}
