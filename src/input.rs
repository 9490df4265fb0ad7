//! Canonical input containers for the classifier contracts.
//!
//! Every public entry point of the capability traits takes its primary input
//! as [`Features`] and its labels as [`Labels`]. Conversions from ndarray
//! arrays of any rank and from plain nested `Vec`s live here, so the
//! coercion to a canonical numeric array happens uniformly at the call
//! boundary instead of inside each classifier.

use ndarray::{Array, Array1, Array2, ArrayD, Dimension};

use crate::error::{ClassifierError, Result};

/// Element type of the container a caller handed in, recorded when the data
/// is coerced to the canonical `f32` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
    U8,
    U16,
}

impl Dtype {
    pub fn is_unsigned(self) -> bool {
        matches!(self, Dtype::U8 | Dtype::U16)
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
            Dtype::U8 => "u8",
            Dtype::U16 => "u16",
        }
    }
}

/// Feature array with samples on the first axis.
///
/// The data is held as a dynamic-rank `f32` array so image-shaped and flat
/// inputs go through the same pipeline; the original element type is kept as
/// a [`Dtype`] tag so standardization can reject unsigned inputs before any
/// arithmetic happens.
#[derive(Debug, Clone)]
pub struct Features {
    data: ArrayD<f32>,
    dtype: Dtype,
}

impl Features {
    pub fn new(data: ArrayD<f32>) -> Self {
        Features {
            data,
            dtype: Dtype::F32,
        }
    }

    pub fn with_dtype(data: ArrayD<f32>, dtype: Dtype) -> Self {
        Features { data, dtype }
    }

    pub fn array(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Number of samples (length of the first axis).
    pub fn n_samples(&self) -> usize {
        if self.data.ndim() == 0 {
            0
        } else {
            self.data.shape()[0]
        }
    }

    /// Shape of a single sample, i.e. the shape without the batch axis.
    pub fn sample_shape(&self) -> &[usize] {
        &self.data.shape()[1.min(self.data.ndim())..]
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.data
    }

    /// Flatten each sample, yielding a `(n_samples, n_features)` matrix.
    pub fn to_matrix(&self) -> Result<Array2<f32>> {
        let n = self.n_samples();
        let cols: usize = self.sample_shape().iter().product();
        self.data
            .clone()
            .into_shape((n, cols))
            .map_err(|e| ClassifierError::Config(format!("cannot flatten features: {}", e)))
    }
}

impl<D: Dimension> From<Array<f32, D>> for Features {
    fn from(data: Array<f32, D>) -> Self {
        Features::new(data.into_dyn())
    }
}

impl<D: Dimension> From<Array<f64, D>> for Features {
    fn from(data: Array<f64, D>) -> Self {
        Features::with_dtype(data.mapv(|v| v as f32).into_dyn(), Dtype::F64)
    }
}

impl<D: Dimension> From<Array<u8, D>> for Features {
    fn from(data: Array<u8, D>) -> Self {
        Features::with_dtype(data.mapv(f32::from).into_dyn(), Dtype::U8)
    }
}

impl<D: Dimension> From<Array<u16, D>> for Features {
    fn from(data: Array<u16, D>) -> Self {
        Features::with_dtype(data.mapv(f32::from).into_dyn(), Dtype::U16)
    }
}

fn rows_to_array<T: Copy>(rows: &[Vec<T>], to_f32: fn(T) -> f32) -> Result<Array2<f32>> {
    let n = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(n * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ClassifierError::Config(format!(
                "ragged input: row 0 has {} features but row {} has {}",
                width,
                i,
                row.len()
            )));
        }
        flat.extend(row.iter().map(|&v| to_f32(v)));
    }
    Array2::from_shape_vec((n, width), flat)
        .map_err(|e| ClassifierError::Config(e.to_string()))
}

impl TryFrom<Vec<Vec<f32>>> for Features {
    type Error = ClassifierError;

    fn try_from(rows: Vec<Vec<f32>>) -> Result<Self> {
        Ok(Features::new(rows_to_array(&rows, |v| v)?.into_dyn()))
    }
}

impl TryFrom<Vec<Vec<f64>>> for Features {
    type Error = ClassifierError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Ok(Features::with_dtype(
            rows_to_array(&rows, |v| v as f32)?.into_dyn(),
            Dtype::F64,
        ))
    }
}

impl TryFrom<Vec<Vec<u8>>> for Features {
    type Error = ClassifierError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self> {
        Ok(Features::with_dtype(
            rows_to_array(&rows, f32::from)?.into_dyn(),
            Dtype::U8,
        ))
    }
}

/// Class labels, either index-encoded (`(n_samples,)`) or one-hot encoded
/// (`(n_samples, nb_classes)`).
#[derive(Debug, Clone)]
pub enum Labels {
    Indices(Array1<usize>),
    OneHot(Array2<f32>),
}

impl Labels {
    pub fn n_samples(&self) -> usize {
        match self {
            Labels::Indices(idx) => idx.len(),
            Labels::OneHot(m) => m.nrows(),
        }
    }

    /// Normalize to one-hot form given the classifier's class count.
    ///
    /// Idempotent: an already one-hot array of the right width is returned
    /// unchanged. Index labels outside `0..nb_classes` and one-hot arrays of
    /// the wrong width are configuration errors.
    pub fn to_one_hot(&self, nb_classes: usize) -> Result<Array2<f32>> {
        match self {
            Labels::Indices(idx) => {
                let mut one_hot = Array2::zeros((idx.len(), nb_classes));
                for (row, &class) in idx.iter().enumerate() {
                    if class >= nb_classes {
                        return Err(ClassifierError::Config(format!(
                            "label {} out of range for {} classes",
                            class, nb_classes
                        )));
                    }
                    one_hot[(row, class)] = 1.0;
                }
                Ok(one_hot)
            }
            Labels::OneHot(m) => {
                if m.ncols() != nb_classes {
                    return Err(ClassifierError::Config(format!(
                        "one-hot labels have width {} but the classifier has {} classes",
                        m.ncols(),
                        nb_classes
                    )));
                }
                Ok(m.clone())
            }
        }
    }
}

impl From<Vec<usize>> for Labels {
    fn from(idx: Vec<usize>) -> Self {
        Labels::Indices(Array1::from_vec(idx))
    }
}

impl From<&[usize]> for Labels {
    fn from(idx: &[usize]) -> Self {
        Labels::Indices(Array1::from_vec(idx.to_vec()))
    }
}

impl From<Array1<usize>> for Labels {
    fn from(idx: Array1<usize>) -> Self {
        Labels::Indices(idx)
    }
}

impl From<Array2<f32>> for Labels {
    fn from(one_hot: Array2<f32>) -> Self {
        Labels::OneHot(one_hot)
    }
}

/// Which class gradients `class_gradient` should compute.
#[derive(Debug, Clone)]
pub enum GradientTarget {
    /// Gradients for every class, shape `(batch, nb_classes, *input_shape)`.
    All,
    /// One class shared across the batch, shape `(batch, 1, *input_shape)`.
    Class(usize),
    /// One class per sample; the length must equal the batch size.
    PerSample(Vec<usize>),
}

impl GradientTarget {
    pub fn validate(&self, n_samples: usize, nb_classes: usize) -> Result<()> {
        match self {
            GradientTarget::All => Ok(()),
            GradientTarget::Class(c) => {
                if *c >= nb_classes {
                    return Err(ClassifierError::Config(format!(
                        "class {} out of range for {} classes",
                        c, nb_classes
                    )));
                }
                Ok(())
            }
            GradientTarget::PerSample(classes) => {
                if classes.len() != n_samples {
                    return Err(ClassifierError::Config(format!(
                        "{} per-sample targets for a batch of {}",
                        classes.len(),
                        n_samples
                    )));
                }
                if let Some(c) = classes.iter().find(|&&c| c >= nb_classes) {
                    return Err(ClassifierError::Config(format!(
                        "class {} out of range for {} classes",
                        c, nb_classes
                    )));
                }
                Ok(())
            }
        }
    }
}

impl From<usize> for GradientTarget {
    fn from(class: usize) -> Self {
        GradientTarget::Class(class)
    }
}

impl From<Vec<usize>> for GradientTarget {
    fn from(classes: Vec<usize>) -> Self {
        GradientTarget::PerSample(classes)
    }
}

/// Reference to a model layer, by position or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Index(usize),
    Name(String),
}

impl From<usize> for Layer {
    fn from(index: usize) -> Self {
        Layer::Index(index)
    }
}

impl From<&str> for Layer {
    fn from(name: &str) -> Self {
        Layer::Name(name.to_string())
    }
}
