//! Input standardization, clip bounds, and the defence pipeline runner.
//!
//! [`ClassifierConfig`] holds the per-instance preprocessing state every
//! classifier carries: optional clip bounds, the ordered defence chains, and
//! the optional `(subtract, divide)` standardization pair. All of it is
//! validated at construction and immutable afterwards. The forward pass
//! applies defences in list order and standardization last; the backward
//! (gradient) pass undoes standardization first and then walks the defences
//! in reverse list order.

use ndarray::{arr0, Array1, Array2, ArrayD};

use crate::defences::{Mode, Postprocessor, Preprocessor};
use crate::error::{ClassifierError, Result};
use crate::input::{Dtype, Features, Labels};

/// Validated `(min, max)` bounds for input features. Scalar bounds apply to
/// every feature; array bounds are matched element-wise.
#[derive(Debug, Clone)]
pub struct ClipValues {
    min: ArrayD<f32>,
    max: ArrayD<f32>,
}

impl ClipValues {
    /// Build clip bounds, requiring `min < max` everywhere.
    pub fn new(min: ArrayD<f32>, max: ArrayD<f32>) -> Result<Self> {
        if min.shape() != max.shape() {
            return Err(ClassifierError::Config(format!(
                "clip_values min has shape {:?} but max has shape {:?}",
                min.shape(),
                max.shape()
            )));
        }
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo >= hi) {
            return Err(ClassifierError::Config(
                "invalid clip_values: min >= max".to_string(),
            ));
        }
        Ok(ClipValues { min, max })
    }

    pub fn scalar(min: f32, max: f32) -> Result<Self> {
        ClipValues::new(arr0(min).into_dyn(), arr0(max).into_dyn())
    }

    pub fn per_feature(min: Array1<f32>, max: Array1<f32>) -> Result<Self> {
        ClipValues::new(min.into_dyn(), max.into_dyn())
    }

    pub fn min(&self) -> &ArrayD<f32> {
        &self.min
    }

    pub fn max(&self) -> &ArrayD<f32> {
        &self.max
    }

    /// Clamp `x` into the bounds in place.
    pub fn clamp(&self, x: &mut ArrayD<f32>) -> Result<()> {
        let dim = x.raw_dim();
        let lo = self.min.broadcast(dim.clone()).ok_or_else(|| {
            ClassifierError::Config(format!(
                "clip_values shape {:?} does not broadcast to input shape {:?}",
                self.min.shape(),
                x.shape()
            ))
        })?;
        let hi = self.max.broadcast(dim).ok_or_else(|| {
            ClassifierError::Config(format!(
                "clip_values shape {:?} does not broadcast to input shape {:?}",
                self.max.shape(),
                x.shape()
            ))
        })?;
        ndarray::Zip::from(&mut *x)
            .and(&lo)
            .and(&hi)
            .for_each(|v, &lo, &hi| *v = v.max(lo).min(hi));
        Ok(())
    }
}

impl TryFrom<(f32, f32)> for ClipValues {
    type Error = ClassifierError;

    fn try_from((min, max): (f32, f32)) -> Result<Self> {
        ClipValues::scalar(min, max)
    }
}

impl TryFrom<&[f32]> for ClipValues {
    type Error = ClassifierError;

    /// Accepts exactly `[min, max]`; any other arity is a configuration
    /// error.
    fn try_from(bounds: &[f32]) -> Result<Self> {
        match bounds {
            [min, max] => ClipValues::scalar(*min, *max),
            _ => Err(ClassifierError::Config(format!(
                "clip_values should contain exactly 2 elements, got {}",
                bounds.len()
            ))),
        }
    }
}

/// The `(subtract, divide)` affine normalization applied to raw inputs.
#[derive(Debug, Clone)]
pub struct Standardization {
    sub: ArrayD<f32>,
    div: ArrayD<f32>,
}

impl Standardization {
    pub fn new(sub: ArrayD<f32>, div: ArrayD<f32>) -> Result<Self> {
        if sub.shape() != div.shape() {
            return Err(ClassifierError::Config(format!(
                "standardization subtract has shape {:?} but divide has shape {:?}",
                sub.shape(),
                div.shape()
            )));
        }
        if div.iter().any(|&v| v == 0.0) {
            return Err(ClassifierError::Config(
                "standardization divide factor contains zero".to_string(),
            ));
        }
        Ok(Standardization { sub, div })
    }

    pub fn scalar(sub: f32, div: f32) -> Result<Self> {
        Standardization::new(arr0(sub).into_dyn(), arr0(div).into_dyn())
    }

    pub fn per_feature(sub: Array1<f32>, div: Array1<f32>) -> Result<Self> {
        Standardization::new(sub.into_dyn(), div.into_dyn())
    }

    /// Forward step: `(x - sub) / div`.
    ///
    /// Fails fast with an `UnsupportedDtype` error when the recorded element
    /// type is unsigned, before any arithmetic is attempted.
    pub fn apply(&self, x: ArrayD<f32>, dtype: Dtype) -> Result<ArrayD<f32>> {
        if dtype.is_unsigned() {
            return Err(ClassifierError::UnsupportedDtype(dtype.name()));
        }
        let dim = x.raw_dim();
        let sub = self.broadcast_to(&self.sub, &dim, x.shape())?;
        let div = self.broadcast_to(&self.div, &dim, x.shape())?;
        Ok((&x - &sub) / &div)
    }

    /// Backward step: divide the incoming gradient by the divide factor (the
    /// subtract term has zero derivative). The gradient may carry an extra
    /// class axis; trailing-axis broadcasting covers both layouts.
    pub fn gradient(&self, gradients: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let dim = gradients.raw_dim();
        let div = self.broadcast_to(&self.div, &dim, gradients.shape())?;
        Ok(&gradients / &div)
    }

    /// Inverse transform `x * div + sub`, mapping standardized data back to
    /// the raw feature space.
    pub fn invert(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let dim = x.raw_dim();
        let sub = self.broadcast_to(&self.sub, &dim, x.shape())?;
        let div = self.broadcast_to(&self.div, &dim, x.shape())?;
        Ok(&x * &div + &sub)
    }

    fn broadcast_to<'a>(
        &self,
        param: &'a ArrayD<f32>,
        dim: &ndarray::IxDyn,
        target_shape: &[usize],
    ) -> Result<ndarray::ArrayViewD<'a, f32>> {
        param.broadcast(dim.clone()).ok_or_else(|| {
            ClassifierError::Config(format!(
                "standardization shape {:?} does not broadcast to input shape {:?}",
                param.shape(),
                target_shape
            ))
        })
    }
}

impl TryFrom<(f32, f32)> for Standardization {
    type Error = ClassifierError;

    fn try_from((sub, div): (f32, f32)) -> Result<Self> {
        Standardization::scalar(sub, div)
    }
}

impl TryFrom<&[f32]> for Standardization {
    type Error = ClassifierError;

    fn try_from(pair: &[f32]) -> Result<Self> {
        match pair {
            [sub, div] => Standardization::scalar(*sub, *div),
            _ => Err(ClassifierError::Config(format!(
                "standardization should contain exactly 2 elements (subtract, divide), got {}",
                pair.len()
            ))),
        }
    }
}

/// Per-instance preprocessing state shared by all classifier adapters.
///
/// Built once at classifier construction; the defence lists and
/// standardization parameters are fixed for the lifetime of the instance.
#[derive(Default)]
pub struct ClassifierConfig {
    clip_values: Option<ClipValues>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    postprocessors: Vec<Box<dyn Postprocessor>>,
    standardization: Option<Standardization>,
}

impl ClassifierConfig {
    pub fn new() -> Self {
        ClassifierConfig::default()
    }

    pub fn with_clip_values(mut self, clip_values: ClipValues) -> Self {
        self.clip_values = Some(clip_values);
        self
    }

    pub fn with_preprocessor(mut self, defence: Box<dyn Preprocessor>) -> Self {
        self.preprocessors.push(defence);
        self
    }

    pub fn with_postprocessor(mut self, defence: Box<dyn Postprocessor>) -> Self {
        self.postprocessors.push(defence);
        self
    }

    pub fn with_standardization(mut self, standardization: Standardization) -> Self {
        self.standardization = Some(standardization);
        self
    }

    pub fn clip_values(&self) -> Option<&ClipValues> {
        self.clip_values.as_ref()
    }

    pub fn standardization(&self) -> Option<&Standardization> {
        self.standardization.as_ref()
    }

    /// Forward pipeline, run on every raw `(x, y)` a classifier receives:
    /// label normalization, defences in list order filtered by `mode`, then
    /// standardization.
    pub fn apply_preprocessing(
        &self,
        x: &Features,
        y: Option<&Labels>,
        nb_classes: usize,
        mode: Mode,
    ) -> Result<(ArrayD<f32>, Option<Array2<f32>>)> {
        let mut y_hot = match y {
            Some(labels) => Some(labels.to_one_hot(nb_classes)?),
            None => None,
        };

        let mut data = x.array().clone();
        for defence in &self.preprocessors {
            if defence.active(mode) {
                let (next_x, next_y) = defence.call(data, y_hot);
                data = next_x;
                y_hot = next_y;
            }
        }

        if let Some(standardization) = &self.standardization {
            data = standardization.apply(data, x.dtype())?;
        }

        log::trace!(
            "preprocessing pipeline produced shape {:?} ({:?} mode)",
            data.shape(),
            mode
        );
        Ok((data, y_hot))
    }

    /// Postprocessing pipeline. Operates on a copy of the predictions; the
    /// backend's returned array is never mutated.
    pub fn apply_postprocessing(&self, preds: &Array2<f32>, mode: Mode) -> Array2<f32> {
        let mut post_preds = preds.clone();
        for defence in &self.postprocessors {
            if defence.active(mode) {
                post_preds = defence.call(post_preds);
            }
        }
        post_preds
    }

    /// Backward pipeline, the adjoint of [`apply_preprocessing`]: undo the
    /// standardization scaling, then run defence gradient estimators in
    /// reverse list order.
    ///
    /// [`apply_preprocessing`]: ClassifierConfig::apply_preprocessing
    pub fn apply_preprocessing_gradient(
        &self,
        x: &Features,
        mut gradients: ArrayD<f32>,
        mode: Mode,
    ) -> Result<ArrayD<f32>> {
        if let Some(standardization) = &self.standardization {
            gradients = standardization.gradient(gradients)?;
        }
        for defence in self.preprocessors.iter().rev() {
            if defence.active(mode) {
                gradients = defence.estimate_gradient(x.array(), gradients);
            }
        }
        Ok(gradients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn clip_values_rejects_min_not_below_max() {
        assert!(ClipValues::scalar(1.0, 0.0).is_err());
        assert!(ClipValues::scalar(1.0, 1.0).is_err());
        assert!(ClipValues::scalar(0.0, 1.0).is_ok());
    }

    #[test]
    fn per_feature_clip_values_checked_elementwise() {
        let min = Array1::from_vec(vec![0.0, 0.0]);
        let max = Array1::from_vec(vec![1.0, 0.0]);
        assert!(ClipValues::per_feature(min, max).is_err());

        let min = Array1::from_vec(vec![0.0, -1.0]);
        let max = Array1::from_vec(vec![1.0, 1.0]);
        assert!(ClipValues::per_feature(min, max).is_ok());
    }

    #[test]
    fn clip_values_arity_must_be_two() {
        assert!(ClipValues::try_from(&[0.0f32][..]).is_err());
        assert!(ClipValues::try_from(&[0.0f32, 1.0, 2.0][..]).is_err());
        assert!(ClipValues::try_from(&[0.0f32, 1.0][..]).is_ok());
    }

    #[test]
    fn clamp_applies_bounds() {
        let clip = ClipValues::scalar(0.0, 1.0).unwrap();
        let mut x = array![[1.5f32, -0.5], [0.25, 0.75]].into_dyn();
        clip.clamp(&mut x).unwrap();
        assert_eq!(x, array![[1.0f32, 0.0], [0.25, 0.75]].into_dyn());
    }

    #[test]
    fn standardization_arity_must_be_two() {
        assert!(Standardization::try_from(&[0.5f32][..]).is_err());
        assert!(Standardization::try_from(&[0.5f32, 0.5, 0.5][..]).is_err());
        assert!(Standardization::try_from(&[0.5f32, 0.5][..]).is_ok());
    }

    #[test]
    fn standardization_rejects_zero_divide() {
        assert!(Standardization::scalar(0.0, 0.0).is_err());
        let sub = Array1::from_vec(vec![0.0, 0.0]);
        let div = Array1::from_vec(vec![1.0, 0.0]);
        assert!(Standardization::per_feature(sub, div).is_err());
    }

    #[test]
    fn standardization_round_trip_recovers_input() {
        let std = Standardization::scalar(0.4, 2.5).unwrap();
        let x = array![[1.0f32, 0.0, -3.0], [7.5, 0.4, 2.0]].into_dyn();
        let forward = std.apply(x.clone(), Dtype::F32).unwrap();
        let back = std.invert(forward).unwrap();
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-5, "round trip mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn standardization_fails_fast_on_unsigned_dtype() {
        let std = Standardization::scalar(0.5, 0.5).unwrap();
        let x = array![[1.0f32, 2.0]].into_dyn();
        let err = std.apply(x, Dtype::U8).unwrap_err();
        assert!(matches!(err, ClassifierError::UnsupportedDtype("u8")));
    }

    #[test]
    fn gradient_divides_by_divide_factor() {
        let std = Standardization::scalar(0.5, 2.0).unwrap();
        let grads = array![[4.0f32, 8.0]].into_dyn();
        let back = std.gradient(grads).unwrap();
        assert_eq!(back, array![[2.0f32, 4.0]].into_dyn());
    }

    #[test]
    fn per_feature_standardization_broadcasts_over_batch() {
        let std = Standardization::per_feature(
            Array1::from_vec(vec![1.0, 2.0]),
            Array1::from_vec(vec![2.0, 4.0]),
        )
        .unwrap();
        let x = array![[3.0f32, 6.0], [1.0, 2.0]].into_dyn();
        let out = std.apply(x, Dtype::F32).unwrap();
        assert_eq!(out, array![[1.0f32, 1.0], [0.0, 0.0]].into_dyn());
    }

    #[test]
    fn empty_config_passes_data_through() {
        let config = ClassifierConfig::new();
        let x = Features::from(array![[1.0f32, -1.0]]);
        let (out, y) = config
            .apply_preprocessing(&x, None, 2, Mode::Predict)
            .unwrap();
        assert_eq!(out, array![[1.0f32, -1.0]].into_dyn());
        assert!(y.is_none());
    }

    #[test]
    fn standardization_scenario_matches_expected_values() {
        // clip=(0,1), no defences, preprocessing=(0.5, 0.5), x=[[1,0]]
        let config = ClassifierConfig::new()
            .with_clip_values(ClipValues::scalar(0.0, 1.0).unwrap())
            .with_standardization(Standardization::scalar(0.5, 0.5).unwrap());
        let x = Features::from(array![[1.0f32, 0.0]]);
        let (out, _) = config
            .apply_preprocessing(&x, None, 2, Mode::Predict)
            .unwrap();
        assert_eq!(out, array![[1.0f32, -1.0]].into_dyn());
    }
}
