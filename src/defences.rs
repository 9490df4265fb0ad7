//! Defence interfaces consumed by the preprocessing pipeline.
//!
//! Concrete defences live in the surrounding toolkit; this crate only fixes
//! the shape of the contract: a forward transform gated by two applicability
//! flags and, for preprocessing defences, a gradient-estimation backward
//! step used by the adjoint pipeline.

use ndarray::{Array2, ArrayD};

/// Whether a pipeline pass happens during training or prediction. Defences
/// are filtered by the matching applicability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Fit,
    Predict,
}

/// An input transform applied before the backend model runs.
///
/// Defences are applied in list order on the forward pass and their
/// `estimate_gradient` steps in reverse list order on the backward pass.
pub trait Preprocessor {
    /// Apply this defence when fitting.
    fn apply_fit(&self) -> bool;

    /// Apply this defence when predicting.
    fn apply_predict(&self) -> bool;

    /// Transform `(x, y)`; defences may consume and rewrite both.
    fn call(
        &self,
        x: ArrayD<f32>,
        y: Option<Array2<f32>>,
    ) -> (ArrayD<f32>, Option<Array2<f32>>);

    /// Backward (gradient-estimation) step: given the original input and the
    /// incoming gradient, produce the gradient w.r.t. this defence's input.
    fn estimate_gradient(&self, x: &ArrayD<f32>, gradients: ArrayD<f32>) -> ArrayD<f32>;

    fn active(&self, mode: Mode) -> bool {
        match mode {
            Mode::Fit => self.apply_fit(),
            Mode::Predict => self.apply_predict(),
        }
    }
}

/// An output transform applied to model predictions.
pub trait Postprocessor {
    fn apply_fit(&self) -> bool;

    fn apply_predict(&self) -> bool;

    /// Transform the predictions. The pipeline hands each defence an owned
    /// copy, so the backend's original output array is never mutated.
    fn call(&self, preds: Array2<f32>) -> Array2<f32>;

    fn active(&self, mode: Mode) -> bool {
        match mode {
            Mode::Fit => self.apply_fit(),
            Mode::Predict => self.apply_predict(),
        }
    }
}
