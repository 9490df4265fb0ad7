//! Capability contracts for classifier adapters.
//!
//! The base [`Classifier`] trait is the minimum every adapter provides and
//! is enough for black-box algorithms. Neural-network, gradient, and
//! decision-tree capabilities extend it independently; an adapter implements
//! exactly the set it can honor. [`WhiteBoxClassifier`] is the named union
//! for callers that need a neural network with gradient access.

pub mod logistic;
pub mod stumps;

use std::path::Path;

use ndarray::{Array2, ArrayD};

use crate::defences::Mode;
use crate::error::{ClassifierError, Result};
use crate::generators::DataGenerator;
use crate::input::{Features, GradientTarget, Labels, Layer};
use crate::preprocessing::{ClassifierConfig, ClipValues};
use crate::trees::Tree;

/// Learning phase set by the user, if any. `Unset` means the backend's own
/// current phase is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningPhase {
    Train,
    Inference,
    Unset,
}

/// Minimum functionality required of every classifier adapter.
pub trait Classifier {
    /// Preprocessing state fixed at construction: clip bounds, defences,
    /// standardization.
    fn config(&self) -> &ClassifierConfig;

    /// Shape of a single input sample, without the batch axis.
    fn input_shape(&self) -> &[usize];

    /// Number of output classes. Stable for the lifetime of the instance.
    fn nb_classes(&self) -> usize;

    /// Predict class scores of shape `(n_samples, nb_classes)`.
    fn predict(&self, x: &Features) -> Result<Array2<f32>>;

    /// Train in place; `y` may be index- or one-hot-encoded.
    fn fit(&mut self, x: &Features, y: &Labels) -> Result<()>;

    /// Persist backend-specific state. When `path` is `None`, the default
    /// data directory from [`crate::config::data_path`] is used.
    ///
    /// The default body signals the capability is missing; adapters that can
    /// persist themselves override it.
    fn save(&self, filename: &str, path: Option<&Path>) -> Result<()> {
        let _ = (filename, path);
        Err(ClassifierError::NotImplemented("save"))
    }

    fn clip_values(&self) -> Option<&ClipValues> {
        self.config().clip_values()
    }
}

/// Additional functionality for neural-network classifiers.
pub trait NeuralNetworkClassifier: Classifier {
    /// Predict in batches of `batch_size`.
    fn predict_batch(&self, x: &Features, batch_size: usize) -> Result<Array2<f32>>;

    /// Train for `nb_epochs` epochs with mini-batches of `batch_size`.
    fn fit_epochs(
        &mut self,
        x: &Features,
        y: &Labels,
        batch_size: usize,
        nb_epochs: usize,
    ) -> Result<()>;

    /// Train from a batch generator.
    ///
    /// The default implementation pulls `floor(size / batch_size)` batches
    /// per epoch, runs each through the forward pipeline in fit mode, and
    /// fits on it for a single epoch. Backends with a native generator path
    /// may override this for speed.
    fn fit_generator(
        &mut self,
        generator: &mut dyn DataGenerator,
        nb_epochs: usize,
    ) -> Result<()> {
        let nb_batches = generator.size() / generator.batch_size();
        for epoch in 0..nb_epochs {
            log::debug!("fit_generator epoch {}/{}", epoch + 1, nb_epochs);
            for _ in 0..nb_batches {
                let (x, y) = generator.get_batch()?;
                let (x_fit, y_fit) = self.config().apply_preprocessing(
                    &x,
                    Some(&y),
                    self.nb_classes(),
                    Mode::Fit,
                )?;
                let y_fit = y_fit.ok_or_else(|| {
                    ClassifierError::Backend(
                        "generator batch lost its labels during preprocessing".to_string(),
                    )
                })?;
                self.fit_epochs(
                    &Features::new(x_fit),
                    &Labels::OneHot(y_fit),
                    generator.batch_size(),
                    1,
                )?;
            }
        }
        Ok(())
    }

    /// Output of the given layer for input `x`.
    fn get_activations(
        &self,
        x: &Features,
        layer: &Layer,
        batch_size: usize,
    ) -> Result<ArrayD<f32>>;

    /// Force the backend into training (`true`) or inference (`false`)
    /// phase for all following computations.
    fn set_learning_phase(&mut self, train: bool);

    fn learning_phase(&self) -> LearningPhase;

    /// Index of the channel axis in the input array, if the input has one.
    fn channel_index(&self) -> Option<usize> {
        None
    }

    /// Best-effort hidden-layer names. No guarantee on order or
    /// completeness; implementations return an empty list rather than
    /// guessing, and this never errors.
    fn layer_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Additional functionality for classifiers exposing loss and class
/// gradients, as required by white-box algorithms.
pub trait GradientClassifier: Classifier {
    /// Per-class derivatives of the class scores w.r.t. `x`.
    ///
    /// Shape is `(batch, nb_classes, *input_shape)` for
    /// [`GradientTarget::All`] and `(batch, 1, *input_shape)` otherwise.
    fn class_gradient(&self, x: &Features, target: &GradientTarget) -> Result<ArrayD<f32>>;

    /// Derivative of the training loss w.r.t. `x`, same shape as `x`.
    fn loss_gradient(&self, x: &Features, y: &Labels) -> Result<ArrayD<f32>>;
}

/// Additional functionality for tree-ensemble classifiers.
pub trait DecisionTreeClassifier: Classifier {
    /// The decision trees backing this classifier.
    fn trees(&self) -> Vec<Tree>;
}

/// Named union of the neural-network and gradient capabilities, for callers
/// that need both at once. Implemented automatically.
pub trait WhiteBoxClassifier: NeuralNetworkClassifier + GradientClassifier {}

impl<T: NeuralNetworkClassifier + GradientClassifier> WhiteBoxClassifier for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct MinimalClassifier {
        config: ClassifierConfig,
    }

    impl Classifier for MinimalClassifier {
        fn config(&self) -> &ClassifierConfig {
            &self.config
        }

        fn input_shape(&self) -> &[usize] {
            &[2]
        }

        fn nb_classes(&self) -> usize {
            2
        }

        fn predict(&self, x: &Features) -> Result<Array2<f32>> {
            let n = x.n_samples();
            Ok(Array2::from_elem((n, 2), 0.5))
        }

        fn fit(&mut self, _x: &Features, _y: &Labels) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn save_defaults_to_not_implemented() {
        let clf = MinimalClassifier {
            config: ClassifierConfig::new(),
        };
        let err = clf.save("model.json", None).unwrap_err();
        assert!(matches!(err, ClassifierError::NotImplemented("save")));
    }

    #[test]
    fn clip_values_accessor_reads_config() {
        let clf = MinimalClassifier {
            config: ClassifierConfig::new()
                .with_clip_values(ClipValues::scalar(0.0, 1.0).unwrap()),
        };
        let clip = clf.clip_values().unwrap();
        assert_eq!(clip.min().sum(), 0.0);
        assert_eq!(clip.max().sum(), 1.0);
    }

    #[test]
    fn trait_objects_work_for_black_box_callers() {
        let clf: Box<dyn Classifier> = Box::new(MinimalClassifier {
            config: ClassifierConfig::new(),
        });
        let preds = clf.predict(&Features::from(array![[1.0f32, 0.0]])).unwrap();
        assert_eq!(preds.dim(), (1, 2));
    }
}
