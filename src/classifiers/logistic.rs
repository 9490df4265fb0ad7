//! Reference multinomial logistic-regression adapter.
//!
//! A small softmax classifier trained with mini-batch SGD. It exists so the
//! capability contracts have a fully working in-crate backend: it implements
//! the base, neural-network, and gradient capabilities, routes every entry
//! point through the defence pipeline, and computes its class and loss
//! gradients analytically.

use std::fs;
use std::path::Path;

use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};

use crate::classifiers::{Classifier, GradientClassifier, LearningPhase, NeuralNetworkClassifier};
use crate::config::{data_path, TrainingConfig};
use crate::defences::Mode;
use crate::error::{ClassifierError, Result};
use crate::input::{Features, GradientTarget, Labels, Layer};
use crate::preprocessing::ClassifierConfig;

/// Softmax-regression classifier over flattened input features.
pub struct LogisticClassifier {
    weights: Array2<f32>,
    bias: Array1<f32>,
    input_shape: Vec<usize>,
    nb_classes: usize,
    config: ClassifierConfig,
    training: TrainingConfig,
    learning_phase: LearningPhase,
}

/// On-disk form of the model state written by `save`.
#[derive(Deserialize, Serialize)]
struct SavedLogistic {
    input_shape: Vec<usize>,
    nb_classes: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    training: TrainingConfig,
}

impl LogisticClassifier {
    pub fn new(
        input_shape: Vec<usize>,
        nb_classes: usize,
        config: ClassifierConfig,
        training: TrainingConfig,
    ) -> Result<Self> {
        if nb_classes < 2 {
            return Err(ClassifierError::Config(format!(
                "nb_classes must be at least 2, got {}",
                nb_classes
            )));
        }
        let n_features: usize = input_shape.iter().product();
        if input_shape.is_empty() || n_features == 0 {
            return Err(ClassifierError::Config(format!(
                "invalid input_shape {:?}",
                input_shape
            )));
        }
        Ok(LogisticClassifier {
            weights: Array2::zeros((n_features, nb_classes)),
            bias: Array1::zeros(nb_classes),
            input_shape,
            nb_classes,
            config,
            training,
            learning_phase: LearningPhase::Unset,
        })
    }

    fn n_features(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Run the forward pipeline and flatten the result to a sample matrix.
    fn preprocess_to_matrix(
        &self,
        x: &Features,
        y: Option<&Labels>,
        mode: Mode,
    ) -> Result<(Array2<f32>, Option<Array2<f32>>)> {
        let (x_p, y_p) = self
            .config
            .apply_preprocessing(x, y, self.nb_classes, mode)?;
        let m = Features::new(x_p).to_matrix()?;
        if m.ncols() != self.n_features() {
            return Err(ClassifierError::Config(format!(
                "input has {} features per sample, expected {}",
                m.ncols(),
                self.n_features()
            )));
        }
        Ok((m, y_p))
    }

    fn logits(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }

    fn softmax(mut logits: Array2<f32>) -> Array2<f32> {
        for mut row in logits.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        logits
    }

    fn cross_entropy(probs: &Array2<f32>, y: &Array2<f32>) -> f32 {
        let n = probs.nrows() as f32;
        let mut loss = 0.0;
        for (p, t) in probs.iter().zip(y.iter()) {
            if *t > 0.0 {
                loss -= t * p.max(1e-12).ln();
            }
        }
        loss / n
    }

    /// Gradient of one class score w.r.t. the flattened input of sample `i`:
    /// `p_ic * (w_c - sum_k p_ik w_k)`.
    fn single_class_gradient(
        &self,
        probs: &Array2<f32>,
        weighted: &Array2<f32>,
        sample: usize,
        class: usize,
    ) -> Array1<f32> {
        let direction = &self.weights.column(class) - &weighted.row(sample);
        direction * probs[(sample, class)]
    }

    /// Restore batch and input-shape axes on a gradient matrix, with an
    /// optional class axis of width `classes`.
    fn reshape_gradient(&self, grads: ArrayD<f32>, n: usize, classes: Option<usize>) -> Result<ArrayD<f32>> {
        let mut shape = vec![n];
        if let Some(c) = classes {
            shape.push(c);
        }
        shape.extend_from_slice(&self.input_shape);
        grads
            .into_shape(shape)
            .map_err(|e| ClassifierError::Backend(e.to_string()))
    }
}

impl Classifier for LogisticClassifier {
    fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn nb_classes(&self) -> usize {
        self.nb_classes
    }

    fn predict(&self, x: &Features) -> Result<Array2<f32>> {
        self.predict_batch(x, self.training.batch_size)
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<()> {
        self.fit_epochs(x, y, self.training.batch_size, self.training.nb_epochs)
    }

    fn save(&self, filename: &str, path: Option<&Path>) -> Result<()> {
        let dir = match path {
            Some(p) => p.to_path_buf(),
            None => data_path(),
        };
        fs::create_dir_all(&dir)?;
        let state = SavedLogistic {
            input_shape: self.input_shape.clone(),
            nb_classes: self.nb_classes,
            weights: self.weights.iter().copied().collect(),
            bias: self.bias.to_vec(),
            training: self.training.clone(),
        };
        let target = dir.join(filename);
        fs::write(&target, serde_json::to_string(&state)?)?;
        log::info!("saved logistic classifier to {}", target.display());
        Ok(())
    }
}

impl NeuralNetworkClassifier for LogisticClassifier {
    fn predict_batch(&self, x: &Features, batch_size: usize) -> Result<Array2<f32>> {
        if batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be non-zero".to_string()));
        }
        let (m, _) = self.preprocess_to_matrix(x, None, Mode::Predict)?;

        let mut probs = Array2::zeros((m.nrows(), self.nb_classes));
        for (chunk_idx, chunk) in m.axis_chunks_iter(Axis(0), batch_size).enumerate() {
            let p = Self::softmax(self.logits(&chunk.to_owned()));
            let start = chunk_idx * batch_size;
            probs
                .slice_mut(s![start..start + p.nrows(), ..])
                .assign(&p);
        }

        Ok(self.config.apply_postprocessing(&probs, Mode::Predict))
    }

    fn fit_epochs(
        &mut self,
        x: &Features,
        y: &Labels,
        batch_size: usize,
        nb_epochs: usize,
    ) -> Result<()> {
        if batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be non-zero".to_string()));
        }
        let (m, y_hot) = self.preprocess_to_matrix(x, Some(y), Mode::Fit)?;
        let y_hot = y_hot.ok_or_else(|| {
            ClassifierError::Backend("labels were dropped during preprocessing".to_string())
        })?;
        if y_hot.nrows() != m.nrows() {
            return Err(ClassifierError::Config(format!(
                "{} samples but {} label rows",
                m.nrows(),
                y_hot.nrows()
            )));
        }

        let n = m.nrows();
        let lr = self.training.learning_rate;
        let mut rng = thread_rng();
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..nb_epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = m.select(Axis(0), batch);
                let yb = y_hot.select(Axis(0), batch);
                let probs = Self::softmax(self.logits(&xb));
                let delta = &probs - &yb;
                let b = batch.len() as f32;

                let grad_w = xb.t().dot(&delta) / b;
                let grad_b = delta.sum_axis(Axis(0)) / b;
                self.weights = &self.weights - &(grad_w * lr);
                self.bias = &self.bias - &(grad_b * lr);
            }

            if log::log_enabled!(log::Level::Trace) {
                let probs = Self::softmax(self.logits(&m));
                log::trace!(
                    "epoch {}/{}: loss {:.6}",
                    epoch + 1,
                    nb_epochs,
                    Self::cross_entropy(&probs, &y_hot)
                );
            }
        }
        Ok(())
    }

    fn get_activations(
        &self,
        x: &Features,
        layer: &Layer,
        batch_size: usize,
    ) -> Result<ArrayD<f32>> {
        let _ = batch_size;
        let (m, _) = self.preprocess_to_matrix(x, None, Mode::Predict)?;
        let logits = self.logits(&m);
        match layer {
            Layer::Index(0) => Ok(logits.into_dyn()),
            Layer::Index(1) => Ok(Self::softmax(logits).into_dyn()),
            Layer::Name(name) if name == "logits" => Ok(logits.into_dyn()),
            Layer::Name(name) if name == "softmax" => Ok(Self::softmax(logits).into_dyn()),
            _ => Err(ClassifierError::Config(format!(
                "unknown layer {:?}; available layers: {:?}",
                layer,
                self.layer_names()
            ))),
        }
    }

    fn set_learning_phase(&mut self, train: bool) {
        self.learning_phase = if train {
            LearningPhase::Train
        } else {
            LearningPhase::Inference
        };
    }

    fn learning_phase(&self) -> LearningPhase {
        self.learning_phase
    }

    fn layer_names(&self) -> Vec<String> {
        vec!["logits".to_string(), "softmax".to_string()]
    }
}

impl GradientClassifier for LogisticClassifier {
    fn class_gradient(&self, x: &Features, target: &GradientTarget) -> Result<ArrayD<f32>> {
        let (m, _) = self.preprocess_to_matrix(x, None, Mode::Predict)?;
        let n = m.nrows();
        target.validate(n, self.nb_classes)?;

        let probs = Self::softmax(self.logits(&m));
        // Expectation of the weight columns under the softmax distribution,
        // one row per sample.
        let weighted = probs.dot(&self.weights.t());

        let grads = match target {
            GradientTarget::All => {
                let mut grads = Array3::zeros((n, self.nb_classes, self.n_features()));
                for i in 0..n {
                    for c in 0..self.nb_classes {
                        grads
                            .slice_mut(s![i, c, ..])
                            .assign(&self.single_class_gradient(&probs, &weighted, i, c));
                    }
                }
                grads
            }
            GradientTarget::Class(c) => {
                let mut grads = Array3::zeros((n, 1, self.n_features()));
                for i in 0..n {
                    grads
                        .slice_mut(s![i, 0, ..])
                        .assign(&self.single_class_gradient(&probs, &weighted, i, *c));
                }
                grads
            }
            GradientTarget::PerSample(classes) => {
                let mut grads = Array3::zeros((n, 1, self.n_features()));
                for (i, &c) in classes.iter().enumerate() {
                    grads
                        .slice_mut(s![i, 0, ..])
                        .assign(&self.single_class_gradient(&probs, &weighted, i, c));
                }
                grads
            }
        };

        let classes = grads.dim().1;
        let grads = self.reshape_gradient(grads.into_dyn(), n, Some(classes))?;
        self.config
            .apply_preprocessing_gradient(x, grads, Mode::Predict)
    }

    fn loss_gradient(&self, x: &Features, y: &Labels) -> Result<ArrayD<f32>> {
        let (m, y_hot) = self.preprocess_to_matrix(x, Some(y), Mode::Predict)?;
        let y_hot = y_hot.ok_or_else(|| {
            ClassifierError::Backend("labels were dropped during preprocessing".to_string())
        })?;
        if y_hot.nrows() != m.nrows() {
            return Err(ClassifierError::Config(format!(
                "{} samples but {} label rows",
                m.nrows(),
                y_hot.nrows()
            )));
        }

        let probs = Self::softmax(self.logits(&m));
        let delta = &probs - &y_hot;
        let grads = delta.dot(&self.weights.t());

        let n = grads.nrows();
        let grads = self.reshape_gradient(grads.into_dyn(), n, None)?;
        self.config
            .apply_preprocessing_gradient(x, grads, Mode::Predict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_data() -> (Features, Labels) {
        let x = Features::from(array![
            [0.0f32, 0.1],
            [0.1, 0.0],
            [0.0, 0.2],
            [0.9, 1.0],
            [1.0, 0.9],
            [0.8, 1.0],
        ]);
        let y = Labels::from(vec![0usize, 0, 0, 1, 1, 1]);
        (x, y)
    }

    fn trained_classifier() -> LogisticClassifier {
        let mut clf = LogisticClassifier::new(
            vec![2],
            2,
            ClassifierConfig::new(),
            TrainingConfig::new(0.5, 2, 200),
        )
        .unwrap();
        let (x, y) = toy_data();
        clf.fit(&x, &y).unwrap();
        clf
    }

    #[test]
    fn rejects_degenerate_construction() {
        assert!(LogisticClassifier::new(
            vec![2],
            1,
            ClassifierConfig::new(),
            TrainingConfig::default()
        )
        .is_err());
        assert!(LogisticClassifier::new(
            vec![],
            2,
            ClassifierConfig::new(),
            TrainingConfig::default()
        )
        .is_err());
    }

    #[test]
    fn fit_separates_toy_classes() {
        let clf = trained_classifier();
        let (x, _) = toy_data();
        let probs = clf.predict(&x).unwrap();
        assert!(probs[(0, 0)] > 0.5, "sample 0 should favor class 0");
        assert!(probs[(3, 1)] > 0.5, "sample 3 should favor class 1");
        // rows sum to one
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn training_reduces_loss() {
        let (x, y) = toy_data();
        let mut clf = LogisticClassifier::new(
            vec![2],
            2,
            ClassifierConfig::new(),
            TrainingConfig::new(0.5, 2, 1),
        )
        .unwrap();
        let y_hot = y.to_one_hot(2).unwrap();
        let before =
            LogisticClassifier::cross_entropy(&clf.predict(&x).unwrap(), &y_hot);
        clf.fit_epochs(&x, &y, 2, 100).unwrap();
        let after = LogisticClassifier::cross_entropy(&clf.predict(&x).unwrap(), &y_hot);
        assert!(after < before, "loss should drop: {} -> {}", before, after);
    }

    #[test]
    fn class_gradient_shapes_follow_target() {
        let clf = trained_classifier();
        let (x, _) = toy_data();

        let all = clf.class_gradient(&x, &GradientTarget::All).unwrap();
        assert_eq!(all.shape(), &[6, 2, 2]);

        let single = clf.class_gradient(&x, &GradientTarget::Class(1)).unwrap();
        assert_eq!(single.shape(), &[6, 1, 2]);

        let per_sample = clf
            .class_gradient(&x, &GradientTarget::PerSample(vec![0, 1, 0, 1, 0, 1]))
            .unwrap();
        assert_eq!(per_sample.shape(), &[6, 1, 2]);
    }

    #[test]
    fn per_sample_gradient_matches_single_class_rows() {
        let clf = trained_classifier();
        let (x, _) = toy_data();
        let all = clf.class_gradient(&x, &GradientTarget::All).unwrap();
        let per_sample = clf
            .class_gradient(&x, &GradientTarget::PerSample(vec![1, 0, 1, 0, 1, 0]))
            .unwrap();
        for i in 0..6 {
            let expected_class = if i % 2 == 0 { 1 } else { 0 };
            for f in 0..2 {
                let a = all[[i, expected_class, f]];
                let b = per_sample[[i, 0, f]];
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn loss_gradient_has_input_shape() {
        let clf = trained_classifier();
        let (x, y) = toy_data();
        let grads = clf.loss_gradient(&x, &y).unwrap();
        assert_eq!(grads.shape(), x.array().shape());
    }

    #[test]
    fn loss_gradient_points_against_descent() {
        // Moving inputs against the loss gradient should not increase loss.
        let clf = trained_classifier();
        let (x, y) = toy_data();
        let y_hot = y.to_one_hot(2).unwrap();
        let grads = clf.loss_gradient(&x, &y).unwrap();

        let stepped = x.array() - &(grads * 0.05);
        let before = LogisticClassifier::cross_entropy(&clf.predict(&x).unwrap(), &y_hot);
        let after = LogisticClassifier::cross_entropy(
            &clf.predict(&Features::new(stepped)).unwrap(),
            &y_hot,
        );
        assert!(after <= before + 1e-6, "loss went up: {} -> {}", before, after);
    }

    #[test]
    fn activations_expose_logits_and_softmax() {
        let clf = trained_classifier();
        let (x, _) = toy_data();
        let logits = clf.get_activations(&x, &Layer::from("logits"), 32).unwrap();
        assert_eq!(logits.shape(), &[6, 2]);
        let softmax = clf.get_activations(&x, &Layer::Index(1), 32).unwrap();
        for row in softmax.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-4);
        }
        assert!(clf.get_activations(&x, &Layer::from("conv1"), 32).is_err());
    }

    #[test]
    fn learning_phase_tracks_user_setting() {
        let mut clf = trained_classifier();
        assert_eq!(clf.learning_phase(), LearningPhase::Unset);
        clf.set_learning_phase(true);
        assert_eq!(clf.learning_phase(), LearningPhase::Train);
        clf.set_learning_phase(false);
        assert_eq!(clf.learning_phase(), LearningPhase::Inference);
    }

    #[test]
    fn save_writes_model_state() {
        let clf = trained_classifier();
        let dir = std::env::temp_dir().join("aegis-logistic-save-test");
        clf.save("model.json", Some(&dir)).unwrap();
        let raw = std::fs::read_to_string(dir.join("model.json")).unwrap();
        let state: SavedLogistic = serde_json::from_str(&raw).unwrap();
        assert_eq!(state.nb_classes, 2);
        assert_eq!(state.weights.len(), 4);
        std::fs::remove_dir_all(&dir).ok();
    }
}
