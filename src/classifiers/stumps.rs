//! Reference decision-stump ensemble adapter.
//!
//! One depth-1 tree per class, fit one-vs-rest by exhaustive threshold
//! search. The point is not competitive accuracy but a working in-crate
//! backend for the decision-tree capability, including `trees()`
//! introspection.

use std::fs;
use std::path::Path;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::classifiers::{Classifier, DecisionTreeClassifier};
use crate::config::data_path;
use crate::defences::Mode;
use crate::error::{ClassifierError, Result};
use crate::input::{Features, Labels};
use crate::preprocessing::ClassifierConfig;
use crate::trees::{LeafNode, Tree};

/// A single axis-aligned split with a class-membership rate on each side.
#[derive(Deserialize, Serialize, Debug, Clone)]
struct Stump {
    feature: usize,
    threshold: f32,
    value_lo: f32,
    value_hi: f32,
}

impl Stump {
    fn score(&self, row: ndarray::ArrayView1<f32>) -> f32 {
        if row[self.feature] > self.threshold {
            self.value_hi
        } else {
            self.value_lo
        }
    }
}

/// One-vs-rest decision-stump ensemble, one stump per class.
pub struct StumpEnsembleClassifier {
    stumps: Vec<Stump>,
    input_shape: Vec<usize>,
    nb_classes: usize,
    config: ClassifierConfig,
}

#[derive(Deserialize, Serialize)]
struct SavedStumps {
    input_shape: Vec<usize>,
    nb_classes: usize,
    stumps: Vec<Stump>,
}

impl StumpEnsembleClassifier {
    pub fn new(
        input_shape: Vec<usize>,
        nb_classes: usize,
        config: ClassifierConfig,
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
        Ok(StumpEnsembleClassifier {
            stumps: Vec::new(),
            input_shape,
            nb_classes,
            config,
        })
    }

    fn n_features(&self) -> usize {
        self.input_shape.iter().product()
    }

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

    /// Exhaustive search for the split that best separates `positives`.
    fn fit_stump(m: &Array2<f32>, positives: &[bool]) -> Stump {
        let n = m.nrows();
        let mut best = Stump {
            feature: 0,
            threshold: f32::NEG_INFINITY,
            value_lo: 0.0,
            value_hi: 0.0,
        };
        let mut best_gap = -1.0f32;

        for feature in 0..m.ncols() {
            for candidate in m.column(feature).iter() {
                let threshold = *candidate;
                let (mut hi_pos, mut hi_n, mut lo_pos, mut lo_n) = (0usize, 0usize, 0usize, 0usize);
                for i in 0..n {
                    if m[(i, feature)] > threshold {
                        hi_n += 1;
                        if positives[i] {
                            hi_pos += 1;
                        }
                    } else {
                        lo_n += 1;
                        if positives[i] {
                            lo_pos += 1;
                        }
                    }
                }
                if hi_n == 0 || lo_n == 0 {
                    continue;
                }
                let rate_hi = hi_pos as f32 / hi_n as f32;
                let rate_lo = lo_pos as f32 / lo_n as f32;
                let gap = (rate_hi - rate_lo).abs();
                if gap > best_gap {
                    best_gap = gap;
                    best = Stump {
                        feature,
                        threshold,
                        value_lo: rate_lo,
                        value_hi: rate_hi,
                    };
                }
            }
        }

        if best_gap < 0.0 {
            // degenerate column set; fall back to the global positive rate
            let rate = positives.iter().filter(|&&p| p).count() as f32 / n.max(1) as f32;
            best.value_lo = rate;
            best.value_hi = rate;
        }
        best
    }
}

impl Classifier for StumpEnsembleClassifier {
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
        if self.stumps.is_empty() {
            return Err(ClassifierError::Backend(
                "stump ensemble has not been fitted".to_string(),
            ));
        }
        let (m, _) = self.preprocess_to_matrix(x, None, Mode::Predict)?;

        let mut scores = Array2::zeros((m.nrows(), self.nb_classes));
        for (i, row) in m.axis_iter(Axis(0)).enumerate() {
            for (c, stump) in self.stumps.iter().enumerate() {
                scores[(i, c)] = stump.score(row);
            }
            let total: f32 = (0..self.nb_classes).map(|c| scores[(i, c)]).sum();
            if total > 0.0 {
                for c in 0..self.nb_classes {
                    scores[(i, c)] /= total;
                }
            } else {
                let uniform = 1.0 / self.nb_classes as f32;
                for c in 0..self.nb_classes {
                    scores[(i, c)] = uniform;
                }
            }
        }

        Ok(self.config.apply_postprocessing(&scores, Mode::Predict))
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<()> {
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

        self.stumps = (0..self.nb_classes)
            .map(|class| {
                let positives: Vec<bool> =
                    (0..m.nrows()).map(|i| y_hot[(i, class)] > 0.5).collect();
                Self::fit_stump(&m, &positives)
            })
            .collect();
        log::debug!("fitted {} stumps", self.stumps.len());
        Ok(())
    }

    fn save(&self, filename: &str, path: Option<&Path>) -> Result<()> {
        let dir = match path {
            Some(p) => p.to_path_buf(),
            None => data_path(),
        };
        fs::create_dir_all(&dir)?;
        let state = SavedStumps {
            input_shape: self.input_shape.clone(),
            nb_classes: self.nb_classes,
            stumps: self.stumps.clone(),
        };
        fs::write(dir.join(filename), serde_json::to_string(&state)?)?;
        Ok(())
    }
}

impl DecisionTreeClassifier for StumpEnsembleClassifier {
    fn trees(&self) -> Vec<Tree> {
        self.stumps
            .iter()
            .enumerate()
            .map(|(class, stump)| {
                Tree::new(
                    Some(class),
                    vec![
                        LeafNode {
                            tree_id: class,
                            node_id: 0,
                            class_label: class,
                            value: stump.value_lo,
                        },
                        LeafNode {
                            tree_id: class,
                            node_id: 1,
                            class_label: class,
                            value: stump.value_hi,
                        },
                    ],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_data() -> (Features, Labels) {
        let x = Features::from(array![
            [0.0f32, 1.0],
            [0.1, 0.9],
            [0.2, 1.1],
            [1.0, 0.0],
            [0.9, 0.1],
            [1.1, 0.2],
        ]);
        let y = Labels::from(vec![0usize, 0, 0, 1, 1, 1]);
        (x, y)
    }

    #[test]
    fn predict_before_fit_is_a_backend_error() {
        let clf =
            StumpEnsembleClassifier::new(vec![2], 2, ClassifierConfig::new()).unwrap();
        let (x, _) = toy_data();
        assert!(matches!(
            clf.predict(&x).unwrap_err(),
            ClassifierError::Backend(_)
        ));
    }

    #[test]
    fn stumps_separate_toy_classes() {
        let mut clf =
            StumpEnsembleClassifier::new(vec![2], 2, ClassifierConfig::new()).unwrap();
        let (x, y) = toy_data();
        clf.fit(&x, &y).unwrap();
        let probs = clf.predict(&x).unwrap();
        assert!(probs[(0, 0)] > probs[(0, 1)]);
        assert!(probs[(5, 1)] > probs[(5, 0)]);
    }

    #[test]
    fn trees_expose_one_tree_per_class() {
        let mut clf =
            StumpEnsembleClassifier::new(vec![2], 3, ClassifierConfig::new()).unwrap();
        let x = Features::from(array![
            [0.0f32, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
        ]);
        let y = Labels::from(vec![0usize, 1, 2]);
        clf.fit(&x, &y).unwrap();

        let trees = clf.trees();
        assert_eq!(trees.len(), 3);
        for (class, tree) in trees.iter().enumerate() {
            assert_eq!(tree.class_id, Some(class));
            assert_eq!(tree.leaf_nodes.len(), 2);
            assert_eq!(tree.leaf_nodes[0].tree_id, class);
        }
    }

    #[test]
    fn save_writes_stump_state() {
        let mut clf =
            StumpEnsembleClassifier::new(vec![2], 2, ClassifierConfig::new()).unwrap();
        let (x, y) = toy_data();
        clf.fit(&x, &y).unwrap();

        let dir = std::env::temp_dir().join("aegis-stumps-save-test");
        clf.save("stumps.json", Some(&dir)).unwrap();
        let raw = std::fs::read_to_string(dir.join("stumps.json")).unwrap();
        let state: SavedStumps = serde_json::from_str(&raw).unwrap();
        assert_eq!(state.stumps.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
