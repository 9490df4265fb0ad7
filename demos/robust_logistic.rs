//! Train the reference logistic adapter with a full defence pipeline and
//! pull gradients back through it.
//!
//! Run with `cargo run --example robust_logistic`.

use anyhow::Result;
use ndarray::{array, Array2, ArrayD, Axis};

use aegis_classifiers::classifiers::logistic::LogisticClassifier;
use aegis_classifiers::classifiers::{Classifier, GradientClassifier, NeuralNetworkClassifier};
use aegis_classifiers::config::TrainingConfig;
use aegis_classifiers::defences::Preprocessor;
use aegis_classifiers::input::{Features, GradientTarget, Labels};
use aegis_classifiers::preprocessing::{ClassifierConfig, ClipValues, Standardization};

/// Toy smoothing defence: blend each sample towards the batch mean.
struct MeanSmoothing {
    strength: f32,
}

impl Preprocessor for MeanSmoothing {
    fn apply_fit(&self) -> bool {
        false
    }

    fn apply_predict(&self) -> bool {
        true
    }

    fn call(
        &self,
        x: ArrayD<f32>,
        y: Option<Array2<f32>>,
    ) -> (ArrayD<f32>, Option<Array2<f32>>) {
        let mean = x.mean().unwrap_or(0.0);
        let smoothed = x.mapv(|v| (1.0 - self.strength) * v + self.strength * mean);
        (smoothed, y)
    }

    fn estimate_gradient(&self, _x: &ArrayD<f32>, gradients: ArrayD<f32>) -> ArrayD<f32> {
        gradients.mapv(|g| (1.0 - self.strength) * g)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = ClassifierConfig::new()
        .with_clip_values(ClipValues::scalar(0.0, 1.0)?)
        .with_preprocessor(Box::new(MeanSmoothing { strength: 0.1 }))
        .with_standardization(Standardization::scalar(0.5, 0.5)?);

    let mut clf = LogisticClassifier::new(vec![2], 2, config, TrainingConfig::new(0.5, 4, 300))?;

    let x = Features::from(array![
        [0.1f32, 0.2],
        [0.2, 0.1],
        [0.0, 0.3],
        [0.8, 0.9],
        [0.9, 0.8],
        [1.0, 0.7],
    ]);
    let y = Labels::from(vec![0usize, 0, 0, 1, 1, 1]);

    clf.fit(&x, &y)?;

    let probs = clf.predict_batch(&x, 4)?;
    println!("predictions:\n{:.3}", probs);

    let grads = clf.class_gradient(&x, &GradientTarget::Class(1))?;
    let sample0 = grads.index_axis(Axis(0), 0);
    println!(
        "class-1 gradient of sample 0: {:?}",
        sample0.index_axis(Axis(0), 0)
    );

    let loss_grads = clf.loss_gradient(&x, &y)?;
    println!("loss gradient shape: {:?}", loss_grads.shape());

    // FGSM-style step, clamped back into the valid input range
    let mut adversarial = x.array() + &(loss_grads.mapv(f32::signum) * 0.1);
    if let Some(clip) = clf.clip_values() {
        clip.clamp(&mut adversarial)?;
    }
    let adv_probs = clf.predict(&Features::new(adversarial))?;
    println!("predictions after perturbation:\n{:.3}", adv_probs);

    clf.save("robust_logistic.json", None)?;
    println!("model saved under {:?}", aegis_classifiers::config::data_path());
    Ok(())
}
