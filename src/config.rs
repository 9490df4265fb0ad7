//! Crate-wide defaults and training hyper-parameters.
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default batch size for batched predict/fit operations.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Default number of training epochs.
pub const DEFAULT_NB_EPOCHS: usize = 20;

/// Environment variable overriding where `save` writes model state when no
/// explicit path is given.
pub const DATA_PATH_ENV: &str = "AEGIS_DATA_PATH";

/// Resolve the default directory for persisted model state.
pub fn data_path() -> PathBuf {
    match env::var(DATA_PATH_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("aegis-data"),
    }
}

/// Training hyper-parameters shared by the reference backends.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub nb_epochs: usize,
}

impl TrainingConfig {
    pub fn new(learning_rate: f32, batch_size: usize, nb_epochs: usize) -> Self {
        Self {
            learning_rate,
            batch_size,
            nb_epochs,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            batch_size: DEFAULT_BATCH_SIZE,
            nb_epochs: DEFAULT_NB_EPOCHS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_training_config_is_sane() {
        let cfg = TrainingConfig::default();
        assert!(cfg.learning_rate > 0.0);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.nb_epochs, DEFAULT_NB_EPOCHS);
    }

    #[test]
    fn training_config_round_trips_through_json() {
        let cfg = TrainingConfig::new(0.01, 32, 5);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_size, 32);
        assert_eq!(back.nb_epochs, 5);
    }
}
