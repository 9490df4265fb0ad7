//! Error types shared by the classifier contracts and the defence pipeline.
use std::error::Error;
use std::fmt;

/// Errors surfaced by classifier construction, the defence pipeline, and the
/// capability contracts. All variants are raised synchronously; nothing at
/// this layer is retried or silently recovered.
#[derive(Debug)]
pub enum ClassifierError {
    /// Construction-time validation failure (malformed clip bounds,
    /// standardization pairs, ragged inputs, shape mismatches).
    Config(String),
    /// The input's recorded element type cannot represent the result of
    /// standardization (unsigned integers under mean-subtraction).
    UnsupportedDtype(&'static str),
    /// A contract operation the concrete classifier did not provide.
    NotImplemented(&'static str),
    /// Failure reported by the backend model.
    Backend(String),
    /// Error while persisting or restoring model state.
    Serialization(String),
    Io(std::io::Error),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClassifierError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            ClassifierError::UnsupportedDtype(dtype) => write!(
                f,
                "input dtype `{}` cannot represent negative values; convert the input to a signed or floating-point type before standardization",
                dtype
            ),
            ClassifierError::NotImplemented(op) => {
                write!(f, "operation `{}` is not implemented by this classifier", op)
            }
            ClassifierError::Backend(msg) => write!(f, "backend error: {}", msg),
            ClassifierError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            ClassifierError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for ClassifierError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClassifierError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClassifierError {
    fn from(err: std::io::Error) -> Self {
        ClassifierError::Io(err)
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
