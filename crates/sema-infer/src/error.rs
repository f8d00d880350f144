use crate::Device;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum InferError {
    ModelNotFound(PathBuf),
    ModelLoad(String),
    UnsupportedDevice(Device),
    InvalidInput {
        name: String,
        expected_names: Vec<String>,
    },
    UnsupportedDtype(String),
    Backend(String),
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferError::ModelNotFound(path) => {
                write!(f, "model file not found: {}", path.display())
            }
            InferError::ModelLoad(msg) => write!(f, "model load error: {msg}"),
            InferError::UnsupportedDevice(device) => {
                write!(f, "unsupported device: {device}")
            }
            InferError::InvalidInput {
                name,
                expected_names,
            } => {
                write!(
                    f,
                    "invalid input '{name}', model expects {expected_names:?}"
                )
            }
            InferError::UnsupportedDtype(msg) => write!(f, "unsupported dtype: {msg}"),
            InferError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for InferError {}
