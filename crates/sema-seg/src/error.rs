use std::fmt;

#[derive(Debug)]
pub enum PaletteError {
    Io(String),
    Malformed(String),
}

impl fmt::Display for PaletteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaletteError::Io(msg) => write!(f, "palette io error: {msg}"),
            PaletteError::Malformed(msg) => write!(f, "malformed palette: {msg}"),
        }
    }
}

impl std::error::Error for PaletteError {}

impl From<std::io::Error> for PaletteError {
    fn from(err: std::io::Error) -> Self {
        PaletteError::Io(err.to_string())
    }
}

#[derive(Debug)]
pub enum SegError {
    InvalidInput(String),
    InsufficientBatch { batch: usize, requested: usize },
    PaletteTooSmall { palette: usize, num_classes: usize },
    InvalidOutput(String),
    Infer(sema_infer::InferError),
    Tensor(sema_base::TensorError),
}

impl fmt::Display for SegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SegError::InsufficientBatch { batch, requested } => {
                write!(
                    f,
                    "batch size {batch} is smaller than the {requested} images requested"
                )
            }
            SegError::PaletteTooSmall {
                palette,
                num_classes,
            } => {
                write!(
                    f,
                    "palette has {palette} colors but {num_classes} classes were requested"
                )
            }
            SegError::InvalidOutput(msg) => write!(f, "invalid model output: {msg}"),
            SegError::Infer(err) => write!(f, "inference error: {err}"),
            SegError::Tensor(err) => write!(f, "tensor error: {err}"),
        }
    }
}

impl std::error::Error for SegError {}

impl From<sema_infer::InferError> for SegError {
    fn from(err: sema_infer::InferError) -> Self {
        SegError::Infer(err)
    }
}

impl From<sema_base::TensorError> for SegError {
    fn from(err: sema_base::TensorError) -> Self {
        SegError::Tensor(err)
    }
}
