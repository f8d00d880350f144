//! Live semantic-segmentation core for the sema ecosystem.
//!
//! `Palette` maps class ids to display colors, `FrameProcessor` turns camera
//! frames into model input batches and class-index maps back into RGB masks,
//! `Segmenter` drives an inference session, and `Pipeline` runs the
//! capture -> preprocess -> infer -> decode -> display loop.

pub mod error;
pub mod palette;
pub mod pipeline;
pub mod processor;
pub mod segmenter;

pub use error::{PaletteError, SegError};
pub use palette::Palette;
pub use pipeline::{
    AdmissionGate, CaptureError, FrameSource, MaskSink, MissingModelPolicy, ModelProvider,
    Pipeline, PipelineError, PipelineStats, SinkError,
};
pub use processor::FrameProcessor;
pub use segmenter::{SegConfig, Segmenter};
