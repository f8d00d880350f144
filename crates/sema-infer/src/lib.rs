//! Inference runtime plumbing for the sema ecosystem.
//!
//! Models are opaque ONNX graphs: a `Backend` turns a `ModelSource` into a
//! `Session`, and a `Session` maps named input tensors to named output
//! tensors. Nothing here knows about segmentation; that lives in sema-seg.

pub mod backend;
pub mod backends;
pub mod device;
pub mod error;
pub mod modelsource;
pub mod session;

pub use backend::Backend;
pub use backends::OnnxBackend;
pub use device::Device;
pub use error::InferError;
pub use modelsource::ModelSource;
pub use session::Session;
