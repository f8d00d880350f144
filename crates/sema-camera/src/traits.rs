use crate::CameraError;
use sema_base::Tensor;

/// Async camera trait for frame capture.
///
/// Implementations provide a `recv` method that asynchronously returns
/// decoded frames as `Tensor<u8>` in HWC layout `[height, width, 3]`, RGB.
#[allow(async_fn_in_trait)]
pub trait Camera {
    /// Receive the next frame from the camera.
    async fn recv(&mut self) -> Result<Tensor<u8>, CameraError>;
}
