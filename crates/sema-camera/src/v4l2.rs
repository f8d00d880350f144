use crate::{Camera, CameraConfig, CameraError};
use sema_base::Tensor;
use sema_base::log;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

type FrameResult = Result<Tensor<u8>, CameraError>;

/// V4L2 camera implementation.
///
/// Captures MJPEG on a dedicated thread and hands decoded RGB frames to the
/// async side through a bounded channel. The thread stops when the camera
/// is dropped.
pub struct V4l2Camera {
    config: CameraConfig,
    device: Option<Device>,
    receiver: Option<mpsc::Receiver<FrameResult>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for V4l2Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Camera")
            .field("config", &self.config)
            .field("device", &"<v4l::Device>")
            .field("receiver", &self.receiver.is_some())
            .field("thread_handle", &self.thread_handle.is_some())
            .finish()
    }
}

impl Camera for V4l2Camera {
    async fn recv(&mut self) -> Result<Tensor<u8>, CameraError> {
        self.ensure_started()?;

        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| CameraError::Channel("Receiver not initialized".to_string()))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| CameraError::Channel("Channel closed".to_string()))?
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        // Dropping the receiver signals the capture thread to stop
        drop(self.receiver.take());

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl V4l2Camera {
    /// Create a new V4L2 camera with the given configuration.
    ///
    /// Opens the device at `config.device()`, sets MJPEG format at the
    /// requested resolution, and configures the frame rate.
    ///
    /// # Errors
    ///
    /// Returns `CameraError::Device` if the device cannot be opened, MJPEG
    /// is not supported, or format/parameter setting fails.
    pub fn new(config: CameraConfig) -> Result<Self, CameraError> {
        let device = Device::with_path(config.device())?;

        let mut format = Format::new(config.width(), config.height(), FourCC::new(b"MJPG"));
        format = Capture::set_format(&device, &format)?;

        // The device may silently substitute another format
        if format.fourcc != FourCC::new(b"MJPG") {
            return Err(CameraError::Device(
                "MJPEG format not supported by device".to_string(),
            ));
        }

        let params = v4l::video::capture::Parameters::with_fps(config.fps());
        v4l::video::Capture::set_params(&device, &params)?;

        Ok(Self {
            config,
            device: Some(device),
            receiver: None,
            thread_handle: None,
        })
    }

    /// Start the capture thread if not already running.
    ///
    /// Called automatically on the first `recv()`.
    fn ensure_started(&mut self) -> Result<(), CameraError> {
        if self.receiver.is_some() {
            return Ok(());
        }

        let device = self
            .device
            .take()
            .ok_or_else(|| CameraError::Device("Device already consumed".to_string()))?;

        let buffer_count = self.config.buffer_count() as usize;
        let (tx, rx) = mpsc::channel(buffer_count);

        let handle = thread::spawn(move || {
            if let Err(e) = Self::capture_loop(device, tx, buffer_count) {
                log::error!("Capture thread error: {}", e);
            }
        });

        self.receiver = Some(rx);
        self.thread_handle = Some(handle);

        Ok(())
    }

    /// Background thread capture loop.
    ///
    /// Reads MJPEG frames from V4L2, decodes them to RGB tensors, and sends
    /// them through the channel until the receiver drops.
    fn capture_loop(
        device: Device,
        tx: mpsc::Sender<FrameResult>,
        buffer_count: usize,
    ) -> Result<(), CameraError> {
        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count as u32)?;

        loop {
            let (frame_data, _metadata) = CaptureStream::next(&mut stream)?;

            // The mmap buffer is only valid until the next capture call
            let frame_vec = frame_data.to_vec();

            let result = sema_image::decode_rgb(&frame_vec).map_err(CameraError::from);

            if tx.blocking_send(result).is_err() {
                // Receiver dropped - exit thread
                break;
            }
        }

        Ok(())
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }
}
