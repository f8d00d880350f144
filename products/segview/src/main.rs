use minifb::{Key, Window, WindowOptions};
use sema_base::Tensor;
use sema_base::log;
use sema_camera::{Camera, CameraConfig, CameraError, V4l2Camera};
use sema_infer::{Backend, Device, InferError, ModelSource, OnnxBackend, Session};
use sema_seg::{
    CaptureError, FrameProcessor, FrameSource, MaskSink, MissingModelPolicy, Palette, Pipeline,
    SegConfig, SinkError,
};
use std::path::PathBuf;

const DEFAULT_MODEL: &str = "model/deeplab.onnx";
const DEFAULT_PALETTE: &str = "palette.json";

/// Caffe-style per-channel means some checkpoints expect subtracted from
/// the model input, in the camera's channel order. Opt in with --mean.
const CHANNEL_MEAN: [f32; 3] = [104.00699, 116.66877, 122.67891];

/// Convert HWC RGB buffer to packed ARGB u32 for minifb
fn rgb_to_argb(buf: &[u8], width: usize, height: usize) -> Vec<u32> {
    let expected = width * height * 3;
    assert!(
        buf.len() >= expected,
        "RGB buffer too small: expected {} bytes, got {}",
        expected,
        buf.len()
    );
    let mut argb = Vec::with_capacity(width * height);
    for i in 0..width * height {
        let idx = i * 3;
        let r = buf[idx] as u32;
        let g = buf[idx + 1] as u32;
        let b = buf[idx + 2] as u32;
        argb.push((r << 16) | (g << 8) | b);
    }
    argb
}

/// Adapts the camera to the pipeline's frame seam.
struct CameraSource {
    camera: V4l2Camera,
}

impl FrameSource for CameraSource {
    async fn next_frame(&mut self) -> Result<Tensor<u8>, CaptureError> {
        match self.camera.recv().await {
            Ok(frame) => Ok(frame),
            Err(CameraError::Decode(e)) => {
                log::warn!("frame decode failed: {}", e);
                Err(CaptureError::NoFrame)
            }
            Err(e) => Err(CaptureError::Fatal(e.to_string())),
        }
    }
}

/// Shows masks in a window; closing it or pressing ESC stops the loop.
struct WindowSink {
    window: Window,
}

impl WindowSink {
    fn new(width: usize, height: usize) -> Result<Self, minifb::Error> {
        let mut window = Window::new(
            "segview - ESC to exit",
            width,
            height,
            WindowOptions::default(),
        )?;
        window.set_target_fps(30);
        Ok(Self { window })
    }
}

impl MaskSink for WindowSink {
    fn show(&mut self, image: &Tensor<u8>) -> Result<(), SinkError> {
        let (h, w, _) = image
            .dims3()
            .map_err(|e| SinkError::Display(e.to_string()))?;
        let argb = rgb_to_argb(&image.data, w, h);
        self.window
            .update_with_buffer(&argb, w, h)
            .map_err(|e| SinkError::Display(e.to_string()))
    }

    fn stop_requested(&mut self) -> bool {
        !self.window.is_open() || self.window.is_key_down(Key::Escape)
    }
}

struct Args {
    model_path: String,
    palette_path: String,
    camera_device: Option<String>,
    lenient: bool,
    mean: Option<[f32; 3]>,
}

// Usage: segview [model.onnx] [palette.json] [/dev/videoN] [--lenient] [--mean]
fn parse_args() -> Args {
    let mut args = Args {
        model_path: DEFAULT_MODEL.to_string(),
        palette_path: DEFAULT_PALETTE.to_string(),
        camera_device: None,
        lenient: false,
        mean: None,
    };
    let mut positional = 0;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--lenient" => args.lenient = true,
            "--mean" => args.mean = Some(CHANNEL_MEAN),
            _ => {
                match positional {
                    0 => args.model_path = arg,
                    1 => args.palette_path = arg,
                    2 => args.camera_device = Some(arg),
                    _ => log::warn!("ignoring extra argument: {}", arg),
                }
                positional += 1;
            }
        }
    }
    args
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sema_base::init_stdout_logger();

    let args = parse_args();

    log::info!("segview");
    log::info!("model: {}", args.model_path);
    log::info!("palette: {}", args.palette_path);

    let palette = Palette::load(&args.palette_path)?;
    log::info!("palette loaded: {} colors", palette.len());

    let processor = FrameProcessor::new(palette);
    let config = SegConfig::default().with_mean(args.mean);

    let backend = OnnxBackend::new(Device::Cpu);
    let model_path = PathBuf::from(&args.model_path);
    let provider = move || -> Result<Box<dyn Session>, InferError> {
        backend.load_model(ModelSource::File(model_path.clone()))
    };
    let policy = if args.lenient {
        MissingModelPolicy::WarnAndContinue
    } else {
        MissingModelPolicy::Fail
    };

    let mut pipeline = Pipeline::new(processor, config.clone(), provider, policy);

    let mut camera_config = CameraConfig::default();
    if let Some(device) = &args.camera_device {
        camera_config = camera_config.with_device(device.clone());
    }
    let camera = V4l2Camera::new(camera_config)?;
    log::info!("camera opened: {}", camera.config().device());
    let mut source = CameraSource { camera };

    let mut sink = WindowSink::new(config.target_size(), config.target_size())?;

    let stats = pipeline.run(&mut source, &mut sink).await?;
    log::info!(
        "exiting: {} frames, {} masks, {} dropped, {} skipped, {} passthrough",
        stats.frames,
        stats.masks,
        stats.dropped,
        stats.skipped,
        stats.passthrough
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_argb_packs_pixels() {
        let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
        let argb = rgb_to_argb(&rgb, 2, 2);
        assert_eq!(argb, vec![0x00FF0000, 0x0000FF00, 0x000000FF, 0x000A141E]);
    }
}
