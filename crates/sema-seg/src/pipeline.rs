use crate::{FrameProcessor, SegConfig, SegError, Segmenter};
use sema_base::Tensor;
use sema_base::log;
use sema_infer::{InferError, Session};
use std::fmt;

/// Capture-side failure for one tick.
#[derive(Debug)]
pub enum CaptureError {
    /// No frame available this tick; the loop retries on the next one.
    NoFrame,
    /// The source is gone; the loop terminates.
    Fatal(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoFrame => write!(f, "no frame available"),
            CaptureError::Fatal(msg) => write!(f, "capture failed: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum SinkError {
    Display(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Display(msg) => write!(f, "display error: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

#[derive(Debug)]
pub enum PipelineError {
    Capture(String),
    ModelInit(InferError),
    Decode(SegError),
    Sink(SinkError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Capture(msg) => write!(f, "capture error: {msg}"),
            PipelineError::ModelInit(err) => write!(f, "model init error: {err}"),
            PipelineError::Decode(err) => write!(f, "decode error: {err}"),
            PipelineError::Sink(err) => write!(f, "sink error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Async frame provider seam.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Pull the next frame as an HWC RGB `Tensor<u8>`.
    async fn next_frame(&mut self) -> Result<Tensor<u8>, CaptureError>;
}

/// Display seam. Doubles as the cooperative stop poll, checked once per
/// loop iteration.
pub trait MaskSink {
    fn show(&mut self, image: &Tensor<u8>) -> Result<(), SinkError>;
    fn stop_requested(&mut self) -> bool;
}

/// Get-or-create seam for the lazily initialized inference session.
pub trait ModelProvider {
    fn load_model(&mut self) -> Result<Box<dyn Session>, InferError>;
}

impl<F> ModelProvider for F
where
    F: FnMut() -> Result<Box<dyn Session>, InferError>,
{
    fn load_model(&mut self) -> Result<Box<dyn Session>, InferError> {
        self()
    }
}

/// What to do when the model cannot be loaded on first use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MissingModelPolicy {
    /// Treat a failed load as fatal.
    Fail,
    /// Warn once and keep the loop running, passing resized frames through
    /// to the sink instead of masks.
    WarnAndContinue,
}

/// Single-slot admission gate: at most one inference call outstanding.
///
/// A frame arriving while the gate is held is dropped, not queued.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    in_progress: bool,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot. Returns false if an inference call is already
    /// outstanding.
    pub fn try_acquire(&mut self) -> bool {
        if self.in_progress {
            false
        } else {
            self.in_progress = true;
            true
        }
    }

    /// Free the slot. Must be called once the class map is received,
    /// whether inference succeeded or failed.
    pub fn release(&mut self) {
        self.in_progress = false;
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }
}

/// Per-run counters, returned when the loop terminates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames received from the source.
    pub frames: u64,
    /// Frames dropped by the admission gate.
    pub dropped: u64,
    /// Frames skipped because of a per-frame error.
    pub skipped: u64,
    /// Decoded masks handed to the sink.
    pub masks: u64,
    /// Raw frames handed to the sink while no model is available.
    pub passthrough: u64,
}

enum ModelState {
    Uninit,
    Ready(Segmenter),
    Unavailable,
}

/// The capture -> preprocess -> infer -> decode -> display loop.
///
/// Single logical thread: one frame moves through all stages before the
/// next is pulled. The inference session is initialized exactly once, on
/// the first frame that reaches the inference stage.
pub struct Pipeline<P> {
    processor: FrameProcessor,
    config: SegConfig,
    provider: P,
    policy: MissingModelPolicy,
    model: ModelState,
    gate: AdmissionGate,
    stats: PipelineStats,
}

impl<P: ModelProvider> Pipeline<P> {
    pub fn new(
        processor: FrameProcessor,
        config: SegConfig,
        provider: P,
        policy: MissingModelPolicy,
    ) -> Self {
        Self {
            processor,
            config,
            provider,
            policy,
            model: ModelState::Uninit,
            gate: AdmissionGate::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Drive the loop until the sink requests a stop or a fatal error.
    ///
    /// Per-frame errors (bad frames, failed inference calls) are logged and
    /// skipped; only capture loss, model init under the `Fail` policy,
    /// decode precondition violations, and sink failures end the run.
    pub async fn run(
        &mut self,
        source: &mut impl FrameSource,
        sink: &mut impl MaskSink,
    ) -> Result<PipelineStats, PipelineError> {
        loop {
            if sink.stop_requested() {
                log::info!("stop requested, shutting down");
                break;
            }

            let frame = match source.next_frame().await {
                Ok(frame) => frame,
                Err(CaptureError::NoFrame) => {
                    log::debug!("no frame this tick");
                    continue;
                }
                Err(CaptureError::Fatal(msg)) => return Err(PipelineError::Capture(msg)),
            };
            self.stats.frames += 1;

            if let Some(image) = self.process_frame(&frame)? {
                sink.show(&image).map_err(PipelineError::Sink)?;
            }
        }

        Ok(self.stats.clone())
    }

    /// Move one frame through preprocess, inference, and decode.
    ///
    /// Returns the image to display, or None when the frame was dropped or
    /// skipped.
    fn process_frame(&mut self, frame: &Tensor<u8>) -> Result<Option<Tensor<u8>>, PipelineError> {
        // Admission control: a frame arriving while an inference call is
        // outstanding is dropped, not queued.
        if self.gate.in_progress() {
            self.stats.dropped += 1;
            return Ok(None);
        }

        let (resized, batch) =
            match self
                .processor
                .preprocess(frame, self.config.target_size(), self.config.mean())
            {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("skipping frame: {}", e);
                    self.stats.skipped += 1;
                    return Ok(None);
                }
            };

        self.ensure_model()?;
        let segmenter = match &mut self.model {
            ModelState::Ready(segmenter) => segmenter,
            _ => {
                self.stats.passthrough += 1;
                return Ok(Some(resized));
            }
        };

        if !self.gate.try_acquire() {
            self.stats.dropped += 1;
            return Ok(None);
        }
        let result = segmenter.segment(&batch);
        self.gate.release();

        let maps = match result {
            Ok(maps) => maps,
            Err(e) => {
                log::warn!("inference failed, skipping frame: {}", e);
                self.stats.skipped += 1;
                return Ok(None);
            }
        };

        // Fixed batch of one; a shortfall here is a precondition violation,
        // not a per-frame hiccup.
        let masks = self
            .processor
            .decode(&maps, 1, self.config.num_classes())
            .map_err(PipelineError::Decode)?;
        let Some(mask) = masks.into_iter().next() else {
            return Err(PipelineError::Decode(SegError::InsufficientBatch {
                batch: 0,
                requested: 1,
            }));
        };

        self.stats.masks += 1;
        Ok(Some(mask))
    }

    /// One-time lazy model init. The provider is asked exactly once; the
    /// outcome is cached for the life of the pipeline.
    fn ensure_model(&mut self) -> Result<(), PipelineError> {
        if let ModelState::Uninit = self.model {
            self.model = match self.provider.load_model() {
                Ok(session) => {
                    log::info!("model loaded");
                    ModelState::Ready(Segmenter::new(session, self.config.clone()))
                }
                Err(e) => match self.policy {
                    MissingModelPolicy::Fail => return Err(PipelineError::ModelInit(e)),
                    MissingModelPolicy::WarnAndContinue => {
                        log::warn!("model unavailable, continuing without inference: {}", e);
                        ModelState::Unavailable
                    }
                },
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Palette;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const SIZE: usize = 2;

    fn processor() -> FrameProcessor {
        let palette =
            Palette::from_colors(vec![[0, 0, 0], [255, 0, 0], [0, 255, 0]]).unwrap();
        FrameProcessor::new(palette)
    }

    fn config() -> SegConfig {
        SegConfig::default()
            .with_target_size(SIZE)
            .with_num_classes(3)
    }

    fn rgb_frame(value: u8) -> Tensor<u8> {
        Tensor::new(vec![4, 4, 3], vec![value; 4 * 4 * 3]).unwrap()
    }

    /// Session yielding NHWC one-hot logits for a fixed class plan.
    struct FakeSession {
        classes: Vec<i64>,
        calls: Rc<Cell<usize>>,
        active: Rc<Cell<bool>>,
        reentered: Rc<Cell<bool>>,
        input_names: Vec<String>,
        output_names: Vec<String>,
    }

    impl FakeSession {
        fn new(classes: Vec<i64>) -> Self {
            Self {
                classes,
                calls: Rc::new(Cell::new(0)),
                active: Rc::new(Cell::new(false)),
                reentered: Rc::new(Cell::new(false)),
                input_names: vec!["data".to_string()],
                output_names: vec!["fc_out".to_string()],
            }
        }
    }

    impl Session for FakeSession {
        fn run(
            &mut self,
            inputs: &[(&str, Tensor<f32>)],
        ) -> Result<HashMap<String, Tensor<f32>>, InferError> {
            if self.active.get() {
                self.reentered.set(true);
            }
            self.active.set(true);
            self.calls.set(self.calls.get() + 1);

            assert_eq!(inputs.len(), 1);
            assert_eq!(inputs[0].0, "data");
            assert_eq!(inputs[0].1.shape, vec![1, SIZE, SIZE, 3]);

            let mut logits = vec![0.0f32; SIZE * SIZE * 3];
            for (pixel, &class) in self.classes.iter().enumerate() {
                logits[pixel * 3 + class as usize] = 1.0;
            }
            let mut outputs = HashMap::new();
            outputs.insert(
                "fc_out".to_string(),
                Tensor::new(vec![1, SIZE, SIZE, 3], logits).unwrap(),
            );

            self.active.set(false);
            Ok(outputs)
        }

        fn input_names(&self) -> &[String] {
            &self.input_names
        }

        fn output_names(&self) -> &[String] {
            &self.output_names
        }
    }

    struct FakeSource {
        frames: VecDeque<Result<Tensor<u8>, CaptureError>>,
    }

    impl FakeSource {
        fn new(frames: Vec<Result<Tensor<u8>, CaptureError>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for FakeSource {
        async fn next_frame(&mut self) -> Result<Tensor<u8>, CaptureError> {
            self.frames
                .pop_front()
                .unwrap_or(Err(CaptureError::Fatal("source exhausted".to_string())))
        }
    }

    struct FakeSink {
        shown: Vec<Tensor<u8>>,
        stop_after: usize,
    }

    impl FakeSink {
        fn new(stop_after: usize) -> Self {
            Self {
                shown: Vec::new(),
                stop_after,
            }
        }
    }

    impl MaskSink for FakeSink {
        fn show(&mut self, image: &Tensor<u8>) -> Result<(), SinkError> {
            self.shown.push(image.clone());
            Ok(())
        }

        fn stop_requested(&mut self) -> bool {
            self.shown.len() >= self.stop_after
        }
    }

    fn pipeline_with_session(
        session: FakeSession,
    ) -> Pipeline<impl FnMut() -> Result<Box<dyn Session>, InferError>> {
        let mut session = Some(session);
        Pipeline::new(
            processor(),
            config(),
            move || -> Result<Box<dyn Session>, InferError> {
                Ok(Box::new(session.take().expect("model loaded once")))
            },
            MissingModelPolicy::Fail,
        )
    }

    #[test]
    fn test_admission_gate_single_slot() {
        let mut gate = AdmissionGate::new();
        assert!(!gate.in_progress());
        assert!(gate.try_acquire());
        assert!(gate.in_progress());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_frame_dropped_while_inference_outstanding() {
        let mut pipeline = pipeline_with_session(FakeSession::new(vec![0, 1, 2, 0]));
        assert!(pipeline.gate.try_acquire());

        let outcome = pipeline.process_frame(&rgb_frame(9)).unwrap();
        assert!(outcome.is_none());
        assert_eq!(pipeline.stats.dropped, 1);
        assert_eq!(pipeline.stats.masks, 0);
    }

    #[tokio::test]
    async fn test_run_displays_decoded_masks() {
        let session = FakeSession::new(vec![0, 1, 2, 0]);
        let mut pipeline = pipeline_with_session(session);
        let mut source = FakeSource::new(vec![Ok(rgb_frame(50))]);
        let mut sink = FakeSink::new(1);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();

        assert_eq!(stats.frames, 1);
        assert_eq!(stats.masks, 1);
        assert_eq!(sink.shown.len(), 1);
        assert_eq!(sink.shown[0].shape, vec![SIZE, SIZE, 3]);
        #[rustfmt::skip]
        assert_eq!(
            sink.shown[0].data,
            vec![
                0, 0, 0,   255, 0, 0,
                0, 255, 0,   0, 0, 0,
            ]
        );
    }

    #[tokio::test]
    async fn test_session_called_per_frame_never_reentered() {
        let session = FakeSession::new(vec![1, 1, 1, 1]);
        let calls = Rc::clone(&session.calls);
        let reentered = Rc::clone(&session.reentered);
        let mut pipeline = pipeline_with_session(session);
        let mut source = FakeSource::new(vec![
            Ok(rgb_frame(1)),
            Ok(rgb_frame(2)),
            Ok(rgb_frame(3)),
        ]);
        let mut sink = FakeSink::new(3);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.masks, 3);
        assert_eq!(calls.get(), 3);
        assert!(!reentered.get());
    }

    #[tokio::test]
    async fn test_no_frame_tick_retries() {
        let session = FakeSession::new(vec![0, 0, 0, 0]);
        let mut pipeline = pipeline_with_session(session);
        let mut source = FakeSource::new(vec![Err(CaptureError::NoFrame), Ok(rgb_frame(5))]);
        let mut sink = FakeSink::new(1);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();

        assert_eq!(stats.frames, 1);
        assert_eq!(stats.masks, 1);
    }

    #[tokio::test]
    async fn test_bad_frame_skipped_loop_continues() {
        let session = FakeSession::new(vec![0, 0, 0, 0]);
        let mut pipeline = pipeline_with_session(session);
        let gray = Tensor::new(vec![4, 4, 1], vec![0u8; 16]).unwrap();
        let mut source = FakeSource::new(vec![Ok(gray), Ok(rgb_frame(5))]);
        let mut sink = FakeSink::new(1);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.masks, 1);
    }

    #[tokio::test]
    async fn test_fatal_capture_ends_run() {
        let session = FakeSession::new(vec![0, 0, 0, 0]);
        let mut pipeline = pipeline_with_session(session);
        let mut source =
            FakeSource::new(vec![Err(CaptureError::Fatal("unplugged".to_string()))]);
        let mut sink = FakeSink::new(10);

        let result = pipeline.run(&mut source, &mut sink).await;
        assert!(matches!(result, Err(PipelineError::Capture(_))));
    }

    #[tokio::test]
    async fn test_missing_model_fail_policy_is_fatal() {
        let mut pipeline = Pipeline::new(
            processor(),
            config(),
            || -> Result<Box<dyn Session>, InferError> {
                Err(InferError::ModelNotFound("model/deeplab.onnx".into()))
            },
            MissingModelPolicy::Fail,
        );
        let mut source = FakeSource::new(vec![Ok(rgb_frame(5))]);
        let mut sink = FakeSink::new(1);

        let result = pipeline.run(&mut source, &mut sink).await;
        assert!(matches!(result, Err(PipelineError::ModelInit(_))));
    }

    #[tokio::test]
    async fn test_missing_model_warn_policy_passes_frames_through() {
        let attempts = Rc::new(Cell::new(0usize));
        let provider_attempts = Rc::clone(&attempts);
        let mut pipeline = Pipeline::new(
            processor(),
            config(),
            move || -> Result<Box<dyn Session>, InferError> {
                provider_attempts.set(provider_attempts.get() + 1);
                Err(InferError::ModelNotFound("model/deeplab.onnx".into()))
            },
            MissingModelPolicy::WarnAndContinue,
        );
        let mut source = FakeSource::new(vec![Ok(rgb_frame(8)), Ok(rgb_frame(9))]);
        let mut sink = FakeSink::new(2);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.passthrough, 2);
        assert_eq!(stats.masks, 0);
        // Load attempted exactly once, outcome cached
        assert_eq!(attempts.get(), 1);
        // Passthrough shows the resized frame, not a mask
        assert_eq!(sink.shown[0].shape, vec![SIZE, SIZE, 3]);
        assert!(sink.shown[0].data.iter().all(|&v| v == 8));
    }

    #[tokio::test]
    async fn test_stop_requested_before_first_frame() {
        let session = FakeSession::new(vec![0, 0, 0, 0]);
        let mut pipeline = pipeline_with_session(session);
        let mut source = FakeSource::new(vec![Ok(rgb_frame(5))]);
        let mut sink = FakeSink::new(0);

        let stats = pipeline.run(&mut source, &mut sink).await.unwrap();
        assert_eq!(stats.frames, 0);
    }
}
