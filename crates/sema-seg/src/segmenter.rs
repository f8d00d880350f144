use crate::SegError;
use sema_base::Tensor;
use sema_infer::Session;

/// Configuration for a segmentation run.
#[derive(Clone, Debug)]
pub struct SegConfig {
    target_size: usize,
    num_classes: usize,
    mean: Option<[f32; 3]>,
    input_name: String,
    output_name: String,
}

impl Default for SegConfig {
    fn default() -> Self {
        Self {
            target_size: 300,
            num_classes: 27,
            mean: None,
            input_name: "data".to_string(),
            output_name: "fc_out".to_string(),
        }
    }
}

impl SegConfig {
    /// Set the square model input size in pixels.
    pub fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = target_size;
        self
    }

    /// Set the number of classes the run is allowed to render.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Set the per-channel mean subtracted from the model input.
    pub fn with_mean(mut self, mean: Option<[f32; 3]>) -> Self {
        self.mean = mean;
        self
    }

    /// Set the model's input tensor name.
    pub fn with_input_name(mut self, input_name: String) -> Self {
        self.input_name = input_name;
        self
    }

    /// Set the model's output tensor name.
    pub fn with_output_name(mut self, output_name: String) -> Self {
        self.output_name = output_name;
        self
    }

    // Getters
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn mean(&self) -> Option<[f32; 3]> {
        self.mean
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

/// Drives an inference session and reduces its logits to a class-index map.
pub struct Segmenter {
    session: Box<dyn Session>,
    config: SegConfig,
}

impl Segmenter {
    pub fn new(session: Box<dyn Session>, config: SegConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &SegConfig {
        &self.config
    }

    /// Run the model on a preprocessed `[1, S, S, 3]` batch and argmax the
    /// logits into a `[1, H, W]` class-index map.
    ///
    /// # Errors
    ///
    /// `SegError::Infer` if the session fails, `SegError::InvalidOutput` if
    /// the model does not produce the configured output or its shape cannot
    /// be interpreted as per-pixel class logits.
    pub fn segment(&mut self, batch: &Tensor<f32>) -> Result<Tensor<i64>, SegError> {
        let mut outputs = self
            .session
            .run(&[(self.config.input_name.as_str(), batch.clone())])?;

        let logits = outputs.remove(&self.config.output_name).ok_or_else(|| {
            SegError::InvalidOutput(format!(
                "model produced no output named '{}'",
                self.config.output_name
            ))
        })?;

        argmax_classes(&logits, self.config.num_classes)
    }
}

/// Reduce 4-D logits to per-pixel class ids.
///
/// Accepts NHWC `[N, H, W, C]` or NCHW `[N, C, H, W]`; the class axis is the
/// one whose extent equals `num_classes`. A shape matching on both axes is
/// ambiguous and rejected rather than guessed.
fn argmax_classes(logits: &Tensor<f32>, num_classes: usize) -> Result<Tensor<i64>, SegError> {
    if logits.ndim() != 4 {
        return Err(SegError::InvalidOutput(format!(
            "expected 4-D logits, got shape {:?}",
            logits.shape
        )));
    }
    let shape = &logits.shape;
    let nhwc = shape[3] == num_classes;
    let nchw = shape[1] == num_classes;

    match (nhwc, nchw) {
        (true, true) => Err(SegError::InvalidOutput(format!(
            "ambiguous logits layout for shape {:?} with {} classes",
            shape, num_classes
        ))),
        (true, false) => Ok(argmax_nhwc(logits)),
        (false, true) => Ok(argmax_nchw(logits)),
        (false, false) => Err(SegError::InvalidOutput(format!(
            "no axis of shape {:?} matches {} classes",
            shape, num_classes
        ))),
    }
}

fn argmax_nhwc(logits: &Tensor<f32>) -> Tensor<i64> {
    let (n, h, w, c) = (
        logits.shape[0],
        logits.shape[1],
        logits.shape[2],
        logits.shape[3],
    );
    let mut ids = Vec::with_capacity(n * h * w);
    for pixel in logits.data.chunks_exact(c) {
        ids.push(argmax(pixel.iter().copied()));
    }
    Tensor {
        shape: vec![n, h, w],
        data: ids,
    }
}

fn argmax_nchw(logits: &Tensor<f32>) -> Tensor<i64> {
    let (n, c, h, w) = (
        logits.shape[0],
        logits.shape[1],
        logits.shape[2],
        logits.shape[3],
    );
    let plane = h * w;
    let mut ids = Vec::with_capacity(n * plane);
    for i in 0..n {
        let image = &logits.data[i * c * plane..(i + 1) * c * plane];
        for p in 0..plane {
            ids.push(argmax((0..c).map(|ch| image[ch * plane + p])));
        }
    }
    Tensor {
        shape: vec![n, h, w],
        data: ids,
    }
}

fn argmax(values: impl Iterator<Item = f32>) -> i64 {
    let mut best = 0i64;
    let mut best_value = f32::NEG_INFINITY;
    for (i, value) in values.enumerate() {
        if value > best_value {
            best_value = value;
            best = i as i64;
        }
    }
    best
}
