use crate::{Palette, SegError};
use sema_base::Tensor;

/// Frame pre- and post-processing around the inference call.
///
/// Owns the loaded `Palette`; stateless between calls otherwise.
pub struct FrameProcessor {
    palette: Palette,
}

impl FrameProcessor {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Resize a frame and wrap it in a batch of one.
    ///
    /// Takes an HWC RGB frame, resizes it to `target_size x target_size`
    /// with bilinear interpolation, and returns the resized `[S, S, 3]` u8
    /// image together with an NHWC `[1, S, S, 3]` f32 batch. When `mean` is
    /// given, the per-channel values are subtracted from the batch (a model
    /// input contract; no other normalization is applied).
    ///
    /// # Errors
    ///
    /// `SegError::InvalidInput` if the frame is empty, not 3-channel, or
    /// `target_size` is zero.
    pub fn preprocess(
        &self,
        frame: &Tensor<u8>,
        target_size: usize,
        mean: Option<[f32; 3]>,
    ) -> Result<(Tensor<u8>, Tensor<f32>), SegError> {
        if target_size == 0 {
            return Err(SegError::InvalidInput(
                "target size must be non-zero".to_string(),
            ));
        }
        let (h, w, c) = frame
            .dims3()
            .map_err(|_| SegError::InvalidInput(format!(
                "expected HWC frame, got shape {:?}",
                frame.shape
            )))?;
        if h == 0 || w == 0 {
            return Err(SegError::InvalidInput(format!(
                "frame dimensions must be non-zero, got {}x{}",
                h, w
            )));
        }
        if c != 3 {
            return Err(SegError::InvalidInput(format!(
                "expected 3 channels (RGB), got {}",
                c
            )));
        }

        let resized_data = resize_bilinear(&frame.data, h, w, target_size);

        let mut feed = Vec::with_capacity(resized_data.len());
        match mean {
            Some(mean) => {
                for (i, &v) in resized_data.iter().enumerate() {
                    feed.push(v as f32 - mean[i % 3]);
                }
            }
            None => feed.extend(resized_data.iter().map(|&v| v as f32)),
        }

        let resized = Tensor::new(vec![target_size, target_size, 3], resized_data)?;
        let batch = Tensor::new(vec![1, target_size, target_size, 3], feed)?;
        Ok((resized, batch))
    }

    /// Decode class-index maps into RGB masks.
    ///
    /// `maps` is a `[N, H, W]` batch of class ids. For each of the first
    /// `num_images` maps, builds an `[H, W, 3]` image where a pixel gets
    /// `palette[id]` iff `0 <= id < num_classes`; out-of-range ids keep the
    /// zero background. `num_classes` may be smaller than the palette (the
    /// table can cover a superset of the classes a run is allowed to
    /// render), never larger.
    ///
    /// # Errors
    ///
    /// `SegError::InsufficientBatch` if `num_images` exceeds the batch,
    /// `SegError::PaletteTooSmall` if `num_classes` exceeds the palette,
    /// `SegError::InvalidInput` if `maps` is not rank 3.
    pub fn decode(
        &self,
        maps: &Tensor<i64>,
        num_images: usize,
        num_classes: usize,
    ) -> Result<Vec<Tensor<u8>>, SegError> {
        if maps.ndim() != 3 {
            return Err(SegError::InvalidInput(format!(
                "expected [N, H, W] class maps, got shape {:?}",
                maps.shape
            )));
        }
        let (n, h, w) = (maps.shape[0], maps.shape[1], maps.shape[2]);
        if n < num_images {
            return Err(SegError::InsufficientBatch {
                batch: n,
                requested: num_images,
            });
        }
        if num_classes > self.palette.len() {
            return Err(SegError::PaletteTooSmall {
                palette: self.palette.len(),
                num_classes,
            });
        }

        let colors = self.palette.colors();
        let plane = h * w;
        let mut outputs = Vec::with_capacity(num_images);
        for i in 0..num_images {
            let mut mask = Tensor::<u8>::zeros(vec![h, w, 3])?;
            let ids = &maps.data[i * plane..(i + 1) * plane];
            for (pixel, &id) in mask.data.chunks_exact_mut(3).zip(ids) {
                if id >= 0 && (id as usize) < num_classes {
                    pixel.copy_from_slice(&colors[id as usize]);
                }
            }
            outputs.push(mask);
        }
        Ok(outputs)
    }
}

/// Bilinear resize of an HWC RGB8 image to `size x size`.
///
/// Sample positions use half-pixel centers, so resizing to the source size
/// reproduces the input exactly.
fn resize_bilinear(data: &[u8], h: usize, w: usize, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size * size * 3];
    let scale_y = h as f32 / size as f32;
    let scale_x = w as f32 / size as f32;

    for oy in 0..size {
        let sy = ((oy as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = sy as usize;
        let y1 = (y0 + 1).min(h - 1);
        let fy = sy - y0 as f32;

        for ox in 0..size {
            let sx = ((ox as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = sx as usize;
            let x1 = (x0 + 1).min(w - 1);
            let fx = sx - x0 as f32;

            for ch in 0..3 {
                let p00 = data[(y0 * w + x0) * 3 + ch] as f32;
                let p01 = data[(y0 * w + x1) * 3 + ch] as f32;
                let p10 = data[(y1 * w + x0) * 3 + ch] as f32;
                let p11 = data[(y1 * w + x1) * 3 + ch] as f32;

                let top = p00 * (1.0 - fx) + p01 * fx;
                let bottom = p10 * (1.0 - fx) + p11 * fx;
                let value = top * (1.0 - fy) + bottom * fy;

                out[(oy * size + ox) * 3 + ch] = value.round() as u8;
            }
        }
    }

    out
}
