use std::fmt;

#[derive(Debug, PartialEq)]
pub enum TensorError {
    ShapeOverflow,
    ShapeMismatch { expected: usize, got: usize },
    RankMismatch { expected: usize, got: usize },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::ShapeOverflow => write!(f, "shape dimensions overflow when multiplied"),
            TensorError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected} elements, got {got}")
            }
            TensorError::RankMismatch { expected, got } => {
                write!(f, "rank mismatch: expected {expected} dimensions, got {got}")
            }
        }
    }
}

impl std::error::Error for TensorError {}

/// Dense row-major tensor. Images use HWC layout `[height, width, channels]`,
/// batched tensors prepend the batch dimension.
#[derive(Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T: fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("len", &self.data.len())
            .finish()
    }
}

fn shape_product(shape: &[usize]) -> Result<usize, TensorError> {
    let mut product: usize = 1;
    for &dim in shape {
        product = product
            .checked_mul(dim)
            .ok_or(TensorError::ShapeOverflow)?;
    }
    Ok(product)
}

impl<T> Tensor<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        let product = shape_product(&shape)?;
        if product != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected: product,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interpret the shape as `[height, width, channels]`.
    ///
    /// Frame consumers use this to validate captured images before touching
    /// the pixel data.
    pub fn dims3(&self) -> Result<(usize, usize, usize), TensorError> {
        if self.shape.len() != 3 {
            return Err(TensorError::RankMismatch {
                expected: 3,
                got: self.shape.len(),
            });
        }
        Ok((self.shape[0], self.shape[1], self.shape[2]))
    }
}

impl<T: Default + Clone> Tensor<T> {
    pub fn zeros(shape: Vec<usize>) -> Result<Self, TensorError> {
        let product = shape_product(&shape)?;
        Ok(Self {
            shape,
            data: vec![T::default(); product],
        })
    }
}
