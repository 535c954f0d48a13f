use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftscanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Layer shape mismatch: expected {expected_height}x{expected_width}, got {height}x{width}")]
    LayerShapeMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Empty image stack")]
    EmptyStack,

    #[error("Image index {index} out of range (total: {total})")]
    ImageIndexOutOfRange { index: usize, total: usize },

    #[error("Invalid PSF: {0}")]
    InvalidPsf(String),

    #[error("Invalid stamp radius {radius} (must be 1..={max})")]
    InvalidStampRadius { radius: usize, max: usize },

    #[error("Invalid encoding width {num_bytes} (must be 1, 2 or 4)")]
    InvalidEncoding { num_bytes: usize },

    #[error("Index mask length {got} does not match image count {expected}")]
    MaskLengthMismatch { expected: usize, got: usize },

    #[error("Invalid stack container: {0}")]
    InvalidContainer(String),

    #[error("Search has not been prepared: {0}")]
    NotReady(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

pub type Result<T> = std::result::Result<T, DriftscanError>;
