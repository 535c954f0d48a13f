/// Sentinel marking a masked or otherwise absent pixel.
///
/// Stored as IEEE NaN; test with [`crate::image::pixel_has_data`], never `==`.
pub const NO_DATA: f32 = f32::NAN;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Kernel radius at which masked convolution switches to the FFT path.
pub const FFT_CONV_MIN_RADIUS: usize = 8;

/// Minimum surviving kernel weight before a convolved pixel degrades to NO_DATA.
pub const CONV_WEIGHT_FLOOR: f32 = 1e-12;

/// Largest allowed stamp radius.
pub const MAX_STAMP_EDGE: usize = 64;

/// Floor for the per-image quantization range, so a constant image still
/// encodes with a non-zero scale.
pub const QUANT_MIN_RANGE: f32 = 1e-6;

/// Default sigma-G coefficient: for a Gaussian, sigma = 0.7413 * IQR.
pub const DEFAULT_SIGMAG_COEFF: f32 = 0.7413;

/// Maximum images the GPU search kernel can stage per thread.
pub const MAX_GPU_TIMES: usize = 128;

/// Maximum per-pixel results the GPU search kernel can hold in registers.
pub const MAX_RESULTS_PER_PIXEL: usize = 8;

/// Sentinel used in place of NaN inside GPU buffers, where NaN comparisons
/// are not portable across shader compilers.
pub const GPU_NO_DATA: f32 = -9999.0;
