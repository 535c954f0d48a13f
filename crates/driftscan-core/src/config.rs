use serde::{Deserialize, Serialize};

use crate::compute::DevicePreference;
use crate::consts::DEFAULT_SIGMAG_COEFF;

/// Rectangle of start pixels to search, half-open on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRect {
    pub x_start_min: i32,
    pub x_start_max: i32,
    pub y_start_min: i32,
    pub y_start_max: i32,
}

/// Parameters of the trajectory grid search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Minimum surviving observations for a reported trajectory.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Minimum likelihood for a reported trajectory.
    #[serde(default = "default_min_lh")]
    pub min_lh: f32,
    /// Whether to run the sigma-G outlier filter per candidate.
    #[serde(default = "default_true")]
    pub do_sigmag_filter: bool,
    /// Run the sigma-G filter inside the device kernel. When false the GPU
    /// search returns unfiltered candidates and the filter is applied
    /// host-side; the CPU backend always filters host-side.
    #[serde(default = "default_true")]
    pub gpu_filter: bool,
    /// Lower sigma-G percentile, in [0, 100].
    #[serde(default = "default_sgl_l")]
    pub sgl_l: f32,
    /// Upper sigma-G percentile, in [0, 100].
    #[serde(default = "default_sgl_h")]
    pub sgl_h: f32,
    /// Sigma-G coefficient; 0.7413 matches a Gaussian IQR.
    #[serde(default = "default_sigmag_coeff")]
    pub sigmag_coeff: f32,
    /// Psi plane encoding width: 1, 2 or 4 bytes.
    #[serde(default = "default_num_bytes")]
    pub psi_num_bytes: usize,
    /// Phi plane encoding width: 1, 2 or 4 bytes.
    #[serde(default = "default_num_bytes")]
    pub phi_num_bytes: usize,
    /// Start-pixel rectangle; `None` searches the full image.
    #[serde(default)]
    pub rect: Option<SearchRect>,
    /// Candidates retained per start pixel.
    #[serde(default = "default_results_per_pixel")]
    pub results_per_pixel: usize,
}

fn default_min_observations() -> usize {
    7
}
fn default_min_lh() -> f32 {
    10.0
}
fn default_true() -> bool {
    true
}
fn default_sgl_l() -> f32 {
    25.0
}
fn default_sgl_h() -> f32 {
    75.0
}
fn default_sigmag_coeff() -> f32 {
    DEFAULT_SIGMAG_COEFF
}
fn default_num_bytes() -> usize {
    4
}
fn default_results_per_pixel() -> usize {
    8
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            min_lh: default_min_lh(),
            do_sigmag_filter: true,
            gpu_filter: true,
            sgl_l: default_sgl_l(),
            sgl_h: default_sgl_h(),
            sigmag_coeff: default_sigmag_coeff(),
            psi_num_bytes: default_num_bytes(),
            phi_num_bytes: default_num_bytes(),
            rect: None,
            results_per_pixel: default_results_per_pixel(),
        }
    }
}

/// Velocity grid: `ang_steps x v_steps` polar samples around an externally
/// supplied reference angle, half-open on both axes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default)]
    pub v_min: f32,
    #[serde(default = "default_v_max")]
    pub v_max: f32,
    #[serde(default = "default_v_steps")]
    pub v_steps: usize,
    /// Angle offset below the reference angle, radians.
    #[serde(default = "default_ang_offset")]
    pub ang_below: f32,
    /// Angle offset above the reference angle, radians.
    #[serde(default = "default_ang_offset")]
    pub ang_above: f32,
    #[serde(default = "default_ang_steps")]
    pub ang_steps: usize,
    /// Reference angle in radians (e.g. the local ecliptic), supplied by the
    /// caller; the engine never derives it.
    #[serde(default)]
    pub reference_angle: f32,
}

fn default_v_max() -> f32 {
    20.0
}
fn default_v_steps() -> usize {
    21
}
fn default_ang_offset() -> f32 {
    0.5
}
fn default_ang_steps() -> usize {
    11
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            v_min: 0.0,
            v_max: default_v_max(),
            v_steps: default_v_steps(),
            ang_below: default_ang_offset(),
            ang_above: default_ang_offset(),
            ang_steps: default_ang_steps(),
            reference_angle: 0.0,
        }
    }
}

/// How per-time stamps are reduced to one coadd.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StampType {
    #[default]
    Sum,
    Mean,
    Median,
}

/// Stamp generation and coadd quality-filter parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StampParameters {
    #[serde(default = "default_stamp_radius")]
    pub radius: usize,
    #[serde(default)]
    pub stamp_type: StampType,
    /// Whether the coadd quality filters run at all.
    #[serde(default)]
    pub do_filtering: bool,
    #[serde(default = "default_peak_offset")]
    pub peak_offset_x: f32,
    #[serde(default = "default_peak_offset")]
    pub peak_offset_y: f32,
    /// Minimum fraction of coadd flux in the brightest pixel.
    #[serde(default = "default_center_thresh")]
    pub center_thresh: f32,
    #[serde(default = "default_first_moment_limit")]
    pub m01_limit: f32,
    #[serde(default = "default_first_moment_limit")]
    pub m10_limit: f32,
    #[serde(default = "default_cross_moment_limit")]
    pub m11_limit: f32,
    #[serde(default = "default_second_moment_limit")]
    pub m02_limit: f32,
    #[serde(default = "default_second_moment_limit")]
    pub m20_limit: f32,
}

fn default_stamp_radius() -> usize {
    10
}
fn default_peak_offset() -> f32 {
    2.0
}
fn default_center_thresh() -> f32 {
    0.03
}
fn default_first_moment_limit() -> f32 {
    0.15
}
fn default_cross_moment_limit() -> f32 {
    0.3
}
fn default_second_moment_limit() -> f32 {
    0.5
}

impl Default for StampParameters {
    fn default() -> Self {
        Self {
            radius: default_stamp_radius(),
            stamp_type: StampType::default(),
            do_filtering: false,
            peak_offset_x: default_peak_offset(),
            peak_offset_y: default_peak_offset(),
            center_thresh: default_center_thresh(),
            m01_limit: default_first_moment_limit(),
            m10_limit: default_first_moment_limit(),
            m11_limit: default_cross_moment_limit(),
            m02_limit: default_second_moment_limit(),
            m20_limit: default_second_moment_limit(),
        }
    }
}

/// Top-level configuration consumed by the search tooling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub device: DevicePreference,
    /// Mask bitfield applied to every image before psi/phi generation.
    #[serde(default)]
    pub mask_flags: u32,
    /// Global-mask threshold; 0 disables global mask synthesis.
    #[serde(default)]
    pub global_mask_threshold: usize,
    #[serde(default)]
    pub search: SearchParameters,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub stamp: StampParameters,
}
