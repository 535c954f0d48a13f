use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{SearchParameters, StampParameters};
use crate::error::Result;
use crate::image::RawImage;
use crate::psiphi::PsiPhiArray;
use crate::stack::ImageStack;
use crate::trajectory::Trajectory;

#[cfg(not(feature = "gpu"))]
use crate::error::DriftscanError;

use super::cpu::CpuBackend;

/// Which compute device to use for search and coadds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Use the GPU when one is available, otherwise fall back to CPU.
    #[default]
    Auto,
    ForceCpu,
    ForceGpu,
}

/// Execution backend for the two batch operations of the engine.
///
/// Both operations are pure with respect to their inputs; a backend may be
/// shared across searches but concurrent use must be serialized by the
/// caller.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    /// Evaluate the velocity grid over every start pixel and return the
    /// concatenated per-pixel top-K lists, globally sorted.
    fn search(
        &self,
        psi_phi: &PsiPhiArray,
        grid: &[(f32, f32)],
        params: &SearchParameters,
    ) -> Result<Vec<Trajectory>>;

    /// Batch stamp coadds, index-aligned with `trajectories`.
    fn coadd_stamps(
        &self,
        stack: &ImageStack,
        trajectories: &[Trajectory],
        params: &StampParameters,
        use_index: &[Vec<bool>],
    ) -> Result<Vec<RawImage>>;
}

/// Instantiate a backend for the given preference.
///
/// `Auto` degrades to CPU with a warning when no GPU is available (or the
/// crate was built without the `gpu` feature); `ForceGpu` surfaces the
/// failure instead.
pub fn create_backend(preference: DevicePreference) -> Result<Arc<dyn ComputeBackend>> {
    match preference {
        DevicePreference::ForceCpu => Ok(Arc::new(CpuBackend)),
        DevicePreference::ForceGpu => {
            #[cfg(feature = "gpu")]
            {
                let backend = super::wgpu_backend::WgpuBackend::new()?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "gpu"))]
            {
                Err(DriftscanError::Gpu(
                    "GPU requested but driftscan-core was built without the `gpu` feature"
                        .to_string(),
                ))
            }
        }
        DevicePreference::Auto => {
            #[cfg(feature = "gpu")]
            {
                match super::wgpu_backend::WgpuBackend::new() {
                    Ok(backend) => return Ok(Arc::new(backend)),
                    Err(err) => {
                        tracing::warn!("no usable GPU, falling back to CPU: {err}");
                    }
                }
            }
            Ok(Arc::new(CpuBackend))
        }
    }
}
