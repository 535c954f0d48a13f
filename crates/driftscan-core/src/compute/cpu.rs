use crate::config::{SearchParameters, StampParameters};
use crate::error::Result;
use crate::image::RawImage;
use crate::psiphi::PsiPhiArray;
use crate::search::cpu::search_cpu;
use crate::stack::ImageStack;
use crate::stamp::coadd_stamps_cpu;
use crate::trajectory::Trajectory;

use super::ComputeBackend;

/// CPU backend using Rayon for parallelism.
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn search(
        &self,
        psi_phi: &PsiPhiArray,
        grid: &[(f32, f32)],
        params: &SearchParameters,
    ) -> Result<Vec<Trajectory>> {
        Ok(search_cpu(psi_phi, grid, params))
    }

    fn coadd_stamps(
        &self,
        stack: &ImageStack,
        trajectories: &[Trajectory],
        params: &StampParameters,
        use_index: &[Vec<bool>],
    ) -> Result<Vec<RawImage>> {
        coadd_stamps_cpu(stack, trajectories, params, use_index)
    }
}
