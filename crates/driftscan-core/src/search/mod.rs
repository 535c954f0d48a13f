pub mod cpu;
pub mod grid;
pub mod sigma_g;

use std::sync::Arc;

use crate::compute::{cpu::CpuBackend, ComputeBackend};
use crate::config::{GridConfig, SearchParameters};
use crate::consts::NO_DATA;
use crate::error::{DriftscanError, Result};
use crate::image::pixel_has_data;
use crate::psiphi::PsiPhiArray;
use crate::stack::ImageStack;
use crate::trajectory::Trajectory;

/// Lifecycle of a [`StackSearch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// No psi/phi statistics generated yet.
    Fresh,
    /// Psi/phi statistics cached; ready to search.
    Ready,
    /// A result vector from the last search is held.
    HasResults,
}

/// The grid-search driver: borrows an immutable [`ImageStack`], caches the
/// derived [`PsiPhiArray`], and runs searches through a compute backend.
pub struct StackSearch<'a> {
    stack: &'a ImageStack,
    backend: Arc<dyn ComputeBackend>,
    psi_phi: Option<PsiPhiArray>,
    results: Vec<Trajectory>,
    state: SearchState,
}

impl<'a> StackSearch<'a> {
    /// A search driver on the CPU backend.
    pub fn new(stack: &'a ImageStack) -> Self {
        Self::with_backend(stack, Arc::new(CpuBackend))
    }

    pub fn with_backend(stack: &'a ImageStack, backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            stack,
            backend,
            psi_phi: None,
            results: Vec::new(),
            state: SearchState::Fresh,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn stack(&self) -> &ImageStack {
        self.stack
    }

    pub fn psi_phi(&self) -> Option<&PsiPhiArray> {
        self.psi_phi.as_ref()
    }

    /// Generate and cache the packed psi/phi statistics.
    ///
    /// Idempotent: a second call with the same encoding widths is a no-op;
    /// new widths invalidate and re-encode.
    pub fn prepare_psi_phi(&mut self, psi_num_bytes: usize, phi_num_bytes: usize) -> Result<()> {
        if let Some(existing) = &self.psi_phi {
            if existing.psi_num_bytes() == psi_num_bytes
                && existing.phi_num_bytes() == phi_num_bytes
            {
                return Ok(());
            }
            tracing::debug!(
                psi_num_bytes,
                phi_num_bytes,
                "re-encoding psi/phi with new widths"
            );
        }

        tracing::info!(
            num_times = self.stack.len(),
            width = self.stack.width(),
            height = self.stack.height(),
            "generating psi/phi statistics"
        );
        let psi_images = self.stack.generate_psi_images();
        let phi_images = self.stack.generate_phi_images();
        self.psi_phi = Some(PsiPhiArray::new(
            &psi_images,
            &phi_images,
            self.stack.zeroed_times(),
            psi_num_bytes,
            phi_num_bytes,
        )?);
        if self.state == SearchState::Fresh {
            self.state = SearchState::Ready;
        }
        Ok(())
    }

    /// Run the grid search, replacing any previous results.
    ///
    /// Calling from the fresh state implicitly prepares psi/phi with the
    /// encoding widths named in `params`.
    pub fn search(
        &mut self,
        grid_cfg: &GridConfig,
        params: &SearchParameters,
    ) -> Result<&[Trajectory]> {
        self.prepare_psi_phi(params.psi_num_bytes, params.phi_num_bytes)?;
        let psi_phi = self
            .psi_phi
            .as_ref()
            .ok_or_else(|| DriftscanError::NotReady("psi/phi generation produced nothing".into()))?;

        let grid = grid::velocity_grid(grid_cfg);
        tracing::info!(
            backend = self.backend.name(),
            candidates_per_pixel = grid.len(),
            "starting trajectory search"
        );
        self.results = self.backend.search(psi_phi, &grid, params)?;
        tracing::info!(results = self.results.len(), "search finished");
        self.state = SearchState::HasResults;
        Ok(&self.results)
    }

    /// Results of the last search, sorted by descending likelihood.
    pub fn results(&self) -> &[Trajectory] {
        &self.results
    }

    pub fn clear_results(&mut self) {
        self.results.clear();
        if self.state == SearchState::HasResults {
            self.state = SearchState::Ready;
        }
    }

    /// Per-image psi values sampled along a trajectory; NO_DATA where the
    /// predicted position is invalid.
    pub fn psi_curve(&self, trj: &Trajectory) -> Result<Vec<f32>> {
        let psi_phi = self.require_psi_phi()?;
        Ok(self
            .sample_curve(psi_phi, trj, |pp, t, row, col| pp.read_psi(t, row, col)))
    }

    /// Per-image phi values sampled along a trajectory.
    pub fn phi_curve(&self, trj: &Trajectory) -> Result<Vec<f32>> {
        let psi_phi = self.require_psi_phi()?;
        Ok(self
            .sample_curve(psi_phi, trj, |pp, t, row, col| pp.read_phi(t, row, col)))
    }

    /// Per-image likelihood contributions `psi / sqrt(phi)` along a
    /// trajectory; NO_DATA where either statistic is invalid.
    pub fn lh_curve(&self, trj: &Trajectory) -> Result<Vec<f32>> {
        let psi_phi = self.require_psi_phi()?;
        Ok(self.sample_curve(psi_phi, trj, |pp, t, row, col| {
            let psi = pp.read_psi(t, row, col);
            let phi = pp.read_phi(t, row, col);
            if pixel_has_data(psi) && pixel_has_data(phi) && phi > 0.0 {
                psi / phi.sqrt()
            } else {
                NO_DATA
            }
        }))
    }

    fn require_psi_phi(&self) -> Result<&PsiPhiArray> {
        self.psi_phi
            .as_ref()
            .ok_or_else(|| DriftscanError::NotReady("call prepare_psi_phi first".into()))
    }

    fn sample_curve<F>(&self, psi_phi: &PsiPhiArray, trj: &Trajectory, read: F) -> Vec<f32>
    where
        F: Fn(&PsiPhiArray, usize, i64, i64) -> f32,
    {
        psi_phi
            .zeroed_times()
            .iter()
            .enumerate()
            .map(|(i, &t)| read(psi_phi, i, trj.predicted_row(t), trj.predicted_col(t)))
            .collect()
    }
}
