use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::image::nearest_pixel;

/// A candidate linear trajectory: start pixel `(x, y)` at t = 0 and velocity
/// `(vx, vy)` in pixels/day, with the statistics of its best surviving
/// observation subset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Start column.
    pub x: i16,
    /// Start row.
    pub y: i16,
    /// Column velocity, pixels/day.
    pub vx: f32,
    /// Row velocity, pixels/day.
    pub vy: f32,
    /// Best-fit flux over the surviving observations.
    pub flux: f32,
    /// Detection likelihood over the surviving observations.
    pub likelihood: f32,
    /// Number of surviving observations.
    pub obs_count: i16,
}

impl Trajectory {
    /// Predicted column at zeroed time `t`, rounded to the nearest pixel.
    #[inline]
    pub fn predicted_col(&self, t: f32) -> i64 {
        nearest_pixel(self.x as f32 + self.vx * t)
    }

    /// Predicted row at zeroed time `t`, rounded to the nearest pixel.
    #[inline]
    pub fn predicted_row(&self, t: f32) -> i64 {
        nearest_pixel(self.y as f32 + self.vy * t)
    }
}

/// Result ordering: likelihood descending, then observation count
/// descending, then start pixel ascending, then velocity ascending.
///
/// Applied both in the per-pixel top-K selection and the final global sort,
/// making the result list a deterministic total order.
pub fn compare_trajectories(a: &Trajectory, b: &Trajectory) -> Ordering {
    b.likelihood
        .total_cmp(&a.likelihood)
        .then_with(|| b.obs_count.cmp(&a.obs_count))
        .then_with(|| (a.x, a.y).cmp(&(b.x, b.y)))
        .then_with(|| a.vx.total_cmp(&b.vx))
        .then_with(|| a.vy.total_cmp(&b.vy))
}
