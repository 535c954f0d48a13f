use crate::config::GridConfig;

/// Enumerate the dense velocity grid: `ang_steps x v_steps` vectors
/// `(v cos a, v sin a)`, uniformly spaced and half-open on the upper bound
/// of each axis (`step = (max - min) / steps`).
///
/// Angle order is the outer loop so all speeds along one bearing are
/// adjacent, which keeps the per-pixel evaluation cache-friendly.
pub fn velocity_grid(cfg: &GridConfig) -> Vec<(f32, f32)> {
    if cfg.ang_steps == 0 || cfg.v_steps == 0 {
        return Vec::new();
    }
    let ang_min = cfg.reference_angle - cfg.ang_below;
    let ang_max = cfg.reference_angle + cfg.ang_above;
    let ang_step = (ang_max - ang_min) / cfg.ang_steps as f32;
    let vel_step = (cfg.v_max - cfg.v_min) / cfg.v_steps as f32;

    let mut grid = Vec::with_capacity(cfg.ang_steps * cfg.v_steps);
    for a in 0..cfg.ang_steps {
        let ang = ang_min + a as f32 * ang_step;
        let (sin_a, cos_a) = ang.sin_cos();
        for v in 0..cfg.v_steps {
            let vel = cfg.v_min + v as f32 * vel_step;
            grid.push((vel * cos_a, vel * sin_a));
        }
    }
    grid
}
