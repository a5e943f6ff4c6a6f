//! Logarithmically spaced grids.
//!
//! Used for the candidate frequency boundaries of the analytical window search
//! and for plotting grids.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::input(format!(
            "Invalid log-space range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::input("Log-space steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints exactly; callers compare them against data values.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Log-spaced points between `min` and `max` with `ppd` points per decade.
pub fn logspace_points_per_decade(min: f64, max: f64, ppd: usize) -> Result<Vec<f64>, AppError> {
    if ppd == 0 {
        return Err(AppError::input("Points per decade must be > 0."));
    }
    if !(min > 0.0 && max > min) {
        return Err(AppError::input(format!(
            "Invalid log-space range: min={min}, max={max}."
        )));
    }
    let decades = (max / min).log10();
    let steps = ((decades * ppd as f64).ceil() as usize + 1).max(2);
    log_space(min, max, steps)
}
