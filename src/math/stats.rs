//! Goodness-of-fit statistics.

use statrs::distribution::{ContinuousCDF, Normal};

/// Classify a reduced chi-square value as an outlier.
///
/// For `n_free` degrees of freedom the reduced chi-square has mean 1 and
/// standard deviation `sqrt(2/n_free)`. It is approximated by a normal
/// distribution (valid for large `n_free`), and values outside the two-sided
/// confidence interval at level `conf_level` are flagged.
///
/// Non-finite values and `n_free <= 0` are always outliers.
pub fn is_outlier(redchi2: f64, n_free: f64, conf_level: f64) -> bool {
    if !(redchi2.is_finite() && n_free.is_finite()) || n_free <= 0.0 {
        return true;
    }
    match redchi_interval(n_free, conf_level) {
        Some((lower, upper)) => redchi2 < lower || redchi2 > upper,
        None => true,
    }
}

/// Reduced chi-square above the upper end of the interval at `conf_level`.
///
/// One-sided counterpart of [`is_outlier`]: a fit to exact data (reduced
/// chi-square near zero) passes, a fit stuck away from the data does not.
pub fn is_poor_fit(redchi2: f64, n_free: f64, conf_level: f64) -> bool {
    if !(redchi2.is_finite() && n_free.is_finite()) || n_free <= 0.0 {
        return true;
    }
    redchi_interval(n_free, conf_level).is_none_or(|(_, upper)| redchi2 > upper)
}

/// Two-sided interval `[2 - q, q]` of the reduced chi-square at `conf_level`.
pub fn redchi_interval(n_free: f64, conf_level: f64) -> Option<(f64, f64)> {
    if !(n_free > 0.0 && conf_level > 0.0 && conf_level < 1.0) {
        return None;
    }
    let normal = Normal::new(1.0, (2.0 / n_free).sqrt()).ok()?;
    let upper = normal.inverse_cdf((1.0 + conf_level) / 2.0);
    Some((2.0 - upper, upper))
}
