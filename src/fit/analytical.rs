//! Closed-form least-squares fit of a Lorentzian PSD.
//!
//! Fitting `1/P = (f_c² + f²) π² / D` with weights `P²` is linear in
//! `(f_c² π²/D, π²/D)`, so the solution follows from six power sums
//!
//! ```text
//! S_pq = Σ f^(2p) P^q,   (p, q) ∈ {(0,0), (0,1), (0,2), (1,1), (1,2), (2,2)}
//! ```
//!
//! (Berg-Sørensen & Flyvbjerg 2004, eqs. 13–14). D is *not* de-biased here.
//!
//! The window search evaluates all candidate boundaries of a pass in
//! parallel and picks deterministically by candidate index.

use rayon::prelude::*;

use crate::error::AppError;
use crate::math::logspace_points_per_decade;

/// Default number of candidate boundaries per decade.
pub const DEFAULT_PPD: usize = 20;

/// Windows with fewer points are not evaluated.
const MIN_WINDOW_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticalFit {
    /// Corner frequency; NaN when `a/b < 0` or the sums are degenerate.
    pub fc: f64,
    pub d: f64,
    pub chi2: f64,
}

impl AnalyticalFit {
    /// All three values are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.fc.is_finite() && self.d.is_finite() && self.chi2.is_finite()
    }
}

/// Best window found by [`calc_anal_lsq_opt`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSearch {
    pub fit: AnalyticalFit,
    pub bounds: (f64, f64),
}

/// Closed-form Lorentzian fit of `psd` over `freq`.
pub fn analytical_lsq_lorentzian(freq: &[f64], psd: &[f64]) -> AnalyticalFit {
    let mut s = [[0.0_f64; 3]; 3];
    for (&f, &p) in freq.iter().zip(psd) {
        let f2 = f * f;
        let fp = [1.0, f2, f2 * f2];
        let pq = [1.0, p, p * p];
        for (i, a) in fp.iter().enumerate() {
            for (j, b) in pq.iter().enumerate() {
                s[i][j] += a * b;
            }
        }
    }
    let (s00, s01, s02) = (s[0][0], s[0][1], s[0][2]);
    let (s11, s12, s22) = (s[1][1], s[1][2], s[2][2]);

    let a = s01 * s22 - s11 * s12;
    let b = s11 * s02 - s01 * s12;
    let det = s02 * s22 - s12 * s12;

    let ratio = a / b;
    let fc = if ratio >= 0.0 { ratio.sqrt() } else { f64::NAN };
    let d = std::f64::consts::PI.powi(2) * det / b;
    let chi2 = s00 - (s01 * s01 * s22 + s11 * s11 * s02 - 2.0 * s01 * s11 * s12) / det;

    AnalyticalFit { fc, d, chi2 }
}

/// Search the frequency window whose closed-form fit best matches a Lorentzian.
///
/// Candidate boundaries are log-spaced with `ppd` points per decade; the
/// lower half are `fmin` candidates, the upper half `fmax` candidates.
///
/// 1. With `fmin = min(freq)`, pick the `fmax` minimizing `chi2 / N`.
/// 2. With that `fmax`, pick the `fmin` maximizing `f_c`.
///
/// This is a local two-pass heuristic, not a global optimum. A pass without
/// any valid candidate keeps the full-range bound. The returned fit may be
/// NaN; callers substitute defaults.
pub fn calc_anal_lsq_opt(freq: &[f64], psd: &[f64], ppd: usize) -> Result<WindowSearch, AppError> {
    if freq.len() != psd.len() {
        return Err(AppError::input(format!(
            "Frequency and PSD vectors differ in length ({} vs {}).",
            freq.len(),
            psd.len()
        )));
    }
    if freq.len() < MIN_WINDOW_POINTS {
        return Err(AppError::insufficient(format!(
            "At least {MIN_WINDOW_POINTS} points are needed for the analytical fit, got {}.",
            freq.len()
        )));
    }
    let f_lo = freq.iter().copied().fold(f64::INFINITY, f64::min);
    let f_hi = freq.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let grid = logspace_points_per_decade(f_lo, f_hi, ppd)?;
    let (fmin_candidates, fmax_candidates) = grid.split_at(grid.len() / 2);

    let fmax = best_window(fmax_candidates, |fmax| evaluate_window(freq, psd, f_lo, fmax), |c| -c.chi2_per_point)
        .unwrap_or(f_hi);
    tracing::debug!(fmax, "analytical search: upper bound");

    let fmin = best_window(fmin_candidates, |fmin| evaluate_window(freq, psd, fmin, fmax), |c| c.fit.fc)
        .unwrap_or(f_lo);
    tracing::debug!(fmin, "analytical search: lower bound");

    let (f_part, p_part) = window(freq, psd, fmin, fmax);
    let fit = analytical_lsq_lorentzian(&f_part, &p_part);
    Ok(WindowSearch {
        fit,
        bounds: (fmin, fmax),
    })
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    idx: usize,
    bound: f64,
    fit: AnalyticalFit,
    chi2_per_point: f64,
}

fn evaluate_window(freq: &[f64], psd: &[f64], fmin: f64, fmax: f64) -> Option<(AnalyticalFit, f64)> {
    let (f_part, p_part) = window(freq, psd, fmin, fmax);
    if f_part.len() < MIN_WINDOW_POINTS {
        return None;
    }
    let fit = analytical_lsq_lorentzian(&f_part, &p_part);
    if !fit.is_finite() {
        return None;
    }
    Some((fit, fit.chi2 / f_part.len() as f64))
}

/// Evaluate every candidate bound (parallel) and return the one with the
/// largest `score`; ties go to the lowest index.
fn best_window<E, S>(bounds: &[f64], eval: E, score: S) -> Option<f64>
where
    E: Fn(f64) -> Option<(AnalyticalFit, f64)> + Sync,
    S: Fn(&Candidate) -> f64,
{
    let candidates: Vec<Candidate> = bounds
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &bound)| {
            eval(bound).map(|(fit, chi2_per_point)| Candidate {
                idx,
                bound,
                fit,
                chi2_per_point,
            })
        })
        .collect();

    let mut best = candidates.first()?;
    for c in &candidates[1..] {
        let (sc, sb) = (score(c), score(best));
        if sc > sb || (sc == sb && c.idx < best.idx) {
            best = c;
        }
    }
    Some(best.bound)
}

fn window(freq: &[f64], psd: &[f64], fmin: f64, fmax: f64) -> (Vec<f64>, Vec<f64>) {
    freq.iter()
        .zip(psd)
        .filter(|(f, _)| **f >= fmin && **f <= fmax)
        .map(|(f, p)| (*f, *p))
        .unzip()
}
