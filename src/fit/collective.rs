//! Collective fit of several axes sharing one low-pass filter.
//!
//! Every axis has its own `D_<name>` and `f_c_<name>`; `f3dB` and `alpha`
//! are shared. The residual is the concatenation of `(P − model)/err` over
//! the axes (not inverted).

use std::collections::BTreeMap;
use std::ops::Range;

use rayon::prelude::*;

use crate::error::AppError;
use crate::fit::analytical::analytical_lsq_lorentzian;
use crate::fit::fitter::{DEFAULT_ALPHA, DEFAULT_F3DB, FC_MAX};
use crate::math::{LmOptions, MinimizerResult, Parameters, log_space, minimize};
use crate::models::{ModelParams, PsdModel, low_pass_filter};

/// Data and model of one axis in a collective fit.
#[derive(Debug, Clone)]
pub struct CollectiveAxis {
    pub freq: Vec<f64>,
    pub psd: Vec<f64>,
    pub err: Vec<f64>,
    /// Must include the low-pass filter.
    pub model: PsdModel,
    /// Fallback initial `(D, f_c)`.
    pub guess: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct CollectiveFit {
    pub minimizer: MinimizerResult,
    /// Slice of the residual vector belonging to each axis.
    pub spans: BTreeMap<String, Range<usize>>,
}

pub fn d_param(name: &str) -> String {
    format!("D_{name}")
}

pub fn fc_param(name: &str) -> String {
    format!("f_c_{name}")
}

/// Model parameters of axis `name`; missing entries read as NaN.
pub fn axis_params(params: &Parameters, name: &str) -> ModelParams {
    let value = |key: &str| params.get(key).map_or(f64::NAN, |p| p.value);
    ModelParams {
        d: value(&d_param(name)),
        fc: value(&fc_param(name)),
        f3db: value("f3dB"),
        alpha: value("alpha"),
    }
}

/// Fit all `axes` at once with a shared low-pass filter.
///
/// The shared filter has a long plateau towards `f3dB → ∞`, so the fit is
/// started from several filter frequencies: the requested `f3db` (10 kHz
/// when `None`) first, then `fmax·{1/4, 1/2, 1, 2, 4}`. For each start the
/// per-axis `(D, f_c)` come from the closed-form Lorentzian fit of the
/// spectrum divided by the starting filter, or from `axis.guess` when that
/// fails. The run with the lowest chi-square wins; ties go to the earlier
/// start.
pub fn make_collective_psd_fit(
    axes: &BTreeMap<String, CollectiveAxis>,
    f3db: Option<f64>,
    alpha: Option<f64>,
) -> Result<CollectiveFit, AppError> {
    if axes.is_empty() {
        return Err(AppError::insufficient("No PSDs for the collective fit."));
    }
    let mut spans = BTreeMap::new();
    let mut offset = 0;
    for (name, axis) in axes {
        if !axis.model.lp_filter() {
            return Err(AppError::input(format!(
                "Collective fit of '{name}' needs a low-pass filtered model."
            )));
        }
        if axis.freq.len() != axis.psd.len() || axis.freq.len() != axis.err.len() {
            return Err(AppError::input(format!("Vectors of '{name}' differ in length.")));
        }
        if axis.err.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(AppError::input(format!("Errors of '{name}' must be positive.")));
        }
        spans.insert(name.clone(), offset..offset + axis.freq.len());
        offset += axis.freq.len();
    }

    let residual = |p: &Parameters| -> Vec<f64> {
        let mut out = Vec::with_capacity(offset);
        for (name, axis) in axes {
            let mp = axis_params(p, name);
            out.extend(
                axis.freq
                    .iter()
                    .zip(&axis.psd)
                    .zip(&axis.err)
                    .map(|((&f, &y), &e)| (y - axis.model.eval(f, &mp)) / e),
            );
        }
        out
    };

    let starts = filter_starts(axes, f3db, alpha.unwrap_or(DEFAULT_ALPHA))?;
    let runs: Vec<Result<MinimizerResult, AppError>> = starts
        .par_iter()
        .map(|&(f3db, alpha)| {
            let params = start_params(axes, f3db, alpha)?;
            minimize(&residual, &params, &LmOptions::default())
        })
        .collect();

    let mut best: Option<(usize, MinimizerResult)> = None;
    let mut first_err = None;
    for (i, run) in runs.into_iter().enumerate() {
        match run {
            Ok(run) if run.chisqr.is_finite() => {
                if best.as_ref().is_none_or(|(_, b)| run.chisqr < b.chisqr) {
                    best = Some((i, run));
                }
            }
            Ok(_) => {}
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    let Some((index, minimizer)) = best else {
        return Err(first_err.unwrap_or_else(|| AppError::numerical("Collective fit produced no finite result.")));
    };

    tracing::debug!(
        start_f3db = starts[index].0,
        starts = starts.len(),
        chisqr = minimizer.chisqr,
        status = ?minimizer.status,
        "collective fit start selected"
    );
    if !minimizer.success {
        tracing::warn!(message = %minimizer.message, "collective PSD fit did not converge");
    }
    Ok(CollectiveFit { minimizer, spans })
}

fn filter_starts(
    axes: &BTreeMap<String, CollectiveAxis>,
    f3db: Option<f64>,
    alpha: f64,
) -> Result<Vec<(f64, f64)>, AppError> {
    let mut starts = vec![(f3db.unwrap_or(DEFAULT_F3DB), alpha)];
    let fmax = axes
        .values()
        .flat_map(|a| a.freq.iter().copied())
        .fold(0.0, f64::max);
    if fmax > 0.0 {
        starts.extend(log_space(fmax / 4.0, 4.0 * fmax, 5)?.into_iter().map(|f| (f, alpha)));
    }
    Ok(starts)
}

/// Per-axis `(D, f_c)` for a filter start, from the de-filtered spectrum.
fn axis_start(axis: &CollectiveAxis, f3db: f64, alpha: f64) -> (f64, f64) {
    let flat: Vec<f64> = axis
        .freq
        .iter()
        .zip(&axis.psd)
        .map(|(&f, &p)| p / low_pass_filter(f, f3db, alpha))
        .collect();
    let fit = analytical_lsq_lorentzian(&axis.freq, &flat);
    if fit.is_finite() && fit.d > 0.0 && fit.fc > 0.0 && fit.fc < FC_MAX {
        (fit.d, fit.fc)
    } else {
        axis.guess
    }
}

fn start_params(axes: &BTreeMap<String, CollectiveAxis>, f3db: f64, alpha: f64) -> Result<Parameters, AppError> {
    let mut params = Parameters::new();
    for (name, axis) in axes {
        let (d, fc) = axis_start(axis, f3db, alpha);
        params.add(&d_param(name), d, 0.0, f64::INFINITY, true)?;
        params.add(&fc_param(name), fc, 0.0, FC_MAX, true)?;
    }
    params.add("f3dB", f3db, 0.0, f64::INFINITY, true)?;
    params.add("alpha", alpha, 0.0, 1.0, true)?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelOptions, gen_model_fun, lorentzian_psd, low_pass_filter};

    fn axis(d: f64, fc: f64, f3db: f64, alpha: f64) -> CollectiveAxis {
        let freq: Vec<f64> = (1..=400).map(|i| f64::from(i) * 12.5).collect();
        let psd: Vec<f64> = freq
            .iter()
            .map(|&f| lorentzian_psd(f, d, fc) * low_pass_filter(f, f3db, alpha))
            .collect();
        let err = psd.iter().map(|p| p / 10.0).collect();
        let model = gen_model_fun(
            "lorentzian",
            &ModelOptions {
                lp_filter: true,
                ..ModelOptions::default()
            },
        )
        .unwrap();
        CollectiveAxis {
            freq,
            psd,
            err,
            model,
            guess: (d * 0.8, fc * 1.2),
        }
    }

    #[test]
    fn shared_filter_is_recovered() {
        let mut axes = BTreeMap::new();
        axes.insert("x".to_string(), axis(2e-6, 600.0, 2500.0, 0.4));
        axes.insert("y".to_string(), axis(3e-6, 900.0, 2500.0, 0.4));
        let fit = make_collective_psd_fit(&axes, Some(4000.0), Some(0.5)).unwrap();
        let p = &fit.minimizer.params;
        assert!((p.value("f3dB").unwrap() / 2500.0 - 1.0).abs() < 1e-3);
        assert!((p.value("alpha").unwrap() - 0.4).abs() < 1e-3);
        assert!((p.value("f_c_y").unwrap() / 900.0 - 1.0).abs() < 1e-3);
        assert!((p.value("D_x").unwrap() / 2e-6 - 1.0).abs() < 1e-3);
        assert_eq!(fit.spans["x"], 0..400);
        assert_eq!(fit.spans["y"], 400..800);
    }

    #[test]
    fn default_start_reaches_a_filter_below_the_data_range() {
        let mut axes = BTreeMap::new();
        for (name, d, fc) in [("x", 2e-6, 600.0), ("y", 3e-6, 900.0)] {
            let mut a = axis(d, fc, 3000.0, 0.4);
            a.guess = (1.0, 1000.0);
            axes.insert(name.to_string(), a);
        }
        let fit = make_collective_psd_fit(&axes, None, None).unwrap();
        let p = &fit.minimizer.params;
        assert!(fit.minimizer.status.converged(), "{:?}", fit.minimizer.status);
        assert!((p.value("f3dB").unwrap() / 3000.0 - 1.0).abs() < 1e-3, "f3dB {}", p.value("f3dB").unwrap());
        assert!((p.value("alpha").unwrap() - 0.4).abs() < 1e-3);
        assert!((p.value("f_c_x").unwrap() / 600.0 - 1.0).abs() < 1e-3);
        assert!((p.value("f_c_y").unwrap() / 900.0 - 1.0).abs() < 1e-3);
        assert!(fit.minimizer.redchi < 1e-6);
    }

    #[test]
    fn filter_starts_cover_the_data_range() {
        let mut axes = BTreeMap::new();
        axes.insert("x".to_string(), axis(2e-6, 600.0, 3000.0, 0.4));
        let starts = filter_starts(&axes, Some(7000.0), 0.3).unwrap();
        assert_eq!(starts[0], (7000.0, 0.3));
        let f3db: Vec<f64> = starts[1..].iter().map(|s| s.0).collect();
        assert_eq!(f3db.len(), 5);
        assert_eq!(f3db[0], 1250.0);
        assert!((f3db[2] - 5000.0).abs() < 1e-9);
        assert_eq!(f3db[4], 20_000.0);
        assert!(starts.iter().all(|s| s.1 == 0.3));
    }

    #[test]
    fn unfiltered_model_is_rejected() {
        let mut a = axis(1e-6, 500.0, 1000.0, 0.5);
        a.model = gen_model_fun("lorentzian", &ModelOptions::default()).unwrap();
        let mut axes = BTreeMap::new();
        axes.insert("x".to_string(), a);
        assert!(make_collective_psd_fit(&axes, None, None).is_err());
    }
}
