//! Single-axis non-linear PSD fit.
//!
//! The fit works on the inverse: the residual of point `i` is
//!
//! ```text
//! r_i = (1/model(f_i) − 1/P_i) · w_i,   w_i = P_i·sqrt(N_avg)   (or err_i·N_avg)
//! ```
//!
//! which equals `(P_i/model − 1)·sqrt(N_avg)` and keeps the Lorentzian tail
//! well conditioned. Parameters are `D`, `f_c` and, with the low-pass
//! filter, `f3dB` and `alpha`.

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::math::{LmOptions, MinimizerResult, Parameters, minimize};
use crate::models::{ModelParams, PsdModel};

pub const DEFAULT_F3DB: f64 = 10e3;
pub const DEFAULT_ALPHA: f64 = 0.5;
pub const FC_MAX: f64 = 1e7;

/// Initial values and bounds of a single-axis fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitGuess {
    pub d: f64,
    pub d_min: f64,
    pub d_max: f64,
    pub fc: f64,
    pub fc_min: f64,
    pub fc_max: f64,
    /// [`DEFAULT_F3DB`] when `None`.
    pub f3db: Option<f64>,
    /// [`DEFAULT_ALPHA`] when `None`.
    pub alpha: Option<f64>,
}

impl Default for FitGuess {
    fn default() -> Self {
        Self {
            d: 1.0,
            d_min: 0.0,
            d_max: f64::INFINITY,
            fc: 1000.0,
            fc_min: 0.0,
            fc_max: FC_MAX,
            f3db: None,
            alpha: None,
        }
    }
}

impl FitGuess {
    /// Defaults with the given starting point.
    pub fn from_start(d: f64, fc: f64) -> Self {
        Self {
            d,
            fc,
            ..Self::default()
        }
    }
}

/// Fit parameters for `model` starting at `guess`.
///
/// With a fixed low-pass filter missing `f3dB`/`alpha` values fall back to
/// the defaults and are reported.
pub fn build_params(model: &PsdModel, guess: &FitGuess) -> Result<(Parameters, Vec<Diagnostic>), AppError> {
    let mut params = Parameters::new();
    let mut diagnostics = Vec::new();
    params.add("D", guess.d, guess.d_min, guess.d_max, true)?;
    params.add("f_c", guess.fc, guess.fc_min, guess.fc_max, true)?;
    if model.lp_filter() {
        let vary = !model.lp_fixed();
        if guess.f3db.is_none() && !vary {
            diagnostics.push(Diagnostic::warn(
                "fit",
                "Cut-off frequency not provided! Using 10 kHz as fallback.",
            ));
        }
        if guess.alpha.is_none() && !vary {
            diagnostics.push(Diagnostic::warn("fit", "alpha not provided! Using 0.5 as fallback."));
        }
        params.add("f3dB", guess.f3db.unwrap_or(DEFAULT_F3DB), 0.0, f64::INFINITY, vary)?;
        params.add("alpha", guess.alpha.unwrap_or(DEFAULT_ALPHA), 0.0, 1.0, vary)?;
    }
    Ok((params, diagnostics))
}

/// Current model parameters; missing entries read as NaN.
pub fn model_params(params: &Parameters) -> ModelParams {
    let value = |name: &str| params.get(name).map_or(f64::NAN, |p| p.value);
    ModelParams {
        d: value("D"),
        fc: value("f_c"),
        f3db: value("f3dB"),
        alpha: value("alpha"),
    }
}

/// Fit `1/model` to `1/psd` (see the module docs for the weighting).
pub fn fit_psd(
    freq: &[f64],
    psd: &[f64],
    err: Option<&[f64]>,
    n_avg: u32,
    model: &PsdModel,
    guess: &FitGuess,
) -> Result<(MinimizerResult, Vec<Diagnostic>), AppError> {
    if freq.len() != psd.len() || err.is_some_and(|e| e.len() != freq.len()) {
        return Err(AppError::input("Frequency, PSD and error vectors differ in length."));
    }
    if psd.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
        return Err(AppError::input("PSD values must be positive and finite for the inverse fit."));
    }
    let (params, diagnostics) = build_params(model, guess)?;

    let weights: Vec<f64> = match err {
        None => {
            let sqrt_n = f64::from(n_avg).sqrt();
            psd.iter().map(|p| p * sqrt_n).collect()
        }
        Some(err) => err.iter().map(|e| e * f64::from(n_avg)).collect(),
    };

    let residual = |p: &Parameters| -> Vec<f64> {
        let mp = model_params(p);
        freq.iter()
            .zip(psd)
            .zip(&weights)
            .map(|((&f, &y), &w)| (model.eval_inv(f, &mp) - 1.0 / y) * w)
            .collect()
    };

    let result = minimize(residual, &params, &LmOptions::default())?;
    if !result.success {
        tracing::warn!(message = %result.message, "PSD fit did not converge");
    }
    Ok((result, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelOptions, gen_model_fun, lorentzian_psd, low_pass_filter};

    fn freq() -> Vec<f64> {
        (1..=500).map(|i| f64::from(i) * 10.0).collect()
    }

    #[test]
    fn exact_lorentzian_converges_from_offset_start() {
        let freq = freq();
        let psd: Vec<f64> = freq.iter().map(|&f| lorentzian_psd(f, 2e-6, 800.0)).collect();
        let model = gen_model_fun("lorentzian", &ModelOptions::default()).unwrap();
        let (res, diags) = fit_psd(&freq, &psd, None, 100, &model, &FitGuess::from_start(1e-6, 500.0)).unwrap();
        assert!(diags.is_empty());
        let d = res.params.value("D").unwrap();
        let fc = res.params.value("f_c").unwrap();
        assert!((d / 2e-6 - 1.0).abs() < 1e-6, "D {d}");
        assert!((fc / 800.0 - 1.0).abs() < 1e-6, "fc {fc}");
        assert!(res.chisqr < 1e-12);
    }

    #[test]
    fn low_pass_filter_parameters_are_fitted() {
        let freq = freq();
        let psd: Vec<f64> = freq
            .iter()
            .map(|&f| lorentzian_psd(f, 2e-6, 800.0) * low_pass_filter(f, 3000.0, 0.3))
            .collect();
        let model = gen_model_fun(
            "lorentzian",
            &ModelOptions {
                lp_filter: true,
                ..ModelOptions::default()
            },
        )
        .unwrap();
        let guess = FitGuess {
            f3db: Some(5000.0),
            alpha: Some(0.5),
            ..FitGuess::from_start(1.5e-6, 700.0)
        };
        let (res, _) = fit_psd(&freq, &psd, None, 10, &model, &guess).unwrap();
        assert!(res.success);
        assert!((res.params.value("f3dB").unwrap() / 3000.0 - 1.0).abs() < 1e-3);
        assert!((res.params.value("alpha").unwrap() - 0.3).abs() < 1e-3);
    }

    #[test]
    fn fixed_low_pass_without_values_warns_and_stays() {
        let model = gen_model_fun(
            "lorentzian",
            &ModelOptions {
                lp_filter: true,
                lp_fixed: true,
                ..ModelOptions::default()
            },
        )
        .unwrap();
        let (params, diags) = build_params(&model, &FitGuess::default()).unwrap();
        assert_eq!(diags.len(), 2);
        assert_eq!(params.n_varying(), 2);
        assert_eq!(params.value("f3dB").unwrap(), DEFAULT_F3DB);
        assert_eq!(params.value("alpha").unwrap(), DEFAULT_ALPHA);
    }

    #[test]
    fn non_positive_psd_is_rejected() {
        let model = gen_model_fun("lorentzian", &ModelOptions::default()).unwrap();
        let err = fit_psd(&[1.0, 2.0, 3.0], &[1.0, 0.0, 1.0], None, 1, &model, &FitGuess::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
