//! The record of one fit.

use serde::Serialize;

use crate::math::{LmStatus, MinimizerResult, Parameters, is_outlier, is_poor_fit};
use crate::models::{ModelParams, PsdModel};

/// Value and standard error of a fitted quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub value: f64,
    pub err: f64,
}

impl Estimate {
    pub fn new(value: f64, err: f64) -> Self {
        Self { value, err }
    }
}

/// Result of one analytical or iterative fit of one axis.
///
/// Produced once by a fit call and only handed out by reference afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    /// Axis name (`"<name> (cltv)"` for collective fits).
    pub name: String,
    /// Diffusion constant in V²/s (de-biased when `debias_factor < 1`).
    pub d: Estimate,
    /// Corner frequency in Hz.
    pub fc: Estimate,
    pub f3db: Option<Estimate>,
    pub alpha: Option<Estimate>,
    /// Frequency range the fit used.
    pub bounds: (f64, f64),
    /// Frequencies of the fitted points.
    pub freq: Vec<f64>,
    /// Model curve at `freq`.
    pub eval: Vec<f64>,
    pub residual: Vec<f64>,
    pub chi2: f64,
    pub redchi2: f64,
    /// Degrees of freedom; fractional for collective fits.
    pub nfree: f64,
    pub conf_level: f64,
    /// e.g. `"lp-filtered lorentzian psd fit"`, or `"non-analytical"` when the
    /// closed-form solution failed.
    pub model_name: String,
    /// `n_avg / (n_avg + 1)` when de-biased, else 1.
    pub debias_factor: f64,
    pub params: Option<Parameters>,
    pub minimizer: Option<MinimizerSummary>,
    #[serde(skip)]
    pub model: Option<PsdModel>,
}

/// Solver bookkeeping kept with an iterative fit.
#[derive(Debug, Clone, Serialize)]
pub struct MinimizerSummary {
    pub success: bool,
    pub status: LmStatus,
    pub message: String,
    pub nfev: usize,
    pub ndata: usize,
    pub nvarys: usize,
}

impl From<&MinimizerResult> for MinimizerSummary {
    fn from(r: &MinimizerResult) -> Self {
        Self {
            success: r.success,
            status: r.status,
            message: r.message.clone(),
            nfev: r.nfev,
            ndata: r.ndata,
            nvarys: r.nvarys,
        }
    }
}

impl FitResult {
    pub fn is_outlier(&self) -> bool {
        is_outlier(self.redchi2, self.nfree, self.conf_level)
    }

    /// Reduced chi-square above the confidence band.
    pub fn is_poor_fit(&self) -> bool {
        is_poor_fit(self.redchi2, self.nfree, self.conf_level)
    }

    /// The closed-form solution failed and defaults were substituted.
    pub fn is_analytical_fallback(&self) -> bool {
        self.model.is_none() && self.model_name == NON_ANALYTICAL
    }

    /// Parameters the curve was evaluated with (D not de-biased).
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            d: self.d.value / self.debias_factor,
            fc: self.fc.value,
            f3db: self.f3db.map_or(f64::NAN, |e| e.value),
            alpha: self.alpha.map_or(f64::NAN, |e| e.value),
        }
    }

    /// Re-evaluate the fitted (de-biased) model at arbitrary frequencies.
    ///
    /// `None` when the result carries no model, e.g. the closed-form fallback.
    pub fn eval_at(&self, freq: &[f64]) -> Option<Vec<f64>> {
        let model = self.model.as_ref()?;
        let p = self.model_params();
        Some(freq.iter().map(|&f| model.eval(f, &p) * self.debias_factor).collect())
    }
}

/// Model name of an analytical fit whose closed-form solution failed.
pub const NON_ANALYTICAL: &str = "non-analytical";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelOptions, gen_model_fun, lorentzian_psd};

    fn result(redchi2: f64, nfree: f64) -> FitResult {
        FitResult {
            name: "x".into(),
            d: Estimate::new(1.0, 0.1),
            fc: Estimate::new(500.0, 5.0),
            f3db: None,
            alpha: None,
            bounds: (1.0, 10.0),
            freq: vec![],
            eval: vec![],
            residual: vec![],
            chi2: redchi2 * nfree,
            redchi2,
            nfree,
            conf_level: 0.95,
            model_name: "lorentzian psd fit".into(),
            debias_factor: 0.5,
            params: None,
            minimizer: None,
            model: None,
        }
    }

    #[test]
    fn outlier_follows_redchi() {
        assert!(!result(1.0, 100.0).is_outlier());
        assert!(result(10.0, 100.0).is_outlier());
        assert!(result(1.0, 0.0).is_outlier());
    }

    #[test]
    fn eval_at_applies_debias() {
        let mut r = result(1.0, 100.0);
        assert!(r.eval_at(&[1.0]).is_none());
        r.model = Some(gen_model_fun("lorentzian", &ModelOptions::default()).unwrap());
        let curve = r.eval_at(&[100.0]).unwrap();
        let expected = lorentzian_psd(100.0, 2.0, 500.0) * 0.5;
        assert!((curve[0] - expected).abs() < 1e-15);
    }
}
