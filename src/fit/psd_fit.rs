//! `PsdFit`: fits every axis of a measurement and derives the calibration.
//!
//! Typical flow:
//!
//! 1. [`PsdFit::analytical_lorentzian_fit`] for initial values and windows,
//! 2. [`PsdFit::setup_fit`] to choose model and filter per axis,
//! 3. [`PsdFit::fit_psds`] (or [`PsdFit::collective_psd_fit`]),
//! 4. read [`PsdFit::pc_results`] / [`PsdFit::ac_results`].
//!
//! Per-axis fits are independent once the masks are prepared, so
//! `fit_psds` prepares sequentially and runs the solver in parallel.

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;

use crate::domain::{Diagnostic, ModelKind};
use crate::error::AppError;
use crate::fit::analytical::{DEFAULT_PPD, calc_anal_lsq_opt};
use crate::fit::collective::{CollectiveAxis, axis_params, d_param, fc_param, make_collective_psd_fit};
use crate::fit::fitter::{FitGuess, fit_psd, model_params};
use crate::fit::result::{Estimate, FitResult, MinimizerSummary, NON_ANALYTICAL};
use crate::models::{
    CustomModelFn, DEFAULT_N_ALIAS, HydroParams, ModelOptions, PsdModel, gen_model_fun, lorentzian_psd,
};
use crate::psd::{PsdMeasurement, Selection};
use crate::report::{AxisFit, CalibrationResult, Excitation, ThermalState};
use crate::report::{active_calibration, passive_calibration, transfer_calibration};
use crate::units::{self, Dimension, Unit};

pub const DEFAULT_CONF_LEVEL: f64 = 0.95;

/// Model name of a successful closed-form fit.
pub const ANALYTICAL: &str = "analytical least squares";

/// Fallback values when the closed-form solution is not finite.
const FALLBACK_FC: f64 = 1000.0;
const FALLBACK_D: f64 = 1.0;

/// How one axis is fitted.
#[derive(Clone)]
pub struct FitSetup {
    pub model: ModelKind,
    /// Replaces `model` with a caller-supplied base spectrum `(f, D, f_c)`.
    pub custom: Option<(String, CustomModelFn)>,
    pub lp_filter: bool,
    pub lp_fixed: bool,
    /// Initial (or fixed) low-pass cut-off, Hz.
    pub f3db: Option<f64>,
    pub alpha: Option<f64>,
    pub aliasing: bool,
    /// Sampling rate for aliasing; the PSD's rate when `None`.
    pub f_sample: Option<f64>,
    pub n_alias: usize,
    /// Scale D by `n_avg / (n_avg + 1)` after the fit.
    pub debias: bool,
}

impl Default for FitSetup {
    fn default() -> Self {
        Self {
            model: ModelKind::Lorentzian,
            custom: None,
            lp_filter: false,
            lp_fixed: false,
            f3db: None,
            alpha: None,
            aliasing: false,
            f_sample: None,
            n_alias: DEFAULT_N_ALIAS,
            debias: true,
        }
    }
}

impl fmt::Debug for FitSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitSetup")
            .field("model", &self.model)
            .field("custom", &self.custom.as_ref().map(|(name, _)| name))
            .field("lp_filter", &self.lp_filter)
            .field("lp_fixed", &self.lp_fixed)
            .field("f3db", &self.f3db)
            .field("alpha", &self.alpha)
            .field("aliasing", &self.aliasing)
            .field("f_sample", &self.f_sample)
            .field("n_alias", &self.n_alias)
            .field("debias", &self.debias)
            .finish()
    }
}

/// Frequency selection of a single-axis fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitPsdOptions {
    /// Derive `(fmin, fmax)` from the analytical fit (overrides `bounds`).
    pub dynamic_bounds: bool,
    pub bounds: Option<(f64, f64)>,
    pub f_exclude: Vec<f64>,
    /// Use the setting's height in the hydrodynamic model (∞ otherwise).
    pub use_heights: bool,
}

/// Options of a collective fit. The low-pass filter is always on.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveOptions {
    pub model: ModelKind,
    pub aliasing: bool,
    pub n_alias: usize,
    pub f3db: Option<f64>,
    pub alpha: Option<f64>,
    pub use_heights: bool,
}

impl Default for CollectiveOptions {
    fn default() -> Self {
        Self {
            model: ModelKind::Lorentzian,
            aliasing: false,
            n_alias: DEFAULT_N_ALIAS,
            f3db: None,
            alpha: None,
            use_heights: false,
        }
    }
}

/// Everything a single-axis fit needs once the mask is final.
struct FitJob {
    name: String,
    freq: Vec<f64>,
    psd: Vec<f64>,
    err: Vec<f64>,
    n_avg: u32,
    model: PsdModel,
    guess: FitGuess,
    debias: f64,
}

impl FitJob {
    fn run(&self, conf_level: f64) -> Result<(FitResult, Vec<Diagnostic>), AppError> {
        let (minimizer, mut diagnostics) = fit_psd(&self.freq, &self.psd, Some(&self.err), self.n_avg, &self.model, &self.guess)?;
        let params = &minimizer.params;
        let deb = self.debias;
        let estimate = |name: &str| -> Result<Estimate, AppError> { Ok(Estimate::new(params.value(name)?, params.stderr(name))) };

        let d = estimate("D")?;
        let (f3db, alpha) = if self.model.lp_filter() {
            (Some(estimate("f3dB")?), Some(estimate("alpha")?))
        } else {
            (None, None)
        };
        let eval = self
            .model
            .eval_all(&self.freq, &model_params(params))
            .into_iter()
            .map(|p| p * deb)
            .collect();

        tracing::info!(
            axis = %self.name,
            d = d.value * deb,
            fc = params.value("f_c")?,
            redchi = minimizer.redchi,
            "PSD fit finished"
        );

        let result = FitResult {
            name: self.name.clone(),
            d: Estimate::new(d.value * deb, d.err * deb),
            fc: estimate("f_c")?,
            f3db,
            alpha,
            bounds: freq_range(&self.freq),
            freq: self.freq.clone(),
            eval,
            residual: minimizer.residual.clone(),
            chi2: minimizer.chisqr,
            redchi2: minimizer.redchi,
            nfree: minimizer.nfree as f64,
            conf_level,
            model_name: format!("{} psd fit", self.model.describe()),
            debias_factor: deb,
            params: Some(minimizer.params.clone()),
            minimizer: Some(MinimizerSummary::from(&minimizer)),
            model: Some(self.model.clone()),
        };
        if result.is_poor_fit() {
            diagnostics.push(poor_fit_diagnostic(&result));
        }
        Ok((result, diagnostics))
    }
}

fn poor_fit_diagnostic(result: &FitResult) -> Diagnostic {
    let solver = result
        .minimizer
        .as_ref()
        .map_or_else(String::new, |m| format!(" Solver stopped with {:?}: {}", m.status, m.message));
    Diagnostic::warn(
        result.name.as_str(),
        format!(
            "Reduced chi-square {:.3} is above the {} confidence band (nfree = {:.1}).{solver}",
            result.redchi2, result.conf_level, result.nfree
        ),
    )
}

fn freq_range(freq: &[f64]) -> (f64, f64) {
    let lo = freq.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = freq.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo, hi)
}

fn debias_factor(n_avg: u32) -> f64 {
    let n = f64::from(n_avg);
    n / (n + 1.0)
}

#[derive(Debug, Clone)]
pub struct PsdFit {
    measurement: PsdMeasurement,
    anal_fits: BTreeMap<String, FitResult>,
    fits: BTreeMap<String, FitResult>,
    setups: BTreeMap<String, FitSetup>,
    pc_results: BTreeMap<String, CalibrationResult>,
    ac_results: BTreeMap<String, CalibrationResult>,
    conf_level: f64,
    diagnostics: Vec<Diagnostic>,
}

impl PsdFit {
    pub fn new(measurement: PsdMeasurement, conf_level: f64) -> Self {
        Self {
            measurement,
            anal_fits: BTreeMap::new(),
            fits: BTreeMap::new(),
            setups: BTreeMap::new(),
            pc_results: BTreeMap::new(),
            ac_results: BTreeMap::new(),
            conf_level,
            diagnostics: Vec::new(),
        }
    }

    pub fn measurement(&self) -> &PsdMeasurement {
        &self.measurement
    }

    pub fn measurement_mut(&mut self) -> &mut PsdMeasurement {
        &mut self.measurement
    }

    pub fn names(&self) -> Vec<String> {
        self.measurement.names()
    }

    pub fn conf_level(&self) -> f64 {
        self.conf_level
    }

    pub fn analytical_fit(&self, name: &str) -> Option<&FitResult> {
        self.anal_fits.get(name)
    }

    pub fn analytical_fits(&self) -> &BTreeMap<String, FitResult> {
        &self.anal_fits
    }

    pub fn fit(&self, name: &str) -> Option<&FitResult> {
        self.fits.get(name)
    }

    pub fn fits(&self) -> &BTreeMap<String, FitResult> {
        &self.fits
    }

    pub fn setup(&self, name: &str) -> Option<&FitSetup> {
        self.setups.get(name)
    }

    pub fn pc_results(&self) -> &BTreeMap<String, CalibrationResult> {
        &self.pc_results
    }

    pub fn ac_results(&self) -> &BTreeMap<String, CalibrationResult> {
        &self.ac_results
    }

    /// Warnings collected by all operations so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Fit of the excited axis, if active calibration is set and it was fitted.
    pub fn excited_fit(&self) -> Option<&FitResult> {
        self.fits.get(self.measurement.get_ex_axis()?)
    }

    fn resolve_names(&self, names: Option<&[String]>) -> Result<Vec<String>, AppError> {
        match names {
            None => Ok(self.names()),
            Some(names) => {
                for name in names {
                    if !self.measurement.contains(name) {
                        return Err(AppError::input(format!("No PSD named '{name}'.")));
                    }
                }
                Ok(names.to_vec())
            }
        }
    }

    fn is_excited(&self, name: &str) -> bool {
        self.measurement.get_ex_axis() == Some(name)
    }

    /// Mask the excitation peak on the excited axis.
    fn exclude_excitation(&mut self, name: &str) -> Result<(), AppError> {
        if self.is_excited(name) {
            let f_ex = self.measurement.get_ex_freq(Some(Unit::HZ))?;
            let names = [name.to_string()];
            let diagnostics = self.measurement.exclude_freq(&[f_ex], Some(&names))?;
            self.diagnostics.extend(diagnostics);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Analytical fit
    // ---------------------------------------------------------------------

    /// Closed-form Lorentzian fit in the best window of each axis.
    ///
    /// A non-finite solution is replaced by `f_c = 1000 Hz`, `D = 1 V²/s`,
    /// `chi2 = 0` over the full range and marked [`NON_ANALYTICAL`].
    pub fn analytical_lorentzian_fit(&mut self, names: Option<&[String]>, ppd: usize) -> Result<(), AppError> {
        for name in self.resolve_names(names)? {
            self.exclude_excitation(&name)?;

            let psd = self.measurement.psd(&name)?;
            let deb = debias_factor(psd.n_avg());
            let freq = psd.get_freq(None, Selection::default())?;
            let values = psd.get_psd(None, Selection::default())?;

            let search = calc_anal_lsq_opt(&freq, &values, ppd)?;
            let (fc, d, chi2, bounds, model) = if search.fit.is_finite() {
                let model = gen_model_fun(ModelKind::Lorentzian.display_name(), &ModelOptions::default())?;
                (search.fit.fc, search.fit.d, search.fit.chi2, search.bounds, Some(model))
            } else {
                self.diagnostics.push(Diagnostic::warn(
                    name.as_str(),
                    format!(
                        "Analytical fit did not succeed. Using f_c = {FALLBACK_FC} Hz, D = {FALLBACK_D} V**2/s, chi2 = 0."
                    ),
                ));
                (FALLBACK_FC, FALLBACK_D, 0.0, freq_range(&freq), None)
            };

            let (freq_keep, _): (Vec<f64>, Vec<f64>) = freq
                .iter()
                .zip(&values)
                .filter(|(f, _)| **f >= bounds.0 && **f <= bounds.1)
                .map(|(f, p)| (*f, *p))
                .unzip();
            let nfree = freq_keep.len() as f64 - 2.0;
            let eval = freq_keep
                .iter()
                .map(|&f| lorentzian_psd(f, d * deb, fc))
                .collect();

            tracing::debug!(axis = %name, fc, d = d * deb, fmin = bounds.0, fmax = bounds.1, "analytical fit");

            let model_name = if model.is_some() { ANALYTICAL } else { NON_ANALYTICAL };
            self.anal_fits.insert(
                name.clone(),
                FitResult {
                    name: name.clone(),
                    d: Estimate::new(d * deb, f64::NAN),
                    fc: Estimate::new(fc, f64::NAN),
                    f3db: None,
                    alpha: None,
                    bounds,
                    freq: freq_keep,
                    eval,
                    residual: Vec::new(),
                    chi2,
                    redchi2: chi2 / nfree,
                    nfree,
                    conf_level: self.conf_level,
                    model_name: model_name.to_string(),
                    debias_factor: deb,
                    params: None,
                    minimizer: None,
                    model,
                },
            );
        }
        Ok(())
    }

    fn ensure_analytical(&mut self, name: &str) -> Result<(), AppError> {
        if !self.anal_fits.contains_key(name) {
            self.analytical_lorentzian_fit(Some(&[name.to_string()]), DEFAULT_PPD)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Iterative fits
    // ---------------------------------------------------------------------

    /// Store the fit setup of the named axes (all when `None`).
    pub fn setup_fit(&mut self, names: Option<&[String]>, setup: FitSetup) -> Result<(), AppError> {
        for name in self.resolve_names(names)? {
            self.setups.insert(name, setup.clone());
        }
        Ok(())
    }

    fn prepare_fit(&mut self, name: &str, options: &FitPsdOptions) -> Result<FitJob, AppError> {
        if options.bounds.is_some() || !options.f_exclude.is_empty() {
            self.measurement.psd_mut(name)?.reset_mask();
        }

        let bounds = if options.dynamic_bounds {
            self.ensure_analytical(name)?;
            let anal = &self.anal_fits[name];
            let fc = anal.fc.value;
            let opt_fmin = anal.bounds.0;
            let fmin = if opt_fmin < fc / 10.0 { opt_fmin } else { fc / 10.0 };
            Some((fmin, 10.0 * fc))
        } else {
            options.bounds
        };
        let names = [name.to_string()];
        if let Some((fmin, fmax)) = bounds {
            self.measurement.exclude_freq_outside(fmin, fmax, Some(&names), false)?;
        }
        if !options.f_exclude.is_empty() {
            let diagnostics = self.measurement.exclude_freq(&options.f_exclude, Some(&names))?;
            self.diagnostics.extend(diagnostics);
        }
        self.exclude_excitation(name)?;

        if !self.setups.contains_key(name) {
            self.diagnostics.push(Diagnostic::warn(name, "Fit was not set up. Using default settings."));
            self.setups.insert(name.to_string(), FitSetup::default());
        }
        self.ensure_analytical(name)?;

        let setup = &self.setups[name];
        let anal = &self.anal_fits[name];
        let psd = self.measurement.psd(name)?;

        let model_options = ModelOptions {
            lp_filter: setup.lp_filter,
            lp_fixed: setup.lp_fixed,
            aliasing: setup.aliasing,
            f_sample: Some(setup.f_sample.unwrap_or_else(|| psd.f_sample())),
            n_alias: Some(setup.n_alias),
            hydro: Some(HydroParams::from_setting(
                self.measurement.setting(),
                psd.direction(),
                options.use_heights,
            )),
        };
        let model = match &setup.custom {
            Some((custom_name, fun)) => PsdModel::custom(custom_name.clone(), fun.clone(), &model_options)?,
            None => gen_model_fun(setup.model.display_name(), &model_options)?,
        };
        let guess = FitGuess {
            f3db: setup.f3db,
            alpha: setup.alpha,
            ..FitGuess::from_start(anal.d.value, anal.fc.value)
        };

        Ok(FitJob {
            name: name.to_string(),
            freq: psd.get_freq(None, Selection::default())?,
            psd: psd.get_psd(None, Selection::default())?,
            err: psd.get_err(None, Selection::default())?,
            n_avg: psd.n_avg(),
            model,
            guess,
            debias: if setup.debias { debias_factor(psd.n_avg()) } else { 1.0 },
        })
    }

    /// Fit one axis with its setup (defaults plus a warning if none).
    ///
    /// Explicit bounds or exclusions reset the axis mask first. The initial
    /// D and f_c come from the analytical fit, which is run when missing.
    pub fn fit_psd(&mut self, name: &str, options: &FitPsdOptions) -> Result<(), AppError> {
        let job = self.prepare_fit(name, options)?;
        let (result, diagnostics) = job.run(self.conf_level)?;
        self.diagnostics.extend(diagnostics);
        self.fits.insert(job.name, result);
        Ok(())
    }

    /// Fit the named axes (all when `None`) and compute the calibration.
    ///
    /// Passive results are computed for every fitted axis; active results
    /// once all axes are fitted and an excitation is set. A failing active
    /// calibration is reported as a diagnostic.
    pub fn fit_psds(&mut self, names: Option<&[String]>, options: &FitPsdOptions) -> Result<(), AppError> {
        let names = self.resolve_names(names)?;
        let mut jobs = Vec::with_capacity(names.len());
        for name in &names {
            jobs.push(self.prepare_fit(name, options)?);
        }

        let conf_level = self.conf_level;
        let outcomes: Vec<_> = jobs.par_iter().map(|job| job.run(conf_level)).collect();
        for (job, outcome) in jobs.into_iter().zip(outcomes) {
            let (result, diagnostics) = outcome?;
            self.diagnostics.extend(diagnostics);
            self.fits.insert(job.name, result);
        }

        self.calc_pc_results(Some(&names))?;
        self.calc_ac_results_if_complete();
        Ok(())
    }

    /// Active calibration once every axis is fitted; a failure becomes a
    /// diagnostic.
    pub fn calc_ac_results_if_complete(&mut self) {
        let complete = self.names().iter().all(|n| self.fits.contains_key(n));
        if self.measurement.is_active_calibration() && complete {
            if let Err(err) = self.calc_ac_results() {
                let axis = self.measurement.get_ex_axis().unwrap_or("ac").to_string();
                self.diagnostics.push(Diagnostic::warn(
                    axis,
                    format!("Active calibration failed: {}", err.message()),
                ));
            }
        }
    }

    /// Fit the named axes at once with a shared low-pass filter.
    ///
    /// Per-axis results are stored as `"<name> (cltv)"` with `nfree = n − 2 −
    /// 2n/N_total`.
    pub fn collective_psd_fit(&mut self, names: Option<&[String]>, options: &CollectiveOptions) -> Result<(), AppError> {
        let names = self.resolve_names(names)?;
        for name in &names {
            self.exclude_excitation(name)?;
            self.ensure_analytical(name)?;
        }

        let rates: Vec<f64> = names
            .iter()
            .map(|n| self.measurement.psd(n).map(|p| p.f_sample()))
            .collect::<Result<_, _>>()?;
        let f_sample = rates.first().copied();
        if rates.iter().any(|r| Some(*r) != f_sample) {
            self.diagnostics.push(Diagnostic::warn(
                "collective",
                "PSDs have different sampling rates; aliasing uses the rate of the first axis.",
            ));
        }

        let mut axes = BTreeMap::new();
        for name in &names {
            let psd = self.measurement.psd(name)?;
            let model_options = ModelOptions {
                lp_filter: true,
                lp_fixed: false,
                aliasing: options.aliasing,
                f_sample,
                n_alias: Some(options.n_alias),
                hydro: Some(HydroParams::from_setting(
                    self.measurement.setting(),
                    psd.direction(),
                    options.use_heights,
                )),
            };
            let anal = &self.anal_fits[name];
            axes.insert(
                name.clone(),
                CollectiveAxis {
                    freq: psd.get_freq(None, Selection::default())?,
                    psd: psd.get_psd(None, Selection::default())?,
                    err: psd.get_err(None, Selection::default())?,
                    model: gen_model_fun(options.model.display_name(), &model_options)?,
                    guess: (anal.d.value, anal.fc.value),
                },
            );
        }

        let fit = make_collective_psd_fit(&axes, options.f3db, options.alpha)?;
        let params = &fit.minimizer.params;
        let ntotal = fit.minimizer.residual.len() as f64;
        let shared = |key: &str| -> Result<Estimate, AppError> { Ok(Estimate::new(params.value(key)?, params.stderr(key))) };
        let f3db = shared("f3dB")?;
        let alpha = shared("alpha")?;

        for (name, axis) in &axes {
            let span = fit.spans[name].clone();
            let residual = fit.minimizer.residual[span].to_vec();
            let chi2: f64 = residual.iter().map(|r| r * r).sum();
            let n = axis.freq.len() as f64;
            let nfree = n - 2.0 - 2.0 * n / ntotal;
            let eval = axis.model.eval_all(&axis.freq, &axis_params(params, name));
            let (d_key, fc_key) = (d_param(name), fc_param(name));

            self.fits.insert(
                name.clone(),
                FitResult {
                    name: format!("{name} (cltv)"),
                    d: Estimate::new(params.value(&d_key)?, params.stderr(&d_key)),
                    fc: Estimate::new(params.value(&fc_key)?, params.stderr(&fc_key)),
                    f3db: Some(f3db),
                    alpha: Some(alpha),
                    bounds: freq_range(&axis.freq),
                    freq: axis.freq.clone(),
                    eval,
                    residual,
                    chi2,
                    redchi2: chi2 / nfree,
                    nfree,
                    conf_level: self.conf_level,
                    model_name: format!("collective lp-filtered {} psd fit", options.model.display_name()),
                    debias_factor: 1.0,
                    params: Some(params.clone()),
                    minimizer: Some(MinimizerSummary::from(&fit.minimizer)),
                    model: Some(axis.model.clone()),
                },
            );
            if self.fits[name].is_poor_fit() {
                let diagnostic = poor_fit_diagnostic(&self.fits[name]);
                self.diagnostics.push(diagnostic);
            }
        }
        tracing::info!(axes = names.len(), f3db = f3db.value, alpha = alpha.value, "collective fit finished");
        Ok(())
    }

    /// Outlier flag of each named fit.
    pub fn is_outlier(&self, names: Option<&[String]>) -> Result<BTreeMap<String, bool>, AppError> {
        self.resolve_names(names)?
            .into_iter()
            .map(|name| {
                let fit = self.require_fit(&name)?;
                Ok((name, fit.is_outlier()))
            })
            .collect()
    }

    fn require_fit(&self, name: &str) -> Result<&FitResult, AppError> {
        self.fits
            .get(name)
            .ok_or_else(|| AppError::input(format!("Fit for '{name}' not present. Try to fit the PSD first.")))
    }

    // ---------------------------------------------------------------------
    // Calibration
    // ---------------------------------------------------------------------

    /// Thermal background under the excitation peak and its error.
    ///
    /// Uses the model of the excited-axis fit at `f_ex`, times the frequency
    /// resolution. The error `bp/sqrt(n_avg)` is an upper estimate.
    pub fn get_basepower(&self, unit: Option<Unit>) -> Result<(f64, f64), AppError> {
        let ex_axis = self
            .measurement
            .get_ex_axis()
            .ok_or_else(|| AppError::input("No active calibration parameters set."))?;
        let fit = self.require_fit(ex_axis)?;
        let model = fit
            .model
            .as_ref()
            .ok_or_else(|| AppError::input(format!("Fit of '{ex_axis}' carries no model.")))?;
        let f_ex = self.measurement.get_ex_freq(Some(Unit::HZ))?;
        let psd = self.measurement.psd(ex_axis)?;

        let bp = model.eval(f_ex, &fit.model_params()) * psd.df();
        let bp_err = bp / f64::from(psd.n_avg()).sqrt();
        Ok((
            units::express(bp, Dimension::SignalPower, unit)?,
            units::express(bp_err, Dimension::SignalPower, unit)?,
        ))
    }

    fn thermal_state(&self) -> Result<ThermalState, AppError> {
        let setting = self.measurement.setting();
        Ok(ThermalState {
            temp: setting.temp(),
            temp_err: setting.temp_err(),
            drag: self.measurement.get_stokes_drag(None)?,
            drag_err: self.measurement.get_stokes_drag_err(None)?,
        })
    }

    fn axis_fit(&self, name: &str) -> Result<AxisFit, AppError> {
        let fit = self.require_fit(name)?;
        Ok(AxisFit {
            d: fit.d.value,
            d_err: fit.d.err,
            fc: fit.fc.value,
            fc_err: fit.fc.err,
        })
    }

    /// Passive calibration from the Stokes drag of the setting.
    pub fn calc_pc_results(&mut self, names: Option<&[String]>) -> Result<(), AppError> {
        let state = self.thermal_state()?;
        tracing::debug!(temp = state.temp, drag = state.drag, "passive calibration");
        for name in self.resolve_names(names)? {
            let result = passive_calibration(&state, &self.axis_fit(&name)?);
            self.pc_results.insert(name, result);
        }
        Ok(())
    }

    /// Active calibration from the excitation of one axis, carried over to
    /// the others. Every axis must be fitted.
    pub fn calc_ac_results(&mut self) -> Result<(), AppError> {
        let names = self.names();
        for name in &names {
            self.require_fit(name)?;
        }
        let ac = self
            .measurement
            .active_calibration()
            .ok_or_else(|| AppError::input("No active calibration parameters set."))?
            .clone();

        if !self.measurement.psd(&ac.axis)?.is_lateral() {
            self.diagnostics.push(Diagnostic::warn(
                ac.axis.as_str(),
                "Axial excitation changes the drag with height and amplitude, which is not accounted for. \
                 Excite in a lateral direction to avoid large errors.",
            ));
        }

        let (base_power, base_power_err) = self.get_basepower(None)?;
        let excitation = Excitation {
            frequency: ac.frequency,
            amplitude: ac.amplitude,
            amplitude_err: ac.amplitude_err,
            power: ac.power,
            power_err: ac.power_err,
            base_power,
            base_power_err,
        };
        let setting = self.measurement.setting();
        let excited_fit = self.axis_fit(&ac.axis)?;
        let (excited, _) = active_calibration(setting.temp(), setting.temp_err(), &excitation, &excited_fit)?;
        tracing::debug!(axis = %ac.axis, beta = excited.dissens, gamma = excited.drag, "active calibration");

        self.ac_results.insert(ac.axis.clone(), excited);
        for name in names.iter().filter(|n| **n != ac.axis) {
            let result = transfer_calibration(&excited, &excited_fit, &self.axis_fit(name)?);
            self.ac_results.insert(name.clone(), result);
        }
        Ok(())
    }
}
