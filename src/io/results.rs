//! Fit and calibration result writers.
//!
//! - INI results file (`FIT_RESULTS_<AXIS>`, `PASSIVE_CALIBRATION_RESULTS_<AXIS>`,
//!   `ACTIVE_CALIBRATION_RESULTS_<AXIS>`), merged into an existing file
//! - JSON report of the whole run

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::fit::{FitResult, PsdFit};
use crate::io::params::Ini;
use crate::psd::ActiveCalibration;
use crate::report::CalibrationResult;

pub const FIT_SECTION: &str = "FIT_RESULTS";
pub const PC_SECTION: &str = "PASSIVE_CALIBRATION_RESULTS";
pub const AC_SECTION: &str = "ACTIVE_CALIBRATION_RESULTS";

fn section(prefix: &str, axis: &str) -> String {
    format!("{prefix}_{}", axis.to_ascii_uppercase())
}

/// INI document with one section per fitted axis and calibration result.
pub fn results_document(fit: &PsdFit) -> Result<Ini, AppError> {
    let mut ini = Ini::new();
    for (axis, r) in fit.fits() {
        let s = section(FIT_SECTION, axis);
        ini.set(&s, "model", &r.model_name);
        ini.set(&s, "d", r.d.value);
        ini.set(&s, "d_err", r.d.err);
        ini.set(&s, "d_unit", "V**2/s");
        ini.set(&s, "f_c", r.fc.value);
        ini.set(&s, "f_c_err", r.fc.err);
        if let Some(f3db) = r.f3db {
            ini.set(&s, "f_3db", f3db.value);
            ini.set(&s, "f_3db_err", f3db.err);
        }
        if let Some(alpha) = r.alpha {
            ini.set(&s, "alpha", alpha.value);
            ini.set(&s, "alpha_err", alpha.err);
        }
        ini.set(&s, "f_min", r.bounds.0);
        ini.set(&s, "f_max", r.bounds.1);
        ini.set(&s, "freq_unit", "Hz");
        ini.set(&s, "chi2", r.chi2);
        ini.set(&s, "redchi2", r.redchi2);
        ini.set(&s, "nfree", r.nfree);
        ini.set(&s, "conf_level", r.conf_level);
        ini.set(&s, "outlier", r.is_outlier());
    }
    for (prefix, results) in [(PC_SECTION, fit.pc_results()), (AC_SECTION, fit.ac_results())] {
        for (axis, r) in results {
            write_calibration(&mut ini, &section(prefix, axis), r)?;
        }
    }
    Ok(ini)
}

fn write_calibration(ini: &mut Ini, s: &str, r: &CalibrationResult) -> Result<(), AppError> {
    ini.set(s, "beta", r.get_dissens(None)?);
    ini.set(s, "beta_err", r.get_dissens_err(None)?);
    ini.set(s, "beta_unit", "nm/mV");
    ini.set(s, "kappa", r.get_stiffness(None)?);
    ini.set(s, "kappa_err", r.get_stiffness_err(None)?);
    ini.set(s, "kappa_unit", "pN/nm");
    ini.set(s, "drag", r.get_drag(None)?);
    ini.set(s, "drag_err", r.get_drag_err(None)?);
    ini.set(s, "drag_unit", "nN*s/m");
    ini.set(s, "force_factor", r.get_force_factor(None)?);
    ini.set(s, "force_factor_err", r.get_force_factor_err(None)?);
    ini.set(s, "force_factor_unit", "pN/mV");
    if r.excited {
        ini.set(s, "excited", true);
    }
    Ok(())
}

/// Write the results of `fit` to `path`, replacing same-named sections of
/// an existing file and keeping the others.
pub fn write_results(path: &Path, fit: &PsdFit) -> Result<(), AppError> {
    let mut ini = if path.exists() { Ini::read(path)? } else { Ini::new() };
    ini.merge(&results_document(fit)?);
    ini.write(path)?;
    tracing::info!(path = %path.display(), "results written");
    Ok(())
}

/// Machine-readable summary of a run.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub tool: &'static str,
    pub created: String,
    pub source: &'a str,
    pub conf_level: f64,
    pub temperature_k: f64,
    pub radius_m: f64,
    pub active_calibration: Option<&'a ActiveCalibration>,
    pub analytical_fits: BTreeMap<&'a str, FitSummary>,
    pub fits: BTreeMap<&'a str, FitSummary>,
    pub passive_calibration: &'a BTreeMap<String, CalibrationResult>,
    pub active_calibration_results: &'a BTreeMap<String, CalibrationResult>,
}

/// Fit record without the per-point vectors.
#[derive(Debug, Serialize)]
pub struct FitSummary {
    pub name: String,
    pub model: String,
    pub d: f64,
    pub d_err: f64,
    pub fc: f64,
    pub fc_err: f64,
    pub f3db: Option<f64>,
    pub alpha: Option<f64>,
    pub f_min: f64,
    pub f_max: f64,
    pub chi2: f64,
    pub redchi2: f64,
    pub nfree: f64,
    pub outlier: bool,
}

impl From<&FitResult> for FitSummary {
    fn from(r: &FitResult) -> Self {
        Self {
            name: r.name.clone(),
            model: r.model_name.clone(),
            d: r.d.value,
            d_err: r.d.err,
            fc: r.fc.value,
            fc_err: r.fc.err,
            f3db: r.f3db.map(|e| e.value),
            alpha: r.alpha.map(|e| e.value),
            f_min: r.bounds.0,
            f_max: r.bounds.1,
            chi2: r.chi2,
            redchi2: r.redchi2,
            nfree: r.nfree,
            outlier: r.is_outlier(),
        }
    }
}

fn summaries(fits: &BTreeMap<String, FitResult>) -> BTreeMap<&str, FitSummary> {
    fits.iter().map(|(k, r)| (k.as_str(), FitSummary::from(r))).collect()
}

pub fn json_report<'a>(fit: &'a PsdFit, source: &'a str) -> JsonReport<'a> {
    let m = fit.measurement();
    JsonReport {
        tool: "psdfit",
        created: chrono::Local::now().to_rfc3339(),
        source,
        conf_level: fit.conf_level(),
        temperature_k: m.setting().temp(),
        radius_m: m.setting().radius(),
        active_calibration: m.active_calibration(),
        analytical_fits: summaries(fit.analytical_fits()),
        fits: summaries(fit.fits()),
        passive_calibration: fit.pc_results(),
        active_calibration_results: fit.ac_results(),
    }
}

/// Write the JSON report of `fit`.
pub fn write_json_report(path: &Path, fit: &PsdFit, source: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &json_report(fit, source))
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lorentzian_psd;
    use crate::psd::{ExperimentalSetting, Psd, PsdMeasurement};

    fn fitted() -> PsdFit {
        let freq: Vec<f64> = (1..=500).map(|i| i as f64 * 10.0).collect();
        let psd: Vec<f64> = freq.iter().map(|&f| lorentzian_psd(f, 2e-6, 800.0)).collect();
        let mut m = PsdMeasurement::new(ExperimentalSetting::new(298.15, 0.5e-6).unwrap());
        m.add_psd("x", Psd::new("x", freq, psd, None, 100).unwrap());
        let mut fit = PsdFit::new(m, 0.95);
        fit.analytical_lorentzian_fit(None, 10).unwrap();
        fit.fit_psds(None, &Default::default()).unwrap();
        fit
    }

    #[test]
    fn results_document_has_sections_per_axis() {
        let ini = results_document(&fitted()).unwrap();
        let names: Vec<&str> = ini.section_names().collect();
        assert_eq!(names, ["FIT_RESULTS_X", "PASSIVE_CALIBRATION_RESULTS_X"]);
        let fc: f64 = ini.get("FIT_RESULTS_X", "f_c").unwrap().parse().unwrap();
        assert!((fc - 800.0).abs() < 1.0);
        assert_eq!(ini.get("PASSIVE_CALIBRATION_RESULTS_X", "kappa_unit"), Some("pN/nm"));
    }

    #[test]
    fn existing_sections_survive_merge() {
        let dir = std::env::temp_dir().join(format!("psd-fit-results-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("results.txt");
        std::fs::write(&path, "[NOTES]\noperator = ab\n\n[FIT_RESULTS_X]\nstale = 1\n").unwrap();
        write_results(&path, &fitted()).unwrap();
        let ini = Ini::read(&path).unwrap();
        assert_eq!(ini.get("NOTES", "operator"), Some("ab"));
        assert_eq!(ini.get("FIT_RESULTS_X", "stale"), None);
        assert!(ini.get("FIT_RESULTS_X", "d").is_some());
    }

    #[test]
    fn json_report_lists_fits() {
        let fit = fitted();
        let value = serde_json::to_value(json_report(&fit, "mem")).unwrap();
        assert_eq!(value["tool"], "psdfit");
        assert!(value["fits"]["x"]["fc"].as_f64().unwrap() > 790.0);
        assert!(value["passive_calibration"]["x"]["stiffness"].as_f64().unwrap() > 0.0);
    }
}
