//! Plain-text tables for the terminal.
//!
//! Values are printed in the units experimenters read off a calibration
//! sheet (nm/mV, pN/nm); rows are right-trimmed so output diffs cleanly.

use std::collections::BTreeMap;

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::fit::{FitResult, PsdFit};
use crate::report::CalibrationResult;
use crate::units::TemperatureUnit;

/// Header block: setting and the axes of the measurement.
pub fn format_run_summary(fit: &PsdFit, source: &str) -> String {
    let m = fit.measurement();
    let s = m.setting();
    let mut out = String::new();

    out.push_str("=== psdfit - PSD calibration ===\n");
    out.push_str(&format!("Data: {source}\n"));
    out.push_str(&format!(
        "Setting: T={:.2} degC (+/- {:.2}) | radius={:.3} um | height={} | material={}\n",
        s.get_temp(TemperatureUnit::Celsius),
        s.temp_err(),
        s.radius() * 1e6,
        fmt_height(s.height()),
        s.material().name,
    ));
    out.push_str(&format!(
        "Medium: {} | density={:.2} kg/m**3 | viscosity={:.4e} Pa*s\n",
        s.medium().name(),
        s.density_medium(),
        s.viscosity(),
    ));
    for (name, psd) in m.psds() {
        out.push_str(&format!(
            "Axis {name:<4} n={:<6} n_avg={:<6} f_sample={:.1} Hz | {} (masked {})\n",
            psd.len(),
            psd.n_avg(),
            psd.f_sample(),
            psd.direction().display_name(),
            psd.len() - psd.n_unmasked(),
        ));
    }
    if let Some(ac) = m.active_calibration() {
        out.push_str(&format!(
            "Excitation: axis={} f={:.3} Hz | A={:.3} nm | P={:.4e} V**2\n",
            ac.axis,
            ac.frequency,
            ac.amplitude * 1e9,
            ac.power,
        ));
    }
    out.push('\n');
    out
}

/// Table of fitted parameters, one row per axis.
pub fn format_fit_table(title: &str, fits: &BTreeMap<String, FitResult>) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push_str(":\n");
    push_row(
        &mut out,
        format!(
            "{:<12} {:>11} {:>10} {:>10} {:>9} {:>20} {:>8} {:>8} {:<8} {}",
            "axis", "D [V^2/s]", "+/-", "f_c [Hz]", "+/-", "range [Hz]", "chi2_red", "n_free", "outlier", "model"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<12} {:-<11} {:-<10} {:-<10} {:-<9} {:-<20} {:-<8} {:-<8} {:-<8} {:-<5}",
            "", "", "", "", "", "", "", "", "", ""
        ),
    );
    for fit in fits.values() {
        push_row(
            &mut out,
            format!(
                "{:<12} {:>11} {:>10} {:>10.2} {:>9} {:>20} {:>8.3} {:>8.1} {:<8} {}",
                truncate(&fit.name, 12),
                fmt_sci(fit.d.value),
                fmt_sci(fit.d.err),
                fit.fc.value,
                fmt_err(fit.fc.err),
                format!("{:.1}..{:.1}", fit.bounds.0, fit.bounds.1),
                fit.redchi2,
                fit.nfree,
                if fit.is_outlier() { "yes" } else { "no" },
                fit.model_name,
            ),
        );
        if let (Some(f3db), Some(alpha)) = (fit.f3db, fit.alpha) {
            push_row(
                &mut out,
                format!(
                    "{:<12} f3dB={:.1} (+/- {}) Hz alpha={:.4} (+/- {})",
                    "",
                    f3db.value,
                    fmt_err(f3db.err),
                    alpha.value,
                    fmt_err(alpha.err)
                ),
            );
        }
    }
    out
}

/// Calibration table in nm/mV, pN/nm, nN·s/m and pN/mV.
pub fn format_calibration_table(
    title: &str,
    results: &BTreeMap<String, CalibrationResult>,
) -> Result<String, AppError> {
    let mut out = String::new();
    out.push_str(title);
    out.push_str(":\n");
    push_row(
        &mut out,
        format!(
            "{:<6} {:>22} {:>22} {:>22} {:>22} {}",
            "axis", "beta [nm/mV]", "kappa [pN/nm]", "gamma [nN*s/m]", "force [pN/mV]", ""
        ),
    );
    push_row(
        &mut out,
        format!("{:-<6} {:-<22} {:-<22} {:-<22} {:-<22}", "", "", "", "", ""),
    );
    for (name, r) in results {
        push_row(
            &mut out,
            format!(
                "{:<6} {:>22} {:>22} {:>22} {:>22} {}",
                truncate(name, 6),
                pm(r.get_dissens(None)?, r.get_dissens_err(None)?),
                pm(r.get_stiffness(None)?, r.get_stiffness_err(None)?),
                pm(r.get_drag(None)?, r.get_drag_err(None)?),
                pm(r.get_force_factor(None)?, r.get_force_factor_err(None)?),
                if r.excited { "(excited)" } else { "" },
            ),
        );
    }
    Ok(out)
}

pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    if diagnostics.is_empty() {
        return out;
    }
    out.push_str("Warnings:\n");
    for d in diagnostics {
        out.push_str(&format!("- {d}\n"));
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn pm(value: f64, err: f64) -> String {
    format!("{value:.4} +/- {}", fmt_err(err))
}

fn fmt_sci(v: f64) -> String {
    if v.is_nan() { "-".to_string() } else { format!("{v:.4e}") }
}

fn fmt_err(v: f64) -> String {
    if v.is_nan() {
        "-".to_string()
    } else if v != 0.0 && v.abs() < 1e-3 {
        format!("{v:.2e}")
    } else {
        format!("{v:.4}")
    }
}

fn fmt_height(h: f64) -> String {
    if h.is_infinite() { "inf".to_string() } else { format!("{:.3} um", h * 1e6) }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
