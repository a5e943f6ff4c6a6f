//! Calibration factors of one axis and the formulas that produce them.

use serde::Serialize;

use crate::error::AppError;
use crate::physics::BOLTZMANN;
use crate::units::{self, Dimension, Unit};

/// Displacement sensitivity, trap stiffness and drag of one axis (SI).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationResult {
    /// m/V
    pub dissens: f64,
    pub dissens_err: f64,
    /// N/m
    pub stiffness: f64,
    pub stiffness_err: f64,
    /// N·s/m
    pub drag: f64,
    pub drag_err: f64,
    /// The axis was the excited one of an active calibration.
    pub excited: bool,
}

fn or_default(unit: Option<Unit>, default: Unit) -> Option<Unit> {
    Some(unit.unwrap_or(default))
}

impl CalibrationResult {
    /// Displacement sensitivity, nm/mV unless `unit` is given.
    pub fn get_dissens(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.dissens, Dimension::Sensitivity, or_default(unit, Unit::NM_PER_MV))
    }

    pub fn get_dissens_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.dissens_err, Dimension::Sensitivity, or_default(unit, Unit::NM_PER_MV))
    }

    /// Trap stiffness, pN/nm unless `unit` is given.
    pub fn get_stiffness(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.stiffness, Dimension::Stiffness, or_default(unit, Unit::PN_PER_NM))
    }

    pub fn get_stiffness_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.stiffness_err, Dimension::Stiffness, or_default(unit, Unit::PN_PER_NM))
    }

    /// Drag, nN·s/m unless `unit` is given.
    pub fn get_drag(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.drag, Dimension::Drag, or_default(unit, Unit::NN_S_PER_M))
    }

    pub fn get_drag_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.drag_err, Dimension::Drag, or_default(unit, Unit::NN_S_PER_M))
    }

    /// Force per detector volt, `β·κ`; pN/mV unless `unit` is given.
    pub fn get_force_factor(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.dissens * self.stiffness, Dimension::ForceFactor, or_default(unit, Unit::PN_PER_MV))
    }

    pub fn get_force_factor_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        let ff = self.dissens * self.stiffness;
        let err = (self.dissens_err / self.dissens + self.stiffness_err / self.stiffness) * ff;
        units::express(err, Dimension::ForceFactor, or_default(unit, Unit::PN_PER_MV))
    }
}

/// Fitted quantities of one axis entering the calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisFit {
    /// V²/s
    pub d: f64,
    pub d_err: f64,
    /// Hz
    pub fc: f64,
    pub fc_err: f64,
}

/// Temperature and bead drag of the measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalState {
    /// K
    pub temp: f64,
    pub temp_err: f64,
    /// N·s/m
    pub drag: f64,
    pub drag_err: f64,
}

/// Passive calibration: Stokes drag and the Einstein relation.
pub fn passive_calibration(state: &ThermalState, fit: &AxisFit) -> CalibrationResult {
    let d0 = BOLTZMANN * state.temp / state.drag;
    let d0_err = (state.temp_err / state.temp + state.drag_err / state.drag) * d0;

    let beta = (d0 / fit.d).sqrt();
    let beta_err = (0.5 * d0_err / d0 + fit.d_err / fit.d) * beta;

    let kappa = 2.0 * std::f64::consts::PI * fit.fc * state.drag;
    let kappa_err = (fit.fc_err / fit.fc + state.drag_err / state.drag) * kappa;

    CalibrationResult {
        dissens: beta,
        dissens_err: beta_err,
        stiffness: kappa,
        stiffness_err: kappa_err,
        drag: state.drag,
        drag_err: state.drag_err,
        excited: false,
    }
}

/// Sinusoidal excitation as seen in the excited-axis spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Excitation {
    /// Hz
    pub frequency: f64,
    /// m
    pub amplitude: f64,
    pub amplitude_err: f64,
    /// Measured power of the spike, V².
    pub power: f64,
    pub power_err: f64,
    /// Thermal background under the spike, V².
    pub base_power: f64,
    pub base_power_err: f64,
}

/// Active calibration of the excited axis.
///
/// Returns the result and the calibrated drag `(γ, Δγ)` used for the other
/// axes. Fails when the excitation power does not exceed the thermal
/// background.
pub fn active_calibration(
    temp: f64,
    temp_err: f64,
    ex: &Excitation,
    fit: &AxisFit,
) -> Result<(CalibrationResult, (f64, f64)), AppError> {
    let w_th = ex.amplitude.powi(2) / (2.0 * (1.0 + (fit.fc / ex.frequency).powi(2)));
    let w_th_err = 2.0 * (ex.amplitude_err / ex.amplitude + fit.fc_err / fit.fc) * w_th;

    let w_exp = ex.power - ex.base_power;
    let w_exp_err = ex.power_err + ex.base_power_err;
    if !(w_exp > 0.0) {
        return Err(AppError::numerical(format!(
            "Excitation power {:.3e} V**2 does not exceed the thermal background {:.3e} V**2.",
            ex.power, ex.base_power
        )));
    }

    let beta = (w_th / w_exp).sqrt();
    let beta_err = 0.5 * (w_th_err / w_th + w_exp_err / w_exp) * beta;

    let gamma = BOLTZMANN * temp / (beta.powi(2) * fit.d);
    let gamma_err = (temp_err / temp + 2.0 * beta_err / beta + fit.d_err / fit.d) * gamma;

    let kappa = 2.0 * std::f64::consts::PI * fit.fc * gamma;
    let kappa_err = (fit.fc_err / fit.fc + gamma_err / gamma) * kappa;

    Ok((
        CalibrationResult {
            dissens: beta,
            dissens_err: beta_err,
            stiffness: kappa,
            stiffness_err: kappa_err,
            drag: gamma,
            drag_err: gamma_err,
            excited: true,
        },
        (gamma, gamma_err),
    ))
}

/// Carry an active calibration over to an axis that was not excited.
pub fn transfer_calibration(excited: &CalibrationResult, excited_fit: &AxisFit, fit: &AxisFit) -> CalibrationResult {
    let (beta_ac, dbeta_ac) = (excited.dissens, excited.dissens_err);
    let (gamma, dgamma) = (excited.drag, excited.drag_err);

    let beta = beta_ac * (excited_fit.d / fit.d).sqrt();
    let beta_err = (dbeta_ac / beta_ac + 0.5 * (excited_fit.d_err / excited_fit.d + fit.d_err / fit.d)) * beta;

    let kappa = 2.0 * std::f64::consts::PI * fit.fc * gamma;
    let kappa_err = (fit.fc_err / fit.fc + dgamma / gamma) * kappa;

    CalibrationResult {
        dissens: beta,
        dissens_err: beta_err,
        stiffness: kappa,
        stiffness_err: kappa_err,
        drag: gamma,
        drag_err: dgamma,
        excited: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{stokes_drag, viscosity_h2o};

    fn state() -> ThermalState {
        let temp = 298.15;
        let drag = stokes_drag(0.5e-6, viscosity_h2o(temp));
        ThermalState {
            temp,
            temp_err: 1.0,
            drag,
            drag_err: drag * 0.01,
        }
    }

    #[test]
    fn passive_recovers_sensitivity() {
        let s = state();
        let beta: f64 = 2e-7; // m/V
        let d = BOLTZMANN * s.temp / s.drag / beta.powi(2);
        let fit = AxisFit {
            d,
            d_err: d * 0.01,
            fc: 700.0,
            fc_err: 7.0,
        };
        let r = passive_calibration(&s, &fit);
        assert!((r.dissens / beta - 1.0).abs() < 1e-12);
        // 2e-7 m/V = 0.2 nm/mV
        assert!((r.get_dissens(None).unwrap() - 0.2).abs() < 1e-12);
        let kappa = 2.0 * std::f64::consts::PI * 700.0 * s.drag;
        assert!((r.stiffness / kappa - 1.0).abs() < 1e-12);
        // Δβ/β = 0.5·(ΔT/T + Δγ/γ) + ΔD/D
        let rel = 0.5 * (1.0 / s.temp + 0.01) + 0.01;
        assert!((r.dissens_err / r.dissens - rel).abs() < 1e-12);
        assert!(!r.excited);
    }

    #[test]
    fn active_is_consistent_with_passive_on_ideal_data() {
        let s = state();
        let beta: f64 = 1.5e-7;
        let fc = 500.0;
        let d = BOLTZMANN * s.temp / s.drag / beta.powi(2);
        let fit = AxisFit {
            d,
            d_err: 0.0,
            fc,
            fc_err: 0.0,
        };
        let (f_ex, amp) = (32.0, 150e-9);
        let w_th = amp * amp / (2.0 * (1.0 + (fc / f_ex).powi(2)));
        let base = 1e-9;
        let ex = Excitation {
            frequency: f_ex,
            amplitude: amp,
            amplitude_err: 0.0,
            power: w_th / beta.powi(2) + base,
            power_err: 0.0,
            base_power: base,
            base_power_err: 0.0,
        };
        let (r, (gamma, _)) = active_calibration(s.temp, 0.0, &ex, &fit).unwrap();
        assert!(r.excited);
        assert!((r.dissens / beta - 1.0).abs() < 1e-9);
        assert!((gamma / s.drag - 1.0).abs() < 1e-9);

        let other = AxisFit {
            d: d * 4.0,
            d_err: 0.0,
            fc: 2.0 * fc,
            fc_err: 0.0,
        };
        let t = transfer_calibration(&r, &fit, &other);
        assert!((t.dissens / (beta / 2.0) - 1.0).abs() < 1e-9);
        assert!((t.stiffness / (2.0 * r.stiffness) - 1.0).abs() < 1e-9);
        assert!(!t.excited);
    }

    #[test]
    fn power_below_background_fails() {
        let fit = AxisFit {
            d: 1.0,
            d_err: 0.0,
            fc: 100.0,
            fc_err: 0.0,
        };
        let ex = Excitation {
            frequency: 30.0,
            amplitude: 1e-7,
            amplitude_err: 0.0,
            power: 1.0,
            power_err: 0.0,
            base_power: 2.0,
            base_power_err: 0.0,
        };
        assert_eq!(active_calibration(300.0, 0.0, &ex, &fit).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn force_factor_units() {
        let r = CalibrationResult {
            dissens: 1e-7,
            dissens_err: 1e-9,
            stiffness: 1e-4,
            stiffness_err: 2e-6,
            drag: 1e-8,
            drag_err: 0.0,
            excited: false,
        };
        // 1e-11 N/V = 1e-2 pN/mV
        assert!((r.get_force_factor(None).unwrap() - 1e-2).abs() < 1e-15);
        assert!((r.get_force_factor_err(None).unwrap() - 1e-2 * 0.03).abs() < 1e-15);
        assert!((r.get_stiffness(None).unwrap() - 0.1).abs() < 1e-12);
        assert!((r.get_drag(Some(Unit::N_S_PER_M)).unwrap() - 1e-8).abs() < 1e-20);
    }
}
