//! A set of per-axis PSDs with the shared experimental setting and optional
//! active-calibration parameters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Diagnostic, WallCorrection};
use crate::error::AppError;
use crate::physics::{faxen_factor, oseen_factor, stokes_drag};
use crate::psd::{ExperimentalSetting, Psd, Selection};
use crate::units::{self, Dimension, Unit};

/// Sinusoidal excitation of one axis (stored in SI).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveCalibration {
    pub axis: String,
    /// Hz
    pub frequency: f64,
    /// m
    pub amplitude: f64,
    pub amplitude_err: f64,
    /// V²
    pub power: f64,
    pub power_err: f64,
}

#[derive(Debug, Clone)]
pub struct PsdMeasurement {
    psds: BTreeMap<String, Psd>,
    setting: ExperimentalSetting,
    active: Option<ActiveCalibration>,
}

impl PsdMeasurement {
    pub fn new(setting: ExperimentalSetting) -> Self {
        Self {
            psds: BTreeMap::new(),
            setting,
            active: None,
        }
    }

    /// Measurement with the fallback setting. The returned diagnostic says so.
    pub fn with_default_setting() -> (Self, Diagnostic) {
        let (setting, diagnostic) = ExperimentalSetting::fallback();
        (Self::new(setting), diagnostic)
    }

    /// Store `psd` under `name`. Replacing an existing axis is reported.
    pub fn add_psd(&mut self, name: &str, mut psd: Psd) -> Option<Diagnostic> {
        psd.set_name(name);
        let replaced = self.psds.insert(name.to_string(), psd).is_some();
        replaced.then(|| Diagnostic::warn(name, format!("PSD '{name}' already existed and was overwritten.")))
    }

    /// Axis names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.psds.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.psds.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.psds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psds.is_empty()
    }

    pub fn psd(&self, name: &str) -> Result<&Psd, AppError> {
        self.psds.get(name).ok_or_else(|| unknown_axis(name))
    }

    pub fn psd_mut(&mut self, name: &str) -> Result<&mut Psd, AppError> {
        self.psds.get_mut(name).ok_or_else(|| unknown_axis(name))
    }

    pub fn psds(&self) -> impl Iterator<Item = (&String, &Psd)> {
        self.psds.iter()
    }

    pub fn setting(&self) -> &ExperimentalSetting {
        &self.setting
    }

    pub fn setting_mut(&mut self) -> &mut ExperimentalSetting {
        &mut self.setting
    }

    pub fn get_freq(&self, name: &str, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        self.psd(name)?.get_freq(unit, selection)
    }

    pub fn get_psd(&self, name: &str, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        self.psd(name)?.get_psd(unit, selection)
    }

    pub fn get_err(&self, name: &str, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        self.psd(name)?.get_err(unit, selection)
    }

    pub fn f_sample(&self, name: &str, unit: Option<Unit>) -> Result<f64, AppError> {
        self.psd(name)?.get_f_sample(unit)
    }

    pub fn f_resolution(&self, name: &str, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.psd(name)?.df(), Dimension::Frequency, unit)
    }

    pub fn n_samples(&self, name: &str) -> Result<f64, AppError> {
        Ok(self.psd(name)?.n_samples())
    }

    /// Axis name → `true` for lateral axes.
    pub fn laterality(&self) -> BTreeMap<String, bool> {
        self.psds.iter().map(|(k, p)| (k.clone(), p.is_lateral())).collect()
    }

    // ---------------------------------------------------------------------
    // Active calibration
    // ---------------------------------------------------------------------

    /// Register a sinusoidal excitation of `ex_axis`.
    ///
    /// `ex_freq` in Hz, `ex_power` (and error) in V², amplitude in
    /// `amplitude_unit`.
    #[allow(clippy::too_many_arguments)]
    pub fn set_ac_params(
        &mut self,
        ex_axis: &str,
        ex_freq: f64,
        ex_amplitude: f64,
        ex_power: f64,
        ex_amplitude_err: f64,
        ex_power_err: f64,
        amplitude_unit: Unit,
    ) -> Result<Option<Diagnostic>, AppError> {
        if !self.psds.contains_key(ex_axis) {
            return Err(AppError::input(format!(
                "Excitation axis '{ex_axis}' is not one of the measured axes ({}).",
                self.names().join(", ")
            )));
        }
        if !(ex_freq.is_finite() && ex_freq > 0.0) {
            return Err(AppError::input(format!("Excitation frequency must be positive, got {ex_freq} Hz.")));
        }
        let amplitude = units::to_si(ex_amplitude, Dimension::Length, amplitude_unit)?;
        let amplitude_err = units::to_si(ex_amplitude_err, Dimension::Length, amplitude_unit)?;

        let diagnostic = self.active.as_ref().map(|previous| {
            Diagnostic::warn(
                ex_axis,
                format!("Active calibration parameters of axis '{}' are overwritten.", previous.axis),
            )
        });
        self.active = Some(ActiveCalibration {
            axis: ex_axis.to_string(),
            frequency: ex_freq,
            amplitude,
            amplitude_err,
            power: ex_power,
            power_err: ex_power_err,
        });
        Ok(diagnostic)
    }

    pub fn active_calibration(&self) -> Option<&ActiveCalibration> {
        self.active.as_ref()
    }

    pub fn is_active_calibration(&self) -> bool {
        self.active.is_some()
    }

    fn require_active(&self) -> Result<&ActiveCalibration, AppError> {
        self.active
            .as_ref()
            .ok_or_else(|| AppError::input("No active calibration parameters set."))
    }

    pub fn get_ex_axis(&self) -> Option<&str> {
        self.active.as_ref().map(|ac| ac.axis.as_str())
    }

    pub fn get_ex_freq(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.require_active()?.frequency, Dimension::Frequency, unit)
    }

    pub fn get_ex_amplitude(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.require_active()?.amplitude, Dimension::Length, unit)
    }

    pub fn get_ex_amplitude_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.require_active()?.amplitude_err, Dimension::Length, unit)
    }

    pub fn get_ex_power(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.require_active()?.power, Dimension::SignalPower, unit)
    }

    pub fn get_ex_power_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.require_active()?.power_err, Dimension::SignalPower, unit)
    }

    // ---------------------------------------------------------------------
    // Drag
    // ---------------------------------------------------------------------

    /// Stokes drag `6πηr` of the bead.
    pub fn get_stokes_drag(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        let drag = stokes_drag(self.setting.radius(), self.setting.viscosity());
        units::express(drag, Dimension::Drag, unit)
    }

    /// Linear propagation of the relative viscosity and radius errors.
    pub fn get_stokes_drag_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        let s = &self.setting;
        let drag = stokes_drag(s.radius(), s.viscosity());
        let err = (s.viscosity_err() / s.viscosity() + s.radius_err() / s.radius()) * drag;
        units::express(err, Dimension::Drag, unit)
    }

    /// Stokes drag corrected for one or two walls at the bead height.
    ///
    /// The height is scaled by `focal_shift`. `distance` (wall separation, in
    /// `distance_unit`) is required for [`WallCorrection::TwoWalls`].
    pub fn get_corrected_drag(
        &self,
        correction: WallCorrection,
        distance: Option<f64>,
        focal_shift: f64,
        distance_unit: Unit,
        drag_unit: Option<Unit>,
    ) -> Result<(f64, Vec<Diagnostic>), AppError> {
        let mut diagnostics = Vec::new();
        let drag = stokes_drag(self.setting.radius(), self.setting.viscosity());
        let radius = self.setting.radius();
        let height = self.setting.height() * focal_shift;

        if height < 1.5 * radius {
            diagnostics.push(Diagnostic::warn(
                "drag",
                "Faxen's correction does not work for heights lower than 1.5 * radius.",
            ));
        }

        let factor = match correction {
            WallCorrection::SingleWall => faxen_factor(height, radius),
            WallCorrection::TwoWalls => {
                let Some(distance) = distance else {
                    return Err(AppError::input("Distance between the two walls is not given."));
                };
                let distance = units::to_si(distance, Dimension::Length, distance_unit)?;
                if height > distance - 1.5 * radius {
                    diagnostics.push(Diagnostic::warn(
                        "drag",
                        "The correction does not work for heights above thickness - 1.5 * radius.",
                    ));
                }
                oseen_factor(height, radius, distance)
            }
        };

        Ok((units::express(drag * factor, Dimension::Drag, drag_unit)?, diagnostics))
    }

    // ---------------------------------------------------------------------
    // Masks
    // ---------------------------------------------------------------------

    /// Exclude exact frequencies on the named axes (all axes when `None`).
    pub fn exclude_freq(&mut self, values: &[f64], names: Option<&[String]>) -> Result<Vec<Diagnostic>, AppError> {
        let mut diagnostics = Vec::new();
        for name in self.resolve_names(names)? {
            diagnostics.extend(self.psd_mut(&name)?.exclude_freq(values));
        }
        Ok(diagnostics)
    }

    /// Exclude frequencies outside `[fmin, fmax]`, optionally resetting the
    /// masks first.
    pub fn exclude_freq_outside(
        &mut self,
        fmin: f64,
        fmax: f64,
        names: Option<&[String]>,
        reset: bool,
    ) -> Result<(), AppError> {
        for name in self.resolve_names(names)? {
            let psd = self.psd_mut(&name)?;
            if reset {
                psd.reset_mask();
            }
            psd.exclude_freq_outside(fmin, fmax);
        }
        Ok(())
    }

    pub fn reset_masks(&mut self) {
        self.psds.values_mut().for_each(Psd::reset_mask);
    }

    fn resolve_names(&self, names: Option<&[String]>) -> Result<Vec<String>, AppError> {
        match names {
            None => Ok(self.names()),
            Some(names) => {
                for name in names {
                    if !self.psds.contains_key(name) {
                        return Err(unknown_axis(name));
                    }
                }
                Ok(names.to_vec())
            }
        }
    }
}

fn unknown_axis(name: &str) -> AppError {
    AppError::input(format!("Unknown axis '{name}'."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> PsdMeasurement {
        let setting = ExperimentalSetting::new(298.15, 0.5e-6).unwrap();
        let mut m = PsdMeasurement::new(setting);
        let freq: Vec<f64> = (1..=10).map(|i| i as f64 * 10.0).collect();
        for name in ["y", "x"] {
            let psd = Psd::new(name, freq.clone(), vec![1.0; 10], None, 10).unwrap();
            assert!(m.add_psd(name, psd).is_none());
        }
        m
    }

    #[test]
    fn names_are_sorted_and_overwrite_warns() {
        let mut m = measurement();
        assert_eq!(m.names(), vec!["x", "y"]);
        let psd = Psd::new("other", vec![1.0, 2.0], vec![1.0, 1.0], None, 1).unwrap();
        assert!(m.add_psd("x", psd).is_some());
        assert_eq!(m.psd("x").unwrap().name(), "x");
        assert_eq!(m.psd("x").unwrap().len(), 2);
    }

    #[test]
    fn ac_params_require_known_axis() {
        let mut m = measurement();
        let err = m.set_ac_params("q", 32.0, 100.0, 1e-3, 1.0, 1e-5, Unit::NM).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!m.is_active_calibration());

        assert!(m.set_ac_params("x", 32.0, 100.0, 1e-3, 1.0, 1e-5, Unit::NM).unwrap().is_none());
        assert!(m.is_active_calibration());
        assert!((m.get_ex_amplitude(None).unwrap() - 100e-9).abs() < 1e-20);
        assert!((m.get_ex_amplitude(Some(Unit::NM)).unwrap() - 100.0).abs() < 1e-9);
        assert!(m.set_ac_params("y", 32.0, 100.0, 1e-3, 1.0, 1e-5, Unit::NM).unwrap().is_some());
        assert_eq!(m.get_ex_axis(), Some("y"));
    }

    #[test]
    fn stokes_drag_and_error() {
        let mut m = measurement();
        let drag = m.get_stokes_drag(None).unwrap();
        let expected = 6.0 * std::f64::consts::PI * m.setting().viscosity() * 0.5e-6;
        assert!((drag - expected).abs() < 1e-24);
        assert_eq!(m.get_stokes_drag_err(None).unwrap(), 0.0);

        m.setting_mut().set_radius_err(0.05, Unit::UM).unwrap();
        let err = m.get_stokes_drag_err(None).unwrap();
        assert!((err / drag - 0.1).abs() < 1e-12);
    }

    #[test]
    fn corrected_drag_modes() {
        let mut m = measurement();
        m.setting_mut().set_height(5.0, Unit::UM).unwrap();
        let stokes = m.get_stokes_drag(None).unwrap();
        let (single, diags) = m
            .get_corrected_drag(WallCorrection::SingleWall, None, 1.0, Unit::UM, None)
            .unwrap();
        assert!(diags.is_empty());
        assert!(single > stokes);

        let err = m
            .get_corrected_drag(WallCorrection::TwoWalls, None, 1.0, Unit::UM, None)
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let (two, _) = m
            .get_corrected_drag(WallCorrection::TwoWalls, Some(20.0), 1.0, Unit::UM, None)
            .unwrap();
        assert!(two > single);

        let (_, diags) = m
            .get_corrected_drag(WallCorrection::SingleWall, None, 0.1, Unit::UM, None)
            .unwrap();
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn mask_helpers_apply_to_named_axes() {
        let mut m = measurement();
        m.exclude_freq_outside(25.0, 75.0, Some(&["x".to_string()]), false).unwrap();
        assert_eq!(m.psd("x").unwrap().n_unmasked(), 5);
        assert_eq!(m.psd("y").unwrap().n_unmasked(), 10);
        let diags = m.exclude_freq(&[50.0, 55.0], None).unwrap();
        assert_eq!(diags.len(), 2);
        assert_eq!(m.psd("y").unwrap().n_unmasked(), 9);
        m.reset_masks();
        assert_eq!(m.psd("x").unwrap().n_unmasked(), 10);
        assert!(m.exclude_freq(&[10.0], Some(&["q".to_string()])).is_err());
    }
}
