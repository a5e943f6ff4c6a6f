//! Synthetic optical-tweezers measurements.
//!
//! Each axis gets a Brownian time series with a Lorentzian spectrum (times an
//! optional low-pass filter), which is then estimated with the same Welch
//! routine used for real data. An optional sinusoidal stage excitation adds
//! the peak needed for active calibration.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::models::{lorentzian_psd, low_pass_filter};
use crate::physics::{BOLTZMANN, stokes_drag};
use crate::psd::{ExperimentalSetting, PsdMeasurement, gen_filtered_data, psd_from_time_series};
use crate::units::Unit;

/// Sinusoidal stage motion of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthExcitation {
    pub axis: String,
    /// Hz; moved to the nearest frequency bin.
    pub frequency: f64,
    /// m
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub axes: Vec<String>,
    /// Corner frequency per axis; a single value applies to all.
    pub fc: Vec<f64>,
    /// Diffusion constant of the detector signal, V²/s.
    pub diffusion: f64,
    pub fs: f64,
    /// Total record length, s.
    pub t_msr: f64,
    pub n_avg: usize,
    pub seed: u64,
    /// `(f3dB, alpha)` of a detector low-pass filter.
    pub lp_filter: Option<(f64, f64)>,
    pub temp_k: f64,
    pub radius_m: f64,
    pub excitation: Option<SynthExcitation>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            axes: vec!["x".into(), "y".into()],
            fc: vec![800.0],
            diffusion: 2e-6,
            fs: 10_000.0,
            t_msr: 10.0,
            n_avg: 100,
            seed: 42,
            lp_filter: None,
            temp_k: 298.15,
            radius_m: 0.5e-6,
            excitation: None,
        }
    }
}

impl SynthConfig {
    fn fc_of(&self, idx: usize) -> Result<f64, AppError> {
        match self.fc.as_slice() {
            [single] => Ok(*single),
            many if many.len() == self.axes.len() => Ok(many[idx]),
            many => Err(AppError::input(format!(
                "Got {} corner frequencies for {} axes.",
                many.len(),
                self.axes.len()
            ))),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.axes.is_empty() {
            return Err(AppError::input("At least one axis is required."));
        }
        if !(self.diffusion.is_finite() && self.diffusion > 0.0) {
            return Err(AppError::input(format!("Diffusion constant must be positive, got {}.", self.diffusion)));
        }
        if self.n_avg == 0 {
            return Err(AppError::input("n_avg must be > 0."));
        }
        if let Some(ex) = &self.excitation {
            if !self.axes.contains(&ex.axis) {
                return Err(AppError::input(format!("Excitation axis '{}' is not generated.", ex.axis)));
            }
            if !(ex.frequency > 0.0 && ex.frequency < self.fs / 2.0) {
                return Err(AppError::input(format!(
                    "Excitation frequency {} Hz is outside (0, fs/2).",
                    ex.frequency
                )));
            }
        }
        Ok(())
    }
}

/// Generate a measurement according to `config`.
///
/// The excitation power stored with the measurement is read off the
/// generated spectrum at the excitation bin, as it would be in an
/// experiment.
pub fn generate_measurement(config: &SynthConfig) -> Result<(PsdMeasurement, Vec<Diagnostic>), AppError> {
    config.validate()?;
    let setting = ExperimentalSetting::new(config.temp_k, config.radius_m)?;
    let drag = stokes_drag(setting.radius(), setting.viscosity());
    // m/V relating bead motion to the detector signal
    let beta = (BOLTZMANN * setting.temp() / drag / config.diffusion).sqrt();

    let window_len = (config.fs * config.t_msr).floor() / config.n_avg as f64;
    let df = config.fs / window_len.floor();
    let excitation = config.excitation.as_ref().map(|ex| {
        let f_ex = (ex.frequency / df).round().max(1.0) * df;
        (ex, f_ex)
    });

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut m = PsdMeasurement::new(setting);
    let mut diagnostics = Vec::new();
    let mut ex_power = None;

    for (idx, axis) in config.axes.iter().enumerate() {
        let fc = config.fc_of(idx)?;
        let d = config.diffusion;
        let lp = config.lp_filter;
        let fs = config.fs;
        let filter = |f: f64| {
            let shape = lp.map_or(1.0, |(f3db, alpha)| low_pass_filter(f, f3db, alpha));
            lorentzian_psd(f, d, fc) * shape * fs / 2.0
        };
        let mut x = gen_filtered_data(filter, fs, config.t_msr, 0.0, None, &mut rng)?;

        if let Some((ex, f_ex)) = excitation.filter(|(ex, _)| ex.axis == *axis) {
            // bead response to the stage motion, in detector volts
            let w_th = ex.amplitude.powi(2) / (2.0 * (1.0 + (fc / f_ex).powi(2)));
            let amp_v = (2.0 * w_th).sqrt() / beta;
            let omega = 2.0 * std::f64::consts::PI * f_ex;
            for (i, v) in x.iter_mut().enumerate() {
                *v += amp_v * (omega * i as f64 / fs).sin();
            }
        }

        let (psd, diags) = psd_from_time_series(axis, &x, fs, config.n_avg, false)?;
        diagnostics.extend(diags);
        if let Some((_, f_ex)) = excitation.filter(|(ex, _)| ex.axis == *axis) {
            let k = (f_ex / psd.df()).round() as usize;
            // index 0 of the stored vectors is the first positive bin
            ex_power = psd.psd().get(k.saturating_sub(1)).map(|p| p * psd.df());
        }
        diagnostics.extend(m.add_psd(axis, psd));
        tracing::debug!(axis = %axis, fc, "synthetic axis generated");
    }

    if let (Some((ex, f_ex)), Some(power)) = (excitation, ex_power) {
        diagnostics.extend(m.set_ac_params(&ex.axis, f_ex, ex.amplitude, power, 0.0, 0.0, Unit::METER)?);
    }
    tracing::info!(axes = m.len(), seed = config.seed, "synthetic measurement generated");
    Ok((m, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{DEFAULT_PPD, FitPsdOptions, PsdFit, analytical_lsq_lorentzian, calc_anal_lsq_opt};
    use crate::math::logspace_points_per_decade;

    fn single_axis() -> PsdMeasurement {
        let config = SynthConfig {
            axes: vec!["x".into()],
            ..SynthConfig::default()
        };
        generate_measurement(&config).unwrap().0
    }

    #[test]
    fn generated_spectrum_fits_back() {
        let m = single_axis();
        let psd = m.psd("x").unwrap();
        assert_eq!(psd.n_avg(), 100);
        assert_eq!(psd.f_sample(), 10_000.0);
        assert_eq!(psd.df(), 10.0);

        let full = analytical_lsq_lorentzian(&psd.freq(), &psd.psd());
        assert!((full.fc / 800.0 - 1.0).abs() < 0.03, "fc {}", full.fc);
        assert!((full.d / 2e-6 - 1.0).abs() < 0.03, "D {}", full.d);

        let mut fit = PsdFit::new(m, 0.95);
        fit.fit_psds(None, &FitPsdOptions::default()).unwrap();
        let r = fit.fit("x").unwrap();
        assert!((r.fc.value / 800.0 - 1.0).abs() < 0.05, "fc {}", r.fc.value);
        assert!((r.d.value / 2e-6 - 1.0).abs() < 0.05, "D {}", r.d.value);
    }

    #[test]
    fn window_search_on_noise_settles_on_a_narrow_low_window() {
        // Pass 2 maximizes f_c, which on a noisy spectrum favours a short
        // window well below the corner frequency.
        let m = single_axis();
        let psd = m.psd("x").unwrap();
        let grid = logspace_points_per_decade(10.0, 5000.0, DEFAULT_PPD).unwrap();
        let search = calc_anal_lsq_opt(&psd.freq(), &psd.psd(), DEFAULT_PPD).unwrap();
        assert_eq!(search.bounds, (grid[24], grid[29]));
        assert!((search.bounds.0 - 158.3).abs() < 0.1 && (search.bounds.1 - 281.5).abs() < 0.1);
        assert!(search.fit.fc > 5.0 * 800.0, "fc {}", search.fit.fc);
    }

    #[test]
    fn same_seed_same_data() {
        let config = SynthConfig {
            t_msr: 1.0,
            n_avg: 10,
            ..SynthConfig::default()
        };
        let (a, _) = generate_measurement(&config).unwrap();
        let (b, _) = generate_measurement(&config).unwrap();
        assert_eq!(a.psd("y").unwrap().psd(), b.psd("y").unwrap().psd());
        assert_ne!(a.psd("x").unwrap().psd(), a.psd("y").unwrap().psd());
    }

    #[test]
    fn excitation_peak_is_registered() {
        let config = SynthConfig {
            excitation: Some(SynthExcitation {
                axis: "x".into(),
                frequency: 32.0,
                amplitude: 150e-9,
            }),
            ..SynthConfig::default()
        };
        let (m, _) = generate_measurement(&config).unwrap();
        let ac = m.active_calibration().unwrap();
        assert_eq!(ac.axis, "x");
        assert_eq!(ac.frequency, 30.0);
        let background = lorentzian_psd(30.0, 2e-6, 800.0) * 10.0;
        assert!(ac.power > 10.0 * background);
    }

    #[test]
    fn invalid_configs_fail() {
        let bad_fc = SynthConfig {
            fc: vec![1.0, 2.0, 3.0],
            ..SynthConfig::default()
        };
        assert!(generate_measurement(&bad_fc).is_err());
        let bad_ex = SynthConfig {
            excitation: Some(SynthExcitation {
                axis: "z".into(),
                frequency: 30.0,
                amplitude: 1e-7,
            }),
            ..SynthConfig::default()
        };
        assert_eq!(generate_measurement(&bad_ex).unwrap_err().exit_code(), 2);
    }
}
