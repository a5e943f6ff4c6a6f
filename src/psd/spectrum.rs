//! One-sided power spectral density of one measurement axis.
//!
//! The container keeps frequency, amplitude and error vectors together with
//! an exclusion mask (`true` = excluded). The vectors always have the same
//! length and all frequencies are strictly positive: a sample at `f = 0` in
//! the raw input is split off into [`Psd::offset`].
//!
//! Values are stored in SI (Hz, V²/Hz). Accessors take an optional target
//! unit and a [`Selection`] deciding which points to return.

use serde::{Deserialize, Serialize};

use crate::domain::{Diagnostic, Direction};
use crate::error::AppError;
use crate::units::{self, Dimension, Unit};

/// Which points an accessor returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Ignore the mask and return every point.
    pub get_all: bool,
    /// Return only the excluded points.
    pub get_masked: bool,
    /// Prefix the zero-frequency sample (`offset`).
    pub offset: bool,
}

impl Selection {
    /// Every point, mask ignored.
    pub fn all() -> Self {
        Self {
            get_all: true,
            ..Self::default()
        }
    }

    /// Only the excluded points.
    pub fn masked() -> Self {
        Self {
            get_masked: true,
            ..Self::default()
        }
    }

    pub fn with_offset(mut self) -> Self {
        self.offset = true;
        self
    }
}

/// Relative tolerance when matching requested frequencies to data points.
const FREQ_MATCH_RTOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    name: String,
    freq: Vec<f64>,
    psd: Vec<f64>,
    err: Vec<f64>,
    mask: Vec<bool>,
    offset: f64,
    n_avg: u32,
    f_sample: f64,
    direction: Direction,
}

impl Psd {
    /// Build a PSD from raw vectors.
    ///
    /// A sample at `f = 0` is moved to `offset`. Without `err` the error is
    /// `psd / sqrt(n_avg)`.
    pub fn new(
        name: impl Into<String>,
        freq: Vec<f64>,
        psd: Vec<f64>,
        err: Option<Vec<f64>>,
        n_avg: u32,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if freq.len() != psd.len() {
            return Err(AppError::input(format!(
                "PSD '{name}': frequency and amplitude vectors differ in length ({} vs {}).",
                freq.len(),
                psd.len()
            )));
        }
        if let Some(err) = &err {
            if err.len() != freq.len() {
                return Err(AppError::input(format!(
                    "PSD '{name}': error vector has length {}, expected {}.",
                    err.len(),
                    freq.len()
                )));
            }
        }
        if n_avg == 0 {
            return Err(AppError::input(format!("PSD '{name}': n_avg must be > 0.")));
        }
        if freq.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(AppError::input(format!(
                "PSD '{name}': frequencies must be finite and non-negative."
            )));
        }

        let offset = freq
            .iter()
            .position(|&f| f == 0.0)
            .map(|i| psd[i])
            .unwrap_or(0.0);

        let keep: Vec<usize> = (0..freq.len()).filter(|&i| freq[i] > 0.0).collect();
        if keep.len() < 2 {
            return Err(AppError::insufficient(format!(
                "PSD '{name}': at least two positive frequencies are required."
            )));
        }
        if keep.windows(2).any(|w| freq[w[1]] <= freq[w[0]]) {
            return Err(AppError::input(format!(
                "PSD '{name}': frequencies must be strictly ascending."
            )));
        }

        let sqrt_n = (n_avg as f64).sqrt();
        let f: Vec<f64> = keep.iter().map(|&i| freq[i]).collect();
        let p: Vec<f64> = keep.iter().map(|&i| psd[i]).collect();
        let e: Vec<f64> = match &err {
            Some(err) => keep.iter().map(|&i| err[i]).collect(),
            None => p.iter().map(|v| v / sqrt_n).collect(),
        };
        let f_max = f[f.len() - 1];
        let direction = Direction::from_axis_name(&name);

        Ok(Self {
            mask: vec![false; f.len()],
            name,
            freq: f,
            psd: p,
            err: e,
            offset,
            n_avg,
            f_sample: 2.0 * f_max,
            direction,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the PSD. The direction is kept.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn is_lateral(&self) -> bool {
        self.direction.is_lateral()
    }

    pub fn n_avg(&self) -> u32 {
        self.n_avg
    }

    /// Amplitude at `f = 0` (0.0 when the raw input had no such sample).
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of points, excluded ones included.
    pub fn len(&self) -> usize {
        self.freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// Number of points not excluded.
    pub fn n_unmasked(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Frequencies of the points not excluded, in Hz.
    pub fn freq(&self) -> Vec<f64> {
        self.select(&self.freq, None, Selection::default())
    }

    /// Amplitudes of the points not excluded, in V²/Hz.
    pub fn psd(&self) -> Vec<f64> {
        self.select(&self.psd, None, Selection::default())
    }

    /// Errors of the points not excluded, in V²/Hz.
    pub fn err(&self) -> Vec<f64> {
        self.select(&self.err, None, Selection::default())
    }

    pub fn get_freq(&self, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        let values = self.select(&self.freq, Some(0.0), selection);
        units::express_all(&values, Dimension::Frequency, unit)
    }

    pub fn get_psd(&self, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        let values = self.select(&self.psd, Some(self.offset), selection);
        units::express_all(&values, Dimension::SignalPsd, unit)
    }

    pub fn get_err(&self, unit: Option<Unit>, selection: Selection) -> Result<Vec<f64>, AppError> {
        let offset_err = self.offset / (self.n_avg as f64).sqrt();
        let values = self.select(&self.err, Some(offset_err), selection);
        units::express_all(&values, Dimension::SignalPsd, unit)
    }

    fn select(&self, values: &[f64], offset: Option<f64>, selection: Selection) -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len() + 1);
        if selection.offset {
            if let Some(offset) = offset {
                out.push(offset);
            }
        }
        for (v, &excluded) in values.iter().zip(&self.mask) {
            let take = if selection.get_all {
                true
            } else if selection.get_masked {
                excluded
            } else {
                !excluded
            };
            if take {
                out.push(*v);
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    // Derived quantities
    // ---------------------------------------------------------------------

    /// Frequency resolution: spacing of the first two samples.
    pub fn df(&self) -> f64 {
        self.freq[1] - self.freq[0]
    }

    /// Measurement duration `1 / f_min` in s.
    pub fn t_msr(&self) -> f64 {
        1.0 / self.freq[0]
    }

    /// Number of time samples `T_msr · f_sample` of one averaged window.
    pub fn n_samples(&self) -> f64 {
        self.t_msr() * self.f_sample
    }

    pub fn f_sample(&self) -> f64 {
        self.f_sample
    }

    pub fn get_f_sample(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.f_sample, Dimension::Frequency, unit)
    }

    /// Set the sampling rate. A rate other than `2 · f_max` is allowed but
    /// reported.
    pub fn set_f_sample(&mut self, value: f64, unit: Unit) -> Result<Option<Diagnostic>, AppError> {
        let fs = units::to_si(value, Dimension::Frequency, unit)?;
        if !(fs.is_finite() && fs > 0.0) {
            return Err(AppError::input(format!(
                "PSD '{}': sampling rate must be positive, got {value} {unit}.",
                self.name
            )));
        }
        self.f_sample = fs;
        let nyquist = 2.0 * self.freq[self.freq.len() - 1];
        if (nyquist - fs).abs() > FREQ_MATCH_RTOL * fs {
            return Ok(Some(Diagnostic::warn(
                self.name.clone(),
                format!(
                    "2 x f_max = {nyquist:.3} Hz differs from f_sample = {fs:.3} Hz; the spectrum \
                     should normally end at half the sampling rate."
                ),
            )));
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------
    // Mask operations
    // ---------------------------------------------------------------------

    /// Clear all exclusions.
    pub fn reset_mask(&mut self) {
        self.mask.iter_mut().for_each(|m| *m = false);
    }

    /// OR an external mask into the current one.
    pub fn add_mask(&mut self, mask: &[bool]) -> Result<(), AppError> {
        if mask.len() != self.mask.len() {
            return Err(AppError::input(format!(
                "PSD '{}': mask has length {}, expected {}.",
                self.name,
                mask.len(),
                self.mask.len()
            )));
        }
        for (m, &add) in self.mask.iter_mut().zip(mask) {
            *m |= add;
        }
        Ok(())
    }

    /// Exclude the points whose frequency matches one of `values`.
    ///
    /// Values not present in the frequency vector are reported and skipped.
    pub fn exclude_freq(&mut self, values: &[f64]) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for &value in values {
            let tol = FREQ_MATCH_RTOL * value.abs().max(f64::MIN_POSITIVE);
            let mut found = false;
            for (f, m) in self.freq.iter().zip(self.mask.iter_mut()) {
                if (f - value).abs() <= tol {
                    *m = true;
                    found = true;
                }
            }
            if !found {
                diagnostics.push(Diagnostic::warn(
                    self.name.clone(),
                    format!("Frequency {value} Hz not present in the spectrum; nothing excluded."),
                ));
            }
        }
        diagnostics
    }

    /// Exclude every point outside `[fmin, fmax]`. Exclusions accumulate.
    pub fn exclude_freq_outside(&mut self, fmin: f64, fmax: f64) {
        for (f, m) in self.freq.iter().zip(self.mask.iter_mut()) {
            if *f < fmin || *f > fmax {
                *m = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Psd {
        let freq = vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let psd = vec![9.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        Psd::new("x", freq, psd, None, 4).unwrap()
    }

    #[test]
    fn zero_frequency_moves_to_offset() {
        let p = sample();
        assert_eq!(p.offset(), 9.0);
        assert_eq!(p.freq(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(p.err(), vec![0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(p.f_sample(), 100.0);
        assert_eq!(p.df(), 10.0);
        assert!((p.t_msr() - 0.1).abs() < 1e-12);
        assert!((p.n_samples() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn vector_lengths_stay_equal() {
        let mut p = sample();
        p.exclude_freq_outside(15.0, 45.0);
        let all = Selection::all();
        let n = p.get_freq(None, all).unwrap().len();
        assert_eq!(n, p.get_psd(None, all).unwrap().len());
        assert_eq!(n, p.get_err(None, all).unwrap().len());
        assert_eq!(n, p.mask().len());
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = Psd::new("x", vec![1.0, 2.0], vec![1.0], None, 1).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(Psd::new("x", vec![1.0, 2.0], vec![1.0, 1.0], Some(vec![1.0]), 1).is_err());
    }

    #[test]
    fn reset_mask_restores_all_positive_frequencies() {
        let mut p = sample();
        p.exclude_freq_outside(15.0, 35.0);
        p.exclude_freq(&[30.0]);
        assert_eq!(p.freq(), vec![20.0]);
        p.reset_mask();
        assert_eq!(p.freq(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn exclude_outside_is_idempotent() {
        let mut p = sample();
        p.exclude_freq_outside(15.0, 45.0);
        let once = p.mask().to_vec();
        p.exclude_freq_outside(15.0, 45.0);
        assert_eq!(p.mask(), once.as_slice());
    }

    #[test]
    fn excluding_absent_frequency_warns() {
        let mut p = sample();
        let diagnostics = p.exclude_freq(&[20.0, 25.0]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(p.freq(), vec![10.0, 30.0, 40.0, 50.0]);
        assert_eq!(p.get_freq(None, Selection::masked()).unwrap(), vec![20.0]);
    }

    #[test]
    fn offset_and_units_in_accessors() {
        let p = sample();
        let sel = Selection::all().with_offset();
        let f = p.get_freq(Some(Unit::KHZ), sel).unwrap();
        assert_eq!(f.len(), 6);
        assert_eq!(f[0], 0.0);
        assert!((f[1] - 0.01).abs() < 1e-15);
        let psd = p.get_psd(None, sel).unwrap();
        assert_eq!(psd[0], 9.0);
        let err = p.get_err(None, sel).unwrap();
        assert_eq!(err[0], 4.5);
        assert!(p.get_psd(Some(Unit::HZ), sel).is_err());
    }

    #[test]
    fn sampling_rate_mismatch_is_reported() {
        let mut p = sample();
        assert!(p.set_f_sample(100.0, Unit::HZ).unwrap().is_none());
        assert!(p.set_f_sample(0.2, Unit::KHZ).unwrap().is_some());
        assert_eq!(p.f_sample(), 200.0);
    }

    #[test]
    fn direction_from_name() {
        let p = Psd::new("z", vec![1.0, 2.0], vec![1.0, 1.0], None, 1).unwrap();
        assert!(!p.is_lateral());
    }
}
