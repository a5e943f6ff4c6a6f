//! PSD estimation from time series and filtered noise generation.
//!
//! Periodograms use a boxcar window, no overlap and no detrending. The
//! one-sided density is `2|X_k|² / (fs·N)`, except at DC and (for even `N`)
//! at the Nyquist bin where the factor 2 is dropped.

use rand::Rng;
use rand_distr::StandardNormal;
use realfft::RealFftPlanner;
use realfft::num_complex::Complex;

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::psd::Psd;
use crate::units::Unit;

/// Window periodograms of one time series.
#[derive(Debug, Clone)]
pub struct Periodograms {
    /// `k · fs / N` for `k = 0..=N/2`.
    pub freq: Vec<f64>,
    /// One periodogram per window.
    pub windows: Vec<Vec<f64>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Split `x` into `n_win` equal windows and compute one periodogram each.
///
/// Trailing samples that do not fill a window are dropped with a warning.
pub fn calculate_psd(x: &[f64], fs: f64, n_win: usize) -> Result<Periodograms, AppError> {
    if n_win == 0 {
        return Err(AppError::input("Number of windows must be > 0."));
    }
    if !(fs.is_finite() && fs > 0.0) {
        return Err(AppError::input(format!("Sampling rate must be positive, got {fs}.")));
    }
    let len = x.len() / n_win;
    if len < 4 {
        return Err(AppError::insufficient(format!(
            "{} samples are too few for {n_win} windows.",
            x.len()
        )));
    }

    let mut diagnostics = Vec::new();
    let rest = x.len() % n_win;
    if rest > 0 {
        diagnostics.push(Diagnostic::warn(
            "welch",
            format!("N_win is no common divisor of N = {}; {rest} data points were omitted.", x.len()),
        ));
    }

    let fft = RealFftPlanner::<f64>::new().plan_fft_forward(len);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let scale = 1.0 / (fs * len as f64);
    let nyquist = (len % 2 == 0).then_some(len / 2);

    let mut windows = Vec::with_capacity(n_win);
    for chunk in x.chunks_exact(len).take(n_win) {
        input.copy_from_slice(chunk);
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| AppError::numerical(format!("FFT failed: {e}")))?;
        let periodogram = spectrum
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let one_sided = if k == 0 || Some(k) == nyquist { 1.0 } else { 2.0 };
                one_sided * c.norm_sqr() * scale
            })
            .collect();
        windows.push(periodogram);
    }

    let freq = (0..spectrum.len()).map(|k| k as f64 * fs / len as f64).collect();
    Ok(Periodograms {
        freq,
        windows,
        diagnostics,
    })
}

/// Window-averaged PSD of a time series.
///
/// The error is the standard deviation of the windows divided by
/// `sqrt(n_win)` when `calc_errors` is set, otherwise `mean / sqrt(n_win)`.
pub fn psd_from_time_series(
    name: &str,
    x: &[f64],
    fs: f64,
    n_win: usize,
    calc_errors: bool,
) -> Result<(Psd, Vec<Diagnostic>), AppError> {
    let Periodograms {
        freq,
        windows,
        mut diagnostics,
    } = calculate_psd(x, fs, n_win)?;

    let n = windows.len() as f64;
    let sqrt_n = n.sqrt();
    let mean: Vec<f64> = (0..freq.len())
        .map(|k| windows.iter().map(|w| w[k]).sum::<f64>() / n)
        .collect();
    let err: Vec<f64> = if calc_errors {
        (0..freq.len())
            .map(|k| {
                let var = windows.iter().map(|w| (w[k] - mean[k]).powi(2)).sum::<f64>() / n;
                var.sqrt() / sqrt_n
            })
            .collect()
    } else {
        mean.iter().map(|m| m / sqrt_n).collect()
    };

    let n_avg = u32::try_from(n_win).map_err(|_| AppError::input(format!("Too many windows: {n_win}.")))?;
    let mut psd = Psd::new(name, freq, mean, Some(err), n_avg)?;
    diagnostics.extend(psd.set_f_sample(fs, Unit::HZ)?);
    Ok((psd, diagnostics))
}

/// White Gaussian noise shaped by `sqrt(filter(|f|))` in the frequency domain.
///
/// `filter` describes the target spectral shape; for unit-variance input
/// noise the one-sided PSD of the output is `2·filter(f)/fs`. With `std`
/// the output is rescaled to that standard deviation. The sample mean is
/// replaced by `mean` last.
pub fn gen_filtered_data<F, R>(
    filter: F,
    fs: f64,
    t_msr: f64,
    mean: f64,
    std: Option<f64>,
    rng: &mut R,
) -> Result<Vec<f64>, AppError>
where
    F: Fn(f64) -> f64,
    R: Rng,
{
    let n = (fs * t_msr).floor();
    if !(n.is_finite() && n >= 4.0) {
        return Err(AppError::input(format!(
            "fs * T_msr = {n} is too small to generate data."
        )));
    }
    let n = n as usize;

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut signal: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut signal, &mut spectrum)
        .map_err(|e| AppError::numerical(format!("FFT failed: {e}")))?;

    for (k, c) in spectrum.iter_mut().enumerate() {
        let gain = filter(k as f64 * fs / n as f64).max(0.0).sqrt();
        *c *= gain;
    }
    // Purely real bins for the inverse transform.
    spectrum[0] = Complex::new(spectrum[0].re, 0.0);
    if n % 2 == 0 {
        let last = spectrum.len() - 1;
        spectrum[last] = Complex::new(spectrum[last].re, 0.0);
    }

    let mut out = inverse.make_output_vec();
    inverse
        .process(&mut spectrum, &mut out)
        .map_err(|e| AppError::numerical(format!("Inverse FFT failed: {e}")))?;
    let norm = 1.0 / n as f64;
    out.iter_mut().for_each(|v| *v *= norm);

    if let Some(std) = std {
        let m = out.iter().sum::<f64>() / n as f64;
        let sd = (out.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64).sqrt();
        if sd > 0.0 {
            out.iter_mut().for_each(|v| *v = *v / sd * std);
        }
    }
    let m = out.iter().sum::<f64>() / n as f64;
    out.iter_mut().for_each(|v| *v = *v - m + mean);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parseval_holds_for_one_window() {
        let x: Vec<f64> = (0..64).map(|i| ((i * 7 % 11) as f64 - 5.0) * 0.3).collect();
        let fs = 128.0;
        let p = calculate_psd(&x, fs, 1).unwrap();
        assert_eq!(p.freq.len(), 33);
        assert_eq!(p.freq[32], 64.0);
        let df = fs / 64.0;
        let power: f64 = p.windows[0].iter().sum::<f64>() * df;
        let mean_sq = x.iter().map(|v| v * v).sum::<f64>() / 64.0;
        assert!((power - mean_sq).abs() < 1e-10 * mean_sq.max(1.0));
    }

    #[test]
    fn remainder_is_dropped_with_warning() {
        let x = vec![1.0; 103];
        let p = calculate_psd(&x, 100.0, 10).unwrap();
        assert_eq!(p.windows.len(), 10);
        assert_eq!(p.diagnostics.len(), 1);
        assert!(calculate_psd(&x, 100.0, 0).is_err());
    }

    #[test]
    fn white_noise_is_flat() {
        let mut rng = StdRng::seed_from_u64(7);
        let fs = 1000.0;
        let x = gen_filtered_data(|_| 1.0, fs, 20.0, 0.0, None, &mut rng).unwrap();
        let (psd, diags) = psd_from_time_series("x", &x, fs, 20, false).unwrap();
        assert!(diags.is_empty());
        let level = psd.psd().iter().sum::<f64>() / psd.n_unmasked() as f64;
        let expected = 2.0 / fs;
        assert!((level / expected - 1.0).abs() < 0.05, "level {level}");
        assert_eq!(psd.n_avg(), 20);
        assert_eq!(psd.f_sample(), fs);
    }

    #[test]
    fn mean_and_std_are_applied() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = gen_filtered_data(|f| 1.0 / (1.0 + f * f), 100.0, 10.0, 3.0, Some(0.5), &mut rng).unwrap();
        let n = x.len() as f64;
        let m = x.iter().sum::<f64>() / n;
        let sd = (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt();
        assert!((m - 3.0).abs() < 1e-9);
        assert!((sd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mean_is_exact_without_rescaling() {
        let mut rng = StdRng::seed_from_u64(9);
        let raw = gen_filtered_data(|_| 1.0, 200.0, 5.0, 0.0, None, &mut rng).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let shifted = gen_filtered_data(|_| 1.0, 200.0, 5.0, -1.25, None, &mut rng).unwrap();
        let n = shifted.len() as f64;
        assert!((raw.iter().sum::<f64>() / n).abs() < 1e-12);
        assert!((shifted.iter().sum::<f64>() / n + 1.25).abs() < 1e-12);
        for (a, b) in raw.iter().zip(&shifted) {
            assert!((b - a + 1.25).abs() < 1e-12);
        }
    }

    #[test]
    fn computed_errors_reflect_window_spread() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = gen_filtered_data(|_| 1.0, 500.0, 10.0, 0.0, None, &mut rng).unwrap();
        let (psd, _) = psd_from_time_series("y", &x, 500.0, 50, true).unwrap();
        let rel: f64 = psd
            .psd()
            .iter()
            .zip(psd.err())
            .map(|(p, e)| e / p)
            .sum::<f64>()
            / psd.n_unmasked() as f64;
        assert!(rel > 0.05 && rel < 0.3, "relative error {rel}");
    }
}
