//! ASCII plotting for terminal output.
//!
//! Spectra are drawn on log-log axes in a fixed-size grid, optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - fitted points: `o`
//! - excluded points: `x`
//! - fitted model: `-` line

use crate::fit::{FitResult, PsdFit};
use crate::psd::{Psd, Selection};

/// Number of samples of the model curve per plot column.
const CURVE_OVERSAMPLING: usize = 2;

/// Render one spectrum, optionally with its fit.
pub fn render_psd_plot(psd: &Psd, fit: Option<&FitResult>, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let kept = log_points(&psd.freq(), &psd.psd());
    let masked = log_points(
        &psd.get_freq(None, Selection::masked()).unwrap_or_default(),
        &psd.get_psd(None, Selection::masked()).unwrap_or_default(),
    );

    let Some((lx_min, lx_max)) = range(kept.iter().chain(&masked).map(|p| p.0)) else {
        return format!("PSD {}: nothing to plot\n", psd.name());
    };
    let curve = fit.map(|r| sample_fit(r, lx_min, lx_max, width * CURVE_OVERSAMPLING)).unwrap_or_default();

    let (ly_min, ly_max) = range(kept.iter().chain(&masked).chain(&curve).map(|p| p.1)).unwrap_or((-1.0, 1.0));
    let (ly_min, ly_max) = pad_range(ly_min, ly_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let to_cell = |(lx, ly): (f64, f64)| {
        (
            map_x(lx, lx_min, lx_max, width),
            map_y(ly, ly_min, ly_max, height),
        )
    };

    // Curve first so points overlay it.
    let mut prev = None;
    for &p in &curve {
        let (x, y) = to_cell(p);
        match prev {
            Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, y, '-'),
            None => grid[y][x] = '-',
        }
        prev = Some((x, y));
    }
    for &p in &masked {
        let (x, y) = to_cell(p);
        grid[y][x] = 'x';
    }
    for &p in &kept {
        let (x, y) = to_cell(p);
        grid[y][x] = 'o';
    }

    let mut out = format!(
        "PSD {}: f=[{:.1e}, {:.1e}] Hz | P=[{:.1e}, {:.1e}] V^2/Hz (log-log)\n",
        psd.name(),
        10f64.powf(lx_min),
        10f64.powf(lx_max),
        10f64.powf(ly_min),
        10f64.powf(ly_max),
    );
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

/// Plot every axis of a fit, using the iterative fit when present and the
/// analytical one otherwise.
pub fn render_fit_plots(fit: &PsdFit, width: usize, height: usize) -> String {
    let mut out = String::new();
    for (name, psd) in fit.measurement().psds() {
        let result = fit.fit(name).or_else(|| fit.analytical_fit(name));
        out.push_str(&render_psd_plot(psd, result, width, height));
        out.push('\n');
    }
    out
}

/// `(log10 f, log10 P)` of the strictly positive samples.
fn log_points(freq: &[f64], psd: &[f64]) -> Vec<(f64, f64)> {
    freq.iter()
        .zip(psd)
        .filter(|(f, p)| **f > 0.0 && **p > 0.0)
        .map(|(f, p)| (f.log10(), p.log10()))
        .collect()
}

fn sample_fit(fit: &FitResult, lx_min: f64, lx_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let freq: Vec<f64> = (0..n)
        .map(|i| 10f64.powf(lx_min + (lx_max - lx_min) * i as f64 / (n as f64 - 1.0)))
        .collect();
    match fit.eval_at(&freq) {
        Some(eval) => log_points(&freq, &eval),
        // no model kept (closed-form fallback): use the stored curve
        None => log_points(&fit.freq, &fit.eval),
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (min.is_finite() && max > min).then_some((min, max))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // top row is the maximum
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let (mut x, mut y) = (x0 as isize, y0 as isize);
    let (x1, y1) = (x1 as isize, y1 as isize);
    let dx = (x1 - x).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let dy = -(y1 - y).abs();
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid.get_mut(y as usize).and_then(|row| row.get_mut(x as usize)) {
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Estimate;

    fn psd() -> Psd {
        let mut psd = Psd::new(
            "x",
            vec![1.0, 10.0, 100.0, 1000.0],
            vec![1e-2, 1e-2, 1e-4, 1e-6],
            None,
            10,
        )
        .unwrap();
        psd.exclude_freq(&[100.0]);
        psd
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let txt = render_psd_plot(&psd(), None, 10, 5);
        let expected = concat!(
            "PSD x: f=[1.0e0, 1.0e3] Hz | P=[6.3e-7, 1.6e-2] V^2/Hz (log-log)\n",
            "o  o      \n",
            "          \n",
            "      x   \n",
            "          \n",
            "         o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn stored_curve_is_drawn_without_model() {
        let fit = FitResult {
            name: "x".into(),
            d: Estimate::new(1.0, 0.0),
            fc: Estimate::new(10.0, 0.0),
            f3db: None,
            alpha: None,
            bounds: (1.0, 1000.0),
            freq: vec![1.0, 1000.0],
            eval: vec![1e-2, 1e-6],
            residual: vec![],
            chi2: 0.0,
            redchi2: 0.0,
            nfree: 2.0,
            conf_level: 0.95,
            model_name: "non-analytical".into(),
            debias_factor: 1.0,
            params: None,
            minimizer: None,
            model: None,
        };
        let txt = render_psd_plot(&psd(), Some(&fit), 10, 5);
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.chars().count() == 10));
        assert!(rows[1].contains('-') || rows[3].contains('-'));
        assert_eq!(rows[4].chars().last(), Some('o'));
    }

    #[test]
    fn empty_spectrum_is_reported() {
        let psd = Psd::new("z", vec![1.0, 2.0], vec![0.0, 0.0], None, 1).unwrap();
        assert_eq!(render_psd_plot(&psd, None, 10, 5), "PSD z: nothing to plot\n");
    }
}
