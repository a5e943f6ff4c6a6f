//! Command-line parsing for the PSD calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ModelKind;
use crate::logging::{LogFormat, LogLevel};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "psdfit", version, about = "Power spectral density fits for optical-tweezers calibration")]
pub struct Cli {
    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the PSDs of a measurement and print fits and calibration factors.
    Fit(FitArgs),
    /// Run the closed-form Lorentzian fits only.
    Analyze(AnalyzeArgs),
    /// Generate a synthetic measurement and save it.
    Generate(GenerateArgs),
    /// Plot the PSDs of a measurement.
    Plot(PlotArgs),
}

/// Data and parameter file of a saved measurement.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Tab-separated data file (`freq`, `psd_<axis>`, `err_<axis>`).
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Parameter file; `<data stem>_psd_parameters.txt` when omitted.
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Axes to use, comma separated (all by default).
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,
}

/// Options of `psdfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// PSD model.
    #[arg(long, value_enum, default_value_t = ModelKind::Lorentzian)]
    pub model: ModelKind,

    /// Multiply the model by a first-order low-pass filter (f3dB, alpha).
    #[arg(long)]
    pub lp_filter: bool,

    /// Keep the low-pass parameters fixed at --f3db / --alpha.
    #[arg(long, requires = "lp_filter")]
    pub lp_fixed: bool,

    /// Low-pass cut-off frequency (Hz), initial or fixed value.
    #[arg(long, value_name = "HZ")]
    pub f3db: Option<f64>,

    /// Low-pass alpha, initial or fixed value.
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Add aliased copies of the spectrum.
    #[arg(long)]
    pub aliasing: bool,

    /// Aliased copies on each side.
    #[arg(long, default_value_t = crate::models::DEFAULT_N_ALIAS)]
    pub n_alias: usize,

    /// Do not scale D by n_avg/(n_avg+1).
    #[arg(long)]
    pub no_debias: bool,

    /// Frequency range to fit (Hz).
    #[arg(long, num_args = 2, value_names = ["FMIN", "FMAX"])]
    pub bounds: Option<Vec<f64>>,

    /// Take the frequency range from the analytical fit.
    #[arg(long, conflicts_with = "bounds")]
    pub dynamic_bounds: bool,

    /// Exclude a frequency (Hz); repeatable.
    #[arg(long = "exclude", value_name = "HZ")]
    pub exclude: Vec<f64>,

    /// Use the bead height from the parameter file in the hydro model.
    #[arg(long)]
    pub use_heights: bool,

    /// Fit all axes at once with a shared low-pass filter.
    #[arg(long)]
    pub collective: bool,

    /// Confidence level of the outlier test.
    #[arg(long, default_value_t = crate::fit::DEFAULT_CONF_LEVEL)]
    pub conf_level: f64,

    /// Points per decade of the analytical window search.
    #[arg(long, default_value_t = crate::fit::DEFAULT_PPD)]
    pub ppd: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Write a JSON report.
    #[arg(long, value_name = "PATH")]
    pub export_json: Option<PathBuf>,

    /// Write (merge) results into an INI file.
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,
}

/// Options of `psdfit analyze`.
#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Points per decade of the window search.
    #[arg(long, default_value_t = crate::fit::DEFAULT_PPD)]
    pub ppd: usize,

    /// Restrict the data to this range before the search (Hz).
    #[arg(long, num_args = 2, value_names = ["FMIN", "FMAX"])]
    pub bounds: Option<Vec<f64>>,
}

/// Options of `psdfit generate`.
#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// Output directory.
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// File stem; a timestamped default when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Axes to generate.
    #[arg(long, value_delimiter = ',', default_value = "x,y")]
    pub axes: Vec<String>,

    /// Corner frequency (Hz); once for all axes or once per axis.
    #[arg(long, value_name = "HZ", default_value = "800")]
    pub fc: Vec<f64>,

    /// Diffusion constant of the signal (V^2/s).
    #[arg(long, default_value_t = 2e-6)]
    pub diffusion: f64,

    /// Sampling rate (Hz).
    #[arg(long, default_value_t = 10_000.0)]
    pub fs: f64,

    /// Record length (s).
    #[arg(long, default_value_t = 10.0)]
    pub t_msr: f64,

    /// Number of averaged windows.
    #[arg(long, default_value_t = 100)]
    pub n_avg: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Low-pass cut-off of the detector (Hz).
    #[arg(long, requires = "alpha")]
    pub f3db: Option<f64>,

    /// Low-pass alpha of the detector.
    #[arg(long, requires = "f3db")]
    pub alpha: Option<f64>,

    /// Temperature (degC).
    #[arg(long, default_value_t = 25.0)]
    pub temp_c: f64,

    /// Bead radius (um).
    #[arg(long, default_value_t = 0.5)]
    pub radius_um: f64,

    /// Excited axis for active calibration.
    #[arg(long, requires_all = ["ex_freq", "ex_amplitude_nm"])]
    pub ex_axis: Option<String>,

    /// Excitation frequency (Hz).
    #[arg(long)]
    pub ex_freq: Option<f64>,

    /// Excitation amplitude (nm).
    #[arg(long)]
    pub ex_amplitude_nm: Option<f64>,

    /// Also write error columns.
    #[arg(long)]
    pub with_errors: bool,
}

/// Options of `psdfit plot`.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Overlay the analytical Lorentzian fit.
    #[arg(long)]
    pub with_fit: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_flags_parse() {
        let cli = Cli::parse_from([
            "psdfit",
            "--log-level",
            "debug",
            "fit",
            "--data",
            "m.dat",
            "--names",
            "x,y",
            "--bounds",
            "20",
            "4000",
            "--exclude",
            "50",
            "--exclude",
            "100",
            "--lp-filter",
            "--model",
            "hydro",
        ]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.input.names, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(args.bounds, Some(vec![20.0, 4000.0]));
        assert_eq!(args.exclude, [50.0, 100.0]);
        assert_eq!(args.model, ModelKind::Hydro);
        assert!(args.lp_filter && !args.lp_fixed);
    }

    #[test]
    fn generate_defaults() {
        let cli = Cli::parse_from(["psdfit", "generate", "--out", "/tmp/x"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.axes, ["x", "y"]);
        assert_eq!(args.fc, [800.0]);
        assert_eq!(args.n_avg, 100);
    }
}
