//! Command handlers behind the `psdfit` binary.
//!
//! Each subcommand turns its arguments into a [`RunConfig`] or [`SynthConfig`],
//! runs the shared pipeline and prints tables, diagnostics and plots.

use clap::Parser;

use crate::cli::{AnalyzeArgs, Cli, Command, FitArgs, GenerateArgs, InputArgs, PlotArgs};
use crate::data::{SynthConfig, SynthExcitation, generate_measurement};
use crate::domain::RunConfig;
use crate::error::AppError;
use crate::fit::{DEFAULT_CONF_LEVEL, DEFAULT_PPD, PsdFit};
use crate::io::{load_measurement, save_measurement, write_json_report, write_results};
use crate::logging::{LogConfig, init_logging};
use crate::models::DEFAULT_N_ALIAS;
use crate::report::{format_calibration_table, format_diagnostics, format_fit_table, format_run_summary};
use crate::units::TemperatureUnit;

pub mod pipeline;

/// Entry point for the `psdfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(&LogConfig {
        level: cli.log_level,
        format: cli.log_format,
        ..LogConfig::default()
    });

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Generate(args) => handle_generate(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;
    let fit = &run.fit;

    println!("{}", format_run_summary(fit, &run.source));
    println!("{}", format_fit_table("Analytical Lorentzian fits", fit.analytical_fits()));
    println!("{}", format_fit_table("PSD fits", fit.fits()));
    if !fit.pc_results().is_empty() {
        println!("{}", format_calibration_table("Passive calibration", fit.pc_results())?);
    }
    if !fit.ac_results().is_empty() {
        println!("{}", format_calibration_table("Active calibration", fit.ac_results())?);
    }
    print!("{}", format_diagnostics(&run.diagnostics()));

    if config.plot {
        println!(
            "{}",
            crate::plot::render_fit_plots(fit, config.plot_width, config.plot_height)
        );
    }

    if let Some(path) = &config.export_json {
        write_json_report(path, fit, &run.source)?;
    }
    if let Some(path) = &config.results_path {
        write_results(path, fit)?;
    }
    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let mut config = base_config(&args.input);
    config.analytical_only = true;
    config.ppd = args.ppd;
    config.bounds = bounds_from_args(args.bounds.as_deref())?;
    let run = pipeline::run_fit(&config)?;

    println!("{}", format_run_summary(&run.fit, &run.source));
    println!("{}", format_fit_table("Analytical Lorentzian fits", run.fit.analytical_fits()));
    print!("{}", format_diagnostics(&run.diagnostics()));
    Ok(())
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let excitation = match (&args.ex_axis, args.ex_freq, args.ex_amplitude_nm) {
        (Some(axis), Some(frequency), Some(amplitude_nm)) => Some(SynthExcitation {
            axis: axis.to_ascii_lowercase(),
            frequency,
            amplitude: amplitude_nm * 1e-9,
        }),
        _ => None,
    };
    let config = SynthConfig {
        axes: args.axes.iter().map(|a| a.trim().to_ascii_lowercase()).collect(),
        fc: args.fc.clone(),
        diffusion: args.diffusion,
        fs: args.fs,
        t_msr: args.t_msr,
        n_avg: args.n_avg,
        seed: args.seed,
        lp_filter: args.f3db.zip(args.alpha),
        temp_k: TemperatureUnit::Celsius.to_kelvin(args.temp_c),
        radius_m: args.radius_um * 1e-6,
        excitation,
    };
    let (measurement, diagnostics) = generate_measurement(&config)?;

    std::fs::create_dir_all(&args.out)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", args.out.display())))?;
    let saved = save_measurement(&measurement, &args.out, args.name.as_deref(), args.with_errors)?;
    println!("Data:       {}", saved.data.display());
    println!("Parameters: {}", saved.params.display());
    print!("{}", format_diagnostics(&diagnostics));
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let (measurement, diagnostics) = load_measurement(&args.input.data, args.input.params.as_deref())?;
    let mut fit = PsdFit::new(measurement, DEFAULT_CONF_LEVEL);
    if args.with_fit {
        fit.analytical_lorentzian_fit(args.input.names.as_deref(), DEFAULT_PPD)?;
    }
    print!("{}", crate::plot::render_fit_plots(&fit, args.width, args.height));
    print!("{}", format_diagnostics(&diagnostics));
    Ok(())
}

fn base_config(input: &InputArgs) -> RunConfig {
    RunConfig {
        data_path: input.data.clone(),
        params_path: input.params.clone(),
        names: input.names.clone(),
        model: Default::default(),
        lp_filter: false,
        lp_fixed: false,
        f3db: None,
        alpha: None,
        aliasing: false,
        n_alias: DEFAULT_N_ALIAS,
        debias: true,
        bounds: None,
        dynamic_bounds: false,
        f_exclude: Vec::new(),
        use_heights: false,
        collective: false,
        analytical_only: false,
        conf_level: DEFAULT_CONF_LEVEL,
        ppd: DEFAULT_PPD,
        plot: false,
        plot_width: 100,
        plot_height: 25,
        export_json: None,
        results_path: None,
    }
}

fn bounds_from_args(bounds: Option<&[f64]>) -> Result<Option<(f64, f64)>, AppError> {
    match bounds {
        None => Ok(None),
        Some(&[fmin, fmax]) if fmin < fmax => Ok(Some((fmin, fmax))),
        Some(other) => Err(AppError::input(format!(
            "--bounds expects FMIN < FMAX, got {other:?}."
        ))),
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<RunConfig, AppError> {
    if !(args.conf_level > 0.0 && args.conf_level < 1.0) {
        return Err(AppError::input(format!(
            "Confidence level must be in (0, 1), got {}.",
            args.conf_level
        )));
    }
    Ok(RunConfig {
        model: args.model,
        lp_filter: args.lp_filter,
        lp_fixed: args.lp_fixed,
        f3db: args.f3db,
        alpha: args.alpha,
        aliasing: args.aliasing,
        n_alias: args.n_alias,
        debias: !args.no_debias,
        bounds: bounds_from_args(args.bounds.as_deref())?,
        dynamic_bounds: args.dynamic_bounds,
        f_exclude: args.exclude.clone(),
        use_heights: args.use_heights,
        collective: args.collective,
        conf_level: args.conf_level,
        ppd: args.ppd,
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_json: args.export_json.clone(),
        results_path: args.results.clone(),
        ..base_config(&args.input)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_args_map_to_config() {
        let cli = Cli::parse_from([
            "psdfit", "fit", "--data", "m.dat", "--bounds", "10", "5000", "--no-debias", "--no-plot",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args).unwrap();
        assert_eq!(config.bounds, Some((10.0, 5000.0)));
        assert!(!config.debias);
        assert!(!config.plot);
        assert_eq!(config.ppd, DEFAULT_PPD);
        assert!(config.params_path.is_none());
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        assert_eq!(bounds_from_args(Some(&[100.0, 10.0])).unwrap_err().exit_code(), 2);
        assert_eq!(bounds_from_args(None).unwrap(), None);
    }
}
