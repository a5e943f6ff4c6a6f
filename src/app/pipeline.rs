//! Shared "fit pipeline" logic used by the `fit` and `analyze` commands.
//!
//! load -> mask -> analytical fits -> setup -> (collective) fit -> calibration
//!
//! The command handlers can then focus on presentation.

use crate::domain::{Diagnostic, RunConfig};
use crate::error::AppError;
use crate::fit::{CollectiveOptions, FitPsdOptions, FitSetup, PsdFit};
use crate::io::load_measurement;

/// All computed outputs of a single `psdfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fit: PsdFit,
    /// Warnings raised before fitting (loading, masking).
    pub load_diagnostics: Vec<Diagnostic>,
    /// Display name of the data source.
    pub source: String,
}

impl RunOutput {
    /// Load and fit diagnostics together.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.load_diagnostics.iter().chain(self.fit.diagnostics()).cloned().collect()
    }
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &RunConfig) -> Result<RunOutput, AppError> {
    // 1) Load the measurement.
    let (measurement, mut load_diagnostics) = load_measurement(&config.data_path, config.params_path.as_deref())?;
    let source = config.data_path.display().to_string();
    let mut fit = PsdFit::new(measurement, config.conf_level);
    let names = config.names.as_deref();

    // 2) Closed-form fits for start values (and the only result of `analyze`).
    if config.analytical_only {
        if let Some((fmin, fmax)) = config.bounds {
            fit.measurement_mut().exclude_freq_outside(fmin, fmax, names, true)?;
        }
        fit.analytical_lorentzian_fit(names, config.ppd)?;
        return Ok(RunOutput {
            fit,
            load_diagnostics,
            source,
        });
    }
    fit.analytical_lorentzian_fit(names, config.ppd)?;

    // 3) Iterative fits.
    if config.collective {
        if let Some((fmin, fmax)) = config.bounds {
            fit.measurement_mut().exclude_freq_outside(fmin, fmax, names, true)?;
        }
        if !config.f_exclude.is_empty() {
            load_diagnostics.extend(fit.measurement_mut().exclude_freq(&config.f_exclude, names)?);
        }
        let options = CollectiveOptions {
            model: config.model,
            aliasing: config.aliasing,
            n_alias: config.n_alias,
            f3db: config.f3db,
            alpha: config.alpha,
            use_heights: config.use_heights,
        };
        fit.collective_psd_fit(names, &options)?;
        fit.calc_pc_results(names)?;
        fit.calc_ac_results_if_complete();
    } else {
        fit.setup_fit(names, fit_setup(config))?;
        let options = FitPsdOptions {
            dynamic_bounds: config.dynamic_bounds,
            bounds: config.bounds,
            f_exclude: config.f_exclude.clone(),
            use_heights: config.use_heights,
        };
        fit.fit_psds(names, &options)?;
    }

    Ok(RunOutput {
        fit,
        load_diagnostics,
        source,
    })
}

fn fit_setup(config: &RunConfig) -> FitSetup {
    FitSetup {
        model: config.model,
        lp_filter: config.lp_filter,
        lp_fixed: config.lp_fixed,
        f3db: config.f3db,
        alpha: config.alpha,
        aliasing: config.aliasing,
        n_alias: config.n_alias,
        debias: config.debias,
        ..FitSetup::default()
    }
}
