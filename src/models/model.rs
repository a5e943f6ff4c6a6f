//! PSD model evaluation.
//!
//! A [`PsdModel`] is a base spectrum (Lorentzian, hydrodynamic or a
//! caller-supplied function of `(f, D, f_c)`) optionally multiplied by a
//! first-order low-pass filter and optionally summed over aliased copies at
//! `f + n·f_sample`, `n ∈ [-N, N]`.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use crate::domain::{Direction, ModelKind};
use crate::error::AppError;
use crate::physics::{drag_ratio, effective_mass, stokes_drag};
use crate::psd::ExperimentalSetting;

/// Default number of aliased copies on each side.
pub const DEFAULT_N_ALIAS: usize = 9;

/// Lorentzian one-sided PSD `D / (π² (f² + f_c²))`.
pub fn lorentzian_psd(f: f64, d: f64, fc: f64) -> f64 {
    d / (PI * PI * (f * f + fc * fc))
}

/// Relative PSD of a signal that, to a factor `1 − α²`, passed a first-order
/// low-pass filter.
pub fn low_pass_filter(f: f64, f3db: f64, alpha: f64) -> f64 {
    let a2 = alpha * alpha;
    a2 + (1.0 - a2) / (1.0 + (f / f3db).powi(2))
}

/// Physical parameters entering the hydrodynamically correct PSD (SI).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HydroParams {
    pub radius: f64,
    pub viscosity: f64,
    pub density_medium: f64,
    pub density_particle: f64,
    /// Bead centre to surface; `f64::INFINITY` disables the wall term.
    pub height: f64,
    pub direction: Direction,
}

impl HydroParams {
    /// Parameters of `setting`; the height is ignored unless `use_height`.
    pub fn from_setting(setting: &ExperimentalSetting, direction: Direction, use_height: bool) -> Self {
        Self {
            radius: setting.radius(),
            viscosity: setting.viscosity(),
            density_medium: setting.density_medium(),
            density_particle: setting.density_particle(),
            height: if use_height { setting.height() } else { f64::INFINITY },
            direction,
        }
    }
}

/// Hydrodynamically correct PSD of a sphere including frequency-dependent
/// drag, the wall term and the inertia of sphere plus entrained fluid.
pub fn hydro_psd(f: f64, d: f64, fc: f64, p: &HydroParams) -> f64 {
    let rel = drag_ratio(f, p.radius, p.viscosity, p.density_medium, p.height, p.direction);
    let gamma0 = stokes_drag(p.radius, p.viscosity);
    let f_m0 = gamma0 / (2.0 * PI * effective_mass(p.radius, p.density_particle, p.density_medium));
    let a = fc + f * rel.im - f * f / f_m0;
    let b = f * rel.re;
    d * rel.re / (PI * PI * (a * a + b * b))
}

/// Caller-supplied base spectrum `(f, D, f_c) -> psd`.
pub type CustomModelFn = Arc<dyn Fn(f64, f64, f64) -> f64 + Send + Sync>;

#[derive(Clone)]
pub enum BaseModel {
    Lorentzian,
    Hydro(HydroParams),
    Custom { name: String, fun: CustomModelFn },
}

impl BaseModel {
    pub fn name(&self) -> &str {
        match self {
            BaseModel::Lorentzian => ModelKind::Lorentzian.display_name(),
            BaseModel::Hydro(_) => ModelKind::Hydro.display_name(),
            BaseModel::Custom { name, .. } => name,
        }
    }

    fn eval(&self, f: f64, d: f64, fc: f64) -> f64 {
        match self {
            BaseModel::Lorentzian => lorentzian_psd(f, d, fc),
            BaseModel::Hydro(p) => hydro_psd(f, d, fc, p),
            BaseModel::Custom { fun, .. } => fun(f, d, fc),
        }
    }
}

impl fmt::Debug for BaseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseModel::Lorentzian => write!(f, "Lorentzian"),
            BaseModel::Hydro(p) => f.debug_tuple("Hydro").field(p).finish(),
            BaseModel::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish_non_exhaustive(),
        }
    }
}

/// Parameter values a model is evaluated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub d: f64,
    pub fc: f64,
    /// Only used with the low-pass filter.
    pub f3db: f64,
    pub alpha: f64,
}

/// How to assemble a model.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub lp_filter: bool,
    /// Keep `f3dB` and `alpha` at their initial values during a fit.
    pub lp_fixed: bool,
    pub aliasing: bool,
    /// Required with `aliasing`.
    pub f_sample: Option<f64>,
    /// Aliased copies on each side; [`DEFAULT_N_ALIAS`] when `None`.
    pub n_alias: Option<usize>,
    /// Required for the hydrodynamic model.
    pub hydro: Option<HydroParams>,
}

#[derive(Debug, Clone)]
pub struct PsdModel {
    base: BaseModel,
    lp_filter: bool,
    lp_fixed: bool,
    /// `(f_sample, N)`
    aliasing: Option<(f64, usize)>,
}

impl PsdModel {
    pub fn new(base: BaseModel, options: &ModelOptions) -> Result<Self, AppError> {
        let aliasing = if options.aliasing {
            let Some(fs) = options.f_sample else {
                return Err(AppError::input("Aliasing needs the sampling frequency."));
            };
            if !(fs.is_finite() && fs > 0.0) {
                return Err(AppError::input(format!("Sampling frequency must be positive, got {fs}.")));
            }
            Some((fs, options.n_alias.unwrap_or(DEFAULT_N_ALIAS)))
        } else {
            None
        };
        Ok(Self {
            base,
            lp_filter: options.lp_filter,
            lp_fixed: options.lp_fixed,
            aliasing,
        })
    }

    /// Model with a caller-supplied base spectrum.
    pub fn custom(name: impl Into<String>, fun: CustomModelFn, options: &ModelOptions) -> Result<Self, AppError> {
        Self::new(BaseModel::Custom { name: name.into(), fun }, options)
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    pub fn lp_filter(&self) -> bool {
        self.lp_filter
    }

    pub fn lp_fixed(&self) -> bool {
        self.lp_fixed
    }

    pub fn aliasing(&self) -> Option<(f64, usize)> {
        self.aliasing
    }

    /// e.g. `"aliased lp-filtered lorentzian"`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.aliasing.is_some() {
            parts.push("aliased");
        }
        if self.lp_filter {
            parts.push("lp-filtered");
        }
        parts.push(self.base.name());
        parts.join(" ")
    }

    fn eval_filtered(&self, f: f64, p: &ModelParams) -> f64 {
        let psd = self.base.eval(f, p.d, p.fc);
        if self.lp_filter {
            psd * low_pass_filter(f, p.f3db, p.alpha)
        } else {
            psd
        }
    }

    pub fn eval(&self, f: f64, p: &ModelParams) -> f64 {
        match self.aliasing {
            None => self.eval_filtered(f, p),
            Some((fs, n)) => {
                let n = n as i64;
                (-n..=n).map(|i| self.eval_filtered(f + i as f64 * fs, p)).sum()
            }
        }
    }

    /// `1 / model`, the quantity the single-axis fit works on.
    pub fn eval_inv(&self, f: f64, p: &ModelParams) -> f64 {
        1.0 / self.eval(f, p)
    }

    pub fn eval_all(&self, freq: &[f64], p: &ModelParams) -> Vec<f64> {
        freq.iter().map(|&f| self.eval(f, p)).collect()
    }
}

/// Assemble a named model. Unknown names and a hydrodynamic model without
/// physical parameters fail.
pub fn gen_model_fun(name: &str, options: &ModelOptions) -> Result<PsdModel, AppError> {
    let base = match ModelKind::from_name(name)? {
        ModelKind::Lorentzian => BaseModel::Lorentzian,
        ModelKind::Hydro => {
            let Some(hydro) = options.hydro else {
                return Err(AppError::input("The hydro model needs the physical parameters of the setting."));
            };
            BaseModel::Hydro(hydro)
        }
    };
    PsdModel::new(base, options)
}
