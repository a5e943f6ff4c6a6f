//! Shared domain types.
//!
//! These types are kept small and serializable so they can be used in-memory
//! during fitting, exported to JSON/INI, and parsed from CLI flags.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Direction of a measurement axis relative to the optical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Lateral,
    Axial,
}

impl Direction {
    /// Axis names containing `z` are taken to be axial.
    pub fn from_axis_name(name: &str) -> Self {
        if name.contains('z') {
            Direction::Axial
        } else {
            Direction::Lateral
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Direction::Lateral => "lateral",
            Direction::Axial => "axial",
        }
    }

    pub fn is_lateral(self) -> bool {
        self == Direction::Lateral
    }
}

/// Physical PSD model used by the iterative fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `D / (π² (f² + f_c²))`.
    #[default]
    Lorentzian,
    /// Hydrodynamically correct PSD (frequency-dependent drag + inertia).
    Hydro,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Lorentzian => "lorentzian",
            ModelKind::Hydro => "hydro",
        }
    }

    /// Resolve a model name; unknown names are rejected.
    pub fn from_name(name: &str) -> Result<Self, AppError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lorentzian" => Ok(ModelKind::Lorentzian),
            "hydro" => Ok(ModelKind::Hydro),
            other => Err(AppError::input(format!(
                "Unknown PSD model '{other}' (expected 'lorentzian' or 'hydro')."
            ))),
        }
    }
}

/// Wall correction applied to the Stokes drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WallCorrection {
    /// Faxén's law for a single planar wall.
    SingleWall,
    /// Oseen superposition of two Faxén corrections (sample chamber of finite depth).
    TwoWalls,
}

/// A non-fatal condition worth reporting to the caller.
///
/// Diagnostics are returned from the operation that produced them and are
/// also emitted as `tracing` warnings at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Where the condition arose, e.g. the axis name or `"load"`.
    pub context: String,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic and log it at warn level.
    pub fn warn(context: impl Into<String>, message: impl Into<String>) -> Self {
        let diagnostic = Self {
            context: context.into(),
            message: message.into(),
        };
        tracing::warn!(context = %diagnostic.context, "{}", diagnostic.message);
        diagnostic
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.context, self.message)
    }
}

/// A full `psdfit fit` run as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_path: PathBuf,
    /// Parameter file; derived from the data file name when `None`.
    pub params_path: Option<PathBuf>,
    /// Axes to fit; all axes when `None`.
    pub names: Option<Vec<String>>,

    pub model: ModelKind,
    pub lp_filter: bool,
    pub lp_fixed: bool,
    pub f3db: Option<f64>,
    pub alpha: Option<f64>,
    pub aliasing: bool,
    pub n_alias: usize,
    pub debias: bool,

    pub bounds: Option<(f64, f64)>,
    pub dynamic_bounds: bool,
    pub f_exclude: Vec<f64>,
    pub use_heights: bool,
    pub collective: bool,
    /// Only run the closed-form Lorentzian fits.
    pub analytical_only: bool,

    pub conf_level: f64,
    /// Points per decade of the analytical frequency-window search.
    pub ppd: usize,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_json: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_axis_name() {
        assert_eq!(Direction::from_axis_name("x"), Direction::Lateral);
        assert_eq!(Direction::from_axis_name("z"), Direction::Axial);
        assert_eq!(Direction::from_axis_name("qpd_z2"), Direction::Axial);
        assert!(Direction::from_axis_name("y").is_lateral());
    }

    #[test]
    fn model_names_resolve_and_unknown_fails() {
        assert_eq!(ModelKind::from_name("Hydro").unwrap(), ModelKind::Hydro);
        assert_eq!(ModelKind::from_name(" lorentzian ").unwrap(), ModelKind::Lorentzian);
        let err = ModelKind::from_name("gaussian").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
