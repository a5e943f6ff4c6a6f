//! Physical parameters of one measurement.
//!
//! The setting stores SI values (K, m, kg/m³, Pa·s). Medium properties are
//! derived from the temperature: water uses the built-in viscosity/density
//! formulas, a custom medium supplies either constants or functions of
//! temperature. Every setter re-derives the dependent quantities.

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::physics::{Material, density_h2o, dviscosity_h2o, viscosity_h2o};
use crate::units::{self, Dimension, TemperatureUnit, Unit};

/// A medium property given as a constant or as a function of temperature (K).
#[derive(Debug, Clone, Copy)]
pub enum PropertySource {
    Constant(f64),
    TemperatureFunction(fn(f64) -> f64),
}

impl PropertySource {
    pub fn eval(&self, temp_k: f64) -> f64 {
        match self {
            PropertySource::Constant(v) => *v,
            PropertySource::TemperatureFunction(f) => f(temp_k),
        }
    }
}

/// Error of the viscosity: a constant or `|dη/dT · ΔT|` from a derivative.
#[derive(Debug, Clone, Copy)]
pub enum ErrorSource {
    Constant(f64),
    Derivative(fn(f64) -> f64),
}

impl ErrorSource {
    pub fn eval(&self, temp_k: f64, temp_err_k: f64) -> f64 {
        match self {
            ErrorSource::Constant(v) => *v,
            ErrorSource::Derivative(d) => (d(temp_k) * temp_err_k).abs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomMedium {
    pub name: String,
    /// kg/m³
    pub density: PropertySource,
    /// Pa·s
    pub viscosity: PropertySource,
    /// Pa·s
    pub viscosity_err: ErrorSource,
}

#[derive(Debug, Clone)]
pub enum Medium {
    Water,
    Custom(CustomMedium),
}

impl Medium {
    /// Resolve a medium by name. Anything but water needs density and
    /// viscosity.
    pub fn resolve(
        name: &str,
        density: Option<PropertySource>,
        viscosity: Option<PropertySource>,
        viscosity_err: ErrorSource,
    ) -> Result<Self, AppError> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() || key == "water" || key == "h2o" {
            return Ok(Medium::Water);
        }
        match (density, viscosity) {
            (Some(density), Some(viscosity)) => Ok(Medium::Custom(CustomMedium {
                name: name.trim().to_string(),
                density,
                viscosity,
                viscosity_err,
            })),
            _ => Err(AppError::input(format!(
                "You need to specify density and viscosity of the medium \"{name}\"."
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Medium::Water => "water",
            Medium::Custom(c) => &c.name,
        }
    }

    pub fn is_water(&self) -> bool {
        matches!(self, Medium::Water)
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentalSetting {
    temp: f64,
    temp_err: f64,
    radius: f64,
    radius_err: f64,
    height: f64,
    material: Material,
    medium: Medium,
    density_medium: f64,
    viscosity: f64,
    viscosity_err: f64,
}

impl ExperimentalSetting {
    /// Setting in water with a polystyrene bead, far from any surface.
    pub fn new(temp_k: f64, radius_m: f64) -> Result<Self, AppError> {
        validate_temp(temp_k)?;
        validate_radius(radius_m)?;
        let mut setting = Self {
            temp: temp_k,
            temp_err: 0.0,
            radius: radius_m,
            radius_err: 0.0,
            height: f64::INFINITY,
            material: Material::polystyrene(),
            medium: Medium::Water,
            density_medium: 0.0,
            viscosity: 0.0,
            viscosity_err: 0.0,
        };
        setting.update_medium();
        Ok(setting)
    }

    /// Fallback used when a measurement has no setting: 25 °C, 0.5 µm radius.
    pub fn fallback() -> (Self, Diagnostic) {
        let setting = Self {
            temp: 298.15,
            temp_err: 0.0,
            radius: 0.5e-6,
            radius_err: 0.0,
            height: f64::INFINITY,
            material: Material::polystyrene(),
            medium: Medium::Water,
            density_medium: density_h2o(298.15),
            viscosity: viscosity_h2o(298.15),
            viscosity_err: 0.0,
        };
        let diagnostic = Diagnostic::warn(
            "setting",
            "No experimental setting given; assuming 25 degC, radius 0.5 um, polystyrene in water.",
        );
        (setting, diagnostic)
    }

    fn update_medium(&mut self) {
        match &self.medium {
            Medium::Water => {
                self.density_medium = density_h2o(self.temp);
                self.viscosity = viscosity_h2o(self.temp);
                self.viscosity_err = (dviscosity_h2o(self.temp) * self.temp_err).abs();
            }
            Medium::Custom(c) => {
                self.density_medium = c.density.eval(self.temp);
                self.viscosity = c.viscosity.eval(self.temp);
                self.viscosity_err = c.viscosity_err.eval(self.temp, self.temp_err);
            }
        }
    }

    // --- temperature -----------------------------------------------------

    /// Temperature in K.
    pub fn temp(&self) -> f64 {
        self.temp
    }

    pub fn get_temp(&self, unit: TemperatureUnit) -> f64 {
        unit.from_kelvin(self.temp)
    }

    pub fn set_temp(&mut self, value: f64, unit: TemperatureUnit) -> Result<(), AppError> {
        let temp = unit.to_kelvin(value);
        validate_temp(temp)?;
        self.temp = temp;
        self.update_medium();
        Ok(())
    }

    /// Temperature error in K (same in °C).
    pub fn temp_err(&self) -> f64 {
        self.temp_err
    }

    pub fn set_temp_err(&mut self, value: f64) -> Result<(), AppError> {
        validate_error("temperature", value)?;
        self.temp_err = value;
        self.update_medium();
        Ok(())
    }

    // --- radius ----------------------------------------------------------

    /// Bead radius in m.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn get_radius(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.radius, Dimension::Length, unit)
    }

    pub fn set_radius(&mut self, value: f64, unit: Unit) -> Result<(), AppError> {
        let radius = units::to_si(value, Dimension::Length, unit)?;
        validate_radius(radius)?;
        self.radius = radius;
        Ok(())
    }

    pub fn radius_err(&self) -> f64 {
        self.radius_err
    }

    pub fn get_radius_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.radius_err, Dimension::Length, unit)
    }

    pub fn set_radius_err(&mut self, value: f64, unit: Unit) -> Result<(), AppError> {
        let err = units::to_si(value, Dimension::Length, unit)?;
        validate_error("radius", err)?;
        self.radius_err = err;
        Ok(())
    }

    // --- height ----------------------------------------------------------

    /// Apparent height of the bead centre above the surface in m (∞ if unknown).
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn get_height(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.height, Dimension::Length, unit)
    }

    pub fn set_height(&mut self, value: f64, unit: Unit) -> Result<(), AppError> {
        let height = units::to_si(value, Dimension::Length, unit)?;
        if height.is_nan() || height <= 0.0 {
            return Err(AppError::input(format!("Height must be positive, got {value} {unit}.")));
        }
        self.height = height;
        Ok(())
    }

    // --- particle --------------------------------------------------------

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Particle density in kg/m³.
    pub fn density_particle(&self) -> f64 {
        self.material.density
    }

    /// Set the particle material; `density` in kg/m³ is used for unknown names.
    pub fn set_material(&mut self, name: &str, density: Option<f64>) -> Option<Diagnostic> {
        let (material, diagnostic) = Material::resolve(name, density);
        self.material = material;
        diagnostic
    }

    // --- medium ----------------------------------------------------------

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn set_medium(&mut self, medium: Medium) {
        self.medium = medium;
        self.update_medium();
    }

    /// Medium density in kg/m³.
    pub fn density_medium(&self) -> f64 {
        self.density_medium
    }

    pub fn get_density_medium(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.density_medium, Dimension::Density, unit)
    }

    /// Medium viscosity in Pa·s.
    pub fn viscosity(&self) -> f64 {
        self.viscosity
    }

    pub fn get_viscosity(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.viscosity, Dimension::Viscosity, unit)
    }

    pub fn viscosity_err(&self) -> f64 {
        self.viscosity_err
    }

    pub fn get_viscosity_err(&self, unit: Option<Unit>) -> Result<f64, AppError> {
        units::express(self.viscosity_err, Dimension::Viscosity, unit)
    }
}

fn validate_temp(temp_k: f64) -> Result<(), AppError> {
    if temp_k.is_finite() && temp_k > 0.0 {
        Ok(())
    } else {
        Err(AppError::input(format!("Temperature must be above 0 K, got {temp_k} K.")))
    }
}

fn validate_radius(radius: f64) -> Result<(), AppError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(AppError::input(format!("Bead radius must be positive, got {radius} m.")))
    }
}

fn validate_error(what: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::input(format!("The {what} error must be >= 0, got {value}.")))
    }
}
