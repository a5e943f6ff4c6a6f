//! Registry of named physical units.
//!
//! All quantities are stored in SI internally. Accessors take an optional
//! target [`Unit`]; conversion is multiplicative (`value_si / unit.factor`) and
//! fails when the unit's dimension does not match the quantity.
//!
//! Temperature is not multiplicative (°C has an offset) and is handled by
//! [`TemperatureUnit`].

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Physical dimension of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Dimensionless,
    Frequency,
    Time,
    Length,
    Voltage,
    /// Detector signal power, V².
    SignalPower,
    /// One-sided PSD of the detector signal, V²/Hz.
    SignalPsd,
    /// Diffusion constant of the detector signal, V²/s.
    SignalDiffusion,
    /// Diffusion constant in physical space, m²/s.
    Diffusion,
    Viscosity,
    Density,
    Drag,
    Stiffness,
    /// Displacement sensitivity, m/V.
    Sensitivity,
    /// Force per detector volt, N/V.
    ForceFactor,
    Force,
}

/// A named unit: dimension plus the factor that converts it to SI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    name: &'static str,
    dimension: Dimension,
    factor: f64,
}

const fn unit(name: &'static str, dimension: Dimension, factor: f64) -> Unit {
    Unit {
        name,
        dimension,
        factor,
    }
}

impl Unit {
    pub const ONE: Unit = unit("1", Dimension::Dimensionless, 1.0);

    pub const HZ: Unit = unit("Hz", Dimension::Frequency, 1.0);
    pub const KHZ: Unit = unit("kHz", Dimension::Frequency, 1e3);
    pub const SECOND: Unit = unit("s", Dimension::Time, 1.0);

    pub const METER: Unit = unit("m", Dimension::Length, 1.0);
    pub const UM: Unit = unit("um", Dimension::Length, 1e-6);
    pub const NM: Unit = unit("nm", Dimension::Length, 1e-9);

    pub const VOLT: Unit = unit("V", Dimension::Voltage, 1.0);
    pub const V2: Unit = unit("V**2", Dimension::SignalPower, 1.0);
    pub const V2_PER_HZ: Unit = unit("V**2/Hz", Dimension::SignalPsd, 1.0);
    pub const V2_PER_S: Unit = unit("V**2/s", Dimension::SignalDiffusion, 1.0);
    pub const M2_PER_S: Unit = unit("m**2/s", Dimension::Diffusion, 1.0);

    pub const PA_S: Unit = unit("Pa*s", Dimension::Viscosity, 1.0);
    pub const KG_PER_M3: Unit = unit("kg/m**3", Dimension::Density, 1.0);

    pub const N_S_PER_M: Unit = unit("N*s/m", Dimension::Drag, 1.0);
    pub const NN_S_PER_M: Unit = unit("nN*s/m", Dimension::Drag, 1e-9);
    pub const N_PER_M: Unit = unit("N/m", Dimension::Stiffness, 1.0);
    pub const PN_PER_NM: Unit = unit("pN/nm", Dimension::Stiffness, 1e-3);
    pub const M_PER_V: Unit = unit("m/V", Dimension::Sensitivity, 1.0);
    pub const NM_PER_MV: Unit = unit("nm/mV", Dimension::Sensitivity, 1e-6);
    pub const N_PER_V: Unit = unit("N/V", Dimension::ForceFactor, 1.0);
    pub const PN_PER_MV: Unit = unit("pN/mV", Dimension::ForceFactor, 1e-9);
    pub const NEWTON: Unit = unit("N", Dimension::Force, 1.0);

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Factor converting a value in this unit to SI.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Look up a unit by name (`"um"`, `"µm"`, `"V^2/Hz"`, `"pN/nm"`, ...).
    pub fn parse(name: &str) -> Result<Unit, AppError> {
        let key = normalize(name);
        let key = ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(key);
        REGISTRY
            .iter()
            .find(|u| u.name == key)
            .copied()
            .ok_or_else(|| AppError::input(format!("Unknown unit '{name}'.")))
    }

    pub fn to_si(&self, value: f64) -> f64 {
        value * self.factor
    }

    pub fn from_si(&self, value_si: f64) -> f64 {
        value_si / self.factor
    }

    /// Convert `value` given in `self` into `target`.
    pub fn convert(&self, value: f64, target: Unit) -> Result<f64, AppError> {
        if self.dimension != target.dimension {
            return Err(dimension_error(target, self.dimension));
        }
        Ok(value * self.factor / target.factor)
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Express an SI value of the given dimension in `unit` (SI when `None`).
pub fn express(value_si: f64, dimension: Dimension, unit: Option<Unit>) -> Result<f64, AppError> {
    match unit {
        None => Ok(value_si),
        Some(u) if u.dimension == dimension => Ok(u.from_si(value_si)),
        Some(u) => Err(dimension_error(u, dimension)),
    }
}

/// Convert every element of an SI vector into `unit`.
pub fn express_all(values_si: &[f64], dimension: Dimension, unit: Option<Unit>) -> Result<Vec<f64>, AppError> {
    let factor = express(1.0, dimension, unit)?;
    Ok(values_si.iter().map(|v| v * factor).collect())
}

/// Convert a value given in `unit` into SI, checking the dimension.
pub fn to_si(value: f64, dimension: Dimension, unit: Unit) -> Result<f64, AppError> {
    if unit.dimension != dimension {
        return Err(dimension_error(unit, dimension));
    }
    Ok(unit.to_si(value))
}

fn dimension_error(unit: Unit, expected: Dimension) -> AppError {
    AppError::input(format!(
        "Unit '{}' has dimension {:?}, expected {:?}.",
        unit.name, unit.dimension, expected
    ))
}

fn normalize(name: &str) -> String {
    name.trim()
        .replace(' ', "")
        .replace('^', "**")
        .replace('µ', "u")
        .replace('μ', "u")
}

const REGISTRY: &[Unit] = &[
    Unit::ONE,
    Unit::HZ,
    Unit::KHZ,
    unit("MHz", Dimension::Frequency, 1e6),
    Unit::SECOND,
    unit("ms", Dimension::Time, 1e-3),
    unit("us", Dimension::Time, 1e-6),
    Unit::METER,
    unit("mm", Dimension::Length, 1e-3),
    Unit::UM,
    Unit::NM,
    Unit::VOLT,
    unit("mV", Dimension::Voltage, 1e-3),
    Unit::V2,
    unit("mV**2", Dimension::SignalPower, 1e-6),
    Unit::V2_PER_HZ,
    unit("mV**2/Hz", Dimension::SignalPsd, 1e-6),
    Unit::V2_PER_S,
    unit("mV**2/s", Dimension::SignalDiffusion, 1e-6),
    Unit::M2_PER_S,
    unit("um**2/s", Dimension::Diffusion, 1e-12),
    unit("nm**2/s", Dimension::Diffusion, 1e-18),
    Unit::PA_S,
    unit("mPa*s", Dimension::Viscosity, 1e-3),
    Unit::KG_PER_M3,
    unit("g/cm**3", Dimension::Density, 1e3),
    Unit::N_S_PER_M,
    Unit::NN_S_PER_M,
    unit("pN*s/nm", Dimension::Drag, 1e-3),
    Unit::N_PER_M,
    Unit::PN_PER_NM,
    unit("pN/um", Dimension::Stiffness, 1e-6),
    Unit::M_PER_V,
    unit("nm/V", Dimension::Sensitivity, 1e-9),
    unit("um/V", Dimension::Sensitivity, 1e-6),
    Unit::NM_PER_MV,
    Unit::N_PER_V,
    unit("pN/V", Dimension::ForceFactor, 1e-12),
    Unit::PN_PER_MV,
    Unit::NEWTON,
    unit("pN", Dimension::Force, 1e-12),
];

const ALIASES: &[(&str, &str)] = &[
    ("hz", "Hz"),
    ("hertz", "Hz"),
    ("second", "s"),
    ("meter", "m"),
    ("micrometer", "um"),
    ("micron", "um"),
    ("nanometer", "nm"),
    ("V**2*s", "V**2/Hz"),
    ("kg/m3", "kg/m**3"),
];

/// Temperature scale. Temperature differences (errors) convert without offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Kelvin,
    Celsius,
}

impl TemperatureUnit {
    const ZERO_CELSIUS: f64 = 273.15;

    pub fn parse(name: &str) -> Result<Self, AppError> {
        match normalize(name).to_ascii_lowercase().as_str() {
            "k" | "kelvin" => Ok(TemperatureUnit::Kelvin),
            "c" | "degc" | "celsius" | "°c" | "degree_celsius" => Ok(TemperatureUnit::Celsius),
            _ => Err(AppError::input(format!("Unknown temperature unit '{name}'."))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TemperatureUnit::Kelvin => "K",
            TemperatureUnit::Celsius => "degC",
        }
    }

    pub fn to_kelvin(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Kelvin => value,
            TemperatureUnit::Celsius => value + Self::ZERO_CELSIUS,
        }
    }

    pub fn from_kelvin(self, kelvin: f64) -> f64 {
        match self {
            TemperatureUnit::Kelvin => kelvin,
            TemperatureUnit::Celsius => kelvin - Self::ZERO_CELSIUS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_spellings() {
        assert_eq!(Unit::parse("µm").unwrap(), Unit::UM);
        assert_eq!(Unit::parse("V^2/Hz").unwrap(), Unit::V2_PER_HZ);
        assert_eq!(Unit::parse(" pN/nm ").unwrap(), Unit::PN_PER_NM);
        assert!(Unit::parse("furlong").is_err());
    }

    #[test]
    fn conversion_is_multiplicative_and_checks_dimension() {
        let v = Unit::UM.convert(1.5, Unit::NM).unwrap();
        assert!((v - 1500.0).abs() < 1e-9);
        assert!(Unit::UM.convert(1.0, Unit::HZ).is_err());

        let k = express(2e-4, Dimension::Stiffness, Some(Unit::PN_PER_NM)).unwrap();
        assert!((k - 0.2).abs() < 1e-12);
        assert!(express(1.0, Dimension::Drag, Some(Unit::NM)).is_err());
        assert_eq!(express(3.0, Dimension::Drag, None).unwrap(), 3.0);
    }

    #[test]
    fn temperature_offsets() {
        let c = TemperatureUnit::parse("celsius").unwrap();
        assert!((c.to_kelvin(25.0) - 298.15).abs() < 1e-12);
        assert!((c.from_kelvin(273.15)).abs() < 1e-12);
        assert_eq!(TemperatureUnit::parse("K").unwrap(), TemperatureUnit::Kelvin);
    }
}
