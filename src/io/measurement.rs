//! Two-file measurement format: `<stem>.dat` holds the spectra,
//! `<stem>_psd_parameters.txt` the setting and acquisition parameters.

use std::path::{Path, PathBuf};

use crate::domain::Diagnostic;
use crate::error::AppError;
use crate::io::data::{DataTable, read_data_file, write_data_file};
use crate::io::params::{DEFAULT_SECTION, Ini};
use crate::psd::{ErrorSource, ExperimentalSetting, Medium, PropertySource, Psd, PsdMeasurement, Selection};
use crate::units::{self, Dimension, TemperatureUnit, Unit};

pub const DATA_EXTENSION: &str = "dat";
pub const PARAMS_SUFFIX: &str = "_psd_parameters.txt";
const AC_SECTION: &str = "ACTIVE_CALIBRATION";

/// Default temperature when the parameter file has none (°C).
const FALLBACK_TEMP_C: f64 = 25.0;
const FALLBACK_TEMP_ERR: f64 = 2.5;

/// Paths written by [`save_measurement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub data: PathBuf,
    pub params: PathBuf,
}

/// `_psd_measurement_<YYYY-mm-dd_HH-MM>` from the local clock.
pub fn default_stem() -> String {
    format!("_psd_measurement_{}", chrono::Local::now().format("%Y-%m-%d_%H-%M"))
}

/// Parameter file belonging to `data_path`.
pub fn params_path_for(data_path: &Path) -> PathBuf {
    let stem = data_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    data_path.with_file_name(format!("{stem}{PARAMS_SUFFIX}"))
}

/// Write `m` into `dir` as `<stem>.dat` plus parameter file.
///
/// All axes must share one frequency vector.
pub fn save_measurement(
    m: &PsdMeasurement,
    dir: &Path,
    stem: Option<&str>,
    include_errors: bool,
) -> Result<SavedFiles, AppError> {
    let names = m.names();
    let Some(first) = names.first() else {
        return Err(AppError::insufficient("Nothing to save: the measurement has no PSDs."));
    };
    let all = Selection::all().with_offset();
    let freq = m.get_freq(first, None, all)?;
    for name in &names[1..] {
        if m.get_freq(name, None, all)? != freq {
            return Err(AppError::input("Frequency vectors of the axes differ; cannot save them into one file."));
        }
    }

    let mut table = DataTable::new();
    table.push("freq", freq)?;
    for name in &names {
        table.push(format!("psd_{name}"), m.get_psd(name, None, all)?)?;
    }
    if include_errors {
        for name in &names {
            table.push(format!("err_{name}"), m.get_err(name, None, all)?)?;
        }
    }

    let stem = stem.map_or_else(default_stem, str::to_string);
    let data = dir.join(format!("{stem}.{DATA_EXTENSION}"));
    let params = dir.join(format!("{stem}{PARAMS_SUFFIX}"));
    write_data_file(&data, &table)?;
    parameter_document(m)?.write(&params)?;
    tracing::info!(data = %data.display(), params = %params.display(), "measurement saved");
    Ok(SavedFiles { data, params })
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn parameter_document(m: &PsdMeasurement) -> Result<Ini, AppError> {
    let mut ini = Ini::new();
    let d = DEFAULT_SECTION;
    let names = m.names();
    ini.set(d, "names", names.join(","));
    ini.set(d, "n_avg", join(m.psds().map(|(_, p)| p.n_avg())));
    ini.set(d, "sampling_rate", join(m.psds().map(|(_, p)| p.f_sample())));
    ini.set(d, "freq_unit", Unit::HZ);
    ini.set(d, "psd_unit", Unit::V2_PER_HZ);

    let s = m.setting();
    ini.set(d, "temperature", s.temp());
    ini.set(d, "temperature_err", s.temp_err());
    ini.set(d, "temperature_unit", TemperatureUnit::Kelvin.name());
    ini.set(d, "radius", s.radius());
    ini.set(d, "radius_err", s.radius_err());
    ini.set(d, "radius_unit", Unit::METER);
    ini.set(d, "height", s.height());
    ini.set(d, "height_unit", Unit::METER);
    ini.set(d, "material", &s.material().name);
    if !s.material().is_known() {
        ini.set(d, "density_particle", s.density_particle());
        ini.set(d, "density_particle_unit", Unit::KG_PER_M3);
    }
    ini.set(d, "medium", s.medium().name());
    if !s.medium().is_water() {
        // Temperature functions are frozen to their current value.
        ini.set(d, "density_medium", s.density_medium());
        ini.set(d, "density_medium_unit", Unit::KG_PER_M3);
        ini.set(d, "viscosity", s.viscosity());
        ini.set(d, "viscosity_err", s.viscosity_err());
        ini.set(d, "viscosity_unit", Unit::PA_S);
    }

    if let Some(ac) = m.active_calibration() {
        ini.set(AC_SECTION, "excitation_axis", &ac.axis);
        ini.set(AC_SECTION, "excitation_frequency", ac.frequency);
        ini.set(AC_SECTION, "excitation_amplitude", ac.amplitude);
        ini.set(AC_SECTION, "excitation_amplitude_err", ac.amplitude_err);
        ini.set(AC_SECTION, "amplitude_unit", Unit::METER);
        ini.set(AC_SECTION, "excitation_power", ac.power);
        ini.set(AC_SECTION, "excitation_power_err", ac.power_err);
        ini.set(AC_SECTION, "power_unit", Unit::V2);
    }
    Ok(ini)
}

/// Load a measurement from its data file and parameter file (derived from
/// the data file name when `params_path` is `None`).
pub fn load_measurement(
    data_path: &Path,
    params_path: Option<&Path>,
) -> Result<(PsdMeasurement, Vec<Diagnostic>), AppError> {
    let params_path = params_path.map_or_else(|| params_path_for(data_path), Path::to_path_buf);
    let table = read_data_file(data_path)?;
    let ini = Ini::read(&params_path)?;
    let mut diagnostics = Vec::new();

    let section = DEFAULT_SECTION;
    let text = |key: &str, fallback: &str| ini.get(section, key).unwrap_or(fallback).to_string();

    let names: Vec<String> = match ini.get(section, "names") {
        Some(list) => list
            .split(',')
            .map(|n| n.trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect(),
        None => table
            .names()
            .filter_map(|c| c.strip_prefix("psd_"))
            .map(str::to_string)
            .collect(),
    };
    if names.is_empty() {
        return Err(AppError::input(format!("No axes found in '{}'.", data_path.display())));
    }

    let n_avg = per_axis(&ini, &["n_avg"], &names, &params_path)?
        .into_iter()
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| AppError::input(format!("n_avg must be a positive integer, got '{v}'.")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let f_sample = per_axis(&ini, &["sampling_rate", "f_sample"], &names, &params_path)?
        .into_iter()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| AppError::input(format!("Sampling rate must be a number, got '{v}'.")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let freq_unit = Unit::parse(&text("freq_unit", "Hz"))?;
    let psd_unit = Unit::parse(&text("psd_unit", "V**2/Hz"))?;

    let setting = load_setting(&ini, &params_path, &mut diagnostics)?;
    let mut m = PsdMeasurement::new(setting);

    let freq_raw = table
        .get("freq")
        .ok_or_else(|| AppError::input(format!("Data file '{}' has no 'freq' column.", data_path.display())))?;
    let freq = freq_raw
        .iter()
        .map(|&f| units::to_si(f, Dimension::Frequency, freq_unit))
        .collect::<Result<Vec<_>, _>>()?;
    let to_psd = |values: &[f64]| -> Result<Vec<f64>, AppError> {
        values.iter().map(|&v| units::to_si(v, Dimension::SignalPsd, psd_unit)).collect()
    };

    for (i, name) in names.iter().enumerate() {
        let Some(values) = table.get(&format!("psd_{name}")) else {
            diagnostics.push(Diagnostic::warn(name.as_str(), format!("PSD values for axis '{name}' not found.")));
            continue;
        };
        let err = table.get(&format!("err_{name}")).map(to_psd).transpose()?;
        let mut psd = Psd::new(name.as_str(), freq.clone(), to_psd(values)?, err, n_avg[i])?;
        let fs = units::to_si(f_sample[i], Dimension::Frequency, freq_unit)?;
        diagnostics.extend(psd.set_f_sample(fs, Unit::HZ)?);
        diagnostics.extend(m.add_psd(name, psd));
    }
    if m.is_empty() {
        return Err(AppError::insufficient(format!("No PSD could be loaded from '{}'.", data_path.display())));
    }

    if ini.has_section(AC_SECTION) {
        diagnostics.extend(load_active_calibration(&ini, &mut m)?);
    }

    tracing::info!(data = %data_path.display(), axes = m.len(), "measurement loaded");
    Ok((m, diagnostics))
}

/// Comma list with one entry per axis; a single value is broadcast.
fn per_axis(ini: &Ini, keys: &[&str], names: &[String], path: &Path) -> Result<Vec<String>, AppError> {
    let Some(raw) = ini.get_any(DEFAULT_SECTION, keys) else {
        return Err(AppError::input(format!(
            "Parameter '{}' missing in parameter file '{}'.",
            keys[0],
            path.display()
        )));
    };
    let values: Vec<String> = raw.split(',').map(|v| v.trim().to_string()).collect();
    match values.len() {
        1 => Ok(vec![values[0].clone(); names.len()]),
        n if n == names.len() => Ok(values),
        n => Err(AppError::input(format!(
            "Parameter '{}' has {n} values for {} axes.",
            keys[0],
            names.len()
        ))),
    }
}

fn load_setting(ini: &Ini, path: &Path, diagnostics: &mut Vec<Diagnostic>) -> Result<ExperimentalSetting, AppError> {
    let s = DEFAULT_SECTION;
    let unit = |key: &str, fallback: Unit| -> Result<Unit, AppError> {
        ini.get(s, key).map_or(Ok(fallback), Unit::parse)
    };

    let temp_unit = ini
        .get_any(s, &["temperature_unit", "temp_unit"])
        .map_or(Ok(TemperatureUnit::Celsius), TemperatureUnit::parse)?;
    let (temp, temp_err) = match ini.get_f64(s, &["temperature", "temp"])? {
        Some(t) => (t, ini.get_f64(s, &["temperature_err", "temp_err"])?.unwrap_or(FALLBACK_TEMP_ERR)),
        None => (
            temp_unit.from_kelvin(TemperatureUnit::Celsius.to_kelvin(FALLBACK_TEMP_C)),
            FALLBACK_TEMP_ERR,
        ),
    };

    let (radius, radius_err) = if let Some(r) = ini.get_f64(s, &["radius"])? {
        let u = unit("radius_unit", Unit::METER)?;
        let err = ini.get_f64(s, &["radius_err"])?.unwrap_or(0.0);
        (units::to_si(r, Dimension::Length, u)?, units::to_si(err, Dimension::Length, u)?)
    } else if let Some(dia) = ini.get_f64(s, &["bead_dia"])? {
        let u = unit("diameter_unit", Unit::METER)?;
        let err = ini.get_f64(s, &["err_bead_dia"])?.unwrap_or(0.0);
        (
            units::to_si(dia / 2.0, Dimension::Length, u)?,
            units::to_si(err / 2.0, Dimension::Length, u)?,
        )
    } else {
        return Err(AppError::input(format!(
            "Bead radius is not specified in parameter file '{}'.",
            path.display()
        )));
    };

    let mut setting = ExperimentalSetting::new(temp_unit.to_kelvin(temp), radius)?;
    setting.set_temp_err(temp_err)?;
    setting.set_radius_err(radius_err, Unit::METER)?;

    if let Some(h) = ini.get_f64(s, &["height"])? {
        setting.set_height(h, unit("height_unit", Unit::METER)?)?;
    }

    if let Some(material) = ini.get(s, "material") {
        let density = ini
            .get_f64(s, &["density_particle"])?
            .map(|v| units::to_si(v, Dimension::Density, unit("density_particle_unit", Unit::KG_PER_M3)?))
            .transpose()?;
        diagnostics.extend(setting.set_material(material, density));
    }

    let medium_name = ini.get(s, "medium").unwrap_or("water");
    let density = ini
        .get_f64(s, &["density_medium"])?
        .map(|v| units::to_si(v, Dimension::Density, unit("density_medium_unit", Unit::KG_PER_M3)?))
        .transpose()?;
    let viscosity_unit = unit("viscosity_unit", Unit::PA_S)?;
    let viscosity = ini
        .get_f64(s, &["viscosity"])?
        .map(|v| units::to_si(v, Dimension::Viscosity, viscosity_unit))
        .transpose()?;
    let viscosity_err = ini
        .get_f64(s, &["viscosity_err"])?
        .map(|v| units::to_si(v, Dimension::Viscosity, viscosity_unit))
        .transpose()?
        .unwrap_or(0.0);
    let medium = Medium::resolve(
        medium_name,
        density.map(PropertySource::Constant),
        viscosity.map(PropertySource::Constant),
        ErrorSource::Constant(viscosity_err),
    )?;
    setting.set_medium(medium);
    Ok(setting)
}

fn load_active_calibration(ini: &Ini, m: &mut PsdMeasurement) -> Result<Option<Diagnostic>, AppError> {
    let s = AC_SECTION;
    let Some(axis) = ini.get(s, "excitation_axis") else {
        return Err(AppError::input("Section [ACTIVE_CALIBRATION] lacks 'excitation_axis'."));
    };
    let required = |keys: &[&str]| -> Result<f64, AppError> {
        ini.get_f64(s, keys)?
            .ok_or_else(|| AppError::input(format!("Active calibration parameter '{}' missing.", keys[0])))
    };
    let freq = required(&["excitation_frequency"])?;
    let amplitude = required(&["excitation_amplitude"])?;
    let amplitude_err = ini.get_f64(s, &["excitation_amplitude_err"])?.unwrap_or(0.0);
    let power = required(&["excitation_power", "reference_power", "power"])?;
    let power_err = ini
        .get_f64(s, &["excitation_power_err", "reference_power_err", "power_err"])?
        .unwrap_or(0.0);

    let amplitude_unit = ini
        .get_any(s, &["amplitude_unit"])
        .or_else(|| ini.get(s, "radius_unit"))
        .map_or(Ok(Unit::METER), Unit::parse)?;
    let power_unit = ini.get(s, "power_unit").map_or(Ok(Unit::V2), Unit::parse)?;

    m.set_ac_params(
        &axis.to_ascii_lowercase(),
        freq,
        amplitude,
        units::to_si(power, Dimension::SignalPower, power_unit)?,
        amplitude_err,
        units::to_si(power_err, Dimension::SignalPower, power_unit)?,
        amplitude_unit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("psd-fit-io-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn params_path_replaces_extension() {
        let p = params_path_for(Path::new("/data/run_01.dat"));
        assert_eq!(p, Path::new("/data/run_01_psd_parameters.txt"));
    }

    #[test]
    fn default_stem_has_timestamp() {
        let stem = default_stem();
        assert!(stem.starts_with("_psd_measurement_"));
        assert_eq!(stem.len(), "_psd_measurement_".len() + "2026-01-01_00-00".len());
    }

    #[test]
    fn minimal_parameter_file_uses_fallbacks() {
        let dir = tmp_dir("minimal");
        let data = dir.join("m.dat");
        std::fs::write(&data, "freq\tpsd_x\tpsd_z\n0\t0.5\t0.25\n1\t1e-6\t2e-6\n2\t1e-7\t2e-7\n").unwrap();
        std::fs::write(
            dir.join("m_psd_parameters.txt"),
            "[DEFAULT]\nn_avg = 50\nsampling_rate = 4\nbead_dia = 1\ndiameter_unit = um\n",
        )
        .unwrap();
        let (m, _) = load_measurement(&data, None).unwrap();
        assert_eq!(m.names(), ["x", "z"]);
        let s = m.setting();
        assert!((s.temp() - 298.15).abs() < 1e-12);
        assert_eq!(s.temp_err(), 2.5);
        assert!((s.radius() - 0.5e-6).abs() < 1e-18);
        assert!(s.height().is_infinite());
        assert!(s.medium().is_water());
        let z = m.psd("z").unwrap();
        assert_eq!(z.offset(), 0.25);
        assert!(!z.is_lateral());
        assert_eq!(z.n_avg(), 50);
        assert!(!m.is_active_calibration());
    }

    #[test]
    fn missing_mandatory_keys_fail() {
        let dir = tmp_dir("missing");
        let data = dir.join("m.dat");
        std::fs::write(&data, "freq\tpsd_x\n1\t1\n2\t1\n").unwrap();
        let params = dir.join("m_psd_parameters.txt");
        std::fs::write(&params, "[DEFAULT]\nn_avg = 5\nradius = 1e-6\n").unwrap();
        assert!(load_measurement(&data, None).unwrap_err().message().contains("sampling_rate"));
        std::fs::write(&params, "[DEFAULT]\nn_avg = 5\nf_sample = 4\n").unwrap();
        assert!(load_measurement(&data, None).unwrap_err().message().contains("radius"));
    }

    #[test]
    fn unequal_frequency_vectors_cannot_be_saved() {
        let setting = ExperimentalSetting::new(300.0, 1e-6).unwrap();
        let mut m = PsdMeasurement::new(setting);
        m.add_psd("x", Psd::new("x", vec![1.0, 2.0], vec![1.0, 1.0], None, 1).unwrap());
        m.add_psd("y", Psd::new("y", vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0], None, 1).unwrap());
        let err = save_measurement(&m, &tmp_dir("unequal"), Some("u"), false).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
