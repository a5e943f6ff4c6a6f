//! Spectra and the measurements they belong to.
//!
//! - [`Psd`]: one axis, with exclusion mask (`spectrum`)
//! - [`ExperimentalSetting`]: temperature, bead and medium (`setting`)
//! - [`PsdMeasurement`]: axes + setting + active calibration (`measurement`)
//! - Welch estimation and filtered noise (`welch`)

pub mod measurement;
pub mod setting;
pub mod spectrum;
pub mod welch;

pub use measurement::*;
pub use setting::*;
pub use spectrum::*;
pub use welch::*;
