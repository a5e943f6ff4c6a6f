//! PSD fitting.
//!
//! Responsibilities:
//!
//! - closed-form Lorentzian fit and window search (`analytical`)
//! - bounded single-axis fit of the inverse PSD (`fitter`)
//! - shared-filter fit across axes (`collective`)
//! - orchestration and calibration over a measurement (`psd_fit`)

pub mod analytical;
pub mod collective;
pub mod fitter;
pub mod psd_fit;
pub mod result;

pub use analytical::*;
pub use collective::*;
pub use fitter::*;
pub use psd_fit::*;
pub use result::*;
