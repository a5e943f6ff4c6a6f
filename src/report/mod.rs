//! Calibration results and terminal reports.

pub mod calibration;
pub mod format;

pub use calibration::*;
pub use format::*;
