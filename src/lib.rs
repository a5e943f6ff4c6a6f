//! `psd-fit` library crate.
//!
//! The binary (`psdfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting and calibration code can be embedded in acquisition software

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod physics;
pub mod plot;
pub mod psd;
pub mod report;
pub mod units;
