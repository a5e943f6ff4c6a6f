//! Spectral models of a trapped bead.
//!
//! Models are small pure functions composed into a [`PsdModel`] so the fit
//! code stays generic over Lorentzian, hydrodynamic and custom spectra.

pub mod model;

pub use model::*;
