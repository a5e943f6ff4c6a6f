//! Terminal plots of spectra and fits.

pub mod ascii;

pub use ascii::*;
