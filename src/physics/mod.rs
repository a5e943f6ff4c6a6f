//! Physical models of the trapped particle and its medium.
//!
//! - water viscosity and density as functions of temperature (`water`)
//! - particle materials (`material`)
//! - Stokes drag, wall corrections and frequency-dependent drag (`drag`)

pub mod drag;
pub mod material;
pub mod water;

pub use drag::*;
pub use material::*;
pub use water::*;
