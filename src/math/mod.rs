//! Numerical building blocks.
//!
//! - SVD least squares (`ols`)
//! - bounded Levenberg–Marquardt (`lm`)
//! - log-spaced grids (`space`)
//! - reduced chi-square outlier statistics (`stats`)

pub mod lm;
pub mod ols;
pub mod space;
pub mod stats;

pub use lm::*;
pub use ols::*;
pub use space::*;
pub use stats::*;
