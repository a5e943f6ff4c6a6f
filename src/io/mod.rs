//! Input/output helpers.
//!
//! - tab-separated data files (`data`)
//! - INI parameter and result documents (`params`)
//! - measurement save/load (`measurement`)
//! - fit-result writers, INI and JSON (`results`)

pub mod data;
pub mod measurement;
pub mod params;
pub mod results;

pub use data::*;
pub use measurement::*;
pub use params::*;
pub use results::*;
