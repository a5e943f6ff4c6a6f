//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - axis and model enums (`Direction`, `ModelKind`, `WallCorrection`)
//! - the structured warning channel (`Diagnostic`)
//! - the resolved run configuration (`RunConfig`)

pub mod types;

pub use types::*;
