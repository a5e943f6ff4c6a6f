//! Synthetic measurements for demos and tests.

pub mod synth;

pub use synth::*;
