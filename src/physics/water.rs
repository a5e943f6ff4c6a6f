//! Temperature-dependent properties of water.
//!
//! All temperatures in kelvin, results in SI.

/// Dynamic viscosity of water in Pa·s.
///
/// Empirical fit `η = 1.856e-14 · exp(4209/T + 0.04527·T − 3.376e-5·T²)`,
/// valid between roughly 0 °C and 100 °C.
pub fn viscosity_h2o(temp_k: f64) -> f64 {
    1.856e-14 * (4209.0 / temp_k + 0.04527 * temp_k - 3.376e-5 * temp_k * temp_k).exp()
}

/// Temperature derivative of [`viscosity_h2o`] in Pa·s/K.
pub fn dviscosity_h2o(temp_k: f64) -> f64 {
    viscosity_h2o(temp_k) * (-4209.0 / (temp_k * temp_k) + 0.04527 - 2.0 * 3.376e-5 * temp_k)
}

/// Density of air-free water in kg/m³ (Tanaka et al. 2001).
pub fn density_h2o(temp_k: f64) -> f64 {
    let t = temp_k - 273.15;
    let a1 = -3.983035;
    let a2 = 301.797;
    let a3 = 522528.9;
    let a4 = 69.34881;
    let a5 = 999.974950;
    a5 * (1.0 - (t + a1).powi(2) * (t + a2) / (a3 * (t + a4)))
}
