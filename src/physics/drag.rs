//! Drag on a sphere: Stokes' law, wall corrections and the frequency-dependent
//! hydrodynamic drag.
//!
//! References:
//! - Faxén's law for a sphere moving parallel to a wall.
//! - Tolić-Nørrelykke et al., Rev. Sci. Instrum. 77, 103101 (2006), App. D:
//!   frequency-dependent drag near a wall.

use nalgebra::Complex;

use crate::domain::Direction;

/// Boltzmann constant in J/K.
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Stokes drag `6πηr` in N·s/m.
pub fn stokes_drag(radius: f64, viscosity: f64) -> f64 {
    6.0 * std::f64::consts::PI * viscosity * radius
}

/// Faxén correction factor (≥ 1) for a sphere of `radius` whose centre is at
/// `height` above a wall. Infinite height gives 1.
pub fn faxen_factor(height: f64, radius: f64) -> f64 {
    if !height.is_finite() {
        return 1.0;
    }
    let x = radius / height;
    1.0 / (1.0 - 9.0 / 16.0 * x + x.powi(3) / 8.0 - 45.0 / 256.0 * x.powi(4) - x.powi(5) / 16.0)
}

/// Oseen superposition of the Faxén corrections of two walls `distance` apart.
pub fn oseen_factor(height: f64, radius: f64, distance: f64) -> f64 {
    faxen_factor(height, radius) + faxen_factor(distance - height, radius) - 1.0
}

/// Characteristic frequency `ν / (π R²)` of vorticity diffusion over the
/// particle radius, with `ν = η/ρ` the kinematic viscosity.
pub fn vorticity_frequency(radius: f64, viscosity: f64, density_medium: f64) -> f64 {
    viscosity / (std::f64::consts::PI * density_medium * radius * radius)
}

/// Frequency-dependent drag relative to the Stokes drag, `γ(f)/γ₀`.
///
/// With an infinite `height` the wall term vanishes. Axial motion uses the
/// doubled wall coefficient (9/8 instead of 9/16).
pub fn drag_ratio(
    freq: f64,
    radius: f64,
    viscosity: f64,
    density_medium: f64,
    height: f64,
    direction: Direction,
) -> Complex<f64> {
    let f_nu = vorticity_frequency(radius, viscosity, density_medium);
    let s = (freq / f_nu).sqrt();
    let r = freq / f_nu;
    let one_minus_i = Complex::new(1.0, -1.0);
    let two_i_ninth = Complex::new(0.0, 2.0 / 9.0);

    let bulk = Complex::new(1.0, 0.0) + one_minus_i * s - two_i_ninth * r;
    if !height.is_finite() {
        return bulk;
    }

    let coefficient = match direction {
        Direction::Lateral => 9.0 / 16.0,
        Direction::Axial => 9.0 / 8.0,
    };
    // Penetration depth of the oscillating flow.
    let delta = radius / s;
    let decay = (-one_minus_i * ((2.0 * height - radius) / delta)).exp();
    let wall = Complex::new(1.0, 0.0) - one_minus_i / 3.0 * s + two_i_ninth * r
        - Complex::new(4.0 / 3.0, 0.0) * (Complex::new(1.0, 0.0) - decay);

    bulk + wall * (coefficient * radius / height)
}

/// Effective mass of the sphere plus entrained fluid, in kg.
pub fn effective_mass(radius: f64, density_particle: f64, density_medium: f64) -> f64 {
    let volume = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
    volume * density_particle + 0.5 * volume * density_medium
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stokes_drag_of_micron_bead_in_water() {
        let drag = stokes_drag(0.5e-6, 0.89e-3);
        assert!((drag - 8.388e-9).abs() < 1e-11);
    }

    #[test]
    fn faxen_tends_to_one_far_from_wall() {
        assert_eq!(faxen_factor(f64::INFINITY, 1e-6), 1.0);
        assert!((faxen_factor(1e-3, 1e-6) - 1.0).abs() < 1e-3);
        let near = faxen_factor(1.5e-6, 1e-6);
        assert!(near > 1.5 && near < 1.7, "near = {near}");
    }

    #[test]
    fn oseen_exceeds_single_wall() {
        let r = 1e-6;
        let h = 5e-6;
        let oseen = oseen_factor(h, r, 20e-6);
        assert!(oseen > faxen_factor(h, r));
        let mid = oseen_factor(10e-6, r, 20e-6);
        assert!((mid - (2.0 * faxen_factor(10e-6, r) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn drag_ratio_reduces_to_stokes_at_low_frequency() {
        let ratio = drag_ratio(1e-6, 0.5e-6, 0.89e-3, 997.0, f64::INFINITY, Direction::Lateral);
        assert!((ratio.re - 1.0).abs() < 1e-3);
        assert!(ratio.im.abs() < 1e-3);

        let fast = drag_ratio(1e5, 0.5e-6, 0.89e-3, 997.0, f64::INFINITY, Direction::Lateral);
        assert!(fast.re > 1.0);
        assert!(fast.im < 0.0);
    }

    #[test]
    fn wall_raises_drag_more_for_axial_motion() {
        let lat = drag_ratio(100.0, 0.5e-6, 0.89e-3, 997.0, 2e-6, Direction::Lateral);
        let ax = drag_ratio(100.0, 0.5e-6, 0.89e-3, 997.0, 2e-6, Direction::Axial);
        let bulk = drag_ratio(100.0, 0.5e-6, 0.89e-3, 997.0, f64::INFINITY, Direction::Lateral);
        assert!(lat.re > bulk.re);
        assert!(ax.re > lat.re);
    }
}
