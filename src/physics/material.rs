//! Particle materials and their mass densities.

use serde::{Deserialize, Serialize};

use crate::domain::Diagnostic;

/// Known particle materials: accepted names and density in kg/m³.
const KNOWN: &[(&[&str], &str, f64)] = &[
    (&["ps", "polystyrene"], "polystyrene", 1050.0),
    (&["silica", "sio2"], "silica", 2000.0),
    (&["titania", "tio2"], "titania", 4230.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// kg/m³
    pub density: f64,
}

impl Material {
    pub fn polystyrene() -> Self {
        Self {
            name: "polystyrene".to_string(),
            density: 1050.0,
        }
    }

    /// Look up a known material by name (case-insensitive).
    pub fn known(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase();
        KNOWN
            .iter()
            .find(|(aliases, _, _)| aliases.contains(&key.as_str()))
            .map(|(_, canonical, density)| Self {
                name: canonical.to_string(),
                density: *density,
            })
    }

    pub fn is_known(&self) -> bool {
        Self::known(&self.name).is_some()
    }

    /// Resolve a material from a name and an optional density (kg/m³).
    ///
    /// A known name wins over a supplied density. An unknown name with a
    /// density becomes a custom material; without a density the particle is
    /// assumed to be polystyrene.
    pub fn resolve(name: &str, density: Option<f64>) -> (Self, Option<Diagnostic>) {
        if let Some(material) = Self::known(name) {
            return (material, None);
        }
        match density {
            Some(density) => {
                let name = if name.trim().is_empty() {
                    "unknown material".to_string()
                } else {
                    name.trim().to_string()
                };
                (Self { name, density }, None)
            }
            None => (
                Self::polystyrene(),
                Some(Diagnostic::warn(
                    "material",
                    format!(
                        "Unknown material '{name}' without density, using polystyrene (1050 kg/m**3)."
                    ),
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_name_ignores_density() {
        let (m, diag) = Material::resolve("PS", Some(3000.0));
        assert_eq!(m.density, 1050.0);
        assert!(diag.is_none());
        assert_eq!(Material::known("Titania").unwrap().density, 4230.0);
    }

    #[test]
    fn unknown_material_falls_back_or_uses_density() {
        let (m, diag) = Material::resolve("gold", Some(19300.0));
        assert_eq!(m.name, "gold");
        assert_eq!(m.density, 19300.0);
        assert!(diag.is_none());

        let (m, diag) = Material::resolve("", None);
        assert_eq!(m, Material::polystyrene());
        assert!(diag.is_some());
    }
}
