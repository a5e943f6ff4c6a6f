//! Minimal INI documents for parameter and result files.
//!
//! Supported syntax: `[SECTION]` headers, `key = value` or `key: value`
//! pairs, and `#`/`;` comment lines. Keys are case-insensitive (stored
//! lower-case). Keys of `[DEFAULT]` are visible from every section.

use std::fmt;
use std::path::Path;

use crate::error::AppError;

pub const DEFAULT_SECTION: &str = "DEFAULT";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ini {
    /// Sections in file order; `DEFAULT` first when present.
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl Ini {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, AppError> {
        let mut ini = Ini::new();
        let mut current: Option<String> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                ini.section_mut(&name);
                current = Some(name);
                continue;
            }
            let Some(split) = line.find(['=', ':']) else {
                return Err(AppError::input(format!("Line {}: expected 'key = value', got '{line}'.", idx + 1)));
            };
            let Some(section) = &current else {
                return Err(AppError::input(format!("Line {}: key outside of a section.", idx + 1)));
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            ini.set(section, key, value);
        }
        Ok(ini)
    }

    pub fn read(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::new(2, format!("Failed to read parameter file '{}': {e}", path.display())))?;
        Self::parse(&text).map_err(|e| AppError::input(format!("{}: {}", path.display(), e.message())))
    }

    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        std::fs::write(path, self.to_string())
            .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
    }

    fn section_mut(&mut self, name: &str) -> &mut Vec<(String, String)> {
        let pos = match self.sections.iter().position(|(n, _)| n == name) {
            Some(pos) => pos,
            None if name == DEFAULT_SECTION => {
                self.sections.insert(0, (name.to_string(), Vec::new()));
                0
            }
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos].1
    }

    /// Set `key` in `section`, creating the section when needed.
    pub fn set(&mut self, section: &str, key: &str, value: impl fmt::Display) {
        let key = key.to_ascii_lowercase();
        let value = value.to_string();
        let entries = self.section_mut(section);
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    /// Value of `key` in `section`, falling back to `[DEFAULT]`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        let lookup = |name: &str| {
            self.sections
                .iter()
                .find(|(n, _)| n == name)
                .and_then(|(_, entries)| entries.iter().find(|(k, _)| *k == key))
                .map(|(_, v)| v.as_str())
        };
        lookup(section).or_else(|| lookup(DEFAULT_SECTION))
    }

    /// First of `keys` present in `section`.
    pub fn get_any(&self, section: &str, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(section, k))
    }

    /// Parse `key` as a float; `Ok(None)` when absent.
    pub fn get_f64(&self, section: &str, keys: &[&str]) -> Result<Option<f64>, AppError> {
        self.get_any(section, keys)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| AppError::input(format!("Parameter '{}' is not a number: '{v}'.", keys[0])))
            })
            .transpose()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|(n, _)| n == name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(n, _)| n.as_str())
    }

    /// Replace `other`'s sections in `self` (appending new ones).
    pub fn merge(&mut self, other: &Ini) {
        for (name, entries) in &other.sections {
            *self.section_mut(name) = entries.clone();
        }
    }
}

impl fmt::Display for Ini {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, entries)) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{name}]")?;
            for (k, v) in entries {
                writeln!(f, "{k} = {v}")?;
            }
        }
        Ok(())
    }
}
