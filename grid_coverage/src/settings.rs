//! Tuning of the iterative inverse of localization grid transforms.

use crate::error::Result;

/// Maximum number of refinement steps before the fallback search starts.
pub const MAX_ITER: usize = 10;

/// Settings of the iterative grid inverse.
///
/// The same iteration budget bounds both the regular refinement and the
/// best-candidate search that follows when the refinement does not settle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InverseSettings {
    /// Iteration budget of each inversion phase.
    pub max_iterations: usize,
    /// Largest world distance accepted for a best-effort fallback candidate.
    /// Without a threshold any candidate found by the fallback is returned.
    pub max_residual: Option<f64>,
}

impl Default for InverseSettings {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITER,
            max_residual: None,
        }
    }
}

impl InverseSettings {
    /// Creates settings rejecting fallback candidates farther than
    /// `max_residual` from their target.
    pub fn with_max_residual(max_residual: f64) -> Self {
        Self {
            max_residual: Some(max_residual),
            ..Self::default()
        }
    }

    /// Saves these settings to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
