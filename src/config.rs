use crate::convergence::ConvergenceSettings;
use crate::errors::SchematicError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchematicConfig {
    // Max weight difference for two neighbouring intervals to merge
    pub gap_tolerance: f64,
    pub convergence: ConvergenceSettings,
}

impl Default for SchematicConfig {
    fn default() -> Self {
        Self {
            gap_tolerance: 0.0,
            convergence: ConvergenceSettings::default(),
        }
    }
}

impl SchematicConfig {
    /// Reads a RON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, SchematicError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchematicError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ron::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_compaction::CompactionMode;

    #[test]
    fn test_partial_ron_config() {
        let config: SchematicConfig = ron::from_str(
            "(gap_tolerance: 2.0, convergence: (min_cell_points: 18, compaction: spacing_only, sizing: (exponent: 1.5)))",
        )
        .unwrap();
        assert_eq!(config.gap_tolerance, 2.0);
        assert_eq!(config.convergence.min_cell_points, 18);
        assert_eq!(config.convergence.max_iterations, 20);
        assert_eq!(config.convergence.compaction, CompactionMode::SpacingOnly);
        assert_eq!(config.convergence.sizing.exponent, 1.5);
        assert_eq!(config.convergence.sizing.min_line_px, 40.0);
    }
}
