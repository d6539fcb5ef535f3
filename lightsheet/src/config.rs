use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compute::FilterMode;
use crate::error::{Error, Result};
use crate::pipeline::shear_factor;

/// Z-stepping range of the acquisition loop, in micrometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZRange {
    pub top_um: f64,
    pub bottom_um: f64,
    pub step_um: f64,
}

impl Default for ZRange {
    fn default() -> Self {
        Self {
            top_um: 0.0,
            bottom_um: 0.0,
            step_um: 1.0,
        }
    }
}

impl ZRange {
    pub fn new(top_um: f64, bottom_um: f64, step_um: f64) -> Self {
        Self {
            top_um,
            bottom_um,
            step_um,
        }
    }

    /// Number of planes per stack: `round((top - bottom) / step) + 1`.
    pub fn stack_depth(&self) -> Result<u32> {
        let depth = ((self.top_um - self.bottom_um) / self.step_um).round() + 1.0;
        if !depth.is_finite() || depth < 1.0 || depth > u32::MAX as f64 {
            return Err(Error::InvalidStackDepth {
                depth,
                top_um: self.top_um,
                bottom_um: self.bottom_um,
                step_um: self.step_um,
            });
        }
        Ok(depth as u32)
    }
}

/// Toggles and parameters of the post-processing step.
///
/// Read on every frame, so changes between frames apply to the next
/// completed stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Gates collection, processing and saving altogether.
    pub do_post_processing: bool,
    pub denoise_enabled: bool,
    pub deskew_enabled: bool,
    pub save_stack_enabled: bool,
    pub save_projection_enabled: bool,
    /// Median window radius, positive and odd.
    pub denoise_median_radius: u32,
    pub deskew_angle_degrees: f64,
    pub deskew_offset_x: f64,
    pub interpolation: FilterMode,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            do_post_processing: true,
            denoise_enabled: true,
            deskew_enabled: true,
            save_stack_enabled: true,
            save_projection_enabled: true,
            denoise_median_radius: 3,
            deskew_angle_degrees: 35.0,
            deskew_offset_x: 0.0,
            interpolation: FilterMode::default(),
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        let radius = self.denoise_median_radius;
        if radius == 0 || radius % 2 == 0 {
            return Err(Error::InvalidConfig(format!(
                "denoise median radius must be a positive odd integer, got {}",
                radius
            )));
        }

        if self.deskew_enabled {
            shear_factor(self.deskew_angle_degrees)?;
            if !self.deskew_offset_x.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "deskew offset must be finite, got {}",
                    self.deskew_offset_x
                )));
            }
        }

        Ok(())
    }
}

/// Everything a run session reads from the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub z_range: ZRange,
    /// Parent directory of every dataset.
    pub output_root: PathBuf,
    pub processing: ProcessingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            z_range: ZRange::default(),
            output_root: PathBuf::from("acquisitions"),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parses a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Loads and validates a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_yaml_str(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yml::to_string(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.z_range.stack_depth()?;
        self.processing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_depth_rounds() {
        assert_eq!(ZRange::new(10.0, 0.0, 2.5).stack_depth().unwrap(), 5);
        assert_eq!(ZRange::new(10.0, 0.0, 3.0).stack_depth().unwrap(), 4);
        assert_eq!(ZRange::new(0.3, 0.0, 0.1).stack_depth().unwrap(), 4);
        assert_eq!(ZRange::new(5.0, 5.0, 1.0).stack_depth().unwrap(), 1);
    }

    #[test]
    fn test_stack_depth_rejects_bad_ranges() {
        for range in [
            ZRange::new(0.0, 10.0, 1.0),
            ZRange::new(10.0, 0.0, 0.0),
            ZRange::new(f64::NAN, 0.0, 1.0),
        ] {
            assert!(
                matches!(range.stack_depth(), Err(Error::InvalidStackDepth { .. })),
                "{:?}",
                range
            );
        }
    }

    #[test]
    fn test_radius_must_be_positive_odd() {
        let mut config = ProcessingConfig::default();
        for radius in [1, 3, 5] {
            config.denoise_median_radius = radius;
            assert!(config.validate().is_ok());
        }
        for radius in [0, 2, 4] {
            config.denoise_median_radius = radius;
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_disabled_deskew_skips_angle_check() {
        let mut config = ProcessingConfig {
            deskew_angle_degrees: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.deskew_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_defaults_fill_missing_keys() {
        let yaml = r#"
z_range:
  top_um: 20.0
  bottom_um: 0.0
  step_um: 5.0
output_root: /data/spim
processing:
  deskew_angle_degrees: 45.0
  interpolation: nearest
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.z_range.stack_depth().unwrap(), 5);
        assert_eq!(config.output_root, PathBuf::from("/data/spim"));
        assert_eq!(config.processing.deskew_angle_degrees, 45.0);
        assert_eq!(config.processing.interpolation, FilterMode::Nearest);
        assert_eq!(config.processing.denoise_median_radius, 3);
        assert!(config.processing.do_post_processing);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = SessionConfig {
            z_range: ZRange::new(4.0, 0.0, 1.0),
            output_root: PathBuf::from("out"),
            processing: ProcessingConfig {
                save_projection_enabled: false,
                ..Default::default()
            },
        };
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(SessionConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = SessionConfig::from_yaml_str("z_range: [1, 2");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
