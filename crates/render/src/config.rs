//! Tunables for the camera rig and the emitter, loadable from YAML.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::Perspective;
use crate::error::ConfigError;
use crate::particle::EmitterConfig;

/// How the frame driver moves the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub perspective: Perspective,
    /// Radians of rotation per pixel of pointer travel.
    pub mouse_sensitivity: f32,
    /// World units per frame while a move key is held.
    pub move_speed: f32,
    /// Camera position relative to the followed target.
    pub follow_offset: Vec3,
    /// Per-frame interpolation amount while following.
    pub follow_amount: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            perspective: Perspective::default(),
            mouse_sensitivity: 0.005,
            move_speed: 0.1,
            follow_offset: Vec3::new(0.0, 7.0, -3.0),
            follow_amount: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub camera: CameraConfig,
    pub emitter: EmitterConfig,
}

impl RenderConfig {
    /// Parse and validate. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.camera.perspective;
        if !(p.fovy > 0.0 && p.fovy < std::f32::consts::PI) {
            return Err(ConfigError::Invalid(format!("fovy {} outside (0, pi)", p.fovy)));
        }
        if !(p.near > 0.0 && p.far > p.near) {
            return Err(ConfigError::Invalid(format!(
                "clip planes near={} far={} must satisfy 0 < near < far",
                p.near, p.far
            )));
        }
        if p.aspect <= 0.0 {
            return Err(ConfigError::Invalid(format!("aspect {} must be positive", p.aspect)));
        }
        if self.emitter.capacity == 0 {
            return Err(ConfigError::Invalid("emitter capacity must be at least 1".into()));
        }
        if self.emitter.rate.is_nan() || self.emitter.rate < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "emitter rate {} must be non-negative",
                self.emitter.rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = RenderConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(config.emitter.force, 0.09);
        assert_eq!(config.emitter.gravity, Vec3::new(0.0, -0.2, 0.0));
        assert_eq!(config.camera.follow_offset, Vec3::new(0.0, 7.0, -3.0));
    }

    #[test]
    fn partial_override() {
        let yaml = "
camera:
  move_speed: 0.5
  perspective:
    fovy: 1.0
emitter:
  capacity: 64
  gravity: [0.0, -1.0, 0.0]
";
        let config = RenderConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.camera.move_speed, 0.5);
        assert_eq!(config.camera.perspective.fovy, 1.0);
        assert_eq!(config.camera.perspective.far, 100.0);
        assert_eq!(config.emitter.capacity, 64);
        assert_eq!(config.emitter.gravity, Vec3::NEG_Y);
        assert_eq!(config.emitter.rate, EmitterConfig::default().rate);
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = RenderConfig::from_yaml_str("emitter: { capacity: 0 }").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_clip_planes() {
        let err =
            RenderConfig::from_yaml_str("camera: { perspective: { near: 10.0, far: 1.0 } }").unwrap_err();
        assert!(err.to_string().contains("near"));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let err = RenderConfig::from_yaml_str("camera: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = RenderConfig::load("/nonexistent/lumen.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
