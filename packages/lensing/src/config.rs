//! Effect configuration.
//!
//! The configuration is loaded from JSON (every field optional) or built in
//! code, and is never mutated once an effect has been initialized from it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EffectError;

fn default_true() -> bool {
    true
}

fn default_disk_speed() -> f32 {
    1.0
}

fn default_event_horizon() -> f32 {
    1.0
}

fn default_disk_detail() -> f32 {
    100.0
}

fn default_disk_size() -> f32 {
    5.0
}

fn default_disk_gap() -> f32 {
    2.0
}

fn default_disk_color() -> [f32; 4] {
    [1.0, 0.0, 0.0, 1.0]
}

fn default_disk_power() -> f32 {
    1.0
}

fn default_gravity() -> f32 {
    1e10
}

fn default_max_rotation() -> f32 {
    10.0
}

fn default_marching_steps() -> i32 {
    20
}

fn default_lensing_resolution() -> u32 {
    1024
}

/// Clip planes of the one-off environment capture.
///
/// The face field of view is not configurable: cube faces only tile at 90
/// degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "CaptureSettings::default_near")]
    pub near: f32,
    #[serde(default = "CaptureSettings::default_far")]
    pub far: f32,
}

impl CaptureSettings {
    fn default_near() -> f32 {
        0.03
    }

    fn default_far() -> f32 {
        1_000_000.0
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            near: Self::default_near(),
            far: Self::default_far(),
        }
    }
}

/// Tunables of a black hole effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    #[serde(default = "default_true")]
    pub render_black_hole: bool,
    #[serde(default)]
    pub has_accretion_disk: bool,
    /// Brighten the side of the disk rotating towards the viewer.
    #[serde(default = "default_true")]
    pub enable_doppler_effect: bool,

    #[serde(default = "default_disk_speed")]
    pub accretion_disk_speed: f32,
    #[serde(default = "default_event_horizon")]
    pub event_horizon: f32,
    #[serde(default = "default_disk_detail")]
    pub accretion_disk_detail: f32,
    #[serde(default = "default_disk_size")]
    pub accretion_disk_size: f32,
    #[serde(default = "default_disk_gap")]
    pub accretion_disk_gap: f32,
    /// Linear RGBA.
    #[serde(default = "default_disk_color")]
    pub accretion_disk_color: [f32; 4],
    /// Clamped to the `disk_power` slot range when bound.
    #[serde(default = "default_disk_power")]
    pub accretion_disk_power: f32,
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Maximum random tilt in degrees, applied on the X and Z axes.
    #[serde(default = "default_max_rotation")]
    pub max_rotation: f32,

    #[serde(default = "default_marching_steps")]
    pub marching_steps: i32,
    /// Edge length in texels of each captured cube face.
    #[serde(default = "default_lensing_resolution")]
    pub lensing_resolution: u32,

    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            render_black_hole: true,
            has_accretion_disk: false,
            enable_doppler_effect: true,
            accretion_disk_speed: default_disk_speed(),
            event_horizon: default_event_horizon(),
            accretion_disk_detail: default_disk_detail(),
            accretion_disk_size: default_disk_size(),
            accretion_disk_gap: default_disk_gap(),
            accretion_disk_color: default_disk_color(),
            accretion_disk_power: default_disk_power(),
            gravity: default_gravity(),
            max_rotation: default_max_rotation(),
            marching_steps: default_marching_steps(),
            lensing_resolution: default_lensing_resolution(),
            capture: CaptureSettings::default(),
        }
    }
}

impl EffectConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EffectError> {
        serde_json::from_str(json).map_err(|e| EffectError::InvalidConfig(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EffectError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EffectError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Reject values the shader cannot work with.
    ///
    /// Only finiteness and a usable capture setup are checked; signs are
    /// left to the shader.
    pub fn validate(&self) -> Result<(), EffectError> {
        let scalars = [
            ("accretion_disk_speed", self.accretion_disk_speed),
            ("event_horizon", self.event_horizon),
            ("accretion_disk_detail", self.accretion_disk_detail),
            ("accretion_disk_size", self.accretion_disk_size),
            ("accretion_disk_gap", self.accretion_disk_gap),
            ("accretion_disk_power", self.accretion_disk_power),
            ("gravity", self.gravity),
            ("max_rotation", self.max_rotation),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(EffectError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
            }
        }
        if self.accretion_disk_color.iter().any(|c| !c.is_finite()) {
            return Err(EffectError::InvalidConfig("accretion_disk_color must be finite".to_string()));
        }

        let capture = &self.capture;
        if !(capture.near > 0.0 && capture.far > capture.near && capture.far.is_finite()) {
            return Err(EffectError::InvalidConfig(format!(
                "capture clip range must satisfy 0 < near < far, got {}..{}",
                capture.near, capture.far
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = EffectConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EffectConfig::default());
        assert!(config.render_black_hole);
        assert!(!config.has_accretion_disk);
        assert_eq!(config.marching_steps, 20);
        assert_eq!(config.lensing_resolution, 1024);
        assert_eq!(config.capture.near, 0.03);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = EffectConfig::from_json_str(
            r#"{ "has_accretion_disk": true, "accretion_disk_color": [0.0, 0.5, 1.0, 1.0], "capture": { "far": 500.0 } }"#,
        )
        .unwrap();
        assert!(config.has_accretion_disk);
        assert_eq!(config.accretion_disk_color, [0.0, 0.5, 1.0, 1.0]);
        assert_eq!(config.capture.far, 500.0);
        assert_eq!(config.capture.near, 0.03);
        assert_eq!(config.gravity, 1e10);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = EffectConfig::from_json_str(r#"{ "gravity": "heavy" }"#).unwrap_err();
        assert!(matches!(err, EffectError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let config = EffectConfig {
            gravity: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EffectError::InvalidConfig(_))));

        let config = EffectConfig {
            accretion_disk_size: f32::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_negative_tunables() {
        let config = EffectConfig {
            accretion_disk_power: -5.0,
            max_rotation: -3.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_clip_range() {
        let mut config = EffectConfig::default();
        config.capture.near = 10.0;
        config.capture.far = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capture_fov_is_not_configurable() {
        // Older files may still carry a face fov; it must not reach the capture.
        let config = EffectConfig::from_json_str(r#"{ "capture": { "fov_degrees": 60.0, "far": 500.0 } }"#).unwrap();
        assert_eq!(
            config.capture,
            CaptureSettings {
                near: 0.03,
                far: 500.0,
            }
        );
        assert!(config.validate().is_ok());
    }
}
