//! # Netcode Configuration
//!
//! All tuning values live in a TOML file loaded once at startup. Every field
//! has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! tick_rate = 50
//! snapshot_rate = 20
//!
//! [motion]
//! move_speed = 5.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetcodeError, NetcodeResult};

/// Parameters of the deterministic motion function.
///
/// Client and server must load identical values or prediction diverges forever.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    /// Horizontal speed at full stick deflection (units/s).
    pub move_speed: f32,
    /// Vertical velocity applied on jump (units/s).
    pub jump_velocity: f32,
    /// Vertical acceleration (units/s², negative is down).
    pub gravity: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            jump_velocity: 8.0,
            gravity: -20.0,
        }
    }
}

/// Configuration for the tick clock, replication and prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetcodeConfig {
    /// Simulation rate in Hz.
    pub tick_rate: u32,
    /// Spiral-of-death guard: simulation steps allowed per `advance` call.
    pub max_ticks_per_frame: u32,
    /// Snapshot broadcast rate in Hz, independent of the tick rate.
    pub snapshot_rate: u32,
    /// Capacity of every input queue.
    pub max_buffered_inputs: usize,
    /// Capacity of the prediction ring.
    pub max_prediction_frames: usize,
    /// Position error (units) above which prediction reconciles.
    pub correction_threshold: f32,
    /// Visual error decay rate (units/s).
    pub smoothing_speed: f32,
    /// Render-side interpolation delay. Not consumed by this crate.
    pub interpolation_delay_ms: u32,
    /// Pending notifications per subscriber before the oldest is evicted.
    pub notification_capacity: usize,
    /// Game events retained by the server journal.
    pub event_journal_capacity: usize,
    /// Motion function parameters.
    pub motion: MotionParams,
}

impl Default for NetcodeConfig {
    fn default() -> Self {
        Self {
            tick_rate: 50,
            max_ticks_per_frame: 4,
            snapshot_rate: 20,
            max_buffered_inputs: 120,
            max_prediction_frames: 60,
            correction_threshold: 0.1,
            smoothing_speed: 10.0,
            interpolation_delay_ms: 100,
            notification_capacity: 256,
            event_journal_capacity: 1024,
            motion: MotionParams::default(),
        }
    }
}

impl NetcodeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or a value is out of range.
    pub fn from_toml_str(text: &str) -> NetcodeResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> NetcodeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> NetcodeResult<()> {
        let fail = |msg: &str| Err(NetcodeError::InvalidConfig(msg.to_owned()));

        if self.tick_rate == 0 {
            return fail("tick_rate must be greater than zero");
        }
        if self.max_ticks_per_frame == 0 {
            return fail("max_ticks_per_frame must be greater than zero");
        }
        if self.snapshot_rate == 0 {
            return fail("snapshot_rate must be greater than zero");
        }
        if self.max_buffered_inputs == 0 {
            return fail("max_buffered_inputs must be greater than zero");
        }
        if self.max_prediction_frames == 0 {
            return fail("max_prediction_frames must be greater than zero");
        }
        if self.notification_capacity == 0 {
            return fail("notification_capacity must be greater than zero");
        }
        if self.event_journal_capacity == 0 {
            return fail("event_journal_capacity must be greater than zero");
        }
        if self.correction_threshold.is_nan() || self.correction_threshold < 0.0 {
            return fail("correction_threshold must be zero or positive");
        }
        if self.smoothing_speed.is_nan() || self.smoothing_speed <= 0.0 {
            return fail("smoothing_speed must be positive");
        }
        Ok(())
    }

    /// Duration of one simulation step in seconds.
    #[must_use]
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Time between snapshot broadcasts in seconds.
    #[must_use]
    pub fn snapshot_interval(&self) -> f32 {
        1.0 / self.snapshot_rate as f32
    }

    /// Age in ticks beyond which received snapshots are pruned.
    #[must_use]
    pub const fn snapshot_history_ticks(&self) -> u32 {
        self.snapshot_rate * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetcodeConfig::default();
        assert_eq!(config.tick_rate, 50);
        assert_eq!(config.max_ticks_per_frame, 4);
        assert_eq!(config.snapshot_rate, 20);
        assert_eq!(config.max_buffered_inputs, 120);
        assert_eq!(config.max_prediction_frames, 60);
        assert!((config.correction_threshold - 0.1).abs() < f32::EPSILON);
        assert!((config.smoothing_speed - 10.0).abs() < f32::EPSILON);
        assert_eq!(config.interpolation_delay_ms, 100);
        assert!((config.tick_interval() - 0.02).abs() < 1e-6);
        assert_eq!(config.snapshot_history_ticks(), 40);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = NetcodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NetcodeConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = NetcodeConfig::from_toml_str(
            "tick_rate = 60\nsnapshot_rate = 30\n\n[motion]\nmove_speed = 7.5\n",
        )
        .unwrap();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.snapshot_rate, 30);
        assert!((config.motion.move_speed - 7.5).abs() < f32::EPSILON);
        // Untouched fields keep their defaults
        assert!((config.motion.gravity + 20.0).abs() < f32::EPSILON);
        assert_eq!(config.max_buffered_inputs, 120);
    }

    #[test]
    fn test_rejects_zero_rate() {
        let err = NetcodeConfig::from_toml_str("tick_rate = 0").unwrap_err();
        assert!(matches!(err, NetcodeError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let err = NetcodeConfig::from_toml_str("correction_threshold = -1.0").unwrap_err();
        assert!(matches!(err, NetcodeError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = NetcodeConfig::from_toml_str("tick_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, NetcodeError::ConfigParse(_)));
    }
}
