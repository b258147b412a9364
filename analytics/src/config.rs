//! Configuration for the analytics stages
//!
//! Every stage reads its own section. All sections deserialize from JSON with
//! missing fields falling back to the defaults below, and `validate` must pass
//! before any frame is processed.

use crate::error::{AnalyticsError, Result};
use hooptrack::{BallTrackParams, RansacParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ball track clean-up and gap filling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallTrackConfig {
    /// Largest plausible ball centre displacement per elapsed frame (pixels)
    pub max_ball_speed_px_per_frame: f32,
    /// Longest run of missing frames that interpolation may fill
    pub max_interpolation_gap: usize,
}

impl Default for BallTrackConfig {
    fn default() -> Self {
        Self {
            max_ball_speed_px_per_frame: 25.0,
            max_interpolation_gap: 30, // a bit over one second of broadcast video
        }
    }
}

impl BallTrackConfig {
    pub fn params(&self) -> BallTrackParams {
        BallTrackParams {
            max_ball_speed_px_per_frame: self.max_ball_speed_px_per_frame,
            max_interpolation_gap: self.max_interpolation_gap,
        }
    }
}

/// Per-frame possession scoring
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionConfig {
    /// Players farther than this from the ball centre never get possession
    pub max_possession_distance_px: f32,
    /// Expansion of the player box accounting for arms reaching beyond it
    pub reach_margin_px: f32,
    /// Score reduction when the ball centre lies inside the expanded box
    pub containment_bonus_px: f32,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            max_possession_distance_px: 50.0,
            reach_margin_px: 10.0,
            containment_bonus_px: 25.0,
        }
    }
}

/// Pass and interception detection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Consecutive frames a new holder needs before the change is trusted
    pub min_hold_frames: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            min_hold_frames: 11,
        }
    }
}

/// What to do with a player projected outside the tactical court
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfBoundsPolicy {
    /// Clamp onto the court rectangle and flag the position
    Clamp,
    /// Leave the player out of that frame
    Discard,
}

impl Default for OutOfBoundsPolicy {
    fn default() -> Self {
        Self::Clamp
    }
}

/// Tactical court reference and homography fitting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    /// Width of the reference court image in pixels
    pub court_width: f32,
    /// Height of the reference court image in pixels
    pub court_height: f32,
    /// Real court length in meters
    pub court_width_m: f32,
    /// Real court width in meters
    pub court_height_m: f32,
    /// Fit with RANSAC when more than four keypoints are available
    pub use_ransac: bool,
    /// Inlier threshold in reference court pixels
    pub ransac_reprojection_threshold_px: f64,
    pub ransac_max_subsets: usize,
    /// Drop detected keypoints whose pairwise distance ratios disagree with the court
    pub validate_keypoints: bool,
    /// Relative ratio error above which a keypoint is dropped
    pub keypoint_proportion_tolerance: f32,
    pub out_of_bounds: OutOfBoundsPolicy,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            court_width: 300.0,
            court_height: 161.0,
            court_width_m: 28.0,
            court_height_m: 15.0,
            use_ransac: true,
            ransac_reprojection_threshold_px: 5.0,
            ransac_max_subsets: 500,
            validate_keypoints: true,
            keypoint_proportion_tolerance: 0.8,
            out_of_bounds: OutOfBoundsPolicy::Clamp,
        }
    }
}

impl TacticalConfig {
    pub fn ransac_params(&self) -> RansacParams {
        RansacParams {
            inlier_threshold: self.ransac_reprojection_threshold_px,
            max_subsets: self.ransac_max_subsets,
        }
    }
}

/// Complete configuration of an analytics run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub ball: BallTrackConfig,
    pub possession: PossessionConfig,
    pub events: EventConfig,
    pub tactical: TacticalConfig,
}

impl AnalyticsConfig {
    /// Load from a JSON file and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded analytics config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse from JSON and validate
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero, negative and non-finite limits
    pub fn validate(&self) -> Result<()> {
        require_positive("ball.max_ball_speed_px_per_frame", self.ball.max_ball_speed_px_per_frame)?;
        require_nonzero("ball.max_interpolation_gap", self.ball.max_interpolation_gap)?;

        require_positive(
            "possession.max_possession_distance_px",
            self.possession.max_possession_distance_px,
        )?;
        require_non_negative("possession.reach_margin_px", self.possession.reach_margin_px)?;
        require_non_negative(
            "possession.containment_bonus_px",
            self.possession.containment_bonus_px,
        )?;

        require_nonzero("events.min_hold_frames", self.events.min_hold_frames)?;

        let t = &self.tactical;
        require_positive("tactical.court_width", t.court_width)?;
        require_positive("tactical.court_height", t.court_height)?;
        require_positive("tactical.court_width_m", t.court_width_m)?;
        require_positive("tactical.court_height_m", t.court_height_m)?;
        require_positive(
            "tactical.ransac_reprojection_threshold_px",
            t.ransac_reprojection_threshold_px as f32,
        )?;
        require_nonzero("tactical.ransac_max_subsets", t.ransac_max_subsets)?;
        require_positive(
            "tactical.keypoint_proportion_tolerance",
            t.keypoint_proportion_tolerance,
        )?;

        Ok(())
    }
}

fn require_positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalyticsError::config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

fn require_non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AnalyticsError::config(format!(
            "{} must be zero or positive, got {}",
            name, value
        )))
    }
}

fn require_nonzero(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(AnalyticsError::config(format!("{} must be at least 1", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalyticsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let mut config = AnalyticsConfig::default();
        config.ball.max_interpolation_gap = 0;
        assert!(matches!(config.validate(), Err(AnalyticsError::ConfigError(_))));

        let mut config = AnalyticsConfig::default();
        config.possession.max_possession_distance_px = -1.0;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.events.min_hold_frames = 0;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.ball.max_ball_speed_px_per_frame = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.tactical.ransac_reprojection_threshold_px = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AnalyticsConfig::from_json_str(
            r#"{ "events": { "min_hold_frames": 3 }, "tactical": { "out_of_bounds": "discard" } }"#,
        )
        .unwrap();
        assert_eq!(config.events.min_hold_frames, 3);
        assert_eq!(config.tactical.out_of_bounds, OutOfBoundsPolicy::Discard);
        assert_eq!(config.ball, BallTrackConfig::default());
    }

    #[test]
    fn test_invalid_json_config_is_rejected() {
        let err = AnalyticsConfig::from_json_str(r#"{ "ball": { "max_interpolation_gap": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("max_interpolation_gap"));
    }
}
