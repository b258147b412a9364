//! Court Analytics Library
//!
//! Turns per-frame player tracks, ball detections, team labels and court
//! keypoints from a basketball broadcast into ball possession, passes and
//! interceptions, team ball control, and player positions on a top-down
//! tactical court.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod possession;
pub mod tactical;
pub mod team_control;
pub mod types;

pub use cache::StageCache;
pub use config::{
    AnalyticsConfig, BallTrackConfig, EventConfig, OutOfBoundsPolicy, PossessionConfig, TacticalConfig,
};
pub use error::{AnalyticsError, Result};
pub use events::{EventCounts, EventDetector, EventKind, PossessionDebouncer, PossessionEvent, PossessionState};
pub use pipeline::{AnalyticsPipeline, PipelineTiming};
pub use possession::PossessionAssigner;
pub use tactical::TacticalViewConverter;
pub use team_control::{team_ball_control, BallControlStats};
pub use types::{
    AnalyticsOutput, CourtKeypoints, FrameInputs, FrameTacticalPositions, PossessionRecord, TacticalPosition, Team,
    TeamAssignments,
};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
