//! Frame-indexed data shared by the analytics stages

use crate::error::{AnalyticsError, Result};
use crate::events::PossessionEvent;
use hooptrack::{BallDetection, BallTrack, ObjectTracks};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Team label produced by the external team assigner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "Team A"),
            Self::B => write!(f, "Team B"),
        }
    }
}

/// Per frame, player track ID to team label
pub type TeamAssignments = Vec<BTreeMap<u32, Team>>;

/// Per frame, the player in control of the ball
pub type PossessionRecord = Vec<Option<u32>>;

/// Court landmarks detected in one frame, keyed by reference keypoint index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourtKeypoints {
    pub points: BTreeMap<usize, [f32; 2]>,
}

impl CourtKeypoints {
    pub fn new(points: BTreeMap<usize, [f32; 2]>) -> Self {
        Self { points }
    }

    /// Convert a dense keypoint detector output where undetected points are
    /// reported at the origin
    pub fn from_detected(points: &[[f32; 2]]) -> Self {
        let points = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p[0].is_finite() && p[1].is_finite())
            .filter(|(_, p)| !(p[0] == 0.0 && p[1] == 0.0))
            .map(|(idx, p)| (idx, *p))
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<[f32; 2]> {
        self.points.get(&index).copied()
    }
}

/// Player position on the top-down reference court
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TacticalPosition {
    pub x: f32,
    pub y: f32,
    /// The projection fell outside the court and was moved onto its edge
    pub clamped: bool,
}

/// Projected players of one frame; `None` when the frame could not be calibrated
pub type FrameTacticalPositions = Option<BTreeMap<u32, TacticalPosition>>;

/// Everything the upstream collaborators deliver for one video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInputs {
    pub player_tracks: ObjectTracks,
    pub ball_detections: Vec<Vec<BallDetection>>,
    pub team_assignments: TeamAssignments,
    pub court_keypoints: Vec<CourtKeypoints>,
}

impl FrameInputs {
    /// Number of frames, after checking that every input covers the same frames
    pub fn frame_count(&self) -> Result<usize> {
        let expected = self.player_tracks.len();
        check_len("ball detections", expected, self.ball_detections.len())?;
        check_len("team assignments", expected, self.team_assignments.len())?;
        check_len("court keypoints", expected, self.court_keypoints.len())?;
        Ok(expected)
    }
}

pub(crate) fn check_len(input: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AnalyticsError::frame_mismatch(input, expected, actual))
    }
}

/// Results of a full analytics run, each indexed by frame except the event list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOutput {
    pub ball_track: BallTrack,
    pub possession: PossessionRecord,
    pub events: Vec<PossessionEvent>,
    pub tactical_positions: Vec<FrameTacticalPositions>,
    pub team_ball_control: Vec<Option<Team>>,
}
