//! Per-frame ball possession assignment
//!
//! Every frame is decided on its own. Noise in these decisions is expected and is
//! filtered later by the event debouncer, not here.

use crate::config::PossessionConfig;
use crate::error::Result;
use crate::types::{check_len, PossessionRecord};
use hooptrack::{BallTrack, Bbox, FrameTracks, ObjectTracks};
use rayon::prelude::*;

/// Proximity of one player to the ball
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerScore {
    pub player_id: u32,
    /// Distance from the ball centre to the nearest point of the player box
    pub distance: f32,
    /// Ball centre inside the reach-expanded player box
    pub contained: bool,
    /// Lower is better
    pub score: f32,
}

/// Score every player within the possession distance, best first
///
/// Equal scores are ordered by track ID so the lowest ID wins ties.
pub fn score_players(players: &FrameTracks, ball: &Bbox<f32>, config: &PossessionConfig) -> Vec<PlayerScore> {
    let ball_center = ball.center();

    let mut scores: Vec<PlayerScore> = players
        .iter()
        .filter_map(|(&player_id, tracked)| {
            let distance = tracked.bbox.distance_to_point(ball_center);
            if distance > config.max_possession_distance_px {
                return None;
            }
            let contained = tracked
                .bbox
                .expanded(config.reach_margin_px)
                .contains_point(ball_center);
            let bonus = if contained {
                config.containment_bonus_px
            } else {
                0.0
            };
            Some(PlayerScore {
                player_id,
                distance,
                contained,
                score: distance - bonus,
            })
        })
        .collect();

    scores.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    scores
}

/// The player holding the ball in one frame, if any
pub fn assign_frame(players: &FrameTracks, ball: Option<&Bbox<f32>>, config: &PossessionConfig) -> Option<u32> {
    let ball = ball?;
    score_players(players, ball, config)
        .first()
        .map(|best| best.player_id)
}

/// Assigns possession for every frame of a video
pub struct PossessionAssigner {
    config: PossessionConfig,
}

impl PossessionAssigner {
    pub fn new(config: PossessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PossessionConfig {
        &self.config
    }

    /// Possessing player per frame; frames without ball or players get `None`
    pub fn detect_ball_possession(
        &self,
        player_tracks: &ObjectTracks,
        ball_track: &BallTrack,
    ) -> Result<PossessionRecord> {
        check_len("ball track", player_tracks.len(), ball_track.len())?;

        let possession: PossessionRecord = player_tracks
            .frames
            .par_iter()
            .enumerate()
            .map(|(frame_idx, players)| {
                let ball = ball_track.get(frame_idx).map(|b| &b.bbox);
                assign_frame(players, ball, &self.config)
            })
            .collect();

        let held = possession.iter().filter(|p| p.is_some()).count();
        log::info!(
            "Possession assigned in {}/{} frames",
            held,
            possession.len()
        );
        Ok(possession)
    }
}
