//! Projection of player positions onto the top-down tactical court
//!
//! Each frame is calibrated on its own from the court keypoints detected in it.
//! A frame without enough usable keypoints yields no positions at all; the
//! homography of a neighbouring frame is never reused because camera motion or a
//! cut would silently place players in the wrong spots.

use crate::config::{OutOfBoundsPolicy, TacticalConfig};
use crate::error::{AnalyticsError, Result};
use crate::types::{check_len, CourtKeypoints, FrameTacticalPositions, TacticalPosition};
use hooptrack::bbox::point_distance;
use hooptrack::{FrameTracks, Homography, ObjectTracks, MIN_CORRESPONDENCES};
use nalgebra::Point2;
use rayon::prelude::*;
use std::collections::BTreeMap;

// Distances from the court edges in meters
const BASELINE_MARK_M: f32 = 0.91;
const LANE_NEAR_M: f32 = 5.18;
const LANE_FAR_M: f32 = 10.0;
const SIDELINE_MARK_M: f32 = 14.1;
const FREE_THROW_M: f32 = 5.79;

/// Reference positions of the 18 court keypoints the keypoint detector reports,
/// in tactical court pixels
pub fn default_court_keypoints(width: f32, height: f32, width_m: f32, height_m: f32) -> Vec<[f32; 2]> {
    let y = |m: f32| m / height_m * height;
    let x = |m: f32| m / width_m * width;

    vec![
        // left edge
        [0.0, 0.0],
        [0.0, y(BASELINE_MARK_M)],
        [0.0, y(LANE_NEAR_M)],
        [0.0, y(LANE_FAR_M)],
        [0.0, y(SIDELINE_MARK_M)],
        [0.0, height],
        // middle line
        [width / 2.0, height],
        [width / 2.0, 0.0],
        // left free throw line
        [x(FREE_THROW_M), y(LANE_NEAR_M)],
        [x(FREE_THROW_M), y(LANE_FAR_M)],
        // right edge
        [width, height],
        [width, y(SIDELINE_MARK_M)],
        [width, y(LANE_FAR_M)],
        [width, y(LANE_NEAR_M)],
        [width, y(BASELINE_MARK_M)],
        [width, 0.0],
        // right free throw line
        [x(width_m - FREE_THROW_M), y(LANE_NEAR_M)],
        [x(width_m - FREE_THROW_M), y(LANE_FAR_M)],
    ]
}

/// Maps player foot points from the broadcast image onto the tactical court
pub struct TacticalViewConverter {
    config: TacticalConfig,
    key_points: Vec<[f32; 2]>,
}

impl TacticalViewConverter {
    /// Converter using the standard basketball court keypoint layout
    pub fn new(config: TacticalConfig) -> Self {
        let key_points = default_court_keypoints(
            config.court_width,
            config.court_height,
            config.court_width_m,
            config.court_height_m,
        );
        Self { config, key_points }
    }

    /// Converter with a custom reference keypoint table
    pub fn with_key_points(config: TacticalConfig, key_points: Vec<[f32; 2]>) -> Result<Self> {
        if key_points.len() < MIN_CORRESPONDENCES {
            return Err(AnalyticsError::config(format!(
                "Tactical court needs at least {} reference keypoints, got {}",
                MIN_CORRESPONDENCES,
                key_points.len()
            )));
        }
        Ok(Self { config, key_points })
    }

    pub fn key_points(&self) -> &[[f32; 2]] {
        &self.key_points
    }

    pub fn width(&self) -> f32 {
        self.config.court_width
    }

    pub fn height(&self) -> f32 {
        self.config.court_height
    }

    /// Relative error of the distance ratio `|ij| / |ik|` against the reference court
    ///
    /// `None` when the reference distances cannot form a ratio.
    fn ratio_error(&self, keypoints: &CourtKeypoints, i: usize, j: usize, k: usize) -> Option<f32> {
        let t_ij = point_distance(self.key_points[i], self.key_points[j]);
        let t_ik = point_distance(self.key_points[i], self.key_points[k]);
        if t_ij <= 0.0 || t_ik <= 0.0 {
            return None;
        }
        let (pi, pj, pk) = (keypoints.get(i)?, keypoints.get(j)?, keypoints.get(k)?);
        let d_ij = point_distance(pi, pj);
        let d_ik = point_distance(pi, pk);

        let expected = t_ij / t_ik;
        if d_ik > 0.0 {
            Some(((d_ij / d_ik) - expected).abs() / expected)
        } else {
            Some(f32::INFINITY)
        }
    }

    /// Every `(apex, j, k)` among `members` whose distance ratio is out of tolerance
    fn inconsistent_ratios(&self, keypoints: &CourtKeypoints, members: &[usize]) -> Vec<(usize, usize, usize)> {
        let tolerance = self.config.keypoint_proportion_tolerance;
        let mut failing = Vec::new();
        for &apex in members {
            for (pos, &j) in members.iter().enumerate() {
                for &k in &members[pos + 1..] {
                    if j == apex || k == apex {
                        continue;
                    }
                    if self
                        .ratio_error(keypoints, apex, j, k)
                        .is_some_and(|error| error > tolerance)
                    {
                        failing.push((apex, j, k));
                    }
                }
            }
        }
        failing
    }

    /// Drop keypoints whose distances to the other keypoints are out of
    /// proportion with the same distances on the reference court
    ///
    /// While any ratio among the kept points is out of tolerance, the point
    /// whose removal leaves the fewest inconsistent ratios is dropped. Ties go
    /// to the point that is the apex of the most failing ratios; a remaining
    /// tie drops every tied point, since no calibration beats a wrong one.
    pub fn validate_keypoints(&self, keypoints: &CourtKeypoints) -> CourtKeypoints {
        let mut kept: Vec<usize> = keypoints
            .points
            .keys()
            .copied()
            .filter(|&idx| idx < self.key_points.len())
            .collect();
        let mut rejected: Vec<usize> = Vec::new();

        while kept.len() >= 3 {
            let failing = self.inconsistent_ratios(keypoints, &kept);
            if failing.is_empty() {
                break;
            }

            let leave_one_out: Vec<(usize, usize)> = kept
                .iter()
                .map(|&i| {
                    let rest: Vec<usize> = kept.iter().copied().filter(|&idx| idx != i).collect();
                    (i, self.inconsistent_ratios(keypoints, &rest).len())
                })
                .collect();
            let fewest = leave_one_out.iter().map(|(_, count)| *count).min().unwrap_or(0);
            let mut suspects: Vec<usize> = leave_one_out
                .iter()
                .filter(|(_, count)| *count == fewest)
                .map(|(i, _)| *i)
                .collect();

            if suspects.len() > 1 {
                let apex_failures = |i: usize| failing.iter().filter(|(apex, _, _)| *apex == i).count();
                let most = suspects.iter().map(|&i| apex_failures(i)).max().unwrap_or(0);
                suspects.retain(|&i| apex_failures(i) == most);
            }

            log::debug!(
                "Keypoints {:?} rejected: {} distance ratios exceed tolerance {:.2}",
                suspects,
                failing.len(),
                self.config.keypoint_proportion_tolerance
            );
            kept.retain(|idx| !suspects.contains(idx));
            rejected.extend(suspects);
        }

        let points = keypoints
            .points
            .iter()
            .filter(|(idx, _)| !rejected.contains(idx))
            .map(|(idx, p)| (*idx, *p))
            .collect();
        CourtKeypoints::new(points)
    }

    /// Image-to-court homography of one frame, if it can be calibrated
    pub fn frame_homography(&self, keypoints: &CourtKeypoints) -> Option<Homography> {
        let keypoints = if self.config.validate_keypoints {
            self.validate_keypoints(keypoints)
        } else {
            keypoints.clone()
        };

        let (src, dst): (Vec<Point2<f64>>, Vec<Point2<f64>>) = keypoints
            .points
            .iter()
            .filter_map(|(&idx, image)| {
                self.key_points.get(idx).map(|court| {
                    (
                        Point2::new(image[0] as f64, image[1] as f64),
                        Point2::new(court[0] as f64, court[1] as f64),
                    )
                })
            })
            .unzip();

        if src.len() < MIN_CORRESPONDENCES {
            log::trace!("Only {} usable court keypoints, frame left uncalibrated", src.len());
            return None;
        }

        let fitted = if self.config.use_ransac && src.len() > MIN_CORRESPONDENCES {
            Homography::estimate_ransac(&src, &dst, &self.config.ransac_params()).map(|(h, _)| h)
        } else {
            Homography::estimate(&src, &dst)
        };

        match fitted {
            Ok(homography) => Some(homography),
            Err(e) => {
                log::debug!("Court homography fit failed: {}", e);
                None
            }
        }
    }

    /// Tactical positions of one frame's players
    pub fn project_frame(&self, keypoints: &CourtKeypoints, players: &FrameTracks) -> FrameTacticalPositions {
        let homography = self.frame_homography(keypoints)?;
        let (width, height) = (self.config.court_width, self.config.court_height);

        let positions = players
            .iter()
            .filter_map(|(&player_id, tracked)| {
                let foot = tracked.bbox.foot_point();
                let projected = homography.project(&Point2::new(foot[0] as f64, foot[1] as f64))?;
                let (x, y) = (projected.x as f32, projected.y as f32);

                let inside = (0.0..=width).contains(&x) && (0.0..=height).contains(&y);
                if inside {
                    return Some((player_id, TacticalPosition { x, y, clamped: false }));
                }
                match self.config.out_of_bounds {
                    OutOfBoundsPolicy::Clamp => Some((
                        player_id,
                        TacticalPosition {
                            x: x.clamp(0.0, width),
                            y: y.clamp(0.0, height),
                            clamped: true,
                        },
                    )),
                    OutOfBoundsPolicy::Discard => {
                        log::trace!("Player {} projected off court at ({:.1}, {:.1})", player_id, x, y);
                        None
                    }
                }
            })
            .collect::<BTreeMap<u32, TacticalPosition>>();

        Some(positions)
    }

    /// Tactical positions of every frame; `None` for frames that could not be calibrated
    pub fn transform_players_to_tactical_view(
        &self,
        keypoints_per_frame: &[CourtKeypoints],
        player_tracks: &ObjectTracks,
    ) -> Result<Vec<FrameTacticalPositions>> {
        check_len("court keypoints", player_tracks.len(), keypoints_per_frame.len())?;

        let positions: Vec<FrameTacticalPositions> = keypoints_per_frame
            .par_iter()
            .zip(player_tracks.frames.par_iter())
            .map(|(keypoints, players)| self.project_frame(keypoints, players))
            .collect();

        let calibrated = positions.iter().filter(|p| p.is_some()).count();
        log::info!(
            "Tactical view calibrated in {}/{} frames",
            calibrated,
            positions.len()
        );
        Ok(positions)
    }
}
