//! Per-frame track storage and ball track post-processing
//!
//! Player tracks keep whatever IDs the upstream multi-object tracker assigned;
//! nothing here re-identifies objects. The ball is a single object, so its track
//! holds at most one box per frame and can be cleaned of implausible jumps and
//! gap-filled by linear interpolation.

use crate::bbox::{point_distance, Bbox};
use ndarray::Array2;
use num::cast;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A bounding box in one frame, flagged when synthesised by interpolation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedBox {
    pub bbox: Bbox<f32>,
    pub interpolated: bool,
}

impl TrackedBox {
    pub fn detected(bbox: Bbox<f32>) -> Self {
        Self {
            bbox,
            interpolated: false,
        }
    }

    pub fn interpolated(bbox: Bbox<f32>) -> Self {
        Self {
            bbox,
            interpolated: true,
        }
    }
}

/// Boxes of one frame keyed by track ID
pub type FrameTracks = BTreeMap<u32, TrackedBox>;

/// Multi-object tracks, one map per frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectTracks {
    pub frames: Vec<FrameTracks>,
}

impl ObjectTracks {
    pub fn new(frames: Vec<FrameTracks>) -> Self {
        Self { frames }
    }

    /// Build tracks from tracker output, one `N x 5` array per frame with rows
    /// `[x1, y1, x2, y2, track_id]`
    ///
    /// Rows that are too short, carry a degenerate box or an unusable ID are skipped.
    pub fn from_tracker_rows(frames: &[Array2<f32>]) -> Self {
        let frames: Vec<FrameTracks> = frames
            .par_iter()
            .enumerate()
            .map(|(frame_idx, rows)| {
                let mut tracks = FrameTracks::new();
                for row in rows.outer_iter() {
                    if row.len() < 5 {
                        log::warn!("Frame {}: tracker row has {} columns, expected 5", frame_idx, row.len());
                        continue;
                    }
                    let bbox = Bbox::new(row[0], row[1], row[2], row[3]);
                    let track_id: Option<u32> = cast(row[4]);
                    match track_id {
                        Some(id) if bbox.is_valid() => {
                            tracks.insert(id, TrackedBox::detected(bbox));
                        }
                        _ => {
                            log::warn!(
                                "Frame {}: dropping tracker row {} with id {}",
                                frame_idx,
                                bbox,
                                row[4]
                            );
                        }
                    }
                }
                tracks
            })
            .collect();

        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, frame_idx: usize) -> Option<&FrameTracks> {
        self.frames.get(frame_idx)
    }

    /// Sorted set of every track ID seen in any frame
    pub fn track_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .frames
            .iter()
            .flat_map(|frame| frame.keys().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Tracks with every invalid box removed
    ///
    /// Tracks built with `new` or deserialized never went through the row
    /// checks of `from_tracker_rows`. Borrows `self` when nothing is dropped.
    pub fn without_invalid_boxes(&self) -> Cow<'_, ObjectTracks> {
        let all_valid = self
            .frames
            .iter()
            .all(|frame| frame.values().all(|tracked| tracked.bbox.is_valid()));
        if all_valid {
            return Cow::Borrowed(self);
        }

        let frames = self
            .frames
            .iter()
            .enumerate()
            .map(|(frame_idx, frame)| {
                frame
                    .iter()
                    .filter(|(id, tracked)| {
                        let valid = tracked.bbox.is_valid();
                        if !valid {
                            log::warn!(
                                "Frame {}: dropping track {} with invalid {}",
                                frame_idx,
                                id,
                                tracked.bbox
                            );
                        }
                        valid
                    })
                    .map(|(id, tracked)| (*id, *tracked))
                    .collect()
            })
            .collect();
        Cow::Owned(Self { frames })
    }
}

/// One raw ball candidate from the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallDetection {
    pub bbox: Bbox<f32>,
    pub confidence: f32,
}

/// Limits applied when cleaning and gap-filling the ball track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallTrackParams {
    /// Largest plausible centre displacement per elapsed frame, in pixels
    pub max_ball_speed_px_per_frame: f32,
    /// Longest run of missing frames that may be filled
    pub max_interpolation_gap: usize,
}

/// Single-object track: at most one ball box per frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BallTrack {
    pub frames: Vec<Option<TrackedBox>>,
}

impl BallTrack {
    pub fn new(frames: Vec<Option<TrackedBox>>) -> Self {
        Self { frames }
    }

    /// Keep the most confident valid candidate of each frame
    pub fn from_detections(frames: &[Vec<BallDetection>]) -> Self {
        let frames = frames
            .iter()
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|det| det.bbox.is_valid())
                    .fold(None::<&BallDetection>, |best, det| match best {
                        Some(b) if b.confidence >= det.confidence => Some(b),
                        _ => Some(det),
                    })
                    .map(|det| TrackedBox::detected(det.bbox))
            })
            .collect();

        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame_idx: usize) -> Option<&TrackedBox> {
        self.frames.get(frame_idx).and_then(|b| b.as_ref())
    }

    /// Number of frames holding a box
    pub fn valid_count(&self) -> usize {
        self.frames.iter().filter(|b| b.is_some()).count()
    }

    /// Drop detections whose implied speed from the last accepted detection
    /// exceeds `max_ball_speed_px_per_frame`
    ///
    /// Frames are visited in order and a dropped detection never becomes the
    /// reference for later frames.
    pub fn remove_wrong_detections(&self, params: &BallTrackParams) -> BallTrack {
        let mut frames = self.frames.clone();
        let mut last_good: Option<(usize, [f32; 2])> = None;
        let mut removed = 0usize;

        for (frame_idx, slot) in frames.iter_mut().enumerate() {
            let Some(current) = slot.as_ref() else {
                continue;
            };
            let center = current.bbox.center();

            match last_good {
                None => last_good = Some((frame_idx, center)),
                Some((good_idx, good_center)) => {
                    let frame_gap = (frame_idx - good_idx) as f32;
                    let allowed = params.max_ball_speed_px_per_frame * frame_gap;
                    let displacement = point_distance(good_center, center);

                    if displacement > allowed {
                        log::debug!(
                            "Frame {}: ball jumped {:.1}px over {} frames (limit {:.1}px), removing",
                            frame_idx,
                            displacement,
                            frame_gap,
                            allowed
                        );
                        *slot = None;
                        removed += 1;
                    } else {
                        last_good = Some((frame_idx, center));
                    }
                }
            }
        }

        log::debug!("Removed {} implausible ball detections", removed);
        BallTrack { frames }
    }

    /// Fill interior gaps of at most `max_interpolation_gap` frames by linear
    /// interpolation between the surrounding detections
    ///
    /// Leading and trailing gaps are never extrapolated.
    pub fn interpolate_ball_positions(&self, params: &BallTrackParams) -> BallTrack {
        let mut frames = self.frames.clone();
        let anchors: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter_map(|(idx, b)| b.as_ref().map(|_| idx))
            .collect();

        let mut filled = 0usize;
        for pair in anchors.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            let gap = right - left - 1;
            if gap == 0 {
                continue;
            }
            if gap > params.max_interpolation_gap {
                log::debug!(
                    "Ball gap of {} frames between {} and {} exceeds limit {}, left empty",
                    gap,
                    left,
                    right,
                    params.max_interpolation_gap
                );
                continue;
            }

            let (Some(start), Some(end)) = (frames[left], frames[right]) else {
                continue;
            };
            let span = (right - left) as f32;
            for frame_idx in left + 1..right {
                let t = (frame_idx - left) as f32 / span;
                frames[frame_idx] = Some(TrackedBox::interpolated(start.bbox.lerp(&end.bbox, t)));
                filled += 1;
            }
        }

        log::debug!("Interpolated {} ball positions", filled);
        BallTrack { frames }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn params() -> BallTrackParams {
        BallTrackParams {
            max_ball_speed_px_per_frame: 25.0,
            max_interpolation_gap: 20,
        }
    }

    fn ball_at(x: f32, y: f32) -> Option<TrackedBox> {
        Some(TrackedBox::detected(Bbox::new(x, y, x + 10.0, y + 10.0)))
    }

    #[test]
    fn test_from_tracker_rows() {
        let frames = vec![
            array![[0.0, 0.0, 10.0, 20.0, 3.0], [50.0, 50.0, 60.0, 80.0, 7.0]],
            array![[5.0, 5.0, 5.0, 20.0, 3.0], [1.0, 1.0, 4.0, 4.0, -1.0]],
        ];
        let tracks = ObjectTracks::from_tracker_rows(&frames);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks.frames[0].len(), 2);
        assert_eq!(tracks.frames[0][&7].bbox, Bbox::new(50.0, 50.0, 60.0, 80.0));
        assert!(tracks.frames[1].is_empty());
        assert_eq!(tracks.track_ids(), vec![3, 7]);
    }

    #[test]
    fn test_without_invalid_boxes() {
        let mut frame = FrameTracks::new();
        frame.insert(1, TrackedBox::detected(Bbox::new(40.0, 0.0, 0.0, 100.0)));
        frame.insert(2, TrackedBox::detected(Bbox::new(0.0, 0.0, 40.0, 100.0)));
        let tracks = ObjectTracks::new(vec![frame]);

        let cleaned = tracks.without_invalid_boxes();
        assert!(matches!(cleaned, Cow::Owned(_)));
        assert_eq!(cleaned.track_ids(), vec![2]);

        let valid = cleaned.into_owned();
        assert!(matches!(valid.without_invalid_boxes(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_ball_from_detections_keeps_most_confident() {
        let frames = vec![
            vec![
                BallDetection {
                    bbox: Bbox::new(0.0, 0.0, 5.0, 5.0),
                    confidence: 0.4,
                },
                BallDetection {
                    bbox: Bbox::new(20.0, 20.0, 25.0, 25.0),
                    confidence: 0.9,
                },
            ],
            vec![],
        ];
        let track = BallTrack::from_detections(&frames);
        assert_eq!(track.get(0).map(|b| b.bbox.xmin), Some(20.0));
        assert!(track.get(1).is_none());
    }

    #[test]
    fn test_interpolation_midpoint() {
        let mut frames = vec![None; 11];
        frames[0] = Some(TrackedBox::detected(Bbox::new(0.0, 0.0, 10.0, 10.0)));
        frames[10] = Some(TrackedBox::detected(Bbox::new(100.0, 100.0, 110.0, 110.0)));
        let track = BallTrack::new(frames).interpolate_ball_positions(&params());

        let mid = track.get(5).unwrap();
        assert!(mid.interpolated);
        assert_abs_diff_eq!(mid.bbox.xmin, 50.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mid.bbox.ymin, 50.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mid.bbox.xmax, 60.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mid.bbox.ymax, 60.0, epsilon = 1e-4);
        assert_eq!(track.valid_count(), 11);
        assert!(!track.get(0).unwrap().interpolated);
    }

    #[test]
    fn test_interpolation_leaves_edges_and_long_gaps() {
        let mut frames = vec![None; 40];
        frames[3] = ball_at(0.0, 0.0);
        frames[5] = ball_at(10.0, 0.0);
        frames[30] = ball_at(20.0, 0.0);
        let track = BallTrack::new(frames).interpolate_ball_positions(&params());

        assert!(track.get(0).is_none());
        assert!(track.get(2).is_none());
        assert!(track.get(4).is_some());
        // 24-frame gap is longer than the limit of 20
        assert!(track.get(6).is_none());
        assert!(track.get(29).is_none());
        assert!(track.get(39).is_none());
    }

    #[test]
    fn test_interpolation_single_detection_is_noop() {
        let mut frames = vec![None; 5];
        frames[2] = ball_at(0.0, 0.0);
        let track = BallTrack::new(frames.clone());
        assert_eq!(track.interpolate_ball_positions(&params()), track);

        let empty = BallTrack::new(vec![None; 5]);
        assert_eq!(empty.interpolate_ball_positions(&params()).valid_count(), 0);
    }

    #[test]
    fn test_remove_wrong_detections() {
        let frames = vec![
            ball_at(0.0, 0.0),
            ball_at(20.0, 0.0),
            ball_at(500.0, 0.0), // teleport
            None,
            ball_at(80.0, 0.0), // 60px over 3 frames from frame 1
        ];
        let cleaned = BallTrack::new(frames).remove_wrong_detections(&params());

        assert!(cleaned.get(0).is_some());
        assert!(cleaned.get(1).is_some());
        assert!(cleaned.get(2).is_none());
        assert!(cleaned.get(4).is_some());
    }

    #[test]
    fn test_removed_detection_is_not_reference() {
        // Frame 2 is an outlier; frame 3 is close to it but far from frame 1
        let frames = vec![
            None,
            ball_at(0.0, 0.0),
            ball_at(300.0, 0.0),
            ball_at(310.0, 0.0),
        ];
        let cleaned = BallTrack::new(frames).remove_wrong_detections(&params());
        assert_eq!(cleaned.valid_count(), 1);
        assert!(cleaned.get(1).is_some());
    }

    #[test]
    fn test_removal_independent_of_batching() {
        let frames: Vec<Option<TrackedBox>> = (0..30)
            .map(|i| match i {
                7 | 19 => ball_at(900.0, 900.0),
                i if i % 4 == 0 => None,
                i => ball_at(i as f32 * 10.0, 0.0),
            })
            .collect();
        let track = BallTrack::new(frames);
        let whole = track.remove_wrong_detections(&params());

        // Same result when the caller feeds the prefix first
        let prefix = BallTrack::new(track.frames[..15].to_vec()).remove_wrong_detections(&params());
        assert_eq!(&whole.frames[..15], &prefix.frames[..]);
        assert!(whole.get(7).is_none());
        assert!(whole.get(19).is_none());
        assert!(whole.get(9).is_some());
    }
}
