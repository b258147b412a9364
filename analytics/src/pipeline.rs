/// Analytics pipeline: ball clean-up, then possession/events and tactical projection
use crate::cache::StageCache;
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::events::{EventDetector, PossessionEvent};
use crate::possession::PossessionAssigner;
use crate::tactical::TacticalViewConverter;
use crate::team_control::team_ball_control;
use crate::types::{AnalyticsOutput, FrameInputs, FrameTacticalPositions, PossessionRecord, Team};
use hooptrack::{BallDetection, BallTrack, ObjectTracks};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;

/// Stage output with its wall-clock duration
#[derive(Clone, Debug)]
pub struct StageResult<T> {
    pub data: T,
    pub stage_name: &'static str,
    pub duration_ms: f32,
}

/// Timing information for each pipeline stage
///
/// Possession, events and team control run alongside the tactical projection,
/// so the stage times do not add up to the total.
#[derive(Clone, Debug, Default)]
pub struct PipelineTiming {
    pub ball_track_ms: f32,
    pub possession_ms: f32,
    pub events_ms: f32,
    pub team_control_ms: f32,
    pub tactical_ms: f32,
    pub total_ms: f32,
}

fn run_stage<T>(stage_name: &'static str, stage: impl FnOnce() -> Result<T>) -> Result<StageResult<T>> {
    let start = Instant::now();
    let data = stage()?;
    let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
    log::debug!("Stage {} finished in {:.1}ms", stage_name, duration_ms);
    Ok(StageResult {
        data,
        stage_name,
        duration_ms,
    })
}

/// Load a stage output from the cache, or compute and store it
fn cached_stage<T>(cache: &StageCache, key: &str, stage: impl FnOnce() -> Result<T>) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    if let Some(stored) = cache.read_stub(key)? {
        log::info!("Using cached {}", key);
        return Ok(stored);
    }
    let data = stage()?;
    cache.save_stub(key, &data)?;
    Ok(data)
}

struct DownstreamOutput {
    possession: StageResult<PossessionRecord>,
    events: StageResult<Vec<PossessionEvent>>,
    team_ball_control: StageResult<Vec<Option<Team>>>,
}

pub struct AnalyticsPipeline {
    config: AnalyticsConfig,
    possession: PossessionAssigner,
    events: EventDetector,
    tactical: TacticalViewConverter,
}

impl AnalyticsPipeline {
    /// Validate the configuration and build every stage
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        let tactical = TacticalViewConverter::new(config.tactical.clone());
        Self::with_tactical_converter(config, tactical)
    }

    /// Pipeline with a custom tactical court, e.g. a non-standard keypoint table
    pub fn with_tactical_converter(config: AnalyticsConfig, tactical: TacticalViewConverter) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            possession: PossessionAssigner::new(config.possession.clone()),
            events: EventDetector::new(config.events.clone()),
            tactical,
            config,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Best candidate per frame, outliers removed, short gaps filled
    pub fn clean_ball_track(&self, detections: &[Vec<BallDetection>]) -> BallTrack {
        let params = self.config.ball.params();
        let raw = BallTrack::from_detections(detections);
        let cleaned = raw.remove_wrong_detections(&params);
        let filled = cleaned.interpolate_ball_positions(&params);
        log::info!(
            "Ball track: {} detected, {} kept, {} after interpolation of {} frames",
            raw.valid_count(),
            cleaned.valid_count(),
            filled.valid_count(),
            filled.len()
        );
        filled
    }

    /// Run every stage on one video's inputs
    pub fn run(&self, inputs: &FrameInputs) -> Result<AnalyticsOutput> {
        self.run_with_timing(inputs).map(|(output, _)| output)
    }

    /// Run every stage and report how long each one took
    pub fn run_with_timing(&self, inputs: &FrameInputs) -> Result<(AnalyticsOutput, PipelineTiming)> {
        let start_total = Instant::now();
        let frames = inputs.frame_count()?;
        log::info!("Running court analytics on {} frames", frames);

        let players = inputs.player_tracks.without_invalid_boxes();
        let ball = run_stage("ball_track", || Ok(self.clean_ball_track(&inputs.ball_detections)))?;

        let (downstream, tactical) = rayon::join(
            || self.possession_and_events(inputs, &players, &ball.data),
            || {
                run_stage("tactical", || {
                    self.tactical
                        .transform_players_to_tactical_view(&inputs.court_keypoints, &players)
                })
            },
        );
        let downstream = downstream?;
        let tactical = tactical?;

        let timing = PipelineTiming {
            ball_track_ms: ball.duration_ms,
            possession_ms: downstream.possession.duration_ms,
            events_ms: downstream.events.duration_ms,
            team_control_ms: downstream.team_ball_control.duration_ms,
            tactical_ms: tactical.duration_ms,
            total_ms: start_total.elapsed().as_secs_f32() * 1000.0,
        };
        log::debug!(
            "Pipeline timing - Ball: {:.1}ms, Possession: {:.1}ms, Events: {:.1}ms, Tactical: {:.1}ms, Total: {:.1}ms",
            timing.ball_track_ms,
            timing.possession_ms,
            timing.events_ms,
            timing.tactical_ms,
            timing.total_ms
        );

        let output = AnalyticsOutput {
            ball_track: ball.data,
            possession: downstream.possession.data,
            events: downstream.events.data,
            tactical_positions: tactical.data,
            team_ball_control: downstream.team_ball_control.data,
        };
        Ok((output, timing))
    }

    /// Like `run`, but each stage output found in the cache under
    /// `"{run_key}.{stage}"` is used instead of being recomputed
    pub fn run_cached(&self, inputs: &FrameInputs, cache: &StageCache, run_key: &str) -> Result<AnalyticsOutput> {
        inputs.frame_count()?;
        let players = inputs.player_tracks.without_invalid_boxes();
        let key = |stage: &str| format!("{}.{}", run_key, stage);

        let ball_track = cached_stage(cache, &key("ball_track"), || {
            Ok(self.clean_ball_track(&inputs.ball_detections))
        })?;

        let (downstream, tactical_positions) = rayon::join(
            || -> Result<(PossessionRecord, Vec<PossessionEvent>, Vec<Option<Team>>)> {
                let possession = cached_stage(cache, &key("possession"), || {
                    self.possession
                        .detect_ball_possession(&players, &ball_track)
                })?;
                let events = cached_stage(cache, &key("events"), || {
                    self.events
                        .detect_events(&possession, &inputs.team_assignments)
                })?;
                let control = cached_stage(cache, &key("team_ball_control"), || {
                    team_ball_control(&possession, &inputs.team_assignments)
                })?;
                Ok((possession, events, control))
            },
            || -> Result<Vec<FrameTacticalPositions>> {
                cached_stage(cache, &key("tactical"), || {
                    self.tactical
                        .transform_players_to_tactical_view(&inputs.court_keypoints, &players)
                })
            },
        );
        let (possession, events, team_ball_control) = downstream?;

        Ok(AnalyticsOutput {
            ball_track,
            possession,
            events,
            tactical_positions: tactical_positions?,
            team_ball_control,
        })
    }

    fn possession_and_events(
        &self,
        inputs: &FrameInputs,
        players: &ObjectTracks,
        ball_track: &BallTrack,
    ) -> Result<DownstreamOutput> {
        let possession = run_stage("possession", || {
            self.possession
                .detect_ball_possession(players, ball_track)
        })?;
        let events = run_stage("events", || {
            self.events
                .detect_events(&possession.data, &inputs.team_assignments)
        })?;
        let team_ball_control = run_stage("team_ball_control", || {
            team_ball_control(&possession.data, &inputs.team_assignments)
        })?;

        Ok(DownstreamOutput {
            possession,
            events,
            team_ball_control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use crate::events::EventKind;
    use crate::types::CourtKeypoints;
    use hooptrack::{Bbox, FrameTracks, ObjectTracks, TrackedBox};
    use std::collections::BTreeMap;

    const PLAYER_A: [f32; 4] = [0.0, 0.0, 40.0, 100.0];
    const PLAYER_B: [f32; 4] = [200.0, 0.0, 240.0, 100.0];

    fn ball_at(cx: f32) -> Vec<BallDetection> {
        vec![BallDetection {
            bbox: Bbox::new(cx - 5.0, 45.0, cx + 5.0, 55.0),
            confidence: 0.9,
        }]
    }

    /// Player 1 (A) holds the ball for 8 frames, it is lost for 2, then player 2 (B)
    /// holds it for 10 frames
    fn inputs() -> FrameInputs {
        let players: FrameTracks = [
            (1, TrackedBox::detected(Bbox::from_bounds(PLAYER_A))),
            (2, TrackedBox::detected(Bbox::from_bounds(PLAYER_B))),
        ]
        .into_iter()
        .collect();
        let teams: BTreeMap<u32, Team> = [(1, Team::A), (2, Team::B)].into_iter().collect();
        let court = CourtKeypoints::new(
            [
                (0, [0.0, 0.0]),
                (5, [0.0, 161.0]),
                (10, [300.0, 161.0]),
                (15, [300.0, 0.0]),
            ]
            .into_iter()
            .collect(),
        );

        let ball_detections = (0..20)
            .map(|f| match f {
                0..=7 => ball_at(20.0),
                8 | 9 => vec![],
                _ => ball_at(220.0),
            })
            .collect();

        FrameInputs {
            player_tracks: ObjectTracks::new(vec![players; 20]),
            ball_detections,
            team_assignments: vec![teams; 20],
            court_keypoints: vec![court; 20],
        }
    }

    fn config() -> AnalyticsConfig {
        let mut config = AnalyticsConfig::default();
        config.ball.max_ball_speed_px_per_frame = 100.0;
        config.ball.max_interpolation_gap = 1;
        config.events.min_hold_frames = 3;
        config
    }

    #[test]
    fn test_end_to_end() {
        let pipeline = AnalyticsPipeline::new(config()).unwrap();
        let output = pipeline.run(&inputs()).unwrap();

        assert_eq!(output.ball_track.valid_count(), 18);
        assert_eq!(output.possession[0], Some(1));
        assert_eq!(output.possession[8], None);
        assert_eq!(output.possession[19], Some(2));

        assert_eq!(output.events.len(), 1);
        let event = output.events[0];
        assert_eq!(event.kind, EventKind::Interception);
        assert_eq!((event.start_frame, event.end_frame), (7, 10));
        assert_eq!((event.from_player, event.to_player), (1, 2));

        assert_eq!(output.team_ball_control[3], Some(Team::A));
        assert_eq!(output.team_ball_control[9], None);
        assert_eq!(output.team_ball_control[12], Some(Team::B));

        assert_eq!(output.tactical_positions.len(), 20);
        let frame = output.tactical_positions[0].as_ref().unwrap();
        approx::assert_abs_diff_eq!(frame[&2].x, 220.0, epsilon = 1e-2);
        approx::assert_abs_diff_eq!(frame[&2].y, 100.0, epsilon = 1e-2);
    }

    #[test]
    fn test_timing_is_reported() {
        let pipeline = AnalyticsPipeline::new(config()).unwrap();
        let (output, timing) = pipeline.run_with_timing(&inputs()).unwrap();
        assert_eq!(output, pipeline.run(&inputs()).unwrap());
        assert!(timing.total_ms >= timing.ball_track_ms);
    }

    #[test]
    fn test_no_ball_means_no_events() {
        let mut no_ball = inputs();
        no_ball.ball_detections = vec![vec![]; 20];
        let output = AnalyticsPipeline::new(config()).unwrap().run(&no_ball).unwrap();
        assert!(output.possession.iter().all(|p| p.is_none()));
        assert!(output.events.is_empty());
    }

    #[test]
    fn test_frame_mismatch_is_rejected() {
        let mut short = inputs();
        short.court_keypoints.pop();
        let result = AnalyticsPipeline::new(config()).unwrap().run(&short);
        assert!(matches!(
            result,
            Err(AnalyticsError::FrameCountMismatch {
                input: "court keypoints",
                ..
            })
        ));
    }

    #[test]
    fn test_inverted_player_box_from_json_is_dropped() {
        let json = r#"{
            "player_tracks": { "frames": [
                {
                    "1": { "bbox": { "xmin": 40.0, "ymin": 0.0, "xmax": 0.0, "ymax": 100.0 }, "interpolated": false },
                    "2": { "bbox": { "xmin": 0.0, "ymin": 0.0, "xmax": 40.0, "ymax": 100.0 }, "interpolated": false }
                }
            ] },
            "ball_detections": [
                [ { "bbox": { "xmin": 15.0, "ymin": 45.0, "xmax": 25.0, "ymax": 55.0 }, "confidence": 0.9 } ]
            ],
            "team_assignments": [ { "1": "A", "2": "B" } ],
            "court_keypoints": [ { "points": {} } ]
        }"#;
        let inputs: FrameInputs = serde_json::from_str(json).unwrap();

        let output = AnalyticsPipeline::new(config()).unwrap().run(&inputs).unwrap();
        assert_eq!(output.possession, vec![Some(2)]);
        assert_eq!(output.team_ball_control, vec![Some(Team::B)]);
        assert_eq!(output.tactical_positions, vec![None]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config();
        bad.possession.max_possession_distance_px = 0.0;
        assert!(AnalyticsPipeline::new(bad).is_err());
    }

    #[test]
    fn test_cached_run_matches_and_prefers_stubs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path()).unwrap();
        let pipeline = AnalyticsPipeline::new(config()).unwrap();

        let fresh = pipeline.run(&inputs()).unwrap();
        let first = pipeline.run_cached(&inputs(), &cache, "game1").unwrap();
        assert_eq!(first, fresh);
        assert!(cache.path_for("game1.possession").exists());
        assert!(cache.path_for("game1.tactical").exists());

        // A stored stub wins over recomputation
        cache.save_stub("game2.events", &Vec::<PossessionEvent>::new()).unwrap();
        let second = pipeline.run_cached(&inputs(), &cache, "game2").unwrap();
        assert!(second.events.is_empty());
        assert_eq!(second.possession, fresh.possession);
    }
}
