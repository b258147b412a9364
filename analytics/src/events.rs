//! Pass and interception detection over the possession record
//!
//! A debouncing state machine turns the noisy per-frame possession record into
//! stable holders. Whenever the stable holder changes to another player an event
//! is emitted: a pass when both players share a team, an interception otherwise.

use crate::config::EventConfig;
use crate::error::Result;
use crate::types::{check_len, PossessionRecord, Team, TeamAssignments};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Pass,
    Interception,
}

/// A change of ball holder between two players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossessionEvent {
    pub kind: EventKind,
    /// Last frame the previous holder had the ball
    pub start_frame: usize,
    /// First frame of the new holder's possession run
    pub end_frame: usize,
    pub from_player: u32,
    pub to_player: u32,
    pub from_team: Team,
    pub to_team: Team,
}

/// Debounced possession state of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PossessionState {
    NoPossession,
    Held { player: u32, team: Option<Team> },
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    player: u32,
    team: Option<Team>,
    last_frame: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    player: u32,
    team: Option<Team>,
    first_frame: usize,
    run: usize,
}

/// Finite state machine fed one frame at a time, in frame order
#[derive(Debug, Clone)]
pub struct PossessionDebouncer {
    min_hold_frames: usize,
    next_frame: usize,
    state: PossessionState,
    // last stable holder, remembered through loose-ball frames
    holder: Option<Holder>,
    candidate: Option<Candidate>,
    events: Vec<PossessionEvent>,
    states: Vec<PossessionState>,
}

impl PossessionDebouncer {
    /// A candidate holder is accepted once it has held the ball for
    /// `min_hold_frames` consecutive frames; `0` accepts it on its first frame,
    /// the same as `1`.
    pub fn new(min_hold_frames: usize) -> Self {
        Self {
            min_hold_frames,
            next_frame: 0,
            state: PossessionState::NoPossession,
            holder: None,
            candidate: None,
            events: Vec::new(),
            states: Vec::new(),
        }
    }

    pub fn state(&self) -> PossessionState {
        self.state
    }

    /// Feed the next frame; returns the event completed in this frame, if any
    pub fn push(&mut self, possessor: Option<u32>, teams: &BTreeMap<u32, Team>) -> Option<PossessionEvent> {
        let frame_idx = self.next_frame;
        self.next_frame += 1;
        let mut emitted = None;

        match possessor {
            None => {
                self.candidate = None;
                self.state = PossessionState::NoPossession;
            }
            Some(player) if self.holder.is_some_and(|h| h.player == player) => {
                self.candidate = None;
                if let Some(holder) = self.holder.as_mut() {
                    holder.last_frame = frame_idx;
                    self.state = PossessionState::Held {
                        player,
                        team: holder.team,
                    };
                }
            }
            Some(player) => {
                let candidate = match self.candidate.take() {
                    Some(mut c) if c.player == player => {
                        c.run += 1;
                        c
                    }
                    _ => Candidate {
                        player,
                        team: teams.get(&player).copied(),
                        first_frame: frame_idx,
                        run: 1,
                    },
                };

                if candidate.run >= self.min_hold_frames {
                    emitted = self.holder.and_then(|prev| transition_event(&prev, &candidate));
                    self.holder = Some(Holder {
                        player: candidate.player,
                        team: candidate.team,
                        last_frame: frame_idx,
                    });
                    self.state = PossessionState::Held {
                        player: candidate.player,
                        team: candidate.team,
                    };
                } else {
                    self.candidate = Some(candidate);
                }
            }
        }

        self.states.push(self.state);
        if let Some(event) = emitted {
            log::debug!(
                "Frame {}: {:?} from player {} to player {}",
                frame_idx,
                event.kind,
                event.from_player,
                event.to_player
            );
            self.events.push(event);
        }
        emitted
    }

    pub fn events(&self) -> &[PossessionEvent] {
        &self.events
    }

    /// Debounced state of every frame pushed so far
    pub fn states(&self) -> &[PossessionState] {
        &self.states
    }

    pub fn into_parts(self) -> (Vec<PossessionEvent>, Vec<PossessionState>) {
        (self.events, self.states)
    }
}

fn transition_event(prev: &Holder, next: &Candidate) -> Option<PossessionEvent> {
    if prev.player == next.player {
        return None;
    }
    let (Some(from_team), Some(to_team)) = (prev.team, next.team) else {
        log::debug!(
            "Holder change {} -> {} at frame {} skipped, team unknown",
            prev.player,
            next.player,
            next.first_frame
        );
        return None;
    };

    let kind = if from_team == to_team {
        EventKind::Pass
    } else {
        EventKind::Interception
    };

    Some(PossessionEvent {
        kind,
        start_frame: prev.last_frame,
        end_frame: next.first_frame,
        from_player: prev.player,
        to_player: next.player,
        from_team,
        to_team,
    })
}

/// Runs the debouncer over a whole possession record
pub struct EventDetector {
    config: EventConfig,
}

impl EventDetector {
    pub fn new(config: EventConfig) -> Self {
        Self { config }
    }

    /// Debouncer state after consuming the full record
    pub fn run(&self, possession: &PossessionRecord, teams: &TeamAssignments) -> Result<PossessionDebouncer> {
        check_len("team assignments", possession.len(), teams.len())?;

        let mut debouncer = PossessionDebouncer::new(self.config.min_hold_frames);
        for (possessor, frame_teams) in possession.iter().zip(teams) {
            debouncer.push(*possessor, frame_teams);
        }
        Ok(debouncer)
    }

    /// All passes and interceptions in frame order
    pub fn detect_events(&self, possession: &PossessionRecord, teams: &TeamAssignments) -> Result<Vec<PossessionEvent>> {
        let (events, _) = self.run(possession, teams)?.into_parts();
        let passes = events.iter().filter(|e| e.kind == EventKind::Pass).count();
        log::info!(
            "Detected {} passes and {} interceptions",
            passes,
            events.len() - passes
        );
        Ok(events)
    }

    pub fn detect_passes(&self, possession: &PossessionRecord, teams: &TeamAssignments) -> Result<Vec<PossessionEvent>> {
        Ok(filter_kind(self.detect_events(possession, teams)?, EventKind::Pass))
    }

    pub fn detect_interceptions(
        &self,
        possession: &PossessionRecord,
        teams: &TeamAssignments,
    ) -> Result<Vec<PossessionEvent>> {
        Ok(filter_kind(
            self.detect_events(possession, teams)?,
            EventKind::Interception,
        ))
    }
}

fn filter_kind(events: Vec<PossessionEvent>, kind: EventKind) -> Vec<PossessionEvent> {
    events.into_iter().filter(|e| e.kind == kind).collect()
}

/// Running per-team totals of passes and interceptions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub passes_a: usize,
    pub passes_b: usize,
    /// Interceptions credited to the team that won the ball
    pub interceptions_a: usize,
    pub interceptions_b: usize,
}

impl EventCounts {
    /// Totals over events completed at or before `frame`
    pub fn up_to(events: &[PossessionEvent], frame: usize) -> Self {
        let mut counts = Self::default();
        for event in events.iter().filter(|e| e.end_frame <= frame) {
            match (event.kind, event.to_team) {
                (EventKind::Pass, Team::A) => counts.passes_a += 1,
                (EventKind::Pass, Team::B) => counts.passes_b += 1,
                (EventKind::Interception, Team::A) => counts.interceptions_a += 1,
                (EventKind::Interception, Team::B) => counts.interceptions_b += 1,
            }
        }
        counts
    }
}
