//! Team ball control per frame and its running share

use crate::error::Result;
use crate::types::{check_len, PossessionRecord, Team, TeamAssignments};
use serde::{Deserialize, Serialize};

/// Team of the possessing player in every frame
///
/// Frames without a holder, or whose holder has no team label, are `None`.
pub fn team_ball_control(possession: &PossessionRecord, teams: &TeamAssignments) -> Result<Vec<Option<Team>>> {
    check_len("team assignments", possession.len(), teams.len())?;

    Ok(possession
        .iter()
        .zip(teams)
        .map(|(holder, frame_teams)| holder.and_then(|player| frame_teams.get(&player).copied()))
        .collect())
}

/// Share of controlled frames held by each team, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BallControlStats {
    pub team_a_pct: f32,
    pub team_b_pct: f32,
}

impl BallControlStats {
    /// Share over all frames; frames nobody controlled are ignored
    pub fn total(control: &[Option<Team>]) -> Self {
        Self::per_frame(control).last().copied().unwrap_or_default()
    }

    /// Running share after every frame
    pub fn per_frame(control: &[Option<Team>]) -> Vec<Self> {
        let mut a = 0usize;
        let mut b = 0usize;

        control
            .iter()
            .map(|team| {
                match team {
                    Some(Team::A) => a += 1,
                    Some(Team::B) => b += 1,
                    None => {}
                }
                let total = a + b;
                if total == 0 {
                    Self::default()
                } else {
                    Self {
                        team_a_pct: a as f32 * 100.0 / total as f32,
                        team_b_pct: b as f32 * 100.0 / total as f32,
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_team_ball_control() {
        let labels: BTreeMap<u32, Team> = [(1, Team::A), (2, Team::B)].into_iter().collect();
        let teams = vec![labels; 4];
        let possession = vec![Some(1), None, Some(2), Some(7)];

        let control = team_ball_control(&possession, &teams).unwrap();
        assert_eq!(control, vec![Some(Team::A), None, Some(Team::B), None]);

        assert!(team_ball_control(&possession, &teams[..3].to_vec()).is_err());
    }

    #[test]
    fn test_running_share() {
        let control = [None, Some(Team::A), Some(Team::A), None, Some(Team::B)];
        let stats = BallControlStats::per_frame(&control);

        assert_eq!(stats.len(), 5);
        assert_eq!(stats[0], BallControlStats::default());
        assert_abs_diff_eq!(stats[2].team_a_pct, 100.0);
        assert_abs_diff_eq!(stats[4].team_a_pct, 200.0 / 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(stats[4].team_b_pct, 100.0 / 3.0, epsilon = 1e-4);
        assert_eq!(BallControlStats::total(&control), stats[4]);
        assert_eq!(BallControlStats::total(&[]), BallControlStats::default());
    }
}
