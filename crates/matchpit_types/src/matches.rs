//! Match records and their lifecycle status.

use crate::config::MatchConfig;
use crate::veto::{TeamSlot, VetoState};
use crate::{MatchId, PlayerId, PlayerRef, ServerId, TeamId, TournamentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-match lifecycle status. Strictly linear except for explicit resets:
/// `Pending -> Ready -> Loaded -> Live -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Ready,
    Loaded,
    Live,
    Completed,
}

/// Which part of the bracket a match belongs to. Only double elimination
/// uses `Losers` and `Final`; every other topology stays in `Winners`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketStage {
    Winners,
    Losers,
    Final,
}

/// One competing side of a match: a fixed team, or an ad hoc roster drawn
/// per round in player-shuffle tournaments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideRef {
    Team(TeamId),
    Roster { name: String, players: Vec<PlayerRef> },
}

/// Forward link: where the winner (or loser) of a match advances to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advancement {
    pub target: MatchId,
    pub slot: TeamSlot,
}

/// Most recent live score snapshot reported by the game server.
///
/// `seq` orders snapshots; a snapshot with a lower sequence number than the
/// stored one is stale and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveScore {
    pub seq: u64,
    pub map_number: u32,
    pub team_one: u32,
    pub team_two: u32,
}

/// Per-player statistics from a final match report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatLine {
    pub player_id: PlayerId,
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

/// A single match in the bracket.
///
/// Invariant: `server_id` is `Some` exactly while the status is `Loaded` or
/// `Live`; resets and restarts clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    /// Stable external identifier, used as the webhook routing key.
    pub slug: String,
    pub stage: BracketStage,
    /// 1-based round number within the stage.
    pub round: u32,
    /// 1-based match number within the round.
    pub number: u32,
    pub status: MatchStatus,
    pub side_one: Option<SideRef>,
    pub side_two: Option<SideRef>,
    pub winner_to: Option<Advancement>,
    pub loser_to: Option<Advancement>,
    pub winner: Option<TeamSlot>,
    pub server_id: Option<ServerId>,
    /// Frozen at allocation time, never mutated afterwards.
    pub config: Option<MatchConfig>,
    pub veto: VetoState,
    pub live_score: Option<LiveScore>,
    pub connected_players: BTreeSet<PlayerId>,
    pub player_stats: Vec<PlayerStatLine>,
    pub demo_url: Option<String>,
    /// Guards the external rating pipeline against duplicate final reports.
    pub rating_submitted: bool,
}

impl Match {
    pub fn new(
        tournament_id: TournamentId,
        stage: BracketStage,
        round: u32,
        number: u32,
        veto: VetoState,
    ) -> Self {
        let id = MatchId::new();
        let slug = match stage {
            BracketStage::Winners => format!("r{round}m{number}-{}", id.short()),
            BracketStage::Losers => format!("l{round}m{number}-{}", id.short()),
            BracketStage::Final => format!("gf-{}", id.short()),
        };
        Self {
            id,
            tournament_id,
            slug,
            stage,
            round,
            number,
            status: MatchStatus::Pending,
            side_one: None,
            side_two: None,
            winner_to: None,
            loser_to: None,
            winner: None,
            server_id: None,
            config: None,
            veto,
            live_score: None,
            connected_players: BTreeSet::new(),
            player_stats: Vec::new(),
            demo_url: None,
            rating_submitted: false,
        }
    }

    pub fn has_both_sides(&self) -> bool {
        self.side_one.is_some() && self.side_two.is_some()
    }

    /// The slot a side reference occupies, if it is one of this match's sides.
    pub fn slot_of_team(&self, team: TeamId) -> Option<TeamSlot> {
        match (&self.side_one, &self.side_two) {
            (Some(SideRef::Team(t)), _) if *t == team => Some(TeamSlot::One),
            (_, Some(SideRef::Team(t))) if *t == team => Some(TeamSlot::Two),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::veto::VetoState;

    #[test]
    fn slug_encodes_stage_round_and_number() {
        let t = TournamentId::new();
        let m = Match::new(t, BracketStage::Winners, 2, 3, VetoState::new(vec![]));
        assert!(m.slug.starts_with("r2m3-"));
        let l = Match::new(t, BracketStage::Losers, 1, 1, VetoState::new(vec![]));
        assert!(l.slug.starts_with("l1m1-"));
        let f = Match::new(t, BracketStage::Final, 1, 1, VetoState::new(vec![]));
        assert!(f.slug.starts_with("gf-"));
    }

    #[test]
    fn slot_of_team_resolves_both_sides() {
        let t = TournamentId::new();
        let a = TeamId::new();
        let b = TeamId::new();
        let mut m = Match::new(t, BracketStage::Winners, 1, 1, VetoState::new(vec![]));
        m.side_one = Some(SideRef::Team(a));
        m.side_two = Some(SideRef::Team(b));
        assert_eq!(m.slot_of_team(a), Some(TeamSlot::One));
        assert_eq!(m.slot_of_team(b), Some(TeamSlot::Two));
        assert_eq!(m.slot_of_team(TeamId::new()), None);
    }
}
