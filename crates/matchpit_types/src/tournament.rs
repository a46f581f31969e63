//! Tournament records and their configuration enums.

use crate::veto::VetoStep;
use crate::{PlayerId, PlayerRef, TeamId, TournamentId};
use serde::{Deserialize, Serialize};

/// Bracket topology of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentKind {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
    Swiss,
    /// Teams are re-drawn from a shared player roster every round.
    PlayerShuffle,
}

/// Best-of-N series format. Determines how many maps are played and which
/// canonical veto order applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFormat {
    Bo1,
    Bo3,
    Bo5,
}

impl MatchFormat {
    /// Number of maps a completed veto produces for this format.
    pub fn map_count(&self) -> usize {
        match self {
            MatchFormat::Bo1 => 1,
            MatchFormat::Bo3 => 3,
            MatchFormat::Bo5 => 5,
        }
    }
}

/// How round-1 seeding orders the team list before pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedingMethod {
    /// Use the team list order as given (seed 1 first).
    Ranked,
    /// Shuffle the team list before pairing.
    Random,
}

/// Overall tournament lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Setup,
    Ready,
    InProgress,
    Completed,
    Cancelled,
}

/// Per-tournament knobs consumed by the bracket generator and veto sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSettings {
    pub seeding: SeedingMethod,
    /// Replaces the canonical veto order for the tournament's format when set.
    #[serde(default)]
    pub veto_order: Option<Vec<VetoStep>>,
    /// Skip the veto entirely; maps are taken from the front of the pool.
    #[serde(default)]
    pub skip_veto: bool,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            seeding: SeedingMethod::Ranked,
            veto_order: None,
            skip_veto: false,
        }
    }
}

/// A competing team with its fixed roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub tag: String,
    /// 1-based seed; lower is stronger.
    pub seed: u32,
    pub players: Vec<PlayerRef>,
}

impl Team {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, seed: u32) -> Self {
        Self {
            id: TeamId::new(),
            name: name.into(),
            tag: tag.into(),
            seed,
            players: Vec::new(),
        }
    }
}

/// A roster entry for player-shuffle tournaments. Tracks how often the player
/// sat out so excess players rotate fairly between rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShufflePlayer {
    pub id: PlayerId,
    pub name: String,
    pub times_sat_out: u32,
    pub dropped: bool,
}

impl ShufflePlayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            times_sat_out: 0,
            dropped: false,
        }
    }
}

/// The single active tournament. Exactly one exists at a time; deleting or
/// regenerating it cascades to every match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub kind: TournamentKind,
    pub format: MatchFormat,
    /// Ordered map pool the veto operates on.
    pub map_pool: Vec<String>,
    pub status: TournamentStatus,
    pub settings: TournamentSettings,
    pub teams: Vec<Team>,
    /// Player roster, only populated for [`TournamentKind::PlayerShuffle`].
    pub players: Vec<ShufflePlayer>,
    /// Players per ad hoc team, only meaningful for player shuffle.
    pub team_size: u32,
}

impl Tournament {
    pub fn new(name: impl Into<String>, kind: TournamentKind, format: MatchFormat) -> Self {
        Self {
            id: TournamentId::new(),
            name: name.into(),
            kind,
            format,
            map_pool: Vec::new(),
            status: TournamentStatus::Setup,
            settings: TournamentSettings::default(),
            teams: Vec::new(),
            players: Vec::new(),
            team_size: 5,
        }
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }
}
