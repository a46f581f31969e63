//! Error types for the orchestration core.
//!
//! The taxonomy mirrors how failures surface to administrators: validation
//! errors reject synchronously with no state change, protocol failures are
//! recorded per server and never abort a whole pass, and state conflicts
//! turn the offending transition into a reported no-op.

use matchpit_types::{MatchFormat, MatchId, MatchStatus, TournamentKind, TournamentStatus};
use matchpit_types::{TeamSlot, VetoActionKind};
use std::time::Duration;
use thiserror::Error;

/// Bad topology or team counts. Rejected before any match is created.
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("{kind:?} requires a power-of-two team count, got {count}")]
    NotPowerOfTwo { kind: TournamentKind, count: usize },

    #[error("{kind:?} needs at least {min} teams, got {count}")]
    TooFewTeams {
        kind: TournamentKind,
        min: usize,
        count: usize,
    },

    #[error("swiss requires an even team count, got {0}")]
    OddTeamCount(usize),

    #[error("player shuffle with a team size of {team_size} needs at least {min} players, got {count}")]
    TooFewPlayers {
        team_size: u32,
        min: usize,
        count: usize,
    },

    #[error("a map pool of {pool} maps cannot support a {format:?} veto")]
    PoolTooSmall { pool: usize, format: MatchFormat },

    #[error("tournament is in progress; regeneration requires force")]
    TournamentLive,

    #[error("cannot pair the next round while current-round matches are unfinished")]
    RoundUnfinished,
}

/// Invalid veto submissions. The veto state is left untouched.
#[derive(Debug, Error)]
pub enum VetoError {
    #[error("the veto is already complete")]
    AlreadyComplete,

    #[error("it is not team {0:?}'s turn")]
    OutOfTurn(TeamSlot),

    #[error("the current step requires a {expected:?} action")]
    WrongKind { expected: VetoActionKind },

    #[error("map {0:?} is not in the remaining pool")]
    MapUnavailable(String),

    #[error("no picked map to attach a side to")]
    NoPickForSide,
}

/// A transition was attempted from an unexpected source state. The attempt
/// is a no-op; callers report it as a rejected event, never a crash.
#[derive(Debug, Error)]
#[error("match is {actual:?}, transition expected {expected}")]
pub struct StateConflict {
    pub expected: &'static str,
    pub actual: MatchStatus,
}

/// Per-server command failures. Recorded per match in allocation reports.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("server rejected authentication")]
    Auth,

    #[error("command deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("command {index} failed after {completed} succeeded: {reason}")]
    Partial {
        index: usize,
        completed: usize,
        reason: String,
    },
}

/// Aggregate error for engine-level operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no active tournament")]
    NoTournament,

    #[error("tournament is {0:?} and cannot be allocated")]
    NotAllocatable(TournamentStatus),

    #[error("tournament is {actual:?}, expected one of {expected:?}")]
    TournamentConflict {
        expected: &'static [TournamentStatus],
        actual: TournamentStatus,
    },

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("no match with slug {0:?}")]
    UnknownSlug(String),

    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error(transparent)]
    Veto(#[from] VetoError),

    #[error(transparent)]
    Conflict(#[from] StateConflict),
}

pub type CoreResult<T> = Result<T, CoreError>;
pub type BracketResult<T> = Result<T, BracketError>;
pub type VetoResult<T> = Result<T, VetoError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
