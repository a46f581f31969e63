//! The repository seam between the orchestration core and storage.
//!
//! Every component operates through this trait instead of touching storage
//! directly, so tests (and alternative backends) substitute freely. The
//! mutating operations are shaped as atomic compare-and-act primitives:
//! `modify_match` applies a closure under the store's per-match lock, and
//! `claim_server` is the check-then-set that prevents two allocation passes
//! racing onto the same server.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use matchpit_types::{GameServer, Match, MatchId, ServerId, Tournament, TournamentStatus};

/// An atomic read-modify-write applied to one match. Returning an error
/// aborts the write and leaves the stored match untouched.
pub type MatchMutation = Box<dyn FnOnce(&mut Match) -> Result<(), CoreError> + Send>;

#[async_trait]
pub trait Repository: Send + Sync {
    // -- tournament (exactly one active at a time) ---------------------------

    async fn active_tournament(&self) -> Option<Tournament>;

    async fn put_tournament(&self, tournament: Tournament);

    /// Remove the tournament and cascade to all matches; releases every
    /// server occupancy marker. Returns false when nothing was stored.
    async fn delete_tournament(&self) -> bool;

    /// Compare-and-set on the tournament status.
    async fn update_tournament_status(
        &self,
        expected: &'static [TournamentStatus],
        next: TournamentStatus,
    ) -> CoreResult<()>;

    // -- matches -------------------------------------------------------------

    /// All matches, ordered by round ascending, then bracket stage, then
    /// match number. Allocation depends on this order being stable.
    async fn matches(&self) -> Vec<Match>;

    async fn match_by_id(&self, id: MatchId) -> Option<Match>;

    async fn match_by_slug(&self, slug: &str) -> Option<Match>;

    async fn insert_matches(&self, matches: Vec<Match>);

    /// Discard every existing match (and its event history) and install the
    /// given set in one step. Used by destructive bracket regeneration.
    async fn replace_matches(&self, matches: Vec<Match>);

    /// Apply `mutation` to the stored match atomically. The updated match is
    /// returned on success; on error nothing is written.
    async fn modify_match(&self, id: MatchId, mutation: MatchMutation) -> CoreResult<Match>;

    // -- servers -------------------------------------------------------------

    async fn servers(&self) -> Vec<GameServer>;

    async fn server(&self, id: ServerId) -> Option<GameServer>;

    async fn put_server(&self, server: GameServer);

    /// Atomically mark a server occupied by `match_id`. Fails (returns
    /// false) when the server is disabled, unknown, or already occupied.
    async fn claim_server(&self, id: ServerId, match_id: MatchId) -> bool;

    async fn release_server(&self, id: ServerId);

    async fn set_server_online(&self, id: ServerId, online: bool);
}
