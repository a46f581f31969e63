//! Rating pipeline sink.
//!
//! The external rating system is out of scope here; completed matches are
//! logged with enough structure for a downstream consumer to scrape or for
//! a real submitter to slot in behind the same trait.

use async_trait::async_trait;
use matchpit_core::RatingSink;
use matchpit_types::Match;
use tracing::info;

pub struct LogRatingSink;

#[async_trait]
impl RatingSink for LogRatingSink {
    async fn submit(&self, result: &Match) {
        let score = result
            .live_score
            .map(|s| format!("{}-{}", s.team_one, s.team_two))
            .unwrap_or_else(|| "?".to_string());
        info!(
            slug = %result.slug,
            winner = ?result.winner,
            score,
            players = result.player_stats.len(),
            "match result submitted for rating"
        );
    }
}
