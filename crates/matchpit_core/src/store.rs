//! In-memory repository backed by concurrent maps.
//!
//! Match mutations run under the owning DashMap shard lock: the mutation
//! closure is applied to a working copy and only written back when it
//! succeeds, which gives every caller compare-and-act semantics without a
//! global lock. Matches for different keys mutate concurrently.

use crate::error::{CoreError, CoreResult};
use crate::repo::{MatchMutation, Repository};
use async_trait::async_trait;
use dashmap::DashMap;
use matchpit_types::{
    BracketStage, GameServer, Match, MatchId, ServerId, Tournament, TournamentStatus,
};
use tokio::sync::RwLock;

/// The in-memory store used in production and in every core test.
#[derive(Default)]
pub struct MemoryStore {
    tournament: RwLock<Option<Tournament>>,
    matches: DashMap<MatchId, Match>,
    slugs: DashMap<String, MatchId>,
    servers: DashMap<ServerId, GameServer>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn stage_rank(stage: BracketStage) -> u8 {
    match stage {
        BracketStage::Winners => 0,
        BracketStage::Losers => 1,
        BracketStage::Final => 2,
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn active_tournament(&self) -> Option<Tournament> {
        self.tournament.read().await.clone()
    }

    async fn put_tournament(&self, tournament: Tournament) {
        *self.tournament.write().await = Some(tournament);
    }

    async fn delete_tournament(&self) -> bool {
        let existed = self.tournament.write().await.take().is_some();
        self.matches.clear();
        self.slugs.clear();
        for mut server in self.servers.iter_mut() {
            server.current_match = None;
        }
        existed
    }

    async fn update_tournament_status(
        &self,
        expected: &'static [TournamentStatus],
        next: TournamentStatus,
    ) -> CoreResult<()> {
        let mut guard = self.tournament.write().await;
        let tournament = guard.as_mut().ok_or(CoreError::NoTournament)?;
        if !expected.contains(&tournament.status) {
            return Err(CoreError::TournamentConflict {
                expected,
                actual: tournament.status,
            });
        }
        tournament.status = next;
        Ok(())
    }

    async fn matches(&self) -> Vec<Match> {
        let mut all: Vec<Match> = self.matches.iter().map(|m| m.clone()).collect();
        all.sort_by_key(|m| (m.round, stage_rank(m.stage), m.number));
        all
    }

    async fn match_by_id(&self, id: MatchId) -> Option<Match> {
        self.matches.get(&id).map(|m| m.clone())
    }

    async fn match_by_slug(&self, slug: &str) -> Option<Match> {
        let id = *self.slugs.get(slug)?;
        self.matches.get(&id).map(|m| m.clone())
    }

    async fn insert_matches(&self, matches: Vec<Match>) {
        for m in matches {
            self.slugs.insert(m.slug.clone(), m.id);
            self.matches.insert(m.id, m);
        }
    }

    async fn replace_matches(&self, matches: Vec<Match>) {
        self.matches.clear();
        self.slugs.clear();
        self.insert_matches(matches).await;
    }

    async fn modify_match(&self, id: MatchId, mutation: MatchMutation) -> CoreResult<Match> {
        let mut entry = self
            .matches
            .get_mut(&id)
            .ok_or(CoreError::MatchNotFound(id))?;
        let mut working = entry.clone();
        mutation(&mut working)?;
        *entry = working.clone();
        Ok(working)
    }

    async fn servers(&self) -> Vec<GameServer> {
        let mut all: Vec<GameServer> = self.servers.iter().map(|s| s.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    async fn server(&self, id: ServerId) -> Option<GameServer> {
        self.servers.get(&id).map(|s| s.clone())
    }

    async fn put_server(&self, server: GameServer) {
        self.servers.insert(server.id, server);
    }

    async fn claim_server(&self, id: ServerId, match_id: MatchId) -> bool {
        match self.servers.get_mut(&id) {
            Some(mut server) if server.enabled && server.current_match.is_none() => {
                server.current_match = Some(match_id);
                true
            }
            _ => false,
        }
    }

    async fn release_server(&self, id: ServerId) {
        if let Some(mut server) = self.servers.get_mut(&id) {
            server.current_match = None;
        }
    }

    async fn set_server_online(&self, id: ServerId, online: bool) {
        if let Some(mut server) = self.servers.get_mut(&id) {
            server.online = online;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchpit_types::{MatchStatus, VetoState};
    use std::sync::Arc;

    fn sample_match(round: u32, number: u32) -> Match {
        Match::new(
            matchpit_types::TournamentId::new(),
            BracketStage::Winners,
            round,
            number,
            VetoState::new(vec![]),
        )
    }

    #[tokio::test]
    async fn matches_come_back_in_round_then_number_order() {
        let store = MemoryStore::new();
        let m21 = sample_match(2, 1);
        let m12 = sample_match(1, 2);
        let m11 = sample_match(1, 1);
        store
            .insert_matches(vec![m21.clone(), m12.clone(), m11.clone()])
            .await;

        let ordered: Vec<MatchId> = store.matches().await.into_iter().map(|m| m.id).collect();
        assert_eq!(ordered, vec![m11.id, m12.id, m21.id]);
    }

    #[tokio::test]
    async fn modify_match_rolls_back_on_error() {
        let store = MemoryStore::new();
        let m = sample_match(1, 1);
        let id = m.id;
        store.insert_matches(vec![m]).await;

        let result = store
            .modify_match(
                id,
                Box::new(|m| {
                    m.status = MatchStatus::Live;
                    Err(CoreError::MatchNotFound(m.id))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(
            store.match_by_id(id).await.unwrap().status,
            MatchStatus::Pending
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn claim_server_is_first_wins() {
        let store = Arc::new(MemoryStore::new());
        let server = GameServer::new("alpha", "127.0.0.1", 27015, "pw");
        let sid = server.id;
        store.put_server(server).await;

        let mut claims = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            claims.push(tokio::spawn(async move {
                store.claim_server(sid, MatchId::new()).await
            }));
        }
        let mut won = 0;
        for claim in claims {
            if claim.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);

        store.release_server(sid).await;
        assert!(store.claim_server(sid, MatchId::new()).await);
    }

    #[tokio::test]
    async fn disabled_servers_cannot_be_claimed() {
        let store = MemoryStore::new();
        let mut server = GameServer::new("alpha", "127.0.0.1", 27015, "pw");
        server.enabled = false;
        let sid = server.id;
        store.put_server(server).await;
        assert!(!store.claim_server(sid, MatchId::new()).await);
    }

    #[tokio::test]
    async fn delete_tournament_cascades_and_releases_servers() {
        let store = MemoryStore::new();
        store
            .put_tournament(Tournament::new(
                "t",
                matchpit_types::TournamentKind::SingleElimination,
                matchpit_types::MatchFormat::Bo1,
            ))
            .await;
        let m = sample_match(1, 1);
        let slug = m.slug.clone();
        store.insert_matches(vec![m.clone()]).await;
        let mut server = GameServer::new("alpha", "127.0.0.1", 27015, "pw");
        server.current_match = Some(m.id);
        let sid = server.id;
        store.put_server(server).await;

        assert!(store.delete_tournament().await);
        assert!(store.active_tournament().await.is_none());
        assert!(store.match_by_slug(&slug).await.is_none());
        assert_eq!(store.server(sid).await.unwrap().current_match, None);
        assert!(!store.delete_tournament().await);
    }
}
