//! Webhook event reconciliation.
//!
//! Game servers report progress as events keyed by match slug. Events
//! arrive late, duplicated, and out of order; reconciliation makes every
//! kind idempotent against current match state. An event that does not fit
//! is discarded with a reason and acknowledged, never an error, so servers
//! do not retry into the same wall.

use crate::error::CoreResult;
use crate::repo::Repository;
use async_trait::async_trait;
use matchpit_types::{
    LiveScore, Match, MatchEvent, MatchId, MatchStatus, ServerId, SideRef, TeamSlot,
    TournamentKind, TournamentStatus,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// What happened to one ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Discarded(&'static str),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// External rating pipeline. Invoked exactly once per completed match;
/// what it does with the result is not our concern.
#[async_trait]
pub trait RatingSink: Send + Sync {
    async fn submit(&self, result: &Match);
}

/// Shared cell the state-checking closure writes its discard reason into.
type Verdict = Arc<Mutex<Option<&'static str>>>;

fn verdict_outcome(verdict: &Verdict) -> Outcome {
    match verdict.lock().ok().and_then(|mut v| v.take()) {
        Some(reason) => Outcome::Discarded(reason),
        None => Outcome::Applied,
    }
}

pub struct EventReconciler {
    repo: Arc<dyn Repository>,
    rating: Arc<dyn RatingSink>,
}

impl EventReconciler {
    pub fn new(repo: Arc<dyn Repository>, rating: Arc<dyn RatingSink>) -> Self {
        Self { repo, rating }
    }

    pub async fn ingest(&self, slug: &str, event: MatchEvent) -> CoreResult<Outcome> {
        // A server can report against a match that a reset or regeneration
        // has since removed; such late events are acknowledged and dropped.
        let Some(m) = self.repo.match_by_slug(slug).await else {
            info!(slug, "event for unknown match discarded");
            return Ok(Outcome::Discarded("unknown match"));
        };
        let id = m.id;

        let outcome = match event {
            MatchEvent::SeriesStart { map_number } => self.series_start(id, map_number).await?,
            MatchEvent::PlayerConnected { player_id, name } => {
                let verdict = Verdict::default();
                let v = Arc::clone(&verdict);
                self.repo
                    .modify_match(
                        id,
                        Box::new(move |m| {
                            match m.status {
                                MatchStatus::Loaded | MatchStatus::Live => {
                                    // Membership comes from the frozen config
                                    // rosters, never from name matching.
                                    let on_roster = m
                                        .config
                                        .as_ref()
                                        .map_or(true, |c| c.roster_of(player_id).is_some());
                                    if on_roster {
                                        m.connected_players.insert(player_id);
                                    } else {
                                        set(&v, "player not on either roster");
                                    }
                                }
                                _ => set(&v, "match is not running"),
                            }
                            Ok(())
                        }),
                    )
                    .await?;
                let _ = name;
                verdict_outcome(&verdict)
            }
            MatchEvent::PlayerDisconnected { player_id } => {
                let verdict = Verdict::default();
                let v = Arc::clone(&verdict);
                self.repo
                    .modify_match(
                        id,
                        Box::new(move |m| {
                            match m.status {
                                MatchStatus::Loaded | MatchStatus::Live => {
                                    m.connected_players.remove(&player_id);
                                }
                                _ => set(&v, "match is not running"),
                            }
                            Ok(())
                        }),
                    )
                    .await?;
                verdict_outcome(&verdict)
            }
            MatchEvent::ScoreUpdate {
                seq,
                map_number,
                team_one,
                team_two,
            } => {
                let verdict = Verdict::default();
                let v = Arc::clone(&verdict);
                self.repo
                    .modify_match(
                        id,
                        Box::new(move |m| {
                            match m.status {
                                MatchStatus::Loaded | MatchStatus::Live => {
                                    // Last-writer-wins on the sequence number.
                                    if m.live_score.is_some_and(|s| s.seq >= seq) {
                                        set(&v, "stale score snapshot");
                                    } else {
                                        m.live_score = Some(LiveScore {
                                            seq,
                                            map_number,
                                            team_one,
                                            team_two,
                                        });
                                    }
                                }
                                _ => set(&v, "match is not running"),
                            }
                            Ok(())
                        }),
                    )
                    .await?;
                verdict_outcome(&verdict)
            }
            MatchEvent::SeriesEnd {
                winner,
                team_one_series_score,
                team_two_series_score,
                player_stats,
            } => {
                self.series_end(
                    id,
                    winner,
                    team_one_series_score,
                    team_two_series_score,
                    player_stats,
                )
                .await?
            }
            MatchEvent::DemoUploaded { map_number, url } => {
                let verdict = Verdict::default();
                let v = Arc::clone(&verdict);
                self.repo
                    .modify_match(
                        id,
                        Box::new(move |m| {
                            match m.status {
                                MatchStatus::Live | MatchStatus::Completed => {
                                    m.demo_url = Some(url);
                                }
                                _ => set(&v, "match has not been played"),
                            }
                            let _ = map_number;
                            Ok(())
                        }),
                    )
                    .await?;
                verdict_outcome(&verdict)
            }
        };

        if let Outcome::Discarded(reason) = outcome {
            info!(slug, reason, "event discarded");
        }
        Ok(outcome)
    }

    async fn series_start(&self, id: MatchId, map_number: u32) -> CoreResult<Outcome> {
        let verdict = Verdict::default();
        let v = Arc::clone(&verdict);
        let updated = self
            .repo
            .modify_match(
                id,
                Box::new(move |m| {
                    match m.status {
                        MatchStatus::Loaded => m.status = MatchStatus::Live,
                        MatchStatus::Live => set(&v, "series already started"),
                        _ => set(&v, "match is not loaded"),
                    }
                    Ok(())
                }),
            )
            .await?;
        let outcome = verdict_outcome(&verdict);
        if outcome.is_applied() {
            info!(slug = %updated.slug, map_number, "series live");
        }
        Ok(outcome)
    }

    /// Final report: the status CAS to completed is the idempotence guard.
    /// Everything downstream (server release, advancement, rating) only
    /// runs on the transition that actually applied.
    async fn series_end(
        &self,
        id: MatchId,
        winner: TeamSlot,
        team_one_series_score: u32,
        team_two_series_score: u32,
        player_stats: Vec<matchpit_types::PlayerStatLine>,
    ) -> CoreResult<Outcome> {
        let verdict = Verdict::default();
        let v = Arc::clone(&verdict);
        let should_rate = Arc::new(AtomicBool::new(false));
        let rate = Arc::clone(&should_rate);
        let released: Arc<Mutex<Option<ServerId>>> = Arc::default();
        let release_cell = Arc::clone(&released);

        let updated = self
            .repo
            .modify_match(
                id,
                Box::new(move |m| {
                    match m.status {
                        MatchStatus::Loaded | MatchStatus::Live => {
                            m.status = MatchStatus::Completed;
                            if let Ok(mut cell) = release_cell.lock() {
                                *cell = m.server_id.take();
                            }
                            m.winner = Some(winner);
                            m.player_stats = player_stats;
                            let seq = m.live_score.map_or(0, |s| s.seq) + 1;
                            let map_number = m.live_score.map_or(1, |s| s.map_number);
                            m.live_score = Some(LiveScore {
                                seq,
                                map_number,
                                team_one: team_one_series_score,
                                team_two: team_two_series_score,
                            });
                            if !m.rating_submitted {
                                m.rating_submitted = true;
                                rate.store(true, Ordering::Release);
                            }
                        }
                        MatchStatus::Completed => set(&v, "series already completed"),
                        _ => set(&v, "match is not running"),
                    }
                    Ok(())
                }),
            )
            .await?;

        let outcome = verdict_outcome(&verdict);
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        if let Some(server_id) = released.lock().ok().and_then(|mut cell| cell.take()) {
            self.repo.release_server(server_id).await;
        }

        self.advance(&updated, winner).await;
        self.maybe_complete_tournament().await;

        if should_rate.load(Ordering::Acquire) {
            self.rating.submit(&updated).await;
        }
        info!(
            slug = %updated.slug,
            winner = ?winner,
            score = format!("{team_one_series_score}-{team_two_series_score}"),
            "series completed"
        );
        Ok(Outcome::Applied)
    }

    /// Propagate the winner (and loser, in double elimination) along the
    /// bracket links, promoting a target match that becomes fully seeded.
    async fn advance(&self, completed: &Match, winner: TeamSlot) {
        let side_of = |slot: TeamSlot| -> Option<SideRef> {
            match slot {
                TeamSlot::One => completed.side_one.clone(),
                TeamSlot::Two => completed.side_two.clone(),
            }
        };
        let links = [
            (completed.winner_to, side_of(winner)),
            (completed.loser_to, side_of(winner.other())),
        ];
        for (link, side) in links {
            let Some(adv) = link else { continue };
            let Some(side) = side else {
                warn!(slug = %completed.slug, "completed match is missing a side");
                continue;
            };
            let result = self
                .repo
                .modify_match(
                    adv.target,
                    Box::new(move |t| {
                        match adv.slot {
                            TeamSlot::One => t.side_one = Some(side),
                            TeamSlot::Two => t.side_two = Some(side),
                        }
                        if t.status == MatchStatus::Pending
                            && t.has_both_sides()
                            && t.veto.is_complete()
                        {
                            t.status = MatchStatus::Ready;
                        }
                        Ok(())
                    }),
                )
                .await;
            if let Err(e) = result {
                warn!(slug = %completed.slug, error = %e, "advancement target missing");
            }
        }
    }

    /// An elimination or round-robin tournament is finished once every
    /// stored match is completed. Swiss and shuffle rounds are created on
    /// demand, so completion stays an operator decision there.
    async fn maybe_complete_tournament(&self) {
        let Some(t) = self.repo.active_tournament().await else {
            return;
        };
        if matches!(
            t.kind,
            TournamentKind::Swiss | TournamentKind::PlayerShuffle
        ) {
            return;
        }
        let matches = self.repo.matches().await;
        if !matches.is_empty() && matches.iter().all(|m| m.status == MatchStatus::Completed) {
            let result = self
                .repo
                .update_tournament_status(
                    &[TournamentStatus::InProgress],
                    TournamentStatus::Completed,
                )
                .await;
            if result.is_ok() {
                info!("tournament completed");
            }
        }
    }
}

fn set(verdict: &Verdict, reason: &'static str) {
    if let Ok(mut v) = verdict.lock() {
        *v = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket;
    use crate::store::MemoryStore;
    use crate::testutil::RecordingRating;
    use matchpit_types::{
        ConfigTeam, GameServer, MatchConfig, MatchFormat, PlayerId, PlayerRef, PlayerStatLine,
        Team, Tournament, TournamentKind, TournamentSettings, MATCH_CONFIG_VERSION,
    };

    struct Rig {
        repo: Arc<dyn Repository>,
        reconciler: EventReconciler,
        rating: Arc<RecordingRating>,
    }

    /// Four-team skip-veto single elimination, round one loaded on servers.
    async fn rig() -> Rig {
        let repo: Arc<dyn Repository> = Arc::new(MemoryStore::new());
        let mut t = Tournament::new("cup", TournamentKind::SingleElimination, MatchFormat::Bo1);
        t.map_pool = vec!["de_dust2".into()];
        t.settings = TournamentSettings {
            skip_veto: true,
            ..Default::default()
        };
        t.status = TournamentStatus::InProgress;
        for i in 0..4 {
            t.teams
                .push(Team::new(format!("team {i}"), format!("T{i}"), i + 1));
        }
        let matches = bracket::generate(&mut t).unwrap();
        repo.put_tournament(t).await;
        repo.insert_matches(matches).await;

        // Load round one: claim one server per match.
        for m in repo.matches().await {
            if m.round != 1 {
                continue;
            }
            let server = GameServer::new(format!("s-{}", m.number), "127.0.0.1", 27015, "pw");
            let server_id = server.id;
            repo.put_server(server).await;
            assert!(repo.claim_server(server_id, m.id).await);
            repo.modify_match(
                m.id,
                Box::new(move |m| {
                    m.status = MatchStatus::Loaded;
                    m.server_id = Some(server_id);
                    Ok(())
                }),
            )
            .await
            .unwrap();
        }

        let rating = RecordingRating::new();
        let reconciler = EventReconciler::new(Arc::clone(&repo), rating.clone());
        Rig {
            repo,
            reconciler,
            rating,
        }
    }

    async fn round_one_slugs(repo: &Arc<dyn Repository>) -> Vec<String> {
        repo.matches()
            .await
            .into_iter()
            .filter(|m| m.round == 1)
            .map(|m| m.slug)
            .collect()
    }

    fn series_end(winner: TeamSlot) -> MatchEvent {
        MatchEvent::SeriesEnd {
            winner,
            team_one_series_score: if winner == TeamSlot::One { 13 } else { 7 },
            team_two_series_score: if winner == TeamSlot::Two { 13 } else { 7 },
            player_stats: vec![],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn series_start_is_idempotent() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);

        let first = rig
            .reconciler
            .ingest(&slug, MatchEvent::SeriesStart { map_number: 1 })
            .await
            .unwrap();
        assert_eq!(first, Outcome::Applied);
        assert_eq!(
            rig.repo.match_by_slug(&slug).await.unwrap().status,
            MatchStatus::Live
        );

        let second = rig
            .reconciler
            .ingest(&slug, MatchEvent::SeriesStart { map_number: 1 })
            .await
            .unwrap();
        assert_eq!(second, Outcome::Discarded("series already started"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_slug_is_discarded_not_errored() {
        let rig = rig().await;
        // A late report for a match removed by a reset must be acknowledged.
        let outcome = rig
            .reconciler
            .ingest("r9m9-deadbeef", MatchEvent::SeriesStart { map_number: 1 })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Discarded("unknown match"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scores_are_sequence_guarded() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);
        rig.reconciler
            .ingest(&slug, MatchEvent::SeriesStart { map_number: 1 })
            .await
            .unwrap();

        let score = |seq, one, two| MatchEvent::ScoreUpdate {
            seq,
            map_number: 1,
            team_one: one,
            team_two: two,
        };
        assert!(rig
            .reconciler
            .ingest(&slug, score(5, 4, 3))
            .await
            .unwrap()
            .is_applied());
        // A delayed earlier snapshot must not regress the score.
        assert_eq!(
            rig.reconciler.ingest(&slug, score(3, 2, 2)).await.unwrap(),
            Outcome::Discarded("stale score snapshot")
        );
        assert!(rig
            .reconciler
            .ingest(&slug, score(6, 5, 3))
            .await
            .unwrap()
            .is_applied());

        let m = rig.repo.match_by_slug(&slug).await.unwrap();
        let live = m.live_score.unwrap();
        assert_eq!((live.seq, live.team_one, live.team_two), (6, 5, 3));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connects_and_disconnects_track_the_roster() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);
        let player = PlayerId::new();

        rig.reconciler
            .ingest(
                &slug,
                MatchEvent::PlayerConnected {
                    player_id: player,
                    name: "s1mple".into(),
                },
            )
            .await
            .unwrap();
        assert!(rig
            .repo
            .match_by_slug(&slug)
            .await
            .unwrap()
            .connected_players
            .contains(&player));

        rig.reconciler
            .ingest(&slug, MatchEvent::PlayerDisconnected { player_id: player })
            .await
            .unwrap();
        assert!(rig
            .repo
            .match_by_slug(&slug)
            .await
            .unwrap()
            .connected_players
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connects_outside_the_frozen_rosters_are_discarded() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);
        let rostered = PlayerRef::new("alice");
        let rostered_id = rostered.id;

        let m = rig.repo.match_by_slug(&slug).await.unwrap();
        let config = MatchConfig {
            version: MATCH_CONFIG_VERSION,
            match_slug: slug.clone(),
            team_one: ConfigTeam {
                id: None,
                name: "Alpha".into(),
                tag: "ALP".into(),
                players: vec![rostered],
            },
            team_two: ConfigTeam {
                id: None,
                name: "Bravo".into(),
                tag: "BRV".into(),
                players: vec![PlayerRef::new("bob")],
            },
            maps: vec!["de_dust2".into()],
            players_per_team: 1,
        };
        rig.repo
            .modify_match(
                m.id,
                Box::new(move |m| {
                    m.config = Some(config);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let connect = |player_id, name: &str| MatchEvent::PlayerConnected {
            player_id,
            name: name.into(),
        };
        assert!(rig
            .reconciler
            .ingest(&slug, connect(rostered_id, "alice"))
            .await
            .unwrap()
            .is_applied());
        assert_eq!(
            rig.reconciler
                .ingest(&slug, connect(PlayerId::new(), "stranger"))
                .await
                .unwrap(),
            Outcome::Discarded("player not on either roster")
        );

        let m = rig.repo.match_by_slug(&slug).await.unwrap();
        assert_eq!(m.connected_players.len(), 1);
        assert!(m.connected_players.contains(&rostered_id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn series_end_completes_advances_and_releases() {
        let rig = rig().await;
        let slugs = round_one_slugs(&rig.repo).await;
        let first = rig.repo.match_by_slug(&slugs[0]).await.unwrap();
        let winner_side = first.side_one.clone().unwrap();
        let server_id = first.server_id.unwrap();

        let outcome = rig
            .reconciler
            .ingest(&slugs[0], series_end(TeamSlot::One))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let done = rig.repo.match_by_slug(&slugs[0]).await.unwrap();
        assert_eq!(done.status, MatchStatus::Completed);
        assert_eq!(done.winner, Some(TeamSlot::One));
        // Only loaded and live matches hold a server assignment.
        assert_eq!(done.server_id, None);

        // The winner landed in the final's slot one.
        let target = done.winner_to.unwrap();
        let final_match = rig.repo.match_by_id(target.target).await.unwrap();
        assert_eq!(final_match.side_one, Some(winner_side));
        // Only one side seeded so far; still pending.
        assert_eq!(final_match.status, MatchStatus::Pending);

        // The server went back to the pool.
        let server = rig.repo.server(server_id).await.unwrap();
        assert_eq!(server.current_match, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn final_becomes_ready_once_both_feeders_finish() {
        let rig = rig().await;
        let slugs = round_one_slugs(&rig.repo).await;
        rig.reconciler
            .ingest(&slugs[0], series_end(TeamSlot::One))
            .await
            .unwrap();
        rig.reconciler
            .ingest(&slugs[1], series_end(TeamSlot::Two))
            .await
            .unwrap();

        let final_match = rig
            .repo
            .matches()
            .await
            .into_iter()
            .find(|m| m.round == 2)
            .unwrap();
        assert!(final_match.has_both_sides());
        // Skip-veto tournament: the veto is born complete, so the final is
        // promoted the moment both sides exist.
        assert_eq!(final_match.status, MatchStatus::Ready);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_series_end_rates_exactly_once() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);

        let stats = vec![PlayerStatLine {
            player_id: PlayerId::new(),
            name: "device".into(),
            kills: 24,
            deaths: 15,
            assists: 4,
        }];
        let event = MatchEvent::SeriesEnd {
            winner: TeamSlot::Two,
            team_one_series_score: 9,
            team_two_series_score: 13,
            player_stats: stats,
        };

        assert!(rig
            .reconciler
            .ingest(&slug, event.clone())
            .await
            .unwrap()
            .is_applied());
        assert_eq!(
            rig.reconciler.ingest(&slug, event).await.unwrap(),
            Outcome::Discarded("series already completed")
        );

        assert_eq!(rig.rating.slugs(), vec![slug.clone()]);
        let m = rig.repo.match_by_slug(&slug).await.unwrap();
        assert!(m.rating_submitted);
        assert_eq!(m.player_stats.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tournament_completes_when_the_bracket_does() {
        let rig = rig().await;
        let slugs = round_one_slugs(&rig.repo).await;
        rig.reconciler
            .ingest(&slugs[0], series_end(TeamSlot::One))
            .await
            .unwrap();
        rig.reconciler
            .ingest(&slugs[1], series_end(TeamSlot::One))
            .await
            .unwrap();

        // Run the final through its lifecycle by hand.
        let final_match = rig
            .repo
            .matches()
            .await
            .into_iter()
            .find(|m| m.round == 2)
            .unwrap();
        rig.repo
            .modify_match(
                final_match.id,
                Box::new(|m| {
                    m.status = MatchStatus::Live;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        rig.reconciler
            .ingest(&final_match.slug, series_end(TeamSlot::One))
            .await
            .unwrap();

        let t = rig.repo.active_tournament().await.unwrap();
        assert_eq!(t.status, TournamentStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn demo_url_attaches_after_play() {
        let rig = rig().await;
        let slug = round_one_slugs(&rig.repo).await.remove(0);

        // Too early: the match is only loaded.
        assert_eq!(
            rig.reconciler
                .ingest(
                    &slug,
                    MatchEvent::DemoUploaded {
                        map_number: 1,
                        url: "https://demos.example/a.dem".into()
                    }
                )
                .await
                .unwrap(),
            Outcome::Discarded("match has not been played")
        );

        rig.reconciler
            .ingest(&slug, MatchEvent::SeriesStart { map_number: 1 })
            .await
            .unwrap();
        rig.reconciler
            .ingest(
                &slug,
                MatchEvent::DemoUploaded {
                    map_number: 1,
                    url: "https://demos.example/a.dem".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            rig.repo.match_by_slug(&slug).await.unwrap().demo_url,
            Some("https://demos.example/a.dem".into())
        );
    }
}
