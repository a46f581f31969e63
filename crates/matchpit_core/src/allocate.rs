//! The allocation engine: pairing ready matches with available servers.
//!
//! One allocation pass enumerates ready matches in deterministic order
//! (round, then match number), claims a free server per match atomically,
//! and drives the load sequence through the command dispatcher. Each
//! server's command sequence runs as its own task so one slow server never
//! blocks the rest. The pass always completes with an aggregate report;
//! partial failure is data, not an error.

use crate::bracket;
use crate::dispatch::{commands, ServerCommander};
use crate::error::{CoreError, CoreResult};
use crate::inflight::InFlightTracker;
use crate::lifecycle;
use crate::registry::ServerRegistry;
use crate::repo::Repository;
use futures::future::join_all;
use matchpit_types::{
    ConfigTeam, GameServer, Match, MatchConfig, MatchStatus, ServerId, SideRef, Tournament,
    TournamentId, TournamentStatus, MATCH_CONFIG_VERSION,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Engine knobs, supplied from service configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Externally reachable base URL servers call back to.
    pub public_base_url: String,
    /// Shared secret servers attach to webhook deliveries.
    pub webhook_secret: String,
    /// Header name carrying the shared secret.
    pub webhook_header: String,
    /// Deadline for one server's whole load command sequence.
    pub command_deadline: Duration,
    /// Bounded wait for in-flight commands before destructive operations.
    pub drain_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:8080".to_string(),
            webhook_secret: String::new(),
            webhook_header: "X-Matchpit-Key".to_string(),
            command_deadline: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-match outcome of one allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationOutcome {
    Loaded { server: ServerId },
    NoServerAvailable,
    CommandFailed { server: ServerId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchAllocation {
    pub slug: String,
    #[serde(flatten)]
    pub outcome: AllocationOutcome,
}

/// Aggregate result of an allocation pass. Always returned, including for
/// passes that could not place a single match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    pub allocated: usize,
    pub failed: usize,
    pub outcomes: Vec<MatchAllocation>,
}

impl AllocationReport {
    fn push(&mut self, slug: String, outcome: AllocationOutcome) {
        match outcome {
            AllocationOutcome::Loaded { .. } => self.allocated += 1,
            _ => self.failed += 1,
        }
        self.outcomes.push(MatchAllocation { slug, outcome });
    }
}

pub struct AllocationEngine {
    repo: Arc<dyn Repository>,
    registry: Arc<ServerRegistry>,
    commander: Arc<dyn ServerCommander>,
    config: EngineConfig,
    in_flight: Arc<InFlightTracker>,
}

impl AllocationEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<ServerRegistry>,
        commander: Arc<dyn ServerCommander>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            registry,
            commander,
            config,
            in_flight: InFlightTracker::new(),
        }
    }

    pub fn in_flight(&self) -> Arc<InFlightTracker> {
        Arc::clone(&self.in_flight)
    }

    async fn tournament(&self, id: TournamentId) -> CoreResult<Tournament> {
        match self.repo.active_tournament().await {
            Some(t) if t.id == id => Ok(t),
            _ => Err(CoreError::NoTournament),
        }
    }

    /// One allocation pass. Errors only when the tournament itself is not
    /// allocatable; scarcity and per-server failures are reported, never
    /// raised.
    pub async fn allocate(&self, id: TournamentId) -> CoreResult<AllocationReport> {
        let tournament = self.tournament(id).await?;
        if matches!(
            tournament.status,
            TournamentStatus::Completed | TournamentStatus::Cancelled
        ) {
            return Err(CoreError::NotAllocatable(tournament.status));
        }

        self.promote_ready().await;

        let ready: Vec<Match> = self
            .repo
            .matches()
            .await
            .into_iter()
            .filter(|m| m.status == MatchStatus::Ready)
            .collect();
        let free = self.registry.available().await;

        let mut report = AllocationReport::default();
        let mut tasks = Vec::new();
        let mut servers = free.into_iter();

        for m in ready {
            let Some(server) = servers.next() else {
                report.push(m.slug.clone(), AllocationOutcome::NoServerAvailable);
                continue;
            };
            if !self.registry.claim(server.id, m.id).await {
                // Lost a race with a concurrent pass; treat like scarcity.
                report.push(m.slug.clone(), AllocationOutcome::NoServerAvailable);
                continue;
            }
            tasks.push(self.spawn_load(&tournament, m, server));
        }

        for task in join_all(tasks).await {
            match task {
                Ok((slug, outcome)) => report.push(slug, outcome),
                Err(e) => error!(error = %e, "load task panicked"),
            }
        }

        info!(
            allocated = report.allocated,
            failed = report.failed,
            "allocation pass complete"
        );
        Ok(report)
    }

    /// Drive one match's load sequence on its claimed server. The claim is
    /// released again if anything fails before the match is marked loaded.
    fn spawn_load(
        &self,
        tournament: &Tournament,
        m: Match,
        server: GameServer,
    ) -> tokio::task::JoinHandle<(String, AllocationOutcome)> {
        let repo = Arc::clone(&self.repo);
        let registry = Arc::clone(&self.registry);
        let commander = Arc::clone(&self.commander);
        let config = self.config.clone();
        let frozen = build_config(tournament, &m);
        let guard = self.in_flight.guard();

        tokio::spawn(async move {
            let _guard = guard;
            let slug = m.slug.clone();

            let mut cmds = commands::configure_webhook(
                &config.public_base_url,
                &slug,
                &config.webhook_header,
                &config.webhook_secret,
            );
            cmds.push(commands::load_match(&config.public_base_url, &slug));

            match commander.run(&server, &cmds, config.command_deadline).await {
                Ok(_) => {
                    let server_id = server.id;
                    let result = repo
                        .modify_match(
                            m.id,
                            Box::new(move |m| {
                                lifecycle::advance(MatchStatus::Ready, MatchStatus::Loaded)(m)?;
                                m.server_id = Some(server_id);
                                m.config = Some(frozen);
                                Ok(())
                            }),
                        )
                        .await;
                    match result {
                        Ok(_) => (slug, AllocationOutcome::Loaded { server: server.id }),
                        Err(e) => {
                            // The match moved under us; give the server back.
                            registry.release(server.id).await;
                            warn!(slug = %slug, error = %e, "match moved during load");
                            (
                                slug,
                                AllocationOutcome::CommandFailed {
                                    server: server.id,
                                    reason: e.to_string(),
                                },
                            )
                        }
                    }
                }
                Err(e) => {
                    registry.release(server.id).await;
                    warn!(slug = %slug, server = %server.name, error = %e, "load failed");
                    (
                        slug,
                        AllocationOutcome::CommandFailed {
                            server: server.id,
                            reason: e.to_string(),
                        },
                    )
                }
            }
        })
    }

    /// Start the tournament: mark it in progress and allocate the bracket.
    pub async fn start(&self, id: TournamentId) -> CoreResult<AllocationReport> {
        self.tournament(id).await?;
        match self
            .repo
            .update_tournament_status(
                &[TournamentStatus::Setup, TournamentStatus::Ready],
                TournamentStatus::InProgress,
            )
            .await
        {
            Ok(()) => {}
            // Already running: starting again is just another pass.
            Err(CoreError::TournamentConflict {
                actual: TournamentStatus::InProgress,
                ..
            }) => {}
            Err(e) => return Err(e),
        }
        self.allocate(id).await
    }

    /// Force-end every loaded or live match's server, return those matches
    /// to ready with servers unassigned, then allocate again. Unreachable
    /// servers are logged and skipped, never fatal.
    pub async fn restart(&self, id: TournamentId) -> CoreResult<AllocationReport> {
        let tournament = self.tournament(id).await?;
        if matches!(
            tournament.status,
            TournamentStatus::Completed | TournamentStatus::Cancelled
        ) {
            return Err(CoreError::NotAllocatable(tournament.status));
        }

        let running: Vec<Match> = self
            .repo
            .matches()
            .await
            .into_iter()
            .filter(|m| matches!(m.status, MatchStatus::Loaded | MatchStatus::Live))
            .collect();

        self.end_running_servers(&running).await;

        for m in &running {
            if let Err(e) = self.repo.modify_match(m.id, lifecycle::restart()).await {
                warn!(slug = %m.slug, error = %e, "restart transition rejected");
                continue;
            }
            if let Some(server_id) = m.server_id {
                self.registry.release(server_id).await;
            }
        }
        info!(matches = running.len(), "tournament restarted");

        self.allocate(id).await
    }

    /// Reset the tournament to setup: drain in-flight commands, return every
    /// match to pending, clear veto/server/score data, keep the bracket.
    pub async fn reset(&self, id: TournamentId) -> CoreResult<()> {
        self.tournament(id).await?;

        let running: Vec<Match> = self
            .repo
            .matches()
            .await
            .into_iter()
            .filter(|m| matches!(m.status, MatchStatus::Loaded | MatchStatus::Live))
            .collect();
        self.end_running_servers(&running).await;

        if !self.in_flight.drain(self.config.drain_timeout).await {
            warn!("reset proceeding with commands still in flight");
        }

        for m in self.repo.matches().await {
            if let Err(e) = self
                .repo
                .modify_match(m.id, lifecycle::reset_to_pending())
                .await
            {
                warn!(slug = %m.slug, error = %e, "reset transition failed");
            }
            if let Some(server_id) = m.server_id {
                self.registry.release(server_id).await;
            }
        }

        self.repo
            .update_tournament_status(ANY_STATUS, TournamentStatus::Setup)
            .await?;
        info!("tournament reset to setup");
        Ok(())
    }

    /// Destructive bracket regeneration: discards all matches and their
    /// event history, then installs a fresh bracket. Refused against an
    /// in-progress tournament unless forced.
    pub async fn regenerate(&self, id: TournamentId, force: bool) -> CoreResult<usize> {
        let mut tournament = self.tournament(id).await?;
        if tournament.status == TournamentStatus::InProgress && !force {
            return Err(crate::error::BracketError::TournamentLive.into());
        }

        let running: Vec<Match> = self
            .repo
            .matches()
            .await
            .into_iter()
            .filter(|m| matches!(m.status, MatchStatus::Loaded | MatchStatus::Live))
            .collect();
        self.end_running_servers(&running).await;
        if !self.in_flight.drain(self.config.drain_timeout).await {
            warn!("regeneration proceeding with commands still in flight");
        }

        let matches = bracket::generate(&mut tournament)?;
        let count = matches.len();
        tournament.status = TournamentStatus::Setup;
        self.repo.put_tournament(tournament).await;
        self.repo.replace_matches(matches).await;
        for server in self.registry.list().await {
            if server.current_match.is_some() {
                self.registry.release(server.id).await;
            }
        }
        info!(matches = count, force, "bracket regenerated");
        Ok(count)
    }

    /// Promote pending matches whose sides are resolved and whose veto is
    /// complete (or not required). Conflicts mean someone else already
    /// moved the match, which is fine.
    pub async fn promote_ready(&self) {
        for m in self.repo.matches().await {
            if m.status == MatchStatus::Pending && m.has_both_sides() && m.veto.is_complete() {
                let _ = self
                    .repo
                    .modify_match(
                        m.id,
                        lifecycle::advance(MatchStatus::Pending, MatchStatus::Ready),
                    )
                    .await;
            }
        }
    }

    /// Best-effort forced end for every server occupied by the given
    /// matches, one tracked task per server.
    async fn end_running_servers(&self, running: &[Match]) {
        let mut tasks = Vec::new();
        for m in running {
            let Some(server_id) = m.server_id else { continue };
            let Some(server) = self.repo.server(server_id).await else {
                continue;
            };
            let commander = Arc::clone(&self.commander);
            let deadline = self.config.command_deadline;
            let guard = self.in_flight.guard();
            let slug = m.slug.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = commander
                    .run(&server, &[commands::force_end()], deadline)
                    .await
                {
                    warn!(slug = %slug, server = %server.name, error = %e, "force end failed");
                }
            }));
        }
        join_all(tasks).await;
    }
}

const ANY_STATUS: &[TournamentStatus] = &[
    TournamentStatus::Setup,
    TournamentStatus::Ready,
    TournamentStatus::InProgress,
    TournamentStatus::Completed,
    TournamentStatus::Cancelled,
];

/// Freeze the match configuration from the tournament's rosters and the
/// completed veto. Written once here; never mutated afterwards.
fn build_config(tournament: &Tournament, m: &Match) -> MatchConfig {
    let team_for = |side: &Option<SideRef>, fallback: &str| match side {
        Some(SideRef::Team(id)) => match tournament.team(*id) {
            Some(team) => ConfigTeam {
                id: Some(team.id),
                name: team.name.clone(),
                tag: team.tag.clone(),
                players: team.players.clone(),
            },
            None => ConfigTeam {
                id: Some(*id),
                name: fallback.to_string(),
                tag: String::new(),
                players: Vec::new(),
            },
        },
        Some(SideRef::Roster { name, players }) => ConfigTeam {
            id: None,
            name: name.clone(),
            tag: String::new(),
            players: players.clone(),
        },
        None => ConfigTeam {
            id: None,
            name: fallback.to_string(),
            tag: String::new(),
            players: Vec::new(),
        },
    };

    MatchConfig {
        version: MATCH_CONFIG_VERSION,
        match_slug: m.slug.clone(),
        team_one: team_for(&m.side_one, "TBD"),
        team_two: team_for(&m.side_two, "TBD"),
        maps: m.veto.picked_maps.iter().map(|p| p.map.clone()).collect(),
        players_per_team: match tournament.kind {
            matchpit_types::TournamentKind::PlayerShuffle => tournament.team_size,
            _ => tournament
                .teams
                .first()
                .map(|t| t.players.len() as u32)
                .filter(|n| *n > 0)
                .unwrap_or(5),
        },
    }
}
