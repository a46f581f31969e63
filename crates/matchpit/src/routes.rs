//! HTTP surface: the admin API and the webhook ingestion endpoint.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use matchpit_core::{
    bracket, veto, AllocationEngine, CoreError, EventReconciler, Outcome, Repository,
    ServerRegistry,
};
use matchpit_types::{
    MatchEvent, MatchFormat, PlayerRef, ShufflePlayer, Team, TeamSlot, Tournament, TournamentKind,
    TournamentSettings,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub engine: Arc<AllocationEngine>,
    pub reconciler: Arc<EventReconciler>,
    pub registry: Arc<ServerRegistry>,
    pub webhook_header: Arc<str>,
    pub webhook_secret: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events/{slug}", post(ingest_event))
        .route(
            "/api/tournament",
            post(create_tournament)
                .get(get_tournament)
                .delete(delete_tournament),
        )
        .route("/api/tournament/start", post(start_tournament))
        .route("/api/tournament/restart", post(restart_tournament))
        .route("/api/tournament/allocate", post(allocate))
        .route("/api/tournament/reset", post(reset_tournament))
        .route("/api/tournament/regenerate", post(regenerate))
        .route("/api/tournament/next-round", post(next_round))
        .route("/api/matches", get(list_matches))
        .route("/api/matches/{slug}", get(get_match))
        .route("/api/matches/{slug}/config", get(get_match_config))
        .route("/api/matches/{slug}/veto", get(get_veto).post(post_veto))
        .route("/api/servers", get(list_servers))
        .route("/api/servers/probe", post(probe_servers))
        .with_state(state)
}

// ============================================================================
// Error mapping
// ============================================================================

pub struct ApiError(StatusCode, String);

impl ApiError {
    fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }

    fn unprocessable(msg: impl Into<String>) -> Self {
        Self(StatusCode::UNPROCESSABLE_ENTITY, msg.into())
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::NoTournament | CoreError::MatchNotFound(_) | CoreError::UnknownSlug(_) => {
                StatusCode::NOT_FOUND
            }
            CoreError::TournamentConflict { .. }
            | CoreError::NotAllocatable(_)
            | CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Bracket(_) | CoreError::Veto(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Health and webhook ingestion
// ============================================================================

async fn healthz() -> &'static str {
    "ok"
}

async fn ingest_event(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(event): Json<MatchEvent>,
) -> ApiResult<Response> {
    let presented = headers
        .get(state.webhook_header.as_ref())
        .and_then(|v| v.to_str().ok());
    if presented != Some(state.webhook_secret.as_ref()) {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid webhook key" })),
        )
            .into_response());
    }

    let outcome = state.reconciler.ingest(&slug, event).await?;
    let body = match outcome {
        Outcome::Applied => json!({ "status": "applied" }),
        Outcome::Discarded(reason) => json!({ "status": "discarded", "reason": reason }),
    };
    Ok(Json(body).into_response())
}

// ============================================================================
// Tournament administration
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateTournament {
    name: String,
    kind: TournamentKind,
    format: MatchFormat,
    map_pool: Vec<String>,
    #[serde(default)]
    settings: TournamentSettings,
    #[serde(default)]
    teams: Vec<TeamEntry>,
    /// Player roster for player-shuffle tournaments.
    #[serde(default)]
    players: Vec<String>,
    #[serde(default)]
    team_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TeamEntry {
    name: String,
    #[serde(default)]
    tag: String,
    /// 1-based; zero or absent means "use list position".
    #[serde(default)]
    seed: u32,
    #[serde(default)]
    players: Vec<String>,
}

async fn create_tournament(
    State(state): State<AppState>,
    Json(req): Json<CreateTournament>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.repo.active_tournament().await.is_some() {
        return Err(ApiError(
            StatusCode::CONFLICT,
            "a tournament already exists; delete it first".to_string(),
        ));
    }

    let mut tournament = Tournament::new(req.name, req.kind, req.format);
    tournament.map_pool = req.map_pool;
    tournament.settings = req.settings;
    if let Some(team_size) = req.team_size {
        tournament.team_size = team_size.max(1);
    }
    for (i, entry) in req.teams.into_iter().enumerate() {
        let seed = if entry.seed == 0 {
            i as u32 + 1
        } else {
            entry.seed
        };
        let mut team = Team::new(entry.name, entry.tag, seed);
        team.players = entry.players.into_iter().map(PlayerRef::new).collect();
        tournament.teams.push(team);
    }
    tournament.players = req.players.into_iter().map(ShufflePlayer::new).collect();

    let matches = bracket::generate(&mut tournament).map_err(CoreError::from)?;
    let body = json!({
        "id": tournament.id,
        "name": tournament.name,
        "matches": matches.len(),
    });
    info!(name = %tournament.name, kind = ?tournament.kind, matches = matches.len(), "tournament created");
    state.repo.put_tournament(tournament).await;
    state.repo.insert_matches(matches).await;
    Ok(Json(body))
}

async fn get_tournament(State(state): State<AppState>) -> ApiResult<Json<Tournament>> {
    state
        .repo
        .active_tournament()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no active tournament"))
}

async fn delete_tournament(State(state): State<AppState>) -> ApiResult<StatusCode> {
    if state.repo.delete_tournament().await {
        info!("tournament deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("no active tournament"))
    }
}

async fn active_id(state: &AppState) -> ApiResult<matchpit_types::TournamentId> {
    state
        .repo
        .active_tournament()
        .await
        .map(|t| t.id)
        .ok_or_else(|| ApiError::not_found("no active tournament"))
}

async fn start_tournament(
    State(state): State<AppState>,
) -> ApiResult<Json<matchpit_core::AllocationReport>> {
    let id = active_id(&state).await?;
    Ok(Json(state.engine.start(id).await?))
}

async fn restart_tournament(
    State(state): State<AppState>,
) -> ApiResult<Json<matchpit_core::AllocationReport>> {
    let id = active_id(&state).await?;
    Ok(Json(state.engine.restart(id).await?))
}

async fn allocate(
    State(state): State<AppState>,
) -> ApiResult<Json<matchpit_core::AllocationReport>> {
    let id = active_id(&state).await?;
    Ok(Json(state.engine.allocate(id).await?))
}

async fn reset_tournament(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let id = active_id(&state).await?;
    state.engine.reset(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RegenerateParams {
    #[serde(default)]
    force: bool,
}

async fn regenerate(
    State(state): State<AppState>,
    Query(params): Query<RegenerateParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = active_id(&state).await?;
    let count = state.engine.regenerate(id, params.force).await?;
    Ok(Json(json!({ "matches": count })))
}

/// Pair the next round for formats where rounds are drawn on demand.
async fn next_round(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let mut tournament = state
        .repo
        .active_tournament()
        .await
        .ok_or_else(|| ApiError::not_found("no active tournament"))?;
    let existing = state.repo.matches().await;
    let round = existing.iter().map(|m| m.round).max().unwrap_or(0) + 1;

    let new_matches = match tournament.kind {
        TournamentKind::Swiss => {
            bracket::next_swiss_round(&tournament, &existing).map_err(CoreError::from)?
        }
        TournamentKind::PlayerShuffle => {
            if existing.iter().any(|m| m.status != matchpit_types::MatchStatus::Completed) {
                return Err(CoreError::from(
                    matchpit_core::error::BracketError::RoundUnfinished,
                )
                .into());
            }
            let matches =
                bracket::next_shuffle_round(&mut tournament, round).map_err(CoreError::from)?;
            // Sit-out counters moved; persist them with the new round.
            state.repo.put_tournament(tournament.clone()).await;
            matches
        }
        _ => {
            return Err(ApiError::unprocessable(
                "this tournament kind has a fixed bracket; use regenerate instead",
            ))
        }
    };

    let count = new_matches.len();
    state.repo.insert_matches(new_matches).await;
    info!(round, matches = count, "next round paired");
    Ok(Json(json!({ "round": round, "matches": count })))
}

// ============================================================================
// Matches and vetoes
// ============================================================================

async fn list_matches(State(state): State<AppState>) -> Json<Vec<matchpit_types::Match>> {
    Json(state.repo.matches().await)
}

async fn find_match(state: &AppState, slug: &str) -> ApiResult<matchpit_types::Match> {
    state
        .repo
        .match_by_slug(slug)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no match with slug {slug:?}")))
}

async fn get_match(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<matchpit_types::Match>> {
    find_match(&state, &slug).await.map(Json)
}

/// The frozen configuration blob game servers fetch during `load`.
async fn get_match_config(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<matchpit_types::MatchConfig>> {
    let m = find_match(&state, &slug).await?;
    m.config
        .map(Json)
        .ok_or_else(|| ApiError::not_found("match has not been allocated yet"))
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    /// 1 or 2, the caller's slot in the match.
    team: u8,
}

fn slot_from_query(q: &TeamQuery) -> ApiResult<TeamSlot> {
    match q.team {
        1 => Ok(TeamSlot::One),
        2 => Ok(TeamSlot::Two),
        other => Err(ApiError::unprocessable(format!(
            "team must be 1 or 2, got {other}"
        ))),
    }
}

async fn get_veto(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<TeamQuery>,
) -> ApiResult<Json<matchpit_types::VetoSummary>> {
    let viewer = slot_from_query(&q)?;
    let m = find_match(&state, &slug).await?;
    Ok(Json(m.veto.summary_for(viewer)))
}

async fn post_veto(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<TeamQuery>,
    Json(request): Json<veto::VetoRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = slot_from_query(&q)?;
    let status = veto::submit_for_match(&state.repo, &slug, actor, request).await?;
    Ok(Json(json!({ "status": status })))
}

// ============================================================================
// Servers
// ============================================================================

async fn list_servers(State(state): State<AppState>) -> Json<Vec<matchpit_types::GameServer>> {
    Json(state.registry.list().await)
}

async fn probe_servers(State(state): State<AppState>) -> Json<Vec<matchpit_types::GameServer>> {
    state.registry.probe_all().await;
    Json(state.registry.list().await)
}
