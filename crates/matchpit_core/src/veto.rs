//! The turn-based veto sequencer.
//!
//! Walks two teams through the canonical ban/pick/side order for the match
//! format. Actions apply strictly in step order; anything from the wrong
//! actor, of the wrong kind, or after completion is rejected without
//! touching state. Completion freezes the picked-map list and promotes the
//! match to ready.

use crate::error::{BracketError, BracketResult, CoreError, CoreResult, VetoError, VetoResult};
use crate::repo::Repository;
use matchpit_types::{
    MatchFormat, MatchStatus, PickedMap, Side, TeamSlot, TournamentSettings, VetoAction,
    VetoActionKind, VetoDecision, VetoState, VetoStatus, VetoStep,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One submitted veto decision, as received from a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VetoRequest {
    Ban { map: String },
    Pick { map: String },
    Side { side: Side },
}

/// The canonical step order for a format over a pool of `pool_size` maps.
///
/// - Bo1: alternating bans starting with team one until a single map
///   remains, then the team that did not make the final ban picks its side
///   on that map.
/// - Bo3: ban, ban, pick, side, pick, side, then alternating bans down to
///   one map, which auto-appends as the knife-round decider. Over the
///   standard 7-map pool this is the classic 8-step order.
/// - Bo5: alternating bans down to five maps, then four pick/side pairs;
///   the last remaining map is the knife-round decider.
pub fn canonical_steps(format: MatchFormat, pool_size: usize) -> BracketResult<Vec<VetoStep>> {
    use TeamSlot::{One, Two};
    use VetoActionKind::{Ban, Pick, PickSide};

    // Smallest pool each order fits: Bo3 needs two bans and two picks with
    // a map left over for the decider, Bo5 one ban and four picks.
    let min_pool = match format {
        MatchFormat::Bo1 => 2,
        MatchFormat::Bo3 => 5,
        MatchFormat::Bo5 => 6,
    };
    if pool_size < min_pool {
        return Err(BracketError::PoolTooSmall {
            pool: pool_size,
            format,
        });
    }

    let alternating = |start: TeamSlot, count: usize| {
        (0..count).map(move |i| {
            let owner = if i % 2 == 0 { start } else { start.other() };
            VetoStep::new(owner, Ban)
        })
    };

    let mut steps = Vec::new();
    match format {
        MatchFormat::Bo1 => {
            let bans = pool_size - 1;
            steps.extend(alternating(One, bans));
            let last_ban_owner = steps.last().map(|s| s.owner).unwrap_or(One);
            steps.push(VetoStep::new(last_ban_owner.other(), PickSide));
        }
        MatchFormat::Bo3 => {
            steps.push(VetoStep::new(One, Ban));
            steps.push(VetoStep::new(Two, Ban));
            steps.push(VetoStep::new(One, Pick));
            steps.push(VetoStep::new(Two, PickSide));
            steps.push(VetoStep::new(Two, Pick));
            steps.push(VetoStep::new(One, PickSide));
            steps.extend(alternating(One, pool_size - 5));
        }
        MatchFormat::Bo5 => {
            steps.extend(alternating(One, pool_size - 5));
            for (picker, sider) in [(One, Two), (Two, One), (One, Two), (Two, One)] {
                steps.push(VetoStep::new(picker, Pick));
                steps.push(VetoStep::new(sider, PickSide));
            }
        }
    }
    Ok(steps)
}

/// Fresh veto state for a match, honoring a tournament-level step override.
/// A skip-veto tournament gets an already-completed state with the maps
/// taken from the front of the pool.
pub fn fresh_state(
    format: MatchFormat,
    pool: &[String],
    settings: &TournamentSettings,
) -> BracketResult<VetoState> {
    if settings.skip_veto {
        let needed = format.map_count();
        if pool.len() < needed {
            return Err(BracketError::PoolTooSmall {
                pool: pool.len(),
                format,
            });
        }
        let mut state = VetoState::new(Vec::new());
        state.picked_maps = pool[..needed]
            .iter()
            .enumerate()
            .map(|(i, map)| PickedMap {
                map: map.clone(),
                number: i as u32 + 1,
                picked_by: None,
                side_team_one: None,
                knife_round: true,
            })
            .collect();
        state.status = VetoStatus::Completed;
        return Ok(state);
    }

    let steps = match &settings.veto_order {
        Some(order) => order.clone(),
        None => canonical_steps(format, pool.len())?,
    };
    Ok(VetoState::new(steps))
}

fn remaining_maps<'a>(state: &VetoState, pool: &'a [String]) -> Vec<&'a str> {
    let consumed = state.consumed_maps();
    pool.iter()
        .map(String::as_str)
        .filter(|m| !consumed.contains(m) && !state.picked_maps.iter().any(|p| p.map == *m))
        .collect()
}

/// Apply one action to a veto state. On success returns the new overall
/// status; on rejection the state is untouched.
pub fn submit(
    state: &mut VetoState,
    pool: &[String],
    actor: TeamSlot,
    request: VetoRequest,
) -> VetoResult<VetoStatus> {
    if state.is_complete() {
        return Err(VetoError::AlreadyComplete);
    }
    let step = match state.current_step() {
        Some(step) => *step,
        None => return Err(VetoError::AlreadyComplete),
    };
    if step.owner != actor {
        return Err(VetoError::OutOfTurn(actor));
    }

    let decision = match (step.kind, request) {
        (VetoActionKind::Ban, VetoRequest::Ban { map }) => {
            if !remaining_maps(state, pool).contains(&map.as_str()) {
                return Err(VetoError::MapUnavailable(map));
            }
            VetoDecision::Ban { map }
        }
        (VetoActionKind::Pick, VetoRequest::Pick { map }) => {
            if !remaining_maps(state, pool).contains(&map.as_str()) {
                return Err(VetoError::MapUnavailable(map));
            }
            let number = state.picked_maps.len() as u32 + 1;
            state.picked_maps.push(PickedMap {
                map: map.clone(),
                number,
                picked_by: Some(actor),
                side_team_one: None,
                knife_round: false,
            });
            VetoDecision::Pick { map }
        }
        (VetoActionKind::PickSide, VetoRequest::Side { side }) => {
            let side_team_one = match actor {
                TeamSlot::One => side,
                TeamSlot::Two => side.other(),
            };
            match state.picked_maps.last_mut() {
                Some(last) => {
                    last.side_team_one = Some(side_team_one);
                    last.knife_round = false;
                }
                None => {
                    // Single-map format: the side attaches to the sole
                    // remaining map, which becomes the match map.
                    let remaining = remaining_maps(state, pool);
                    let [sole] = remaining.as_slice() else {
                        return Err(VetoError::NoPickForSide);
                    };
                    state.picked_maps.push(PickedMap {
                        map: sole.to_string(),
                        number: 1,
                        picked_by: None,
                        side_team_one: Some(side_team_one),
                        knife_round: false,
                    });
                }
            }
            VetoDecision::Side { side }
        }
        (expected, _) => return Err(VetoError::WrongKind { expected }),
    };

    state.actions.push(VetoAction {
        step_index: state.actions.len(),
        owner: actor,
        decision,
    });
    state.status = VetoStatus::InProgress;

    if state.actions.len() == state.steps.len() {
        finalize(state, pool);
    }
    Ok(state.status)
}

/// All canonical steps consumed: append the knife-round decider when exactly
/// one map is left over, then freeze.
fn finalize(state: &mut VetoState, pool: &[String]) {
    let remaining = remaining_maps(state, pool);
    if let [decider] = remaining.as_slice() {
        let number = state.picked_maps.len() as u32 + 1;
        state.picked_maps.push(PickedMap {
            map: decider.to_string(),
            number,
            picked_by: None,
            side_team_one: None,
            knife_round: true,
        });
    }
    state.status = VetoStatus::Completed;
    debug!(maps = state.picked_maps.len(), "veto complete");
}

/// Submit one veto action against a stored match, promoting it from pending
/// to ready when the veto completes. Pure validation failures leave both the
/// veto and the match untouched.
pub async fn submit_for_match(
    repo: &Arc<dyn Repository>,
    slug: &str,
    actor: TeamSlot,
    request: VetoRequest,
) -> CoreResult<VetoStatus> {
    let tournament = repo.active_tournament().await.ok_or(CoreError::NoTournament)?;
    let pool = tournament.map_pool.clone();
    let m = repo
        .match_by_slug(slug)
        .await
        .ok_or_else(|| CoreError::UnknownSlug(slug.to_string()))?;
    let id = m.id;

    let updated = repo
        .modify_match(
            id,
            Box::new(move |m| {
                let status = submit(&mut m.veto, &pool, actor, request)?;
                if status == VetoStatus::Completed
                    && m.status == MatchStatus::Pending
                    && m.has_both_sides()
                {
                    m.status = MatchStatus::Ready;
                }
                Ok(())
            }),
        )
        .await?;

    if updated.veto.is_complete() {
        info!(slug, status = ?updated.status, "veto completed, match promoted");
    }
    Ok(updated.veto.status)
}
