//! The per-match lifecycle state machine.
//!
//! Statuses move one way, `Pending -> Ready -> Loaded -> Live -> Completed`,
//! except for the explicit reset paths: restart forces `Loaded|Live -> Ready`
//! and a tournament-level reset forces anything back to `Pending`. Every
//! transition is an optimistic compare-and-swap packaged as a
//! [`MatchMutation`]; applying one against a match in the wrong source state
//! yields a [`StateConflict`] and changes nothing.

use crate::error::StateConflict;
use crate::repo::MatchMutation;
use matchpit_types::{Match, MatchStatus, VetoState};

/// Whether the one-directional state machine permits `from -> to`.
/// Reset paths are not in this table; they go through [`restart`] and
/// [`reset_to_pending`] explicitly.
pub fn is_forward_transition(from: MatchStatus, to: MatchStatus) -> bool {
    use MatchStatus::*;
    matches!(
        (from, to),
        (Pending, Ready) | (Ready, Loaded) | (Loaded, Live) | (Live, Completed)
    )
}

fn expect(m: &Match, allowed: &[MatchStatus], label: &'static str) -> Result<(), StateConflict> {
    if allowed.contains(&m.status) {
        Ok(())
    } else {
        Err(StateConflict {
            expected: label,
            actual: m.status,
        })
    }
}

/// Forward transition with an optimistic source-state check.
pub fn advance(from: MatchStatus, to: MatchStatus) -> MatchMutation {
    debug_assert!(is_forward_transition(from, to));
    let label = status_label(from);
    Box::new(move |m| {
        expect(m, &[from], label)?;
        m.status = to;
        Ok(())
    })
}

/// Restart path: `Loaded|Live -> Ready`, clearing the server assignment.
/// Veto state and scores are untouched.
pub fn restart() -> MatchMutation {
    Box::new(|m| {
        expect(m, &[MatchStatus::Loaded, MatchStatus::Live], "loaded or live")?;
        m.status = MatchStatus::Ready;
        m.server_id = None;
        Ok(())
    })
}

/// Tournament-level reset: any status back to `Pending`. Clears veto
/// progress, server assignment, frozen config, scores, and statistics, but
/// preserves the bracket position and side assignments.
pub fn reset_to_pending() -> MatchMutation {
    Box::new(|m| {
        m.status = MatchStatus::Pending;
        m.server_id = None;
        m.config = None;
        m.veto = VetoState::new(std::mem::take(&mut m.veto.steps));
        m.live_score = None;
        m.connected_players.clear();
        m.player_stats.clear();
        m.winner = None;
        m.demo_url = None;
        m.rating_submitted = false;
        Ok(())
    })
}

fn status_label(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Pending => "pending",
        MatchStatus::Ready => "ready",
        MatchStatus::Loaded => "loaded",
        MatchStatus::Live => "live",
        MatchStatus::Completed => "completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchpit_types::{BracketStage, ServerId, TournamentId, VetoStep};
    use matchpit_types::{TeamSlot, VetoActionKind};

    fn sample(status: MatchStatus) -> Match {
        let mut m = Match::new(
            TournamentId::new(),
            BracketStage::Winners,
            1,
            1,
            VetoState::new(vec![VetoStep::new(TeamSlot::One, VetoActionKind::Ban)]),
        );
        m.status = status;
        m
    }

    #[test]
    fn forward_table_is_strictly_linear() {
        use MatchStatus::*;
        let all = [Pending, Ready, Loaded, Live, Completed];
        for from in all {
            for to in all {
                let legal = matches!(
                    (from, to),
                    (Pending, Ready) | (Ready, Loaded) | (Loaded, Live) | (Live, Completed)
                );
                assert_eq!(is_forward_transition(from, to), legal, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn advance_rejects_wrong_source_state() {
        let mut m = sample(MatchStatus::Ready);
        let mutation = advance(MatchStatus::Loaded, MatchStatus::Live);
        assert!(mutation(&mut m).is_err());
        // Rejected transitions must not touch the match.
        assert_eq!(m.status, MatchStatus::Ready);
    }

    #[test]
    fn restart_clears_server_but_keeps_veto_and_score() {
        let mut m = sample(MatchStatus::Live);
        m.server_id = Some(ServerId::new());
        m.live_score = Some(matchpit_types::LiveScore {
            seq: 3,
            map_number: 1,
            team_one: 7,
            team_two: 5,
        });
        restart()(&mut m).unwrap();
        assert_eq!(m.status, MatchStatus::Ready);
        assert_eq!(m.server_id, None);
        assert!(m.live_score.is_some());
        assert_eq!(m.veto.steps.len(), 1);
    }

    #[test]
    fn restart_rejects_matches_not_loaded_or_live() {
        for status in [MatchStatus::Pending, MatchStatus::Ready, MatchStatus::Completed] {
            let mut m = sample(status);
            assert!(restart()(&mut m).is_err());
            assert_eq!(m.status, status);
        }
    }

    #[test]
    fn reset_to_pending_clears_progress_but_keeps_steps() {
        let mut m = sample(MatchStatus::Completed);
        m.rating_submitted = true;
        m.winner = Some(TeamSlot::One);
        reset_to_pending()(&mut m).unwrap();
        assert_eq!(m.status, MatchStatus::Pending);
        assert!(!m.rating_submitted);
        assert_eq!(m.winner, None);
        assert_eq!(m.veto.steps.len(), 1);
        assert!(m.veto.actions.is_empty());
    }
}
