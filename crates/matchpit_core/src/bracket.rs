//! Bracket generation: the match graph for each tournament topology.
//!
//! Generators validate team counts against the topology before creating
//! anything; a bad count fails with a [`BracketError`] and produces no
//! partial bracket. Round 1 comes out fully seeded; later rounds are
//! placeholder matches wired together with winner (and, for double
//! elimination, loser) advancement links.

use crate::error::{BracketError, BracketResult};
use crate::veto;
use matchpit_types::{
    Advancement, BracketStage, Match, MatchStatus, SeedingMethod, ShufflePlayer, SideRef, Team,
    TeamSlot, Tournament, TournamentKind, VetoState,
};
use matchpit_types::{PlayerRef, TeamId};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// Generate the complete match graph for a tournament.
///
/// For player shuffle this produces round 1 only; later rounds are drawn per
/// round with [`next_shuffle_round`] once results are in. Swiss likewise
/// produces round 1 and continues through [`next_swiss_round`].
pub fn generate(tournament: &mut Tournament) -> BracketResult<Vec<Match>> {
    let matches = match tournament.kind {
        TournamentKind::SingleElimination => single_elimination(tournament)?,
        TournamentKind::DoubleElimination => double_elimination(tournament)?,
        TournamentKind::RoundRobin => round_robin(tournament)?,
        TournamentKind::Swiss => swiss_round_one(tournament)?,
        TournamentKind::PlayerShuffle => next_shuffle_round(tournament, 1)?,
    };
    info!(
        kind = ?tournament.kind,
        matches = matches.len(),
        "bracket generated"
    );
    Ok(matches)
}

fn fresh_veto(tournament: &Tournament) -> BracketResult<VetoState> {
    veto::fresh_state(
        tournament.format,
        &tournament.map_pool,
        &tournament.settings,
    )
}

/// Teams in pairing order, honoring the seeding method.
fn seeded_teams(tournament: &Tournament) -> Vec<Team> {
    let mut teams = tournament.teams.clone();
    match tournament.settings.seeding {
        SeedingMethod::Ranked => teams.sort_by_key(|t| t.seed),
        SeedingMethod::Random => teams.shuffle(&mut rand::thread_rng()),
    }
    teams
}

fn require_power_of_two(kind: TournamentKind, count: usize, min: usize) -> BracketResult<()> {
    if count < min {
        return Err(BracketError::TooFewTeams { kind, min, count });
    }
    if !count.is_power_of_two() {
        return Err(BracketError::NotPowerOfTwo { kind, count });
    }
    Ok(())
}

// ============================================================================
// Single Elimination
// ============================================================================

fn single_elimination(tournament: &Tournament) -> BracketResult<Vec<Match>> {
    let teams = seeded_teams(tournament);
    require_power_of_two(TournamentKind::SingleElimination, teams.len(), 2)?;
    let n = teams.len();
    let rounds = n.trailing_zeros();

    // Build every round's placeholders first, then wire and seed.
    let mut by_round: Vec<Vec<Match>> = Vec::new();
    for round in 1..=rounds {
        let count = n >> round;
        let mut row = Vec::with_capacity(count);
        for number in 1..=count {
            row.push(Match::new(
                tournament.id,
                BracketStage::Winners,
                round,
                number as u32,
                fresh_veto(tournament)?,
            ));
        }
        by_round.push(row);
    }

    wire_winner_links(&mut by_round);
    seed_round_one(&mut by_round[0], &teams);

    Ok(by_round.into_iter().flatten().collect())
}

/// Winner of round r match j advances to round r+1 match j/2, alternating
/// between the two slots.
fn wire_winner_links(by_round: &mut [Vec<Match>]) {
    for round in 0..by_round.len().saturating_sub(1) {
        let next: Vec<_> = by_round[round + 1].iter().map(|m| m.id).collect();
        for (j, m) in by_round[round].iter_mut().enumerate() {
            m.winner_to = Some(Advancement {
                target: next[j / 2],
                slot: if j % 2 == 0 { TeamSlot::One } else { TeamSlot::Two },
            });
        }
    }
}

fn seed_round_one(round_one: &mut [Match], teams: &[Team]) {
    for (j, m) in round_one.iter_mut().enumerate() {
        m.side_one = Some(SideRef::Team(teams[2 * j].id));
        m.side_two = Some(SideRef::Team(teams[2 * j + 1].id));
    }
}

// ============================================================================
// Double Elimination
// ============================================================================

/// Winners bracket as in single elimination, plus a losers bracket of
/// 2(k-1) rounds for 2^k teams and a grand final. Odd losers rounds receive
/// winners-bracket drop-downs paired together; even losers rounds pit the
/// previous losers-round winner against the next winners-round loser.
fn double_elimination(tournament: &Tournament) -> BracketResult<Vec<Match>> {
    let teams = seeded_teams(tournament);
    require_power_of_two(TournamentKind::DoubleElimination, teams.len(), 4)?;
    let n = teams.len();
    let k = n.trailing_zeros() as usize;

    let mut winners: Vec<Vec<Match>> = Vec::new();
    for round in 1..=k {
        let count = n >> round;
        let mut row = Vec::with_capacity(count);
        for number in 1..=count {
            row.push(Match::new(
                tournament.id,
                BracketStage::Winners,
                round as u32,
                number as u32,
                fresh_veto(tournament)?,
            ));
        }
        winners.push(row);
    }
    wire_winner_links(&mut winners);
    seed_round_one(&mut winners[0], &teams);

    // Losers rounds come in pairs: round 2i-1 and 2i both have n/2^(i+1)
    // matches, for i in 1..=k-1.
    let mut losers: Vec<Vec<Match>> = Vec::new();
    for i in 1..=k - 1 {
        let count = n >> (i + 1);
        for half in 0..2 {
            let round = (2 * i - 1 + half) as u32;
            let mut row = Vec::with_capacity(count);
            for number in 1..=count {
                row.push(Match::new(
                    tournament.id,
                    BracketStage::Losers,
                    round,
                    number as u32,
                    fresh_veto(tournament)?,
                ));
            }
            losers.push(row);
        }
    }

    let grand_final = Match::new(
        tournament.id,
        BracketStage::Final,
        k as u32 + 1,
        1,
        fresh_veto(tournament)?,
    );

    // Winners round 1 losers drop into losers round 1, paired up.
    let l1: Vec<_> = losers[0].iter().map(|m| m.id).collect();
    for (j, m) in winners[0].iter_mut().enumerate() {
        m.loser_to = Some(Advancement {
            target: l1[j / 2],
            slot: if j % 2 == 0 { TeamSlot::One } else { TeamSlot::Two },
        });
    }
    // Winners round r >= 2 losers drop into losers round 2(r-1), slot two.
    for r in 2..=k {
        let targets: Vec<_> = losers[2 * (r - 1) - 1].iter().map(|m| m.id).collect();
        for (j, m) in winners[r - 1].iter_mut().enumerate() {
            m.loser_to = Some(Advancement {
                target: targets[j],
                slot: TeamSlot::Two,
            });
        }
    }
    // Odd losers round winners advance within the pair; even losers round
    // winners advance to the next odd round, paired up.
    for lr in 0..losers.len() - 1 {
        let targets: Vec<_> = losers[lr + 1].iter().map(|m| m.id).collect();
        let pair_down = lr % 2 == 1;
        for (j, m) in losers[lr].iter_mut().enumerate() {
            m.winner_to = Some(Advancement {
                target: if pair_down { targets[j / 2] } else { targets[j] },
                slot: if pair_down {
                    if j % 2 == 0 {
                        TeamSlot::One
                    } else {
                        TeamSlot::Two
                    }
                } else {
                    TeamSlot::One
                },
            });
        }
    }
    // Finals wiring: winners champion vs losers champion.
    winners[k - 1][0].winner_to = Some(Advancement {
        target: grand_final.id,
        slot: TeamSlot::One,
    });
    if let Some(last) = losers.last_mut().and_then(|row| row.first_mut()) {
        last.winner_to = Some(Advancement {
            target: grand_final.id,
            slot: TeamSlot::Two,
        });
    }

    let mut matches: Vec<Match> = winners.into_iter().flatten().collect();
    matches.extend(losers.into_iter().flatten());
    matches.push(grand_final);
    Ok(matches)
}

// ============================================================================
// Round Robin
// ============================================================================

/// Circle method: fix the first team, rotate the rest; with an odd team
/// count a bye slot rotates through and its pairings are skipped.
fn round_robin(tournament: &Tournament) -> BracketResult<Vec<Match>> {
    let teams = seeded_teams(tournament);
    if teams.len() < 2 {
        return Err(BracketError::TooFewTeams {
            kind: TournamentKind::RoundRobin,
            min: 2,
            count: teams.len(),
        });
    }

    let mut slots: Vec<Option<TeamId>> = teams.iter().map(|t| Some(t.id)).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let rounds = n - 1;

    let mut matches = Vec::new();
    for round in 1..=rounds {
        let mut number = 1;
        for j in 0..n / 2 {
            let (a, b) = (slots[j], slots[n - 1 - j]);
            let (Some(a), Some(b)) = (a, b) else { continue };
            let mut m = Match::new(
                tournament.id,
                BracketStage::Winners,
                round as u32,
                number,
                fresh_veto(tournament)?,
            );
            m.side_one = Some(SideRef::Team(a));
            m.side_two = Some(SideRef::Team(b));
            matches.push(m);
            number += 1;
        }
        // Rotate everything but the first slot.
        slots[1..].rotate_right(1);
    }
    Ok(matches)
}

// ============================================================================
// Swiss
// ============================================================================

fn swiss_round_one(tournament: &Tournament) -> BracketResult<Vec<Match>> {
    let teams = seeded_teams(tournament);
    if teams.len() < 4 {
        return Err(BracketError::TooFewTeams {
            kind: TournamentKind::Swiss,
            min: 4,
            count: teams.len(),
        });
    }
    if teams.len() % 2 == 1 {
        return Err(BracketError::OddTeamCount(teams.len()));
    }

    // Top half against bottom half, by seed.
    let half = teams.len() / 2;
    let mut matches = Vec::new();
    for j in 0..half {
        let mut m = Match::new(
            tournament.id,
            BracketStage::Winners,
            1,
            j as u32 + 1,
            fresh_veto(tournament)?,
        );
        m.side_one = Some(SideRef::Team(teams[j].id));
        m.side_two = Some(SideRef::Team(teams[half + j].id));
        matches.push(m);
    }
    Ok(matches)
}

/// Pair the next swiss round from standings: wins descending, seed as the
/// tiebreak, avoiding rematches greedily. Refuses while any current-round
/// match is unfinished.
pub fn next_swiss_round(
    tournament: &Tournament,
    existing: &[Match],
) -> BracketResult<Vec<Match>> {
    if existing
        .iter()
        .any(|m| m.status != MatchStatus::Completed)
    {
        return Err(BracketError::RoundUnfinished);
    }
    let last_round = existing.iter().map(|m| m.round).max().unwrap_or(0);

    // Standings and the set of pairings already played.
    let mut wins: Vec<(TeamId, u32, u32)> = tournament
        .teams
        .iter()
        .map(|t| (t.id, 0, t.seed))
        .collect();
    let mut played: Vec<(TeamId, TeamId)> = Vec::new();
    for m in existing {
        let (Some(SideRef::Team(a)), Some(SideRef::Team(b))) = (&m.side_one, &m.side_two) else {
            continue;
        };
        played.push((*a, *b));
        let winner_team = match m.winner {
            Some(TeamSlot::One) => Some(*a),
            Some(TeamSlot::Two) => Some(*b),
            None => None,
        };
        if let Some(w) = winner_team {
            if let Some(entry) = wins.iter_mut().find(|(id, _, _)| *id == w) {
                entry.1 += 1;
            }
        }
    }
    wins.sort_by_key(|(_, w, seed)| (std::cmp::Reverse(*w), *seed));

    let have_met = |a: TeamId, b: TeamId| {
        played
            .iter()
            .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    };

    let mut order: Vec<TeamId> = wins.iter().map(|(id, _, _)| *id).collect();
    let mut matches = Vec::new();
    let mut number = 1;
    while order.len() >= 2 {
        let a = order.remove(0);
        let opponent_index = order
            .iter()
            .position(|&b| !have_met(a, b))
            .unwrap_or(0);
        let b = order.remove(opponent_index);
        let mut m = Match::new(
            tournament.id,
            BracketStage::Winners,
            last_round + 1,
            number,
            fresh_veto(tournament)?,
        );
        m.side_one = Some(SideRef::Team(a));
        m.side_two = Some(SideRef::Team(b));
        matches.push(m);
        number += 1;
    }
    Ok(matches)
}

// ============================================================================
// Player Shuffle
// ============================================================================

/// Draw ad hoc teams for one shuffle round. Players who have sat out the
/// least sit out first when the roster does not divide evenly; the sit-out
/// counters on the tournament roster are updated in place.
pub fn next_shuffle_round(
    tournament: &mut Tournament,
    round: u32,
) -> BracketResult<Vec<Match>> {
    let team_size = tournament.team_size.max(1);
    let per_match = (team_size * 2) as usize;
    let mut active: Vec<ShufflePlayer> = tournament
        .players
        .iter()
        .filter(|p| !p.dropped)
        .cloned()
        .collect();
    if active.len() < per_match {
        return Err(BracketError::TooFewPlayers {
            team_size,
            min: per_match,
            count: active.len(),
        });
    }

    // Sort by times sat out with a random tiebreak, so the same players do
    // not sit out round after round.
    let mut rng = rand::thread_rng();
    let mut keyed: Vec<(ShufflePlayer, u32)> =
        active.drain(..).map(|p| (p, rng.gen::<u32>())).collect();
    keyed.sort_by_key(|(p, tiebreak)| (p.times_sat_out, *tiebreak));
    let mut active: Vec<ShufflePlayer> = keyed.into_iter().map(|(p, _)| p).collect();

    let excess = active.len() % per_match;
    let sitting: Vec<ShufflePlayer> = active.drain(..excess).collect();
    for p in &sitting {
        if let Some(entry) = tournament.players.iter_mut().find(|x| x.id == p.id) {
            entry.times_sat_out += 1;
        }
    }

    active.shuffle(&mut rng);

    let mut matches = Vec::new();
    for (j, chunk) in active.chunks_exact(per_match).enumerate() {
        let number = j as u32 + 1;
        let roster = |players: &[ShufflePlayer], label: &str| SideRef::Roster {
            name: format!("R{round} M{number} {label}"),
            players: players
                .iter()
                .map(|p| PlayerRef {
                    id: p.id,
                    name: p.name.clone(),
                })
                .collect(),
        };
        let mut m = Match::new(
            tournament.id,
            BracketStage::Winners,
            round,
            number,
            fresh_veto(tournament)?,
        );
        m.side_one = Some(roster(&chunk[..team_size as usize], "Alpha"));
        m.side_two = Some(roster(&chunk[team_size as usize..], "Bravo"));
        matches.push(m);
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchpit_types::{MatchFormat, TournamentSettings};

    fn tournament(kind: TournamentKind, teams: usize) -> Tournament {
        let mut t = Tournament::new("test", kind, MatchFormat::Bo1);
        t.map_pool = vec!["de_dust2".into(), "de_mirage".into(), "de_nuke".into()];
        t.settings = TournamentSettings {
            skip_veto: true,
            ..Default::default()
        };
        for i in 0..teams {
            t.teams
                .push(Team::new(format!("team {i}"), format!("T{i}"), i as u32 + 1));
        }
        t
    }

    #[test]
    fn single_elimination_produces_n_minus_one_matches() {
        for n in [2usize, 4, 8, 16] {
            let mut t = tournament(TournamentKind::SingleElimination, n);
            let matches = generate(&mut t).unwrap();
            assert_eq!(matches.len(), n - 1);

            let rounds = matches.iter().map(|m| m.round).max().unwrap();
            assert_eq!(rounds, n.trailing_zeros());

            // Round 1 fully seeded, later rounds unresolved placeholders.
            for m in &matches {
                if m.round == 1 {
                    assert!(m.has_both_sides());
                } else {
                    assert!(m.side_one.is_none() && m.side_two.is_none());
                }
            }
        }
    }

    #[test]
    fn single_elimination_winner_links_converge_on_the_final() {
        let mut t = tournament(TournamentKind::SingleElimination, 8);
        let matches = generate(&mut t).unwrap();
        let final_match = matches
            .iter()
            .find(|m| m.round == 3)
            .expect("a final");
        assert!(final_match.winner_to.is_none());

        // Every non-final match advances somewhere, and both final slots
        // are fed by exactly one semifinal each.
        let semis: Vec<_> = matches.iter().filter(|m| m.round == 2).collect();
        let slots: Vec<_> = semis
            .iter()
            .map(|m| m.winner_to.expect("semi advances").slot)
            .collect();
        assert!(slots.contains(&TeamSlot::One) && slots.contains(&TeamSlot::Two));
        for m in &matches {
            if m.round < 3 {
                assert!(m.winner_to.is_some());
            }
        }
    }

    #[test]
    fn non_power_of_two_is_rejected_with_no_matches() {
        for n in [3usize, 5, 6, 12] {
            let mut t = tournament(TournamentKind::SingleElimination, n);
            assert!(matches!(
                generate(&mut t),
                Err(BracketError::NotPowerOfTwo { .. })
            ));
        }
    }

    #[test]
    fn double_elimination_has_two_n_minus_two_matches() {
        for n in [4usize, 8, 16] {
            let mut t = tournament(TournamentKind::DoubleElimination, n);
            let matches = generate(&mut t).unwrap();
            assert_eq!(matches.len(), 2 * n - 2);

            // Every winners-bracket match sends its loser somewhere.
            for m in matches.iter().filter(|m| m.stage == BracketStage::Winners) {
                assert!(m.loser_to.is_some(), "{} drops nowhere", m.slug);
            }
            // Exactly one grand final, fed on both slots.
            let finals: Vec<_> = matches
                .iter()
                .filter(|m| m.stage == BracketStage::Final)
                .collect();
            assert_eq!(finals.len(), 1);
            let feeds: Vec<_> = matches
                .iter()
                .filter(|m| {
                    m.winner_to
                        .map(|a| a.target == finals[0].id)
                        .unwrap_or(false)
                })
                .collect();
            assert_eq!(feeds.len(), 2);
        }
    }

    #[test]
    fn round_robin_plays_every_pair_once() {
        for n in [4usize, 5, 6] {
            let mut t = tournament(TournamentKind::RoundRobin, n);
            let matches = generate(&mut t).unwrap();
            assert_eq!(matches.len(), n * (n - 1) / 2);

            let mut pairs = std::collections::HashSet::new();
            for m in &matches {
                let (Some(SideRef::Team(a)), Some(SideRef::Team(b))) =
                    (&m.side_one, &m.side_two)
                else {
                    panic!("round robin match without sides");
                };
                let key = if a.0 < b.0 { (*a, *b) } else { (*b, *a) };
                assert!(pairs.insert(key), "pair played twice");
            }
        }
    }

    #[test]
    fn swiss_round_two_pairs_by_standings_without_rematches() {
        let mut t = tournament(TournamentKind::Swiss, 4);
        let mut matches = generate(&mut t).unwrap();
        assert_eq!(matches.len(), 2);

        for m in &mut matches {
            m.status = MatchStatus::Completed;
            m.winner = Some(TeamSlot::One);
        }
        let next = next_swiss_round(&t, &matches).unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|m| m.round == 2));

        // Winners meet winners; no round-1 pairing repeats.
        let r1_pairs: Vec<_> = matches
            .iter()
            .map(|m| (m.side_one.clone(), m.side_two.clone()))
            .collect();
        for m in &next {
            assert!(!r1_pairs.contains(&(m.side_one.clone(), m.side_two.clone())));
        }
    }

    #[test]
    fn swiss_refuses_next_round_while_unfinished() {
        let mut t = tournament(TournamentKind::Swiss, 4);
        let matches = generate(&mut t).unwrap();
        assert!(matches!(
            next_swiss_round(&t, &matches),
            Err(BracketError::RoundUnfinished)
        ));
    }

    #[test]
    fn shuffle_sits_out_excess_players_and_counts_it() {
        let mut t = Tournament::new("s", TournamentKind::PlayerShuffle, MatchFormat::Bo1);
        t.map_pool = vec!["de_dust2".into()];
        t.settings.skip_veto = true;
        t.team_size = 2;
        for i in 0..9 {
            t.players.push(ShufflePlayer::new(format!("p{i}")));
        }

        let matches = next_shuffle_round(&mut t, 1).unwrap();
        assert_eq!(matches.len(), 2);
        let sat: Vec<_> = t
            .players
            .iter()
            .filter(|p| p.times_sat_out == 1)
            .collect();
        assert_eq!(sat.len(), 1);

        for m in &matches {
            for side in [&m.side_one, &m.side_two] {
                let Some(SideRef::Roster { players, .. }) = side else {
                    panic!("shuffle match without roster");
                };
                assert_eq!(players.len(), 2);
            }
        }
    }

    #[test]
    fn shuffle_needs_a_full_match_of_players() {
        let mut t = Tournament::new("s", TournamentKind::PlayerShuffle, MatchFormat::Bo1);
        t.map_pool = vec!["de_dust2".into()];
        t.settings.skip_veto = true;
        t.team_size = 5;
        for i in 0..7 {
            t.players.push(ShufflePlayer::new(format!("p{i}")));
        }
        assert!(matches!(
            next_shuffle_round(&mut t, 1),
            Err(BracketError::TooFewPlayers { .. })
        ));
    }
}
