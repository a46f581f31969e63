//! The frozen match configuration blob.
//!
//! Written exactly once, at allocation time, from the tournament's team data
//! and the completed veto. Game servers fetch it by reference when loading a
//! match; the event reconciler derives team membership from it instead of
//! guessing from roster strings.

use crate::{PlayerId, PlayerRef, TeamId};
use serde::{Deserialize, Serialize};

/// Current version of the serialized config blob shape.
pub const MATCH_CONFIG_VERSION: u32 = 1;

/// One team as frozen into a match config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTeam {
    pub id: Option<TeamId>,
    pub name: String,
    pub tag: String,
    pub players: Vec<PlayerRef>,
}

/// The frozen match configuration handed to a game server at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub version: u32,
    pub match_slug: String,
    pub team_one: ConfigTeam,
    pub team_two: ConfigTeam,
    /// Ordered map list produced by the veto (or taken from the pool when
    /// the veto is skipped).
    pub maps: Vec<String>,
    pub players_per_team: u32,
}

impl MatchConfig {
    /// Unambiguous team membership for a player, derived from the frozen
    /// rosters. Returns `None` for players on neither roster.
    pub fn roster_of(&self, player: PlayerId) -> Option<crate::veto::TeamSlot> {
        if self.team_one.players.iter().any(|p| p.id == player) {
            return Some(crate::veto::TeamSlot::One);
        }
        if self.team_two.players.iter().any(|p| p.id == player) {
            return Some(crate::veto::TeamSlot::Two);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::veto::TeamSlot;

    fn sample() -> MatchConfig {
        MatchConfig {
            version: MATCH_CONFIG_VERSION,
            match_slug: "r1m1-deadbeef".into(),
            team_one: ConfigTeam {
                id: Some(TeamId::new()),
                name: "Alpha".into(),
                tag: "ALP".into(),
                players: vec![PlayerRef::new("alice")],
            },
            team_two: ConfigTeam {
                id: Some(TeamId::new()),
                name: "Bravo".into(),
                tag: "BRV".into(),
                players: vec![PlayerRef::new("bob")],
            },
            maps: vec!["de_alpha".into()],
            players_per_team: 5,
        }
    }

    #[test]
    fn membership_is_derived_from_frozen_rosters() {
        let config = sample();
        let alice = config.team_one.players[0].id;
        let bob = config.team_two.players[0].id;
        assert_eq!(config.roster_of(alice), Some(TeamSlot::One));
        assert_eq!(config.roster_of(bob), Some(TeamSlot::Two));
        assert_eq!(config.roster_of(crate::PlayerId::new()), None);
    }
}
