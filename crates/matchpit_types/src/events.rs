//! Webhook event payloads reported by game servers.
//!
//! Events arrive out of band on `/events/{slug}` and are discriminated by
//! the `event` field. The transport gives no ordering guarantee; score
//! updates carry a sequence number so stale snapshots can be discarded.

use crate::matches::PlayerStatLine;
use crate::veto::TeamSlot;
use crate::PlayerId;
use serde::{Deserialize, Serialize};

/// A server-originated notification for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    /// The server went live with the first map of the series.
    SeriesStart { map_number: u32 },

    PlayerConnected {
        player_id: PlayerId,
        name: String,
    },

    PlayerDisconnected {
        player_id: PlayerId,
    },

    /// Periodic score snapshot, last-write-wins keyed by `seq`.
    ScoreUpdate {
        seq: u64,
        map_number: u32,
        team_one: u32,
        team_two: u32,
    },

    /// Final report for the whole series.
    SeriesEnd {
        winner: TeamSlot,
        team_one_series_score: u32,
        team_two_series_score: u32,
        #[serde(default)]
        player_stats: Vec<PlayerStatLine>,
    },

    DemoUploaded {
        map_number: u32,
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_deserialize_by_discriminator() {
        let raw = r#"{"event":"score_update","seq":7,"map_number":1,"team_one":9,"team_two":6}"#;
        let event: MatchEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            MatchEvent::ScoreUpdate {
                seq: 7,
                map_number: 1,
                team_one: 9,
                team_two: 6
            }
        );

        let raw = r#"{"event":"series_end","winner":"one","team_one_series_score":2,"team_two_series_score":1}"#;
        let event: MatchEvent = serde_json::from_str(raw).unwrap();
        match event {
            MatchEvent::SeriesEnd {
                winner,
                player_stats,
                ..
            } => {
                assert_eq!(winner, TeamSlot::One);
                assert!(player_stats.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_kind_is_an_error() {
        let raw = r#"{"event":"coffee_break"}"#;
        assert!(serde_json::from_str::<MatchEvent>(raw).is_err());
    }
}
