//! The command dispatcher seam and the protocol command strings.
//!
//! The core never opens sockets itself; it hands ordered command strings to
//! a [`ServerCommander`] with an explicit deadline. The production
//! implementation speaks RCON; tests script outcomes per server. Commands
//! are fire-and-confirm, not transactional: any failure means callers must
//! assume the load did not complete.

use crate::error::DispatchError;
use async_trait::async_trait;
use matchpit_types::GameServer;
use std::time::Duration;

#[async_trait]
pub trait ServerCommander: Send + Sync {
    /// Send `commands` in order over one authenticated connection, bounded
    /// as a whole by `deadline`. Returns each command's captured output; on
    /// failure [`DispatchError::Partial`] reports how many commands made it.
    async fn run(
        &self,
        server: &GameServer,
        commands: &[String],
        deadline: Duration,
    ) -> Result<Vec<String>, DispatchError>;
}

/// The protocol command strings the orchestrator issues.
pub mod commands {
    /// Point the server's match-report webhook at our ingestion endpoint.
    /// Safe to repeat; the server overwrites its previous destination.
    pub fn configure_webhook(
        base_url: &str,
        slug: &str,
        header: &str,
        secret: &str,
    ) -> Vec<String> {
        vec![
            format!("matchpit_event_url \"{base_url}/events/{slug}\""),
            format!("matchpit_event_auth \"{header}\" \"{secret}\""),
        ]
    }

    /// Load a match from its frozen configuration reference.
    pub fn load_match(base_url: &str, slug: &str) -> String {
        format!("matchpit_load \"{base_url}/api/matches/{slug}/config\"")
    }

    /// Force the server to end whatever it is currently running.
    pub fn force_end() -> String {
        "matchpit_end_force".to_string()
    }

    /// Cheap liveness probe.
    pub fn probe() -> String {
        "status".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::commands;

    #[test]
    fn webhook_commands_embed_url_and_auth() {
        let cmds =
            commands::configure_webhook("https://pit.example", "r1m1-abc", "X-Matchpit-Key", "s3cret");
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("https://pit.example/events/r1m1-abc"));
        assert!(cmds[1].contains("X-Matchpit-Key"));
        assert!(cmds[1].contains("s3cret"));
    }

    #[test]
    fn load_command_references_the_frozen_config() {
        let cmd = commands::load_match("https://pit.example", "r1m1-abc");
        assert!(cmd.contains("/api/matches/r1m1-abc/config"));
    }
}
