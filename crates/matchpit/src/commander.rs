//! RCON-backed implementation of the core's command dispatcher seam.

use async_trait::async_trait;
use matchpit_core::{DispatchError, ServerCommander};
use matchpit_rcon::{RconClient, RconError};
use matchpit_types::GameServer;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sends command sequences to game servers over Source RCON. One fresh
/// connection per sequence; the deadline covers connect, auth, and every
/// command round trip together.
pub struct RconCommander;

impl RconCommander {
    fn map_error(e: RconError) -> DispatchError {
        match e {
            RconError::AuthFailed => DispatchError::Auth,
            RconError::Timeout(d) => DispatchError::Timeout(d),
            RconError::Io(e) => DispatchError::Unreachable(e.to_string()),
            RconError::Protocol(msg) => DispatchError::Unreachable(msg),
        }
    }
}

#[async_trait]
impl ServerCommander for RconCommander {
    async fn run(
        &self,
        server: &GameServer,
        commands: &[String],
        deadline: Duration,
    ) -> Result<Vec<String>, DispatchError> {
        let started = Instant::now();
        let remaining = |started: Instant| -> Result<Duration, DispatchError> {
            deadline
                .checked_sub(started.elapsed())
                .filter(|d| !d.is_zero())
                .ok_or(DispatchError::Timeout(deadline))
        };

        let mut client =
            RconClient::connect(&server.addr(), &server.rcon_password, remaining(started)?)
                .await
                .map_err(Self::map_error)?;

        let mut outputs = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let budget = remaining(started).map_err(|_| DispatchError::Partial {
                index,
                completed: index,
                reason: format!("deadline of {deadline:?} exhausted"),
            })?;
            match client.exec(command, budget).await {
                Ok(output) => outputs.push(output),
                Err(e) if index == 0 => return Err(Self::map_error(e)),
                Err(e) => {
                    return Err(DispatchError::Partial {
                        index,
                        completed: index,
                        reason: e.to_string(),
                    })
                }
            }
        }
        debug!(server = %server.name, commands = commands.len(), "command sequence completed");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_fails_within_the_deadline() {
        // Nothing listens on this port.
        let server = GameServer::new("ghost", "127.0.0.1", 1, "pw");
        let commander = RconCommander;
        let started = Instant::now();
        let result = commander
            .run(
                &server,
                &["status".to_string()],
                Duration::from_millis(300),
            )
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
