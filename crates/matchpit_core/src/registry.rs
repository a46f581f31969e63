//! The server registry: pool listing, occupancy claims, and liveness probes.

use crate::dispatch::{commands, ServerCommander};
use crate::repo::Repository;
use futures::future::join_all;
use matchpit_types::{GameServer, MatchId, ServerId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deadline for a liveness probe; deliberately shorter than load commands.
const PROBE_DEADLINE: Duration = Duration::from_secs(3);

pub struct ServerRegistry {
    repo: Arc<dyn Repository>,
    commander: Arc<dyn ServerCommander>,
}

impl ServerRegistry {
    pub fn new(repo: Arc<dyn Repository>, commander: Arc<dyn ServerCommander>) -> Self {
        Self { repo, commander }
    }

    pub async fn list(&self) -> Vec<GameServer> {
        self.repo.servers().await
    }

    /// Enabled, unoccupied servers in stable name order. Allocation relies
    /// on this order for deterministic pairing.
    pub async fn available(&self) -> Vec<GameServer> {
        self.repo
            .servers()
            .await
            .into_iter()
            .filter(|s| s.is_available())
            .collect()
    }

    /// Atomically claim a server for a match. See [`Repository::claim_server`].
    pub async fn claim(&self, id: ServerId, match_id: MatchId) -> bool {
        let claimed = self.repo.claim_server(id, match_id).await;
        if claimed {
            debug!(server = %id, match_id = %match_id, "server claimed");
        }
        claimed
    }

    pub async fn release(&self, id: ServerId) {
        self.repo.release_server(id).await;
        debug!(server = %id, "server released");
    }

    /// Probe every configured server concurrently and record its observed
    /// online status. Probe failures only flip the status; they never error.
    pub async fn probe_all(&self) {
        let servers = self.repo.servers().await;
        let probes = servers.into_iter().map(|server| {
            let repo = Arc::clone(&self.repo);
            let commander = Arc::clone(&self.commander);
            async move {
                let result = commander
                    .run(&server, &[commands::probe()], PROBE_DEADLINE)
                    .await;
                let online = result.is_ok();
                if let Err(e) = result {
                    warn!(server = %server.name, error = %e, "probe failed");
                }
                repo.set_server_online(server.id, online).await;
            }
        });
        join_all(probes).await;
    }
}
