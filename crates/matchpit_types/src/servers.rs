//! Game server records.

use crate::{MatchId, ServerId};
use serde::{Deserialize, Serialize};

/// A configured remote game server.
///
/// `enabled` is admin-controlled; `online` is a probed observation and never
/// authoritative. `current_match` is the soft occupancy marker the allocation
/// engine claims atomically to prevent double allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServer {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing, default)]
    pub rcon_password: String,
    pub enabled: bool,
    pub online: bool,
    pub current_match: Option<MatchId>,
}

impl GameServer {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        rcon_password: impl Into<String>,
    ) -> Self {
        Self {
            id: ServerId::new(),
            name: name.into(),
            host: host.into(),
            port,
            rcon_password: rcon_password.into(),
            enabled: true,
            online: false,
            current_match: None,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.current_match.is_none()
    }
}
