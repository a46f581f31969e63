//! Configuration management for the orchestrator.
//!
//! Loads, validates, and converts service configuration from a TOML file.
//! A missing file is replaced with a written-out default so operators have
//! something concrete to edit.

use matchpit_core::EngineConfig;
use matchpit_types::GameServer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn default_webhook_header() -> String {
    "X-Matchpit-Key".to_string()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_enabled() -> bool {
    true
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings
    pub http: HttpSettings,
    /// Allocation and webhook settings
    pub orchestration: OrchestrationSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Game server pool, one `[[servers]]` table per server
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Address the admin API and webhook listener bind to
    pub bind_address: String,
    /// Externally reachable base URL game servers deliver webhooks to.
    /// Must be routable from the game servers, not from us.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    /// Shared secret attached to webhook deliveries
    pub webhook_secret: String,
    /// Header name carrying the shared secret
    #[serde(default = "default_webhook_header")]
    pub webhook_header: String,
    /// Deadline in seconds for one server's command sequence
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Bounded wait in seconds before destructive operations proceed
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// One configured game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub rcon_password: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                public_base_url: "http://127.0.0.1:8080".to_string(),
            },
            orchestration: OrchestrationSettings {
                webhook_secret: "change-me".to_string(),
                webhook_header: default_webhook_header(),
                command_timeout_secs: default_command_timeout(),
                drain_timeout_secs: default_drain_timeout(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            servers: vec![ServerEntry {
                name: "local-1".to_string(),
                host: "127.0.0.1".to_string(),
                port: 27015,
                rcon_password: "change-me".to_string(),
                enabled: true,
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file. If the file doesn't exist,
    /// writes a default configuration there and returns it.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self
            .http
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!("Invalid bind address: {}", &self.http.bind_address));
        }

        if !self.http.public_base_url.starts_with("http://")
            && !self.http.public_base_url.starts_with("https://")
        {
            return Err(format!(
                "public_base_url must be an http(s) URL, got {:?}",
                &self.http.public_base_url
            ));
        }
        if self.http.public_base_url.ends_with('/') {
            return Err("public_base_url must not end with a slash".to_string());
        }

        if self.orchestration.webhook_secret.is_empty() {
            return Err("webhook_secret cannot be empty".to_string());
        }
        if self.orchestration.command_timeout_secs == 0 {
            return Err("command_timeout_secs must be at least 1".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err("server name cannot be empty".to_string());
            }
            if !names.insert(server.name.as_str()) {
                return Err(format!("duplicate server name: {}", server.name));
            }
        }

        Ok(())
    }

    /// Engine knobs derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            public_base_url: self.http.public_base_url.clone(),
            webhook_secret: self.orchestration.webhook_secret.clone(),
            webhook_header: self.orchestration.webhook_header.clone(),
            command_deadline: Duration::from_secs(self.orchestration.command_timeout_secs),
            drain_timeout: Duration::from_secs(self.orchestration.drain_timeout_secs),
        }
    }

    /// The configured server pool as fresh records, seeded into the store
    /// at startup.
    pub fn game_servers(&self) -> Vec<GameServer> {
        self.servers
            .iter()
            .map(|entry| {
                let mut server = GameServer::new(
                    entry.name.clone(),
                    entry.host.clone(),
                    entry.port,
                    entry.rcon_password.clone(),
                );
                server.enabled = entry.enabled;
                server
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::fs;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.bind_address, "127.0.0.1:8080");
        assert_eq!(config.orchestration.webhook_header, "X-Matchpit-Key");
        assert_eq!(config.orchestration.command_timeout_secs, 10);
        assert_eq!(config.servers.len(), 1);
    }

    #[tokio::test]
    async fn load_from_existing_file() {
        let toml_content = r#"
[http]
bind_address = "0.0.0.0:3000"
public_base_url = "https://pit.example.net"

[orchestration]
webhook_secret = "s3cret"
command_timeout_secs = 20

[logging]
level = "debug"
json_format = true

[[servers]]
name = "frankfurt-1"
host = "10.0.0.4"
port = 27015
rcon_password = "pw-1"

[[servers]]
name = "frankfurt-2"
host = "10.0.0.5"
port = 27015
rcon_password = "pw-2"
enabled = false
"#;
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.bind_address, "0.0.0.0:3000");
        assert_eq!(config.orchestration.webhook_secret, "s3cret");
        assert_eq!(config.orchestration.command_timeout_secs, 20);
        // Defaulted fields
        assert_eq!(config.orchestration.webhook_header, "X-Matchpit-Key");
        assert_eq!(config.orchestration.drain_timeout_secs, 5);

        let servers = config.game_servers();
        assert_eq!(servers.len(), 2);
        assert!(servers[0].enabled);
        assert!(!servers[1].enabled);
        assert_eq!(servers[1].addr(), "10.0.0.5:27015");
    }

    #[tokio::test]
    async fn missing_file_writes_a_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matchpit.toml");
        assert!(!path.exists());

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.http.bind_address, "127.0.0.1:8080");

        // The written file round-trips.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.http.public_base_url, config.http.public_base_url);
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = AppConfig::default();
        config.http.bind_address = "not-an-address".to_string();
        assert!(config.validate().unwrap_err().contains("bind address"));

        let mut config = AppConfig::default();
        config.http.public_base_url = "ftp://example".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.http.public_base_url = "http://pit.example/".to_string();
        assert!(config.validate().unwrap_err().contains("slash"));

        let mut config = AppConfig::default();
        config.orchestration.webhook_secret = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("log level"));

        let mut config = AppConfig::default();
        config.servers.push(config.servers[0].clone());
        assert!(config.validate().unwrap_err().contains("duplicate"));
    }
}
