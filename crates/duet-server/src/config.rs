use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Relay settings, read from the environment (a `.env` file is honoured).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Ping interval for dead-connection detection.
    pub heartbeat: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("DUET_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("DUET_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("DUET_PORT must be a port number")?;
        let heartbeat_secs: u64 = lookup("DUET_HEARTBEAT_SECS")
            .unwrap_or_else(|| "15".into())
            .parse()
            .context("DUET_HEARTBEAT_SECS must be a whole number of seconds")?;
        anyhow::ensure!(heartbeat_secs > 0, "DUET_HEARTBEAT_SECS must be positive");

        Ok(Self {
            host,
            port,
            heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
