//! Player configuration

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::infrastructure::websocket::{
    BridgeConfig, ExponentialBackoff, NeverReconnect, ReconnectPolicy,
};

const DEFAULT_WS_URL: &str = "ws://localhost:8765";
const DEFAULT_OUTBOUND_BUFFER: usize = 32;

/// What the bridge does after a transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReconnectMode {
    /// Stay disconnected until the host dispatches a new connect.
    #[default]
    Off,
    /// Re-dispatch connect with exponential backoff.
    Backoff,
}

impl FromStr for ReconnectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "never" | "" => Ok(Self::Off),
            "backoff" => Ok(Self::Backoff),
            other => Err(format!("unknown reconnect mode: {other}")),
        }
    }
}

impl ReconnectMode {
    pub fn policy(self) -> Arc<dyn ReconnectPolicy> {
        match self {
            ReconnectMode::Off => Arc::new(NeverReconnect),
            ReconnectMode::Backoff => Arc::new(ExponentialBackoff::default()),
        }
    }
}

/// Player configuration loaded from environment
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Game server WebSocket endpoint
    pub ws_url: String,
    /// Join key of another player's game, when joining rather than starting one
    pub invite_key: Option<String>,
    /// Per-socket outbound queue capacity
    pub outbound_buffer: usize,
    /// Behavior after a transport failure
    pub reconnect: ReconnectMode,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            invite_key: None,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            reconnect: ReconnectMode::Off,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let ws_url = env::var("SORCERER_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        validate_ws_url(&ws_url)?;

        let invite_key = env::var("SORCERER_INVITE_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let outbound_buffer = match env::var("SORCERER_OUTBOUND_BUFFER") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .context("SORCERER_OUTBOUND_BUFFER must be a positive integer")?,
            Err(_) => DEFAULT_OUTBOUND_BUFFER,
        };
        if outbound_buffer == 0 {
            bail!("SORCERER_OUTBOUND_BUFFER must be greater than zero");
        }

        let reconnect = env::var("SORCERER_RECONNECT")
            .unwrap_or_default()
            .parse::<ReconnectMode>()
            .map_err(anyhow::Error::msg)
            .context("SORCERER_RECONNECT must be `off` or `backoff`")?;

        Ok(Self {
            ws_url,
            invite_key,
            outbound_buffer,
            reconnect,
        })
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            url: self.ws_url.clone(),
            invite_key: self.invite_key.clone(),
        }
    }
}

/// The endpoint must be a `ws://` or `wss://` URL.
pub fn validate_ws_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid WebSocket URL: {raw}"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => bail!("WebSocket URL must use ws or wss, got `{other}`"),
    }
}
