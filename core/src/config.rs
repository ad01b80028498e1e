/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_EVENT_PORT: u16 = 7600;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address of the live event channel
    pub event_addr: SocketAddr,

    /// Base URL of the REST collaborator API
    pub api_base: String,

    /// Timeout on establishing the event channel
    pub connect_timeout: Duration,

    /// Initial reconnect delay
    pub reconnect_initial: Duration,

    /// Cap on the reconnect delay
    pub reconnect_cap: Duration,

    /// Give up reconnecting after this many consecutive failures
    pub max_reconnect_attempts: u32,

    /// Surface the degraded-connectivity warning after this many
    /// consecutive failures
    pub degraded_after: u32,

    /// Typing indicator inactivity timeout
    pub typing_timeout: Duration,

    /// Keepalive read timeout on the event channel
    pub keepalive_timeout: Duration,

    /// Page size for history fetches
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_addr: format!("127.0.0.1:{}", DEFAULT_EVENT_PORT).parse().unwrap(),
            api_base: "http://127.0.0.1:7500/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect_initial: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            degraded_after: 5,
            typing_timeout: Duration::from_secs(2),
            keepalive_timeout: Duration::from_secs(30),
            history_limit: 50,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Config::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--event-addr" => {
                    let addr = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--event-addr requires an address argument".to_string())
                    })?;
                    config.event_addr = addr.parse().map_err(|_| {
                        ChatError::Config("Invalid event channel address".to_string())
                    })?;
                    i += 2;
                }
                "--api-base" => {
                    let base = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--api-base requires a URL argument".to_string())
                    })?;
                    config.api_base = base.trim_end_matches('/').to_string();
                    i += 2;
                }
                "--typing-timeout-ms" => {
                    let ms = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config(
                            "--typing-timeout-ms requires a number argument".to_string(),
                        )
                    })?;
                    let ms = ms.parse::<u64>().map_err(|_| {
                        ChatError::Config("--typing-timeout-ms must be a valid number".to_string())
                    })?;
                    config.typing_timeout = Duration::from_millis(ms);
                    i += 2;
                }
                "--max-reconnect" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--max-reconnect requires a number argument".to_string())
                    })?;
                    config.max_reconnect_attempts = n.parse::<u32>().map_err(|_| {
                        ChatError::Config("--max-reconnect must be a valid number".to_string())
                    })?;
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!(
                        "Unknown argument: {} (usage: chat [--event-addr <addr>] [--api-base <url>] [--typing-timeout-ms <ms>] [--max-reconnect <n>])",
                        other
                    )));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(addr) = std::env::var("LIFELINK_EVENT_ADDR") {
            config.event_addr = addr
                .parse()
                .map_err(|_| ChatError::Config("Invalid LIFELINK_EVENT_ADDR".to_string()))?;
        }
        if let Ok(base) = std::env::var("LIFELINK_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }

        Ok(config)
    }
}
