//! Advisor configuration from environment variables.

use std::env;
use std::time::Duration;

/// Engine process and search settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the engine binary.
    pub path: String,
    /// Worker thread hint passed to the engine.
    pub threads: u32,
    /// Number of ranked variations requested.
    pub multipv: u32,
    /// Engine strength setting (0-20).
    pub skill_level: u32,
    /// Depth ceiling for each search, chosen for interactive response time.
    pub search_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            threads: 2,
            multipv: 3,
            skill_level: 20,
            search_depth: 16,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    pub engine: EngineConfig,
    /// Relay endpoint, queried as `<relay_url>?game=<id>`.
    pub relay_url: String,
    /// Delay between sync fetch cycles.
    pub poll_interval: Duration,
}

impl AdvisorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            path: env::var("STOCKFISH_PATH").unwrap_or(defaults.path),
            threads: env_parse("ENGINE_THREADS", defaults.threads),
            multipv: env_parse("ENGINE_MULTIPV", defaults.multipv),
            skill_level: env_parse("ENGINE_SKILL_LEVEL", defaults.skill_level),
            search_depth: env_parse("ENGINE_SEARCH_DEPTH", defaults.search_depth),
        };

        Self {
            engine,
            relay_url: env::var("RELAY_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/lichess".to_string()),
            poll_interval: Duration::from_secs(env_parse("SYNC_POLL_SECS", 4)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
