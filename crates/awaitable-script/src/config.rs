//! Runtime switches, read once from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::sync::OnceLock;

pub const COALESCE_WAITS_ENV: &str = "AWAITABLE_COALESCE_WAITS";
pub const SPAWN_ENV: &str = "AWAITABLE_SPAWN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Reuse one explicit wait per await binding instead of one per member
    /// access.
    pub coalesce_waits: bool,
    /// Start producers on worker threads when awaits are created.
    pub spawn_awaits: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            coalesce_waits: flag(COALESCE_WAITS_ENV),
            spawn_awaits: flag(SPAWN_ENV),
        }
    }

    /// Process-wide configuration, resolved on first use.
    pub fn global() -> Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        *GLOBAL.get_or_init(|| {
            let config = Config::from_env();
            log::debug!("config: {config:?}");
            config
        })
    }

    pub fn with_coalesce_waits(mut self, enabled: bool) -> Self {
        self.coalesce_waits = enabled;
        self
    }

    pub fn with_spawn_awaits(mut self, enabled: bool) -> Self {
        self.spawn_awaits = enabled;
        self
    }
}

fn flag(name: &str) -> bool {
    env::var(name).map(|raw| parse_bool(&raw)).unwrap_or(false)
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
