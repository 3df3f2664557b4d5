//! Server configuration.
//!
//! Resolution order: explicit override (CLI flag) -> environment -> default.

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8787;
const DEFAULT_DB_FILE_NAME: &str = "quicknote.sqlite3";

pub const ENV_HOST: &str = "QUICKNOTE_HOST";
pub const ENV_PORT: &str = "QUICKNOTE_PORT";
pub const ENV_DB_PATH: &str = "QUICKNOTE_DB_PATH";
pub const ENV_STATIC_DIR: &str = "QUICKNOTE_STATIC_DIR";

/// Resolved settings for `quicknote serve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Directory served for non-API paths, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: default_db_path(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Builds a config from `QUICKNOTE_*` environment variables over defaults.
    ///
    /// Unparseable ports fall back to the default and are logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let port = match read(ENV_PORT) {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|err| {
                log::warn!(
                    "event=config_load module=web status=fallback key={ENV_PORT} value={raw} error={err}"
                );
                defaults.port
            }),
            None => defaults.port,
        };

        Self {
            host: read(ENV_HOST).unwrap_or(defaults.host),
            port,
            db_path: read(ENV_DB_PATH).map(PathBuf::from).unwrap_or(defaults.db_path),
            static_dir: read(ENV_STATIC_DIR).map(PathBuf::from),
        }
    }

    /// Applies explicit overrides; `None` keeps the current value.
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        db_path: Option<PathBuf>,
        static_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(db_path) = db_path {
            self.db_path = db_path;
        }
        if static_dir.is_some() {
            self.static_dir = static_dir;
        }
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| format!("invalid listen address `{}:{}`: {err}", self.host, self.port))
    }
}

/// Default database location: `<temp_dir>/quicknote.sqlite3`.
pub fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}
