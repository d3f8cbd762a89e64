use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "TheraSuite";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DATA_DIR_ENV: &str = "THERASUITE_DATA_DIR";
pub const BIND_ENV: &str = "THERASUITE_BIND";
pub const SESSION_TTL_ENV: &str = "THERASUITE_SESSION_TTL_SECS";

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// One working day.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;

const DATABASE_FILE: &str = "therasuite.db";

/// Get the application data directory.
/// `~/TheraSuite/` unless `THERASUITE_DATA_DIR` points elsewhere.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the database file path
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "therasuite=info,therasuite_lib=info,tower_http=warn"
}

/// HTTP server settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub session_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Invalid values fall back to the defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_bind: SocketAddr = ([127, 0, 0, 1], 8080).into();

        let bind = match lookup(BIND_ENV) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, default = DEFAULT_BIND, "Invalid bind address, using default");
                default_bind
            }),
            None => default_bind,
        };

        let session_ttl_secs = match lookup(SESSION_TTL_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(value = %raw, "Invalid session TTL, using default");
                    DEFAULT_SESSION_TTL_SECS
                }
            },
            None => DEFAULT_SESSION_TTL_SECS,
        };

        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);

        Self {
            bind,
            data_dir,
            session_ttl: Duration::from_secs(session_ttl_secs),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
