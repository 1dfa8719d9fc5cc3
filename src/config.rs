//! Environment-based configuration.
//!
//! The companion runs next to the till on constrained hardware; everything
//! is a plain env var (optionally via `.env`) with a sensible default.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ServiceError;

const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// SQLite file of the uniCenta-shaped POS store.
    pub pos_db_path: PathBuf,
    /// SQLite file of the accounting ledger.
    pub ledger_db_path: PathBuf,
    /// Directory of static frontend assets.
    pub public_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let get_or = |key: &str, default: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let host = get_or("COMPANION_HOST", "0.0.0.0");
        let port: u16 = get_or("COMPANION_PORT", &DEFAULT_PORT.to_string())
            .parse()
            .map_err(|e| ServiceError::Config(format!("COMPANION_PORT: {e}")))?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| ServiceError::Config(format!("bind address: {e}")))?;

        Ok(Self {
            bind_addr,
            pos_db_path: PathBuf::from(get_or("POS_DB_PATH", "data/pos.db")),
            ledger_db_path: PathBuf::from(get_or("LEDGER_DB_PATH", "data/contabilidad.db")),
            public_dir: PathBuf::from(get_or("PUBLIC_DIR", "public")),
        })
    }
}
