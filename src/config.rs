//! Runtime configuration, read from the environment with defaults.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the sled database
    pub db_path: PathBuf,
    /// Background flush interval; `None` leaves flushing to the caller
    pub flush_every_ms: Option<u64>,
    /// Page cache size in bytes
    pub cache_capacity: u64,
    /// How many fresh order numbers to try before giving up on a collision
    pub order_number_attempts: u32,
    /// Default `tracing` filter for binaries
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tickets.db"),
            flush_every_ms: Some(500),
            cache_capacity: 64 * 1024 * 1024,
            order_number_attempts: 8,
            log_filter: "ticket_inventory=info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var("TICKETS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            flush_every_ms: match env::var("TICKETS_FLUSH_EVERY_MS") {
                // 0 disables the background flusher
                Ok(raw) => raw.parse().ok().filter(|ms| *ms > 0),
                Err(_) => defaults.flush_every_ms,
            },
            cache_capacity: env::var("TICKETS_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_capacity),
            order_number_attempts: env::var("TICKETS_ORDER_NUMBER_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.order_number_attempts),
            log_filter: env::var("TICKETS_LOG").unwrap_or(defaults.log_filter),
        }
    }

    pub fn open_db(&self) -> sled::Result<sled::Db> {
        sled::Config::new()
            .path(&self.db_path)
            .cache_capacity(self.cache_capacity)
            .flush_every_ms(self.flush_every_ms)
            .open()
    }
}
