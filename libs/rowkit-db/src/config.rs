//! Serde models for database connection configuration.
//!
//! A connection is described either by a `dsn` or by discrete fields
//! (`engine`, `host`, `port`, ...). Fields override the matching DSN parts.
//! Passwords and DSNs may reference environment variables as `${VAR}`.
//!
//! ```yaml
//! database:
//!   engine: postgres
//!   host: localhost
//!   port: 5432
//!   user: test
//!   password: ${PG_PASSWORD}
//!   dbname: test
//!   pool:
//!     max_conns: 4
//!     acquire_timeout: 5s
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::{ConnectOpts, DbEngine, DbError, Result};

/// One database connection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbConnConfig {
    #[serde(default)]
    pub engine: Option<DbEngine>,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub dbname: Option<String>,
    /// `SQLite` database file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Extra URL query parameters (`sslmode`, `SQLite` `mode`, ...).
    #[serde(default)]
    pub params: Option<HashMap<String, String>>,
    #[serde(default)]
    pub pool: Option<PoolCfg>,
}

impl DbConnConfig {
    /// Extract the section at `key` (usually `"database"`).
    ///
    /// # Errors
    /// Returns `DbError::Config` if the section is missing or malformed.
    pub fn from_figment(figment: &Figment, key: &str) -> Result<Self> {
        figment
            .extract_inner::<Self>(key)
            .map_err(|e| DbError::Config(Box::new(e)))
    }
}

/// Pool knobs; unset values keep the [`ConnectOpts`] defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolCfg {
    #[serde(default)]
    pub max_conns: Option<u32>,
    #[serde(default)]
    pub min_conns: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    #[serde(default)]
    pub test_before_acquire: Option<bool>,
}

impl PoolCfg {
    #[must_use]
    pub fn to_connect_opts(&self) -> ConnectOpts {
        let defaults = ConnectOpts::default();
        ConnectOpts {
            max_conns: self.max_conns.or(defaults.max_conns),
            min_conns: self.min_conns.or(defaults.min_conns),
            acquire_timeout: self.acquire_timeout.or(defaults.acquire_timeout),
            idle_timeout: self.idle_timeout.or(defaults.idle_timeout),
            max_lifetime: self.max_lifetime.or(defaults.max_lifetime),
            test_before_acquire: self
                .test_before_acquire
                .unwrap_or(defaults.test_before_acquire),
            create_sqlite_dirs: defaults.create_sqlite_dirs,
        }
    }
}
