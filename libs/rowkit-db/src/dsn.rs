//! Resolving a [`DbConnConfig`] into a DSN and a connected [`DbHandle`].
//!
//! The DSN (if any) is the base; discrete fields override its parts. `${VAR}`
//! references are expanded in the DSN, the password and parameter values.

use std::path::PathBuf;

use regex::Regex;
use url::Url;

use crate::config::{DbConnConfig, PoolCfg};
use crate::{ConnectOpts, DbEngine, DbError, DbHandle, Result};

/// Query parameters understood by `SQLx` in `SQLite` URLs.
const SQLITE_URL_PARAMS: &[&str] = &["mode", "cache", "immutable", "vfs"];

/// Connect using `cfg`, applying its pool settings.
///
/// # Errors
/// Returns a configuration error from [`resolve_dsn`] or the connection error.
pub async fn build_db_handle(cfg: &DbConnConfig) -> Result<DbHandle> {
    let dsn = resolve_dsn(cfg)?;
    let opts = cfg
        .pool
        .as_ref()
        .map_or_else(ConnectOpts::default, PoolCfg::to_connect_opts);
    tracing::info!(dsn = %redact_credentials_in_dsn(Some(&dsn)), "connecting from configuration");
    DbHandle::connect(&dsn, opts).await
}

/// Build the final DSN described by `cfg`.
///
/// # Errors
/// - `DbError::ConfigConflict` when `engine` disagrees with the DSN scheme or
///   fields do not fit the engine;
/// - `DbError::InvalidParameter` for missing or unsupported settings;
/// - `DbError::EnvVar` for unset `${VAR}` references.
pub fn resolve_dsn(cfg: &DbConnConfig) -> Result<String> {
    let base = cfg.dsn.as_deref().map(expand_env_vars).transpose()?;
    let engine = match (cfg.engine, base.as_deref()) {
        (Some(engine), Some(dsn)) => {
            let inferred = DbHandle::detect(dsn)?;
            if inferred != engine {
                return Err(DbError::ConfigConflict(format!(
                    "engine '{engine:?}' does not match DSN scheme ({inferred:?})"
                )));
            }
            engine
        }
        (Some(engine), None) => engine,
        (None, Some(dsn)) => DbHandle::detect(dsn)?,
        (None, None) => {
            return Err(DbError::InvalidParameter(
                "either 'engine' or 'dsn' must be set".to_owned(),
            ));
        }
    };

    match engine {
        DbEngine::Sqlite => sqlite_dsn(cfg, base),
        DbEngine::Postgres | DbEngine::MySql => server_dsn(cfg, engine, base.as_deref()),
    }
}

fn sqlite_dsn(cfg: &DbConnConfig, base: Option<String>) -> Result<String> {
    let server_fields = [
        ("host", cfg.host.is_some()),
        ("port", cfg.port.is_some()),
        ("user", cfg.user.is_some()),
        ("password", cfg.password.is_some()),
        ("dbname", cfg.dbname.is_some()),
    ];
    if let Some((field, _)) = server_fields.iter().find(|(_, set)| *set) {
        return Err(DbError::ConfigConflict(format!(
            "'{field}' cannot be used with SQLite"
        )));
    }

    let (mut dsn, from_path) = match (base, &cfg.path) {
        (Some(dsn), None) => (dsn, false),
        (None, Some(path)) => (format!("sqlite://{}", path.display()), true),
        (Some(_), Some(_)) => {
            return Err(DbError::ConfigConflict(
                "set either 'dsn' or 'path' for SQLite, not both".to_owned(),
            ));
        }
        (None, None) => {
            return Err(DbError::InvalidParameter(
                "SQLite needs 'dsn' or 'path'".to_owned(),
            ));
        }
    };

    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in cfg.params.iter().flatten() {
        if !SQLITE_URL_PARAMS.contains(&key.as_str()) {
            return Err(DbError::InvalidParameter(format!(
                "unsupported SQLite parameter '{key}' (allowed: {})",
                SQLITE_URL_PARAMS.join(", ")
            )));
        }
        params.push((key.clone(), expand_env_vars(value)?));
    }
    // Files named by `path` are created on first use.
    if from_path && !params.iter().any(|(k, _)| k == "mode") {
        params.push(("mode".to_owned(), "rwc".to_owned()));
    }
    params.sort();

    for (i, (key, value)) in params.iter().enumerate() {
        let sep = if i == 0 && !dsn.contains('?') { '?' } else { '&' };
        dsn.push(sep);
        dsn.push_str(key);
        dsn.push('=');
        dsn.push_str(value);
    }
    Ok(dsn)
}

fn server_dsn(cfg: &DbConnConfig, engine: DbEngine, base: Option<&str>) -> Result<String> {
    if cfg.path.is_some() {
        return Err(DbError::ConfigConflict(
            "'path' is only valid for SQLite".to_owned(),
        ));
    }
    let scheme = match engine {
        DbEngine::MySql => "mysql",
        DbEngine::Postgres | DbEngine::Sqlite => "postgres",
    };
    let mut url = match base {
        Some(dsn) => Url::parse(dsn)?,
        None => Url::parse(&format!("{scheme}://localhost"))?,
    };

    if let Some(host) = &cfg.host {
        url.set_host(Some(host))?;
    }
    if let Some(port) = cfg.port {
        url.set_port(Some(port))
            .map_err(|()| DbError::InvalidParameter(format!("cannot set port {port}")))?;
    }
    if let Some(user) = &cfg.user {
        url.set_username(user)
            .map_err(|()| DbError::InvalidParameter(format!("cannot set user '{user}'")))?;
    }
    if let Some(password) = &cfg.password {
        let password = expand_env_vars(password)?;
        url.set_password(Some(&password))
            .map_err(|()| DbError::InvalidParameter("cannot set password".to_owned()))?;
    }
    if let Some(dbname) = &cfg.dbname {
        url.set_path(&format!("/{dbname}"));
    } else if url.path().trim_start_matches('/').is_empty() {
        return Err(DbError::InvalidParameter(format!(
            "dbname is required for {engine:?} connections"
        )));
    }

    if let Some(params) = cfg.params.as_ref().filter(|p| !p.is_empty()) {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort();
        let mut pairs = url.query_pairs_mut();
        for (key, value) in sorted {
            pairs.append_pair(key, &expand_env_vars(value)?);
        }
    }
    Ok(url.to_string())
}

/// Path of the database file named by a `SQLite` DSN.
pub(crate) fn sqlite_path(dsn: &str) -> Result<PathBuf> {
    let rest = dsn
        .trim_start()
        .strip_prefix("sqlite:")
        .ok_or_else(|| DbError::InvalidParameter(format!("not a SQLite DSN: {dsn}")))?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split_once('?').map_or(rest, |(p, _)| p);
    Ok(PathBuf::from(path))
}

/// Expand `${VAR}` references from the process environment.
///
/// Text that is not a complete `${NAME}` reference is kept as is.
///
/// # Errors
/// Returns `DbError::EnvVar` if a referenced variable is not set.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| DbError::InvalidParameter(e.to_string()))?;
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        out.push_str(&std::env::var(name.as_str())?);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Replace the password in `dsn` for logging.
#[must_use]
pub fn redact_credentials_in_dsn(dsn: Option<&str>) -> String {
    let Some(dsn) = dsn else {
        return "none".to_owned();
    };
    match Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_ok() {
                url.to_string()
            } else {
                "***".to_owned()
            }
        }
        Err(_) if dsn.contains('@') => "***".to_owned(),
        _ => dsn.to_owned(),
    }
}
