#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `rowkit-db`: the `SQLx` side of rowkit.
//!
//! This crate connects to `SQLite`, `PostgreSQL` and `MySQL` through `SQLx` and
//! feeds query results into the driver-independent [`rowkit`] materializers.
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable `SQLx` backends (`sqlite` is on by default)
//!
//! # Building blocks
//! - [`DbHandle`]: one pool per engine, transactions, pooled connections
//! - [`NamedParameterSql`]: `:name` parameters rewritten per [`Dialect`]
//! - [`QueryTemplate`]: runs SQL and hands the cursor to a [`rowkit::Materializer`]
//! - [`ScriptPopulator`]: runs SQL scripts, optionally tolerating failed drops
//! - [`TestTransaction`]: a transaction that is always rolled back
//!
//! # Example
//! ```rust,no_run
//! use rowkit::{Materializer, SingleColumnMapper};
//! use rowkit_db::{ConnectOpts, DbHandle, Params, QueryTemplate};
//! use std::sync::Arc;
//!
//! # async fn demo() -> rowkit_db::Result<()> {
//! let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//! let template = QueryTemplate::default();
//! let mut conn = db.acquire().await?;
//!
//! template.execute(conn.as_conn(), "CREATE TABLE car (model TEXT)", &Params::new()).await?;
//! let models = template
//!     .query(
//!         conn.as_conn(),
//!         "SELECT model FROM car WHERE model <> :skip",
//!         &Params::new().bind("skip", "none"),
//!         &Materializer::MapRows(Arc::new(SingleColumnMapper::<String>::new())),
//!     )
//!     .await?
//!     .into_rows();
//! assert!(models.is_empty());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes,
        clippy::unused_async,
    )
)]

pub mod config;
pub mod dialect;
pub mod dsn;
pub mod named;
pub mod populator;
pub mod template;
pub mod tx;

mod decode;

pub use config::{DbConnConfig, PoolCfg};
pub use dialect::Dialect;
pub use dsn::{build_db_handle, expand_env_vars, redact_credentials_in_dsn, resolve_dsn};
pub use named::{NamedParameterSql, Params};
pub use populator::{PopulateReport, ScriptPopulator, split_statements};
pub use template::QueryTemplate;
pub use tx::TestTransaction;

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "mysql")]
use sqlx::{MySql, MySqlConnection, MySqlPool};
#[cfg(feature = "pg")]
use sqlx::{PgConnection, PgPool, Postgres};
#[cfg(feature = "sqlite")]
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Errors raised while connecting, binding, populating or materializing.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("unsupported DSN scheme: {0}")]
    UnknownDsn(String),

    #[error("backend not compiled in: {0}")]
    FeatureDisabled(&'static str),

    #[error("conflicting connection settings: {0}")]
    ConfigConflict(String),

    #[error("bad connection setting: {0}")]
    InvalidParameter(String),

    #[error("no value bound for ':{0}'")]
    MissingParameter(String),

    #[error("cannot bind parameter: {0}")]
    Bind(String),

    #[error("script statement #{index} failed: {statement}")]
    Script {
        index: usize,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("environment variable: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("malformed DSN: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Materialize(#[from] rowkit::MaterializeError),

    #[error(transparent)]
    Conversion(#[from] rowkit::ConversionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Database engines with a `SQLx` driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    #[must_use]
    pub fn dialect(self) -> Dialect {
        Dialect::for_engine(self)
    }
}

/// Pool settings passed to [`DbHandle::connect`].
///
/// `None` timeouts mean "never"; `None` connection counts keep the `SQLx`
/// defaults.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    pub acquire_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    /// Ping each connection when it leaves the pool.
    pub test_before_acquire: bool,
    /// Create missing parent directories of a `SQLite` database file.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
            create_sqlite_dirs: true,
        }
    }
}

impl ConnectOpts {
    /// Options for an in-memory `SQLite` database: every pooled connection
    /// would otherwise open its own empty database, so the pool keeps exactly
    /// one connection alive forever.
    #[must_use]
    pub fn pinned_memory(mut self) -> Self {
        self.max_conns = Some(1);
        self.min_conns = Some(1);
        self.idle_timeout = None;
        self.max_lifetime = None;
        self
    }

    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    fn pool_options<DB: sqlx::Database>(&self) -> sqlx::pool::PoolOptions<DB> {
        let mut builder = sqlx::pool::PoolOptions::<DB>::new()
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(self.test_before_acquire);
        if let Some(max) = self.max_conns {
            builder = builder.max_connections(max);
        }
        if let Some(min) = self.min_conns {
            builder = builder.min_connections(min);
        }
        if let Some(timeout) = self.acquire_timeout {
            builder = builder.acquire_timeout(timeout);
        }
        builder
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
pub enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Borrowed connection, either pooled or inside a transaction.
///
/// Every query path in this crate runs through one of these, so the same
/// template or populator works with and without a transaction.
pub enum DbConn<'a> {
    #[cfg(feature = "pg")]
    Postgres(&'a mut PgConnection),
    #[cfg(feature = "mysql")]
    MySql(&'a mut MySqlConnection),
    #[cfg(feature = "sqlite")]
    Sqlite(&'a mut SqliteConnection),
    #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
    _Phantom(std::marker::PhantomData<&'a mut ()>),
}

impl DbConn<'_> {
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        match self {
            #[cfg(feature = "pg")]
            DbConn::Postgres(_) => DbEngine::Postgres,
            #[cfg(feature = "mysql")]
            DbConn::MySql(_) => DbEngine::MySql,
            #[cfg(feature = "sqlite")]
            DbConn::Sqlite(_) => DbEngine::Sqlite,
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            DbConn::_Phantom(_) => unreachable!("no database backends enabled"),
        }
    }

    /// Run SQL text as-is, without parameters or statement preparation.
    ///
    /// # Errors
    /// Returns the driver error for a failing statement.
    pub async fn execute_raw(&mut self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
        match self {
            #[cfg(feature = "pg")]
            DbConn::Postgres(c) => Ok(sqlx::raw_sql(sql).execute(&mut **c).await?.rows_affected()),
            #[cfg(feature = "mysql")]
            DbConn::MySql(c) => Ok(sqlx::raw_sql(sql).execute(&mut **c).await?.rows_affected()),
            #[cfg(feature = "sqlite")]
            DbConn::Sqlite(c) => Ok(sqlx::raw_sql(sql).execute(&mut **c).await?.rows_affected()),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            DbConn::_Phantom(_) => Ok(0),
        }
    }

    /// Reborrow for a shorter lifetime, so one connection can serve several calls.
    pub fn reborrow(&mut self) -> DbConn<'_> {
        match self {
            #[cfg(feature = "pg")]
            DbConn::Postgres(c) => DbConn::Postgres(&mut **c),
            #[cfg(feature = "mysql")]
            DbConn::MySql(c) => DbConn::MySql(&mut **c),
            #[cfg(feature = "sqlite")]
            DbConn::Sqlite(c) => DbConn::Sqlite(&mut **c),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            DbConn::_Phantom(_) => DbConn::_Phantom(std::marker::PhantomData),
        }
    }
}

/// A connection checked out of the pool; returned to it on drop.
pub enum PooledConn {
    #[cfg(feature = "pg")]
    Postgres(sqlx::pool::PoolConnection<Postgres>),
    #[cfg(feature = "mysql")]
    MySql(sqlx::pool::PoolConnection<MySql>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::pool::PoolConnection<Sqlite>),
}

impl PooledConn {
    pub fn as_conn(&mut self) -> DbConn<'_> {
        match self {
            #[cfg(feature = "pg")]
            PooledConn::Postgres(c) => DbConn::Postgres(&mut **c),
            #[cfg(feature = "mysql")]
            PooledConn::MySql(c) => DbConn::MySql(&mut **c),
            #[cfg(feature = "sqlite")]
            PooledConn::Sqlite(c) => DbConn::Sqlite(&mut **c),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => unreachable!("no database backends enabled"),
        }
    }
}

/// An open transaction. Dropping it without [`commit`](Self::commit) rolls back.
pub enum DbTransaction {
    #[cfg(feature = "pg")]
    Postgres(sqlx::Transaction<'static, Postgres>),
    #[cfg(feature = "mysql")]
    MySql(sqlx::Transaction<'static, MySql>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn as_conn(&mut self) -> DbConn<'_> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => DbConn::Postgres(&mut **tx),
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => DbConn::MySql(&mut **tx),
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => DbConn::Sqlite(&mut **tx),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => unreachable!("no database backends enabled"),
        }
    }

    /// # Errors
    /// Returns the driver error from `COMMIT`.
    pub async fn commit(self) -> Result<()> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(Into::into),
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => tx.commit().await.map_err(Into::into),
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => tx.commit().await.map_err(Into::into),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => Ok(()),
        }
    }

    /// # Errors
    /// Returns the driver error from `ROLLBACK`.
    pub async fn rollback(self) -> Result<()> {
        match self {
            #[cfg(feature = "pg")]
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(Into::into),
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(Into::into),
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => tx.rollback().await.map_err(Into::into),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => Ok(()),
        }
    }
}

/// Pooled access to one database.
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
}

impl DbHandle {
    /// Engine named by the DSN scheme. Leading whitespace is ignored.
    ///
    /// # Errors
    /// `DbError::UnknownDsn` for any scheme other than `postgres`,
    /// `postgresql`, `mysql` or `sqlite`.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let scheme = dsn.trim_start().split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(DbEngine::Postgres),
            "mysql" => Ok(DbEngine::MySql),
            "sqlite" => Ok(DbEngine::Sqlite),
            _ => Err(DbError::UnknownDsn(dsn.to_owned())),
        }
    }

    /// Open a pool for `dsn`.
    ///
    /// In-memory `SQLite` DSNs get a single pinned connection; file DSNs get
    /// their parent directory created when `opts.create_sqlite_dirs` is set.
    ///
    /// # Errors
    /// `DbError::UnknownDsn`, `DbError::FeatureDisabled` when the backend is
    /// not compiled in, or the driver error from the first connection.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        tracing::debug!(
            dsn = %redact_credentials_in_dsn(Some(dsn)),
            engine = ?engine,
            "opening pool"
        );
        let pool = match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => DbPool::Postgres(opts.pool_options().connect(dsn).await?),
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => return Err(DbError::FeatureDisabled("pg")),
            #[cfg(feature = "mysql")]
            DbEngine::MySql => DbPool::MySql(opts.pool_options().connect(dsn).await?),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(DbError::FeatureDisabled("mysql")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let opts = if is_memory_dsn(dsn) {
                    opts.pinned_memory()
                } else {
                    if opts.create_sqlite_dirs {
                        create_sqlite_parent(dsn)?;
                    }
                    opts
                };
                DbPool::Sqlite(opts.pool_options().connect(dsn).await?)
            }
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => return Err(DbError::FeatureDisabled("sqlite")),
        };
        Ok(Self {
            engine,
            pool,
            dsn: dsn.to_owned(),
        })
    }

    /// Close every pooled connection and wait for checked-out ones to return.
    pub async fn close(self) {
        match self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "mysql")]
            DbPool::MySql(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// The DSN as given, credentials included. Log it through
    /// [`redact_credentials_in_dsn`].
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[cfg(feature = "pg")]
    #[must_use]
    pub fn sqlx_postgres(&self) -> Option<&PgPool> {
        match self.pool {
            DbPool::Postgres(ref p) => Some(p),
            #[cfg(any(feature = "mysql", feature = "sqlite"))]
            _ => None,
        }
    }
    #[cfg(feature = "mysql")]
    #[must_use]
    pub fn sqlx_mysql(&self) -> Option<&MySqlPool> {
        match self.pool {
            DbPool::MySql(ref p) => Some(p),
            #[cfg(any(feature = "pg", feature = "sqlite"))]
            _ => None,
        }
    }
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlx_sqlite(&self) -> Option<&SqlitePool> {
        match self.pool {
            DbPool::Sqlite(ref p) => Some(p),
            #[cfg(any(feature = "pg", feature = "mysql"))]
            _ => None,
        }
    }

    /// Check a connection out of the pool.
    ///
    /// # Errors
    /// Returns an error if no connection becomes available in time.
    pub async fn acquire(&self) -> Result<PooledConn> {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => Ok(PooledConn::Postgres(pool.acquire().await?)),
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => Ok(PooledConn::MySql(pool.acquire().await?)),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => Ok(PooledConn::Sqlite(pool.acquire().await?)),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => Err(DbError::FeatureDisabled("no database backends enabled")),
        }
    }

    /// Start a transaction on a freshly acquired connection.
    ///
    /// # Errors
    /// Returns the driver error if no connection is available or `BEGIN` fails.
    pub async fn begin(&self) -> Result<DbTransaction> {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => Ok(DbTransaction::Postgres(pool.begin().await?)),
            #[cfg(feature = "mysql")]
            DbPool::MySql(pool) => Ok(DbTransaction::MySql(pool.begin().await?)),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => Ok(DbTransaction::Sqlite(pool.begin().await?)),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            _ => Err(DbError::FeatureDisabled("no database backends enabled")),
        }
    }
}

/// `true` for DSNs that open a private in-memory `SQLite` database.
#[must_use]
pub fn is_memory_dsn(dsn: &str) -> bool {
    let s = dsn.trim_start();
    s.starts_with("sqlite::memory:") || s.contains("mode=memory")
}

#[cfg(feature = "sqlite")]
fn create_sqlite_parent(dsn: &str) -> Result<()> {
    let path = dsn::sqlite_path(dsn)?;
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn engine_follows_scheme() {
        let cases = [
            ("sqlite::memory:", DbEngine::Sqlite),
            ("  sqlite:///var/lib/app.db", DbEngine::Sqlite),
            ("postgresql://localhost/app", DbEngine::Postgres),
            ("postgres://localhost/app", DbEngine::Postgres),
            ("mysql://localhost/app", DbEngine::MySql),
        ];
        for (dsn, engine) in cases {
            assert_eq!(DbHandle::detect(dsn).unwrap(), engine, "{dsn}");
        }
        assert!(matches!(
            DbHandle::detect("oracle://localhost:1521/xepdb1"),
            Err(DbError::UnknownDsn(_))
        ));
    }

    #[test]
    fn memory_dsns_are_recognized() {
        assert!(is_memory_dsn("sqlite::memory:"));
        assert!(is_memory_dsn("sqlite:file:memdb1?mode=memory&cache=shared"));
        assert!(!is_memory_dsn("sqlite:///tmp/x.db"));
    }

    #[test]
    fn pinned_memory_keeps_one_connection() {
        let opts = ConnectOpts::default().pinned_memory();
        assert_eq!((opts.min_conns, opts.max_conns), (Some(1), Some(1)));
        assert!(opts.idle_timeout.is_none());
        assert!(opts.max_lifetime.is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn memory_database_outlives_checkouts() -> Result<()> {
        let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
        assert_eq!(db.engine(), DbEngine::Sqlite);
        {
            let mut conn = db.acquire().await?;
            conn.as_conn().execute_raw("CREATE TABLE t (id INTEGER)").await?;
        }
        let mut tx = db.begin().await?;
        tx.as_conn().execute_raw("INSERT INTO t VALUES (1)").await?;
        tx.commit().await?;

        let pool = db.sqlx_sqlite().ok_or(DbError::FeatureDisabled("sqlite"))?;
        let (n,): (i64,) = sqlx::query_as("SELECT count(*) FROM t").fetch_one(pool).await?;
        assert_eq!(n, 1);
        db.close().await;
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn file_database_gets_parent_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a").join("b").join("app.db");
        let dsn = format!("sqlite://{}?mode=rwc", file.display());
        let db = DbHandle::connect(&dsn, ConnectOpts::default()).await?;
        assert!(file.exists());
        assert_eq!(db.dsn(), dsn);
        Ok(())
    }
}
