#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `rowkit-testing`: vendor databases for integration tests.
//!
//! - [`ActiveProfile`] picks the vendor (`ROWKIT_PROFILES_ACTIVE`, default `sqlite`)
//! - [`TestDatabases`] starts one instance per vendor on first use and memoizes it;
//!   Oracle instances get their privilege grant exactly once
//! - [`TestContext`] runs the test's schema script and opens a rolled-back transaction
//!
//! # Features
//! - `containers`: DB2, Oracle and Postgres launchers backed by `testcontainers`
//!
//! # Example
//! ```rust,no_run
//! use std::path::Path;
//! use rowkit_testing::{ActiveProfile, TestContext, TestDatabases};
//!
//! # async fn demo() -> Result<(), rowkit_testing::BootstrapError> {
//! let harness = TestDatabases::with_default_launchers();
//! let profile = ActiveProfile::from_env()?;
//! let mut ctx = TestContext::prepare(&harness, profile, "car_repository", Path::new("tests/sql")).await?;
//! let _conn = ctx.conn();
//! ctx.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod configuration;
#[cfg(feature = "containers")]
pub mod containers;
pub mod context;
pub mod datasource;
pub mod error;
pub mod logging;
pub mod profile;
pub mod sqlite;
pub mod vendor;

pub use bootstrap::{
    AdminSession, GrantAllPrivileges, InstanceState, Launched, PostStartInit, TestDatabases,
    TestDatabasesBuilder, VendorInstance, VendorLauncher,
};
pub use configuration::DataSourceConfiguration;
pub use context::TestContext;
pub use datasource::DataSource;
pub use error::BootstrapError;
pub use logging::init_test_logging;
pub use profile::{ActiveProfile, TestingConfig};
pub use sqlite::SqliteLauncher;
pub use vendor::VendorTag;
