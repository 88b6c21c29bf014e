//! Docker-backed vendor launchers.
//!
//! Containers are started through `testcontainers` and stay up for as long as
//! the memoized [`crate::VendorInstance`] holds them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use testcontainers::core::{ExecCommand, IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt};
use testcontainers_modules::postgres::Postgres;

use crate::{AdminSession, BootstrapError, DataSource, Launched, VendorLauncher, VendorTag};

const DB2_IMAGE: (&str, &str) = ("ibmcom/db2", "11.5.7.0a");
const DB2_PORT: u16 = 50_000;
const ORACLE_IMAGE: (&str, &str) = ("gvenzl/oracle-xe", "21.3.0-slim");
const ORACLE_PORT: u16 = 1521;
const POSTGRES_PORT: u16 = 5432;

/// Credentials and database name used for a launched container.
#[derive(Clone, Debug)]
pub struct ContainerCredentials {
    pub username: String,
    pub password: SecretString,
    pub database: String,
}

impl ContainerCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            database: database.into(),
        }
    }
}

async fn host_and_port<I: testcontainers::Image>(
    vendor: VendorTag,
    container: &ContainerAsync<I>,
    port: u16,
) -> Result<(String, u16), BootstrapError> {
    let host = container
        .get_host()
        .await
        .map_err(|e| BootstrapError::launch(vendor, e))?;
    let port = container
        .get_host_port_ipv4(port)
        .await
        .map_err(|e| BootstrapError::launch(vendor, e))?;
    Ok((host.to_string(), port))
}

/// IBM DB2 community edition.
#[derive(Clone, Debug)]
pub struct Db2Launcher {
    pub credentials: ContainerCredentials,
    pub startup_timeout: Duration,
}

impl Default for Db2Launcher {
    fn default() -> Self {
        Self {
            credentials: ContainerCredentials::new("db2inst1", "foobar1234", "test"),
            startup_timeout: Duration::from_secs(600),
        }
    }
}

#[async_trait]
impl VendorLauncher for Db2Launcher {
    fn vendor(&self) -> VendorTag {
        VendorTag::Db2
    }

    async fn launch(&self) -> Result<Launched, BootstrapError> {
        let creds = &self.credentials;
        tracing::info!(image = DB2_IMAGE.0, tag = DB2_IMAGE.1, "DB2 starting");
        let container = GenericImage::new(DB2_IMAGE.0, DB2_IMAGE.1)
            .with_exposed_port(DB2_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Setup has completed"))
            .with_env_var("LICENSE", "accept")
            .with_env_var("DB2INSTANCE", creds.username.as_str())
            .with_env_var("DB2INST1_PASSWORD", creds.password.expose_secret())
            .with_env_var("DBNAME", creds.database.as_str())
            .with_env_var("ARCHIVE_LOGS", "false")
            .with_env_var("AUTOCONFIG", "false")
            .with_privileged(true)
            .with_startup_timeout(self.startup_timeout)
            .start()
            .await
            .map_err(|e| BootstrapError::launch(VendorTag::Db2, e))?;

        let (host, port) = host_and_port(VendorTag::Db2, &container, DB2_PORT).await?;
        let data_source = DataSource::new(
            VendorTag::Db2,
            format!("db2://{host}:{port}/{}", creds.database),
            creds.username.as_str(),
            creds.password.expose_secret(),
        );
        Ok(Launched::new(data_source).with_guard(container))
    }
}

/// Oracle Database XE.
///
/// The instance exposes an admin session running SQL as `SYSTEM` through
/// `sqlplus` inside the container.
#[derive(Clone, Debug)]
pub struct OracleLauncher {
    pub credentials: ContainerCredentials,
    pub startup_timeout: Duration,
}

impl Default for OracleLauncher {
    fn default() -> Self {
        Self {
            credentials: ContainerCredentials::new("test", "test", "xepdb1"),
            startup_timeout: Duration::from_secs(600),
        }
    }
}

#[async_trait]
impl VendorLauncher for OracleLauncher {
    fn vendor(&self) -> VendorTag {
        VendorTag::Oracle
    }

    async fn launch(&self) -> Result<Launched, BootstrapError> {
        let creds = &self.credentials;
        tracing::info!(image = ORACLE_IMAGE.0, tag = ORACLE_IMAGE.1, "Oracle starting");
        let container = GenericImage::new(ORACLE_IMAGE.0, ORACLE_IMAGE.1)
            .with_exposed_port(ORACLE_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("DATABASE IS READY TO USE!"))
            .with_env_var("ORACLE_PASSWORD", creds.password.expose_secret())
            .with_env_var("APP_USER", creds.username.as_str())
            .with_env_var("APP_USER_PASSWORD", creds.password.expose_secret())
            .with_startup_timeout(self.startup_timeout)
            .start()
            .await
            .map_err(|e| BootstrapError::launch(VendorTag::Oracle, e))?;
        let container = Arc::new(container);

        let (host, port) = host_and_port(VendorTag::Oracle, &*container, ORACLE_PORT).await?;
        let data_source = DataSource::new(
            VendorTag::Oracle,
            format!("//{host}:{port}/{}", creds.database),
            creds.username.as_str(),
            creds.password.expose_secret(),
        );
        let admin = SqlPlusSession {
            container: Arc::clone(&container),
            password: creds.password.clone(),
            service: creds.database.clone(),
        };
        Ok(Launched::new(data_source).with_admin(admin).with_guard(container))
    }
}

/// Runs statements as `SYSTEM` with `sqlplus` inside the Oracle container.
struct SqlPlusSession {
    container: Arc<ContainerAsync<GenericImage>>,
    password: SecretString,
    service: String,
}

#[async_trait]
impl AdminSession for SqlPlusSession {
    async fn execute(&self, sql: &str) -> Result<(), BootstrapError> {
        let script = format!(
            "sqlplus -s -L system/{password}@//localhost:{ORACLE_PORT}/{service} <<'EOF'\nWHENEVER SQLERROR EXIT FAILURE\n{sql};\nEXIT\nEOF\n",
            password = self.password.expose_secret(),
            service = self.service,
        );
        let init_err = |message: String| BootstrapError::Init {
            vendor: VendorTag::Oracle,
            message,
        };

        let mut result = self
            .container
            .exec(ExecCommand::new(["sh", "-c", script.as_str()]))
            .await
            .map_err(|e| init_err(e.to_string()))?;
        let output = result
            .stdout_to_vec()
            .await
            .map_err(|e| init_err(e.to_string()))?;
        match result.exit_code().await.map_err(|e| init_err(e.to_string()))? {
            Some(0) | None => {
                tracing::debug!(statement = %sql, "admin statement executed");
                Ok(())
            }
            Some(code) => Err(init_err(format!(
                "sqlplus exited with {code}: {}",
                String::from_utf8_lossy(&output).trim()
            ))),
        }
    }
}

/// `PostgreSQL` through the `testcontainers-modules` image.
#[derive(Clone, Debug)]
pub struct PostgresLauncher {
    pub credentials: ContainerCredentials,
}

impl Default for PostgresLauncher {
    fn default() -> Self {
        Self {
            credentials: ContainerCredentials::new("test", "test", "test"),
        }
    }
}

#[async_trait]
impl VendorLauncher for PostgresLauncher {
    fn vendor(&self) -> VendorTag {
        VendorTag::Postgres
    }

    async fn launch(&self) -> Result<Launched, BootstrapError> {
        let creds = &self.credentials;
        tracing::info!("Postgres starting");
        let container = ContainerRequest::from(Postgres::default())
            .with_env_var("POSTGRES_USER", creds.username.as_str())
            .with_env_var("POSTGRES_PASSWORD", creds.password.expose_secret())
            .with_env_var("POSTGRES_DB", creds.database.as_str())
            .start()
            .await
            .map_err(|e| BootstrapError::launch(VendorTag::Postgres, e))?;

        let (host, port) = host_and_port(VendorTag::Postgres, &container, POSTGRES_PORT).await?;
        let password = creds.password.expose_secret();
        let data_source = DataSource::new(
            VendorTag::Postgres,
            format!("postgresql://{host}:{port}/{}", creds.database),
            creds.username.as_str(),
            password,
        )
        .with_sqlx_dsn(format!(
            "postgres://{}:{password}@{host}:{port}/{}",
            creds.username, creds.database
        ));
        Ok(Launched::new(data_source).with_guard(container))
    }
}
