#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code, unused_imports)]

use std::any::Any;

use anyhow::Result;

pub const USER: &str = "rowkit";
pub const SECRET: &str = "secret";
pub const DATABASE: &str = "cars";

/// A reachable database; the container (if any) stops when this is dropped.
pub struct TestServer {
    pub url: String,
    _container: Option<Box<dyn Any + Send>>,
}

#[cfg(feature = "sqlite")]
#[must_use]
pub fn sqlite() -> TestServer {
    TestServer {
        url: "sqlite::memory:".into(),
        _container: None,
    }
}

/// # Errors
/// Fails if Docker is unavailable or the container never becomes ready.
#[cfg(feature = "pg")]
pub async fn postgres() -> Result<TestServer> {
    use testcontainers_modules::postgres::Postgres;

    let image = Postgres::default()
        .with_user(USER)
        .with_password(SECRET)
        .with_db_name(DATABASE);
    start(image.into(), 5432, "postgres").await
}

/// # Errors
/// Fails if Docker is unavailable or the container never becomes ready.
#[cfg(feature = "mysql")]
pub async fn mysql() -> Result<TestServer> {
    use testcontainers::ImageExt;
    use testcontainers_modules::mysql::Mysql;

    let image = Mysql::default()
        .with_env_var("MYSQL_ROOT_PASSWORD", SECRET)
        .with_env_var("MYSQL_USER", USER)
        .with_env_var("MYSQL_PASSWORD", SECRET)
        .with_env_var("MYSQL_DATABASE", DATABASE);
    start(image, 3306, "mysql").await
}

#[cfg(any(feature = "pg", feature = "mysql"))]
async fn start<I: testcontainers::Image + 'static>(
    request: testcontainers::ContainerRequest<I>,
    port: u16,
    scheme: &str,
) -> Result<TestServer> {
    use testcontainers::runners::AsyncRunner;

    let container = request.start().await?;
    let host = container.get_host().await?;
    let mapped = container.get_host_port_ipv4(port).await?;
    Ok(TestServer {
        url: format!("{scheme}://{USER}:{SECRET}@{host}:{mapped}/{DATABASE}"),
        _container: Some(Box::new(container)),
    })
}
