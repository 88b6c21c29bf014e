use secrecy::{ExposeSecret, SecretString};

use crate::{BootstrapError, VendorTag};

/// Connection parameters of a started vendor instance.
///
/// `url` is the vendor's native connection string (never carries the password).
/// `sqlx_dsn` is set for vendors `rowkit-db` can connect to and embeds the
/// credentials, so it is kept secret as well.
#[derive(Clone, Debug)]
pub struct DataSource {
    vendor: VendorTag,
    url: String,
    username: String,
    password: SecretString,
    sqlx_dsn: Option<SecretString>,
}

impl DataSource {
    #[must_use]
    pub fn new(
        vendor: VendorTag,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            vendor,
            url: url.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            sqlx_dsn: None,
        }
    }

    #[must_use]
    pub fn with_sqlx_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.sqlx_dsn = Some(SecretString::from(dsn.into()));
        self
    }

    #[must_use]
    pub fn vendor(&self) -> VendorTag {
        self.vendor
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// DSN accepted by [`rowkit_db::DbHandle::connect`].
    ///
    /// # Errors
    /// Returns `BootstrapError::NoDriver` for vendors without a `sqlx` driver.
    pub fn sqlx_dsn(&self) -> Result<&str, BootstrapError> {
        self.sqlx_dsn
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .ok_or(BootstrapError::NoDriver(self.vendor))
    }

    /// Open a pooled handle to this data source.
    ///
    /// # Errors
    /// Returns `BootstrapError::NoDriver` or the connection error.
    pub async fn connect(&self) -> Result<rowkit_db::DbHandle, BootstrapError> {
        let dsn = self.sqlx_dsn()?;
        let db = rowkit_db::DbHandle::connect(dsn, rowkit_db::ConnectOpts::default()).await?;
        Ok(db)
    }
}
