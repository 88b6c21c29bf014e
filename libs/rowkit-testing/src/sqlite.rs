use async_trait::async_trait;

use crate::{BootstrapError, DataSource, Launched, VendorLauncher, VendorTag};

const FILE_NAME: &str = "rowkit-test.db";

/// File-backed SQLite database in a temporary directory.
///
/// The directory is the instance guard: it is removed when the last handle
/// to the instance is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteLauncher;

#[async_trait]
impl VendorLauncher for SqliteLauncher {
    fn vendor(&self) -> VendorTag {
        VendorTag::Sqlite
    }

    async fn launch(&self) -> Result<Launched, BootstrapError> {
        let dir = tempfile::Builder::new()
            .prefix("rowkit-sqlite-")
            .tempdir()
            .map_err(|e| BootstrapError::launch(VendorTag::Sqlite, e))?;
        let path = dir.path().join(FILE_NAME);
        let url = format!("sqlite://{}", path.display());
        tracing::debug!(path = %path.display(), "sqlite test database");

        let data_source = DataSource::new(VendorTag::Sqlite, &url, "", "")
            .with_sqlx_dsn(format!("{url}?mode=rwc"));
        Ok(Launched::new(data_source).with_guard(dir))
    }
}
