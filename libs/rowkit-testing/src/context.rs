use std::path::Path;
use std::sync::Arc;

use rowkit_db::{DbConn, DbHandle, PopulateReport, ScriptPopulator, TestTransaction};

use crate::{ActiveProfile, BootstrapError, DataSourceConfiguration, TestDatabases, VendorInstance, VendorTag};

/// Everything one test needs: a populated database and an open transaction
/// that is rolled back when the test ends.
pub struct TestContext {
    instance: Arc<VendorInstance>,
    db: DbHandle,
    report: PopulateReport,
    tx: TestTransaction,
}

impl TestContext {
    /// Resolve the active vendor's instance, run `<test_name>-<vendor>.sql`
    /// from `scripts_dir` and begin the test transaction.
    ///
    /// # Errors
    /// Returns an error if the instance cannot be started, the vendor has no
    /// `sqlx` driver, the script is missing or fails, or the transaction
    /// cannot begin.
    pub async fn prepare(
        harness: &TestDatabases,
        profile: ActiveProfile,
        test_name: &str,
        scripts_dir: &Path,
    ) -> Result<Self, BootstrapError> {
        let vendor = profile.vendor();
        let instance = harness.get_or_create(vendor).await?;
        let db = instance.data_source().connect().await?;

        let cfg = DataSourceConfiguration::for_vendor(vendor);
        let script = cfg.script_path(scripts_dir, test_name);
        let populator = cfg.customize_populator(ScriptPopulator::new().add_script_file(&script)?);
        let report = {
            let mut conn = db.acquire().await?;
            populator.populate(conn.as_conn()).await?
        };
        tracing::debug!(
            test = test_name,
            vendor = %vendor,
            script = %script.display(),
            executed = report.executed,
            ignored = report.ignored,
            "test schema ready"
        );

        let tx = TestTransaction::begin(&db, test_name).await?;
        Ok(Self {
            instance,
            db,
            report,
            tx,
        })
    }

    /// Connection inside the test transaction.
    pub fn conn(&mut self) -> DbConn<'_> {
        self.tx.conn()
    }

    #[must_use]
    pub fn vendor(&self) -> VendorTag {
        self.instance.vendor()
    }

    #[must_use]
    pub fn instance(&self) -> &VendorInstance {
        &self.instance
    }

    /// Handle outside the test transaction.
    #[must_use]
    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    #[must_use]
    pub fn populate_report(&self) -> PopulateReport {
        self.report
    }

    /// Roll back everything the test wrote.
    ///
    /// # Errors
    /// Returns an error if the rollback fails.
    pub async fn finish(self) -> Result<(), BootstrapError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("vendor", &self.vendor())
            .field("report", &self.report)
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}
