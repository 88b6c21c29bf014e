//! Lazily started, memoized vendor instances.
//!
//! [`TestDatabases`] is the harness-owned handle: build it once per test
//! process (usually behind a `LazyLock<Arc<_>>` in the test crate) and pass it
//! by reference. Each vendor slot moves `Unstarted -> Starting -> Ready`; a
//! failed start returns the error and leaves the slot `Unstarted`, so the next
//! call launches again. Concurrent callers for one vendor share a single launch.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{BootstrapError, DataSource, VendorTag};

/// Lifecycle of one vendor slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Unstarted,
    Starting,
    Ready,
}

/// Privileged session on a started instance, used for post-start initialization.
#[async_trait]
pub trait AdminSession: Send + Sync {
    /// Run one administrative statement.
    ///
    /// # Errors
    /// Returns `BootstrapError::Init` if the statement fails.
    async fn execute(&self, sql: &str) -> Result<(), BootstrapError>;
}

/// Output of a [`VendorLauncher`].
pub struct Launched {
    pub data_source: DataSource,
    pub admin: Option<Box<dyn AdminSession>>,
    /// Keeps the instance alive (container handle, temp dir, ...).
    pub guard: Option<Box<dyn Any + Send + Sync>>,
}

impl Launched {
    #[must_use]
    pub fn new(data_source: DataSource) -> Self {
        Self {
            data_source,
            admin: None,
            guard: None,
        }
    }

    #[must_use]
    pub fn with_admin(mut self, admin: impl AdminSession + 'static) -> Self {
        self.admin = Some(Box::new(admin));
        self
    }

    #[must_use]
    pub fn with_guard(mut self, guard: impl Any + Send + Sync) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }
}

/// Starts a database instance for one vendor.
#[async_trait]
pub trait VendorLauncher: Send + Sync {
    fn vendor(&self) -> VendorTag;

    /// Start the instance and wait until it accepts connections.
    ///
    /// # Errors
    /// Returns `BootstrapError::Launch` if the instance does not come up.
    async fn launch(&self) -> Result<Launched, BootstrapError>;
}

/// Vendor-specific setup that runs once on a freshly started instance.
#[async_trait]
pub trait PostStartInit: Send + Sync {
    /// # Errors
    /// Returns `BootstrapError::Init` (or `NoAdminSession`) if setup fails.
    async fn init(&self, instance: &VendorInstance) -> Result<(), BootstrapError>;
}

/// Grants every privilege to the application user through the admin session.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrantAllPrivileges;

#[async_trait]
impl PostStartInit for GrantAllPrivileges {
    async fn init(&self, instance: &VendorInstance) -> Result<(), BootstrapError> {
        let admin = instance
            .admin()
            .ok_or(BootstrapError::NoAdminSession(instance.vendor()))?;
        let user = instance.data_source().username();
        admin
            .execute(&format!("GRANT ALL PRIVILEGES TO {user}"))
            .await
    }
}

/// A started vendor database, alive as long as any `Arc` to it is.
pub struct VendorInstance {
    data_source: DataSource,
    admin: Option<Box<dyn AdminSession>>,
    _guard: Option<Box<dyn Any + Send + Sync>>,
}

impl VendorInstance {
    fn from_launched(launched: Launched) -> Self {
        Self {
            data_source: launched.data_source,
            admin: launched.admin,
            _guard: launched.guard,
        }
    }

    #[must_use]
    pub fn vendor(&self) -> VendorTag {
        self.data_source.vendor()
    }

    #[must_use]
    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    #[must_use]
    pub fn admin(&self) -> Option<&dyn AdminSession> {
        self.admin.as_deref()
    }
}

impl fmt::Debug for VendorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorInstance")
            .field("data_source", &self.data_source)
            .field("admin", &self.admin.is_some())
            .finish_non_exhaustive()
    }
}

struct Slot {
    launcher: Arc<dyn VendorLauncher>,
    init: Option<Arc<dyn PostStartInit>>,
    instance: OnceCell<Arc<VendorInstance>>,
    starting: AtomicBool,
}

/// Resets the `starting` flag even if the launch future is dropped midway.
struct StartingGuard<'a>(&'a AtomicBool);

impl<'a> StartingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Harness handle memoizing at most one instance per vendor.
pub struct TestDatabases {
    slots: HashMap<VendorTag, Slot>,
}

impl TestDatabases {
    #[must_use]
    pub fn builder() -> TestDatabasesBuilder {
        TestDatabasesBuilder::default()
    }

    /// Harness with every launcher this build provides.
    ///
    /// SQLite is always available; DB2, Oracle (with privilege grant) and
    /// Postgres need the `containers` feature.
    #[must_use]
    pub fn with_default_launchers() -> Arc<Self> {
        let builder = Self::builder().launcher(crate::SqliteLauncher);
        #[cfg(feature = "containers")]
        let builder = builder
            .launcher(crate::containers::Db2Launcher::default())
            .launcher(crate::containers::OracleLauncher::default())
            .post_start_init(VendorTag::Oracle, GrantAllPrivileges)
            .launcher(crate::containers::PostgresLauncher::default());
        builder.build()
    }

    /// Return the vendor's instance, starting it on first use.
    ///
    /// # Errors
    /// Returns `BootstrapError::NoLauncher` for an unconfigured vendor, or the
    /// launch/initialization error. The slot stays `Unstarted` after an error.
    pub async fn get_or_create(&self, vendor: VendorTag) -> Result<Arc<VendorInstance>, BootstrapError> {
        let slot = self
            .slots
            .get(&vendor)
            .ok_or(BootstrapError::NoLauncher(vendor))?;

        if let Some(instance) = slot.instance.get() {
            tracing::debug!(vendor = %vendor, "reusing vendor instance");
            return Ok(Arc::clone(instance));
        }

        let instance = slot
            .instance
            .get_or_try_init(|| async {
                let _starting = StartingGuard::enter(&slot.starting);
                start(slot).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(instance))
    }

    #[must_use]
    pub fn state(&self, vendor: VendorTag) -> InstanceState {
        match self.slots.get(&vendor) {
            Some(slot) if slot.instance.initialized() => InstanceState::Ready,
            Some(slot) if slot.starting.load(Ordering::Acquire) => InstanceState::Starting,
            _ => InstanceState::Unstarted,
        }
    }

    #[must_use]
    pub fn vendors(&self) -> Vec<VendorTag> {
        let mut vendors: Vec<_> = self.slots.keys().copied().collect();
        vendors.sort_by_key(|v| v.as_str());
        vendors
    }
}

impl fmt::Debug for TestDatabases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<_> = self
            .vendors()
            .into_iter()
            .map(|v| (v, self.state(v)))
            .collect();
        f.debug_struct("TestDatabases")
            .field("slots", &states)
            .finish()
    }
}

async fn start(slot: &Slot) -> Result<VendorInstance, BootstrapError> {
    let vendor = slot.launcher.vendor();
    tracing::info!(vendor = %vendor, "starting vendor instance");
    let instance = VendorInstance::from_launched(slot.launcher.launch().await?);
    tracing::info!(vendor = %vendor, url = %instance.data_source().url(), "vendor instance started");

    if let Some(init) = &slot.init {
        init.init(&instance).await?;
        tracing::info!(vendor = %vendor, "post-start initialization done");
    }
    Ok(instance)
}

/// Builder for [`TestDatabases`].
#[derive(Default)]
pub struct TestDatabasesBuilder {
    launchers: HashMap<VendorTag, Arc<dyn VendorLauncher>>,
    inits: HashMap<VendorTag, Arc<dyn PostStartInit>>,
}

impl TestDatabasesBuilder {
    /// Register a launcher, replacing any previous one for the same vendor.
    #[must_use]
    pub fn launcher(mut self, launcher: impl VendorLauncher + 'static) -> Self {
        self.launchers.insert(launcher.vendor(), Arc::new(launcher));
        self
    }

    #[must_use]
    pub fn shared_launcher(mut self, launcher: Arc<dyn VendorLauncher>) -> Self {
        self.launchers.insert(launcher.vendor(), launcher);
        self
    }

    #[must_use]
    pub fn post_start_init(mut self, vendor: VendorTag, init: impl PostStartInit + 'static) -> Self {
        self.inits.insert(vendor, Arc::new(init));
        self
    }

    #[must_use]
    pub fn shared_post_start_init(mut self, vendor: VendorTag, init: Arc<dyn PostStartInit>) -> Self {
        self.inits.insert(vendor, init);
        self
    }

    #[must_use]
    pub fn build(mut self) -> Arc<TestDatabases> {
        let slots = self
            .launchers
            .into_iter()
            .map(|(vendor, launcher)| {
                let slot = Slot {
                    launcher,
                    init: self.inits.remove(&vendor),
                    instance: OnceCell::new(),
                    starting: AtomicBool::new(false),
                };
                (vendor, slot)
            })
            .collect();
        Arc::new(TestDatabases { slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Launcher that counts launches and can be told to fail.
    #[derive(Default)]
    struct FakeLauncher {
        launches: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Option<Duration>,
    }

    struct RecordingAdmin(Arc<parking_lot::Mutex<Vec<String>>>);

    #[async_trait]
    impl AdminSession for RecordingAdmin {
        async fn execute(&self, sql: &str) -> Result<(), BootstrapError> {
            self.0.lock().push(sql.to_owned());
            Ok(())
        }
    }

    struct OracleFake {
        inner: FakeLauncher,
        statements: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl VendorLauncher for Arc<FakeLauncher> {
        fn vendor(&self) -> VendorTag {
            VendorTag::Postgres
        }

        async fn launch(&self) -> Result<Launched, BootstrapError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BootstrapError::Launch {
                    vendor: VendorTag::Postgres,
                    source: "container exited".into(),
                });
            }
            Ok(Launched::new(DataSource::new(
                VendorTag::Postgres,
                "postgresql://localhost:5432/test",
                "test",
                "test",
            )))
        }
    }

    #[async_trait]
    impl VendorLauncher for OracleFake {
        fn vendor(&self) -> VendorTag {
            VendorTag::Oracle
        }

        async fn launch(&self) -> Result<Launched, BootstrapError> {
            self.inner.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Launched::new(DataSource::new(
                VendorTag::Oracle,
                "oracle:thin:@localhost:1521/xepdb1",
                "test",
                "test",
            ))
            .with_admin(RecordingAdmin(Arc::clone(&self.statements))))
        }
    }

    #[tokio::test]
    async fn second_call_returns_identical_instance() {
        let launcher = Arc::new(FakeLauncher::default());
        let dbs = TestDatabases::builder().launcher(Arc::clone(&launcher)).build();
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Unstarted);

        let first = dbs.get_or_create(VendorTag::Postgres).await.unwrap();
        let second = dbs.get_or_create(VendorTag::Postgres).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Ready);
    }

    #[tokio::test]
    async fn oracle_grant_runs_once() {
        let statements = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let dbs = TestDatabases::builder()
            .launcher(OracleFake {
                inner: FakeLauncher::default(),
                statements: Arc::clone(&statements),
            })
            .post_start_init(VendorTag::Oracle, GrantAllPrivileges)
            .build();

        dbs.get_or_create(VendorTag::Oracle).await.unwrap();
        dbs.get_or_create(VendorTag::Oracle).await.unwrap();

        assert_eq!(*statements.lock(), ["GRANT ALL PRIVILEGES TO test"]);
    }

    #[tokio::test]
    async fn grant_without_admin_session_fails() {
        let launcher = Arc::new(FakeLauncher::default());
        let dbs = TestDatabases::builder()
            .launcher(launcher)
            .post_start_init(VendorTag::Postgres, GrantAllPrivileges)
            .build();

        let err = dbs.get_or_create(VendorTag::Postgres).await.unwrap_err();
        assert!(matches!(err, BootstrapError::NoAdminSession(VendorTag::Postgres)));
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Unstarted);
    }

    #[tokio::test]
    async fn failed_launch_leaves_slot_unstarted_and_retries() {
        let launcher = Arc::new(FakeLauncher {
            failures_left: AtomicUsize::new(1),
            ..FakeLauncher::default()
        });
        let dbs = TestDatabases::builder().launcher(Arc::clone(&launcher)).build();

        let err = dbs.get_or_create(VendorTag::Postgres).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Launch { vendor: VendorTag::Postgres, .. }));
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Unstarted);

        dbs.get_or_create(VendorTag::Postgres).await.unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_launch() {
        let launcher = Arc::new(FakeLauncher {
            delay: Some(Duration::from_millis(50)),
            ..FakeLauncher::default()
        });
        let dbs = TestDatabases::builder().launcher(Arc::clone(&launcher)).build();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dbs = Arc::clone(&dbs);
                tokio::spawn(async move { dbs.get_or_create(VendorTag::Postgres).await })
            })
            .collect();
        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.unwrap().unwrap());
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_is_starting_while_launching() {
        let launcher = Arc::new(FakeLauncher {
            delay: Some(Duration::from_millis(200)),
            ..FakeLauncher::default()
        });
        let dbs = TestDatabases::builder().launcher(launcher).build();

        let background = {
            let dbs = Arc::clone(&dbs);
            tokio::spawn(async move { dbs.get_or_create(VendorTag::Postgres).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Starting);

        background.await.unwrap().unwrap();
        assert_eq!(dbs.state(VendorTag::Postgres), InstanceState::Ready);
    }

    #[tokio::test]
    async fn unknown_vendor_has_no_launcher() {
        let dbs = TestDatabases::builder().build();
        assert!(matches!(
            dbs.get_or_create(VendorTag::Db2).await,
            Err(BootstrapError::NoLauncher(VendorTag::Db2))
        ));
    }
}
