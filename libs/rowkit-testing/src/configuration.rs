use std::path::{Path, PathBuf};

use rowkit_db::ScriptPopulator;

use crate::VendorTag;

/// Per-vendor knobs applied when schema scripts are run for a test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSourceConfiguration {
    vendor: VendorTag,
    ignore_failed_drops: bool,
}

impl DataSourceConfiguration {
    /// Defaults for `vendor`: DB2 and Oracle scripts drop objects that may not exist yet.
    #[must_use]
    pub fn for_vendor(vendor: VendorTag) -> Self {
        Self {
            vendor,
            ignore_failed_drops: vendor.drops_before_create(),
        }
    }

    #[must_use]
    pub fn with_ignore_failed_drops(mut self, ignore: bool) -> Self {
        self.ignore_failed_drops = ignore;
        self
    }

    #[must_use]
    pub fn vendor(&self) -> VendorTag {
        self.vendor
    }

    #[must_use]
    pub fn ignores_failed_drops(&self) -> bool {
        self.ignore_failed_drops
    }

    /// Apply the vendor's populator settings.
    #[must_use]
    pub fn customize_populator(&self, populator: ScriptPopulator) -> ScriptPopulator {
        populator.ignore_failed_drops(self.ignore_failed_drops)
    }

    /// `<dir>/<test_name>-<vendor>.sql`
    #[must_use]
    pub fn script_path(&self, dir: &Path, test_name: &str) -> PathBuf {
        dir.join(format!("{test_name}-{}.sql", self.vendor))
    }
}
