//! Vendor profile selection.
//!
//! The active vendor comes from `profiles.active`, read from an optional YAML
//! file and overridden by `ROWKIT_`-prefixed environment variables
//! (`ROWKIT_PROFILES_ACTIVE=oracle`). Without either, tests run against SQLite.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use crate::{BootstrapError, VendorTag};

pub const ENV_PREFIX: &str = "ROWKIT_";

/// Environment keys (after the prefix) that map into [`TestingConfig`].
const ENV_KEYS: [&str; 2] = ["profiles_active", "scripts_dir"];

/// Testing configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestingConfig {
    #[serde(default)]
    pub profiles: ProfilesCfg,
    #[serde(default)]
    pub scripts: ScriptsCfg,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesCfg {
    pub active: Option<VendorTag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsCfg {
    /// Directory holding `<test>-<vendor>.sql` scripts.
    pub dir: Option<PathBuf>,
}

impl TestingConfig {
    /// Figment layering an optional YAML file under the environment.
    #[must_use]
    pub fn figment(yaml: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = yaml {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .filter(|key| ENV_KEYS.iter().any(|k| key.as_str().eq_ignore_ascii_case(k)))
                .split("_"),
        )
    }

    /// Extract the configuration from `figment`.
    ///
    /// # Errors
    /// Returns `BootstrapError::Config` for malformed values or unknown vendors.
    pub fn from_figment(figment: &Figment) -> Result<Self, BootstrapError> {
        figment.extract().map_err(|e| BootstrapError::Config(Box::new(e)))
    }
}

/// The vendor selected for this test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveProfile {
    vendor: VendorTag,
}

impl Default for ActiveProfile {
    fn default() -> Self {
        Self {
            vendor: VendorTag::Sqlite,
        }
    }
}

impl ActiveProfile {
    #[must_use]
    pub fn new(vendor: VendorTag) -> Self {
        Self { vendor }
    }

    /// Resolve the profile from a configuration figment.
    ///
    /// # Errors
    /// Returns `BootstrapError::Config` if the configuration cannot be extracted.
    pub fn from_figment(figment: &Figment) -> Result<Self, BootstrapError> {
        let cfg = TestingConfig::from_figment(figment)?;
        Ok(Self::from_config(&cfg))
    }

    /// Resolve the profile from the environment alone.
    ///
    /// # Errors
    /// Returns `BootstrapError::Config` if `ROWKIT_PROFILES_ACTIVE` names no known vendor.
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_figment(&TestingConfig::figment(None))
    }

    #[must_use]
    pub fn from_config(cfg: &TestingConfig) -> Self {
        let profile = cfg.profiles.active.map(Self::new).unwrap_or_default();
        tracing::debug!(vendor = %profile.vendor, "active test profile");
        profile
    }

    #[must_use]
    pub fn vendor(&self) -> VendorTag {
        self.vendor
    }

    #[must_use]
    pub fn is_active(&self, vendor: VendorTag) -> bool {
        self.vendor == vendor
    }
}
