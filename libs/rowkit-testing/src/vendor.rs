use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Database vendor a test run is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorTag {
    Db2,
    Oracle,
    Postgres,
    /// In-process default profile.
    Sqlite,
}

impl VendorTag {
    pub const ALL: [VendorTag; 4] = [Self::Db2, Self::Oracle, Self::Postgres, Self::Sqlite];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Db2 => "db2",
            Self::Oracle => "oracle",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Whether `rowkit-db` can open connections to this vendor.
    #[must_use]
    pub fn has_sqlx_driver(self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }

    /// Whether schema scripts for this vendor start by dropping objects that may be missing.
    #[must_use]
    pub fn drops_before_create(self) -> bool {
        matches!(self, Self::Db2 | Self::Oracle)
    }
}

impl fmt::Display for VendorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown vendor '{0}' (expected one of: db2, oracle, postgres, sqlite)")]
pub struct UnknownVendor(pub String);

impl FromStr for VendorTag {
    type Err = UnknownVendor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVendor(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for VendorTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Oracle".parse::<VendorTag>().unwrap(), VendorTag::Oracle);
        assert_eq!(" db2 ".parse::<VendorTag>().unwrap(), VendorTag::Db2);
        assert!("h2".parse::<VendorTag>().is_err());
    }

    #[test]
    fn display_matches_serde_name() {
        for v in VendorTag::ALL {
            let json = serde_json::to_string(&v).unwrap();
            assert_eq!(json, format!("\"{v}\""));
        }
    }

    #[test]
    fn deserializes_any_case() {
        let v: VendorTag = serde_json::from_str("\"Postgres\"").unwrap();
        assert_eq!(v, VendorTag::Postgres);
        assert!(serde_json::from_str::<VendorTag>("\"h2\"").is_err());
    }
}
