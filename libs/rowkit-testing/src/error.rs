use thiserror::Error;

use crate::VendorTag;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while starting vendor instances or preparing test contexts.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("No launcher configured for vendor '{0}'")]
    NoLauncher(VendorTag),

    #[error("Failed to start {vendor} instance")]
    Launch {
        vendor: VendorTag,
        #[source]
        source: BoxError,
    },

    #[error("Post-start initialization of {vendor} failed: {message}")]
    Init { vendor: VendorTag, message: String },

    #[error("{0} instance exposes no admin session")]
    NoAdminSession(VendorTag),

    #[error("No sqlx driver for vendor '{0}'")]
    NoDriver(VendorTag),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Db(#[from] rowkit_db::DbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    #[must_use]
    pub fn launch(vendor: VendorTag, source: impl Into<BoxError>) -> Self {
        Self::Launch {
            vendor,
            source: source.into(),
        }
    }
}
