use crate::cursor::CursorError;
use crate::hub::{HubError, TypeKey};
use crate::registry::MaterializerKey;

/// Errors raised while resolving or running a materialization strategy.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("no materializer registered under {0}")]
    NotFound(MaterializerKey),

    #[error("materializer {key} produces {registered}, requested {requested}")]
    TypeMismatch {
        key: MaterializerKey,
        registered: TypeKey,
        requested: TypeKey,
    },

    #[error("materializer {0} is already registered")]
    DuplicateKey(MaterializerKey),

    #[error("no materialization strategy for query returning {0}")]
    NoStrategy(TypeKey),

    #[error("query method references extractor {0}, which yields the whole result, not rows")]
    ExtractorReferenced(MaterializerKey),

    #[error("extractor expected at least one row")]
    EmptyResult,

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Component(#[from] HubError),

    #[error("materializer failed: {0}")]
    Strategy(#[source] anyhow::Error),
}

/// Library-local result type.
pub type Result<T> = std::result::Result<T, MaterializeError>;
