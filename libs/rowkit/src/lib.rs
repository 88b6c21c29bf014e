#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `rowkit`: pluggable result materialization.
//!
//! This crate has no database driver dependency. It defines:
//! - the row/value model and the forward-only [`RowCursor`];
//! - materialization strategies ([`ResultExtractor`], [`RowMapper`]) and the
//!   immutable [`MaterializerRegistry`] that resolves them by name or type;
//! - the [`ComponentHub`] used to inject collaborators into strategies;
//! - [`QueryMappingConfiguration`] and [`QueryMethod`] for default mappers and
//!   extractor/row-mapper precedence;
//! - [`CustomConversions`] for vendor-typed columns such as JSON.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use rowkit::{ComponentHub, MaterializerRegistry, Materialized, Row, VecCursor, row_mapper_fn};
//!
//! let mut builder = MaterializerRegistry::builder(Arc::new(ComponentHub::new()));
//! builder
//!     .register_row_mapper("upper", row_mapper_fn(|row: &Row, _| Ok(row.get::<String>(0)?.to_uppercase())))
//!     .unwrap();
//! let registry = builder.build();
//!
//! let mut cursor = VecCursor::with_names(&["s"], vec![vec!["abc".into()]]);
//! let out = registry.resolve_named::<String>("upper").unwrap().materialize(&mut cursor).unwrap();
//! assert_eq!(out, Materialized::Rows(vec!["ABC".to_owned()]));
//! ```

pub mod convert;
pub mod cursor;
pub mod error;
pub mod hub;
pub mod mapping;
pub mod materializer;
pub mod registry;
pub mod value;

pub use convert::{
    ConversionError, CustomConversions, JsonHolder, JsonHolderReader, JsonHolderWriter,
    ReadingConverter, WritingConverter,
};
pub use cursor::{Column, CursorError, Row, RowCursor, VecCursor};
pub use error::{MaterializeError, Result};
pub use hub::{ComponentHub, FromComponents, HubError, TypeKey};
pub use mapping::{QueryMappingConfiguration, QueryMethod};
pub use materializer::{
    Materialized, Materializer, ResultExtractor, RowMapper, RowMapperExtractor, Shape,
    SingleColumnMapper, extractor_fn, row_mapper_fn,
};
pub use registry::{MaterializerKey, MaterializerRegistry, MaterializerRegistryBuilder, Registration};
pub use value::{FromValue, TypedValue, Value};
