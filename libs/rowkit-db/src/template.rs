//! Runs SQL against a [`DbConn`] and hands the result to a materializer.
//!
//! Strategy lookup happens before the statement is sent, so an unknown
//! materializer key fails without touching the database and surfaces as
//! [`DbError::Materialize`], never as [`DbError::Sqlx`].

use std::sync::Arc;

use rowkit::{
    Materialized, Materializer, MaterializerKey, MaterializerRegistry, QueryMappingConfiguration,
    QueryMethod, RowCursor, Value,
};
use serde_json::value::RawValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::types::Json;
use sqlx::{Database, Encode, Type};

use crate::decode::{DecodeRow, SqlxCursor};
use crate::named::{NamedParameterSql, Params};
use crate::{DbConn, DbError, Result};

type SqlQuery<'q, DB> = sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Query runner bound to a materializer registry and mapping configuration.
#[derive(Clone, Debug, Default)]
pub struct QueryTemplate {
    registry: Arc<MaterializerRegistry>,
    mapping: Arc<QueryMappingConfiguration>,
}

impl QueryTemplate {
    #[must_use]
    pub fn new(registry: Arc<MaterializerRegistry>) -> Self {
        Self {
            registry,
            mapping: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: Arc<QueryMappingConfiguration>) -> Self {
        self.mapping = mapping;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &MaterializerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn mapping(&self) -> &QueryMappingConfiguration {
        &self.mapping
    }

    /// Run `sql` and materialize the result with `materializer`.
    ///
    /// # Errors
    /// `DbError::MissingParameter`/`DbError::Bind` for bad parameters,
    /// `DbError::Sqlx` if the statement fails, `DbError::Materialize` if the
    /// strategy fails.
    pub async fn query<T>(
        &self,
        conn: DbConn<'_>,
        sql: &str,
        params: &Params,
        materializer: &Materializer<T>,
    ) -> Result<Materialized<T>> {
        let engine = conn.engine();
        let named = NamedParameterSql::parse(sql);
        let rendered = named.to_sql(engine.dialect());
        let values = named.bind_values(params)?;
        tracing::debug!(
            engine = ?engine,
            sql = %rendered,
            params = values.len(),
            shape = ?materializer.shape(),
            "running query"
        );

        match conn {
            #[cfg(feature = "pg")]
            DbConn::Postgres(c) => {
                let rows = bind_all(sqlx::query(&rendered), values)?.fetch_all(c).await?;
                materialize(materializer, rows)
            }
            #[cfg(feature = "mysql")]
            DbConn::MySql(c) => {
                let rows = bind_all(sqlx::query(&rendered), values)?.fetch_all(c).await?;
                materialize(materializer, rows)
            }
            #[cfg(feature = "sqlite")]
            DbConn::Sqlite(c) => {
                let rows = bind_all(sqlx::query(&rendered), values)?.fetch_all(c).await?;
                materialize(materializer, rows)
            }
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            DbConn::_Phantom(_) => Err(DbError::FeatureDisabled("no database backends enabled")),
        }
    }

    /// Run `sql` with the strategy registered under `key`.
    ///
    /// # Errors
    /// As [`Self::query`]; an unknown key is `DbError::Materialize`.
    pub async fn query_with<T: 'static>(
        &self,
        conn: DbConn<'_>,
        sql: &str,
        params: &Params,
        key: &MaterializerKey,
    ) -> Result<Materialized<T>> {
        let materializer = self.registry.resolve::<T>(key)?;
        self.query(conn, sql, params, &materializer).await
    }

    /// Run a query method returning a list of `E`.
    ///
    /// The method's result extractor wins over its row mapper, which wins
    /// over the default mapper configured for `E`.
    ///
    /// # Errors
    /// As [`Self::query`]; `DbError::Materialize` if no strategy applies.
    pub async fn query_for_list<E: Send + Sync + 'static>(
        &self,
        conn: DbConn<'_>,
        method: &QueryMethod,
        params: &Params,
    ) -> Result<Vec<E>> {
        let materializer = self.mapping.resolve_list::<E>(method, &self.registry)?;
        Ok(self
            .query(conn, method.sql(), params, &materializer)
            .await?
            .into_single()?)
    }

    /// Run a query method whose whole result is one `T`.
    ///
    /// The method's result extractor wins over its row mapper; with a row
    /// mapper the first row is returned.
    ///
    /// # Errors
    /// As [`Self::query`]; `DbError::Materialize` with `EmptyResult` when a
    /// row mapper sees no rows.
    pub async fn query_for_object<T: 'static>(
        &self,
        conn: DbConn<'_>,
        method: &QueryMethod,
        params: &Params,
    ) -> Result<T> {
        let materializer = self.mapping.resolve_extractor::<T>(method, &self.registry)?;
        Ok(self
            .query(conn, method.sql(), params, &materializer)
            .await?
            .into_single()?)
    }

    /// Run a statement that returns no rows; yields the affected row count.
    ///
    /// # Errors
    /// `DbError::Sqlx` if the statement fails, or a parameter error.
    pub async fn execute(&self, conn: DbConn<'_>, sql: &str, params: &Params) -> Result<u64> {
        let engine = conn.engine();
        let named = NamedParameterSql::parse(sql);
        let rendered = named.to_sql(engine.dialect());
        let values = named.bind_values(params)?;
        tracing::debug!(engine = ?engine, sql = %rendered, params = values.len(), "executing statement");

        let affected = match conn {
            #[cfg(feature = "pg")]
            DbConn::Postgres(c) => bind_all(sqlx::query(&rendered), values)?
                .execute(c)
                .await?
                .rows_affected(),
            #[cfg(feature = "mysql")]
            DbConn::MySql(c) => bind_all(sqlx::query(&rendered), values)?
                .execute(c)
                .await?
                .rows_affected(),
            #[cfg(feature = "sqlite")]
            DbConn::Sqlite(c) => bind_all(sqlx::query(&rendered), values)?
                .execute(c)
                .await?
                .rows_affected(),
            #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
            DbConn::_Phantom(_) => 0,
        };
        Ok(affected)
    }
}

fn materialize<T, R: DecodeRow>(materializer: &Materializer<T>, rows: Vec<R>) -> Result<Materialized<T>> {
    let mut cursor = SqlxCursor::new(rows);
    let out = materializer.materialize(&mut cursor as &mut dyn RowCursor)?;
    tracing::debug!(rows = cursor.position(), produced = out.len(), "materialized");
    Ok(out)
}

fn bind_all<'q, DB>(mut query: SqlQuery<'q, DB>, values: Vec<Value>) -> Result<SqlQuery<'q, DB>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Json<Box<RawValue>>: Encode<'q, DB> + Type<DB>,
    JsonText: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match value {
            // Untyped NULL: bound as a nullable text parameter.
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(b),
            Value::Int(n) => query.bind(n),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Typed(t) if t.is_json() => match t.value() {
                Some(text) => {
                    let raw = RawValue::from_string(text.to_owned())
                        .map_err(|e| DbError::Bind(format!("{}: {e}", t.type_name())))?;
                    if t.type_name().eq_ignore_ascii_case("jsonb") {
                        query.bind(Json(raw))
                    } else {
                        query.bind(JsonText(raw.get().to_owned()))
                    }
                }
                None => query.bind(None::<String>),
            },
            Value::Typed(t) => query.bind(t.value().map(str::to_owned)),
        };
    }
    Ok(query)
}

/// JSON text bound with the `json` type, so Postgres stores it as written
/// instead of normalizing it the way `jsonb` does.
struct JsonText(String);

#[cfg(feature = "pg")]
impl Type<sqlx::Postgres> for JsonText {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("json")
    }
}

#[cfg(feature = "pg")]
impl<'q> Encode<'q, sqlx::Postgres> for JsonText {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        <String as Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(feature = "mysql")]
impl Type<sqlx::MySql> for JsonText {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }
}

#[cfg(feature = "mysql")]
impl<'q> Encode<'q, sqlx::MySql> for JsonText {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::MySql as Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        <String as Encode<'q, sqlx::MySql>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(feature = "sqlite")]
impl Type<sqlx::Sqlite> for JsonText {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

#[cfg(feature = "sqlite")]
impl<'q> Encode<'q, sqlx::Sqlite> for JsonText {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        <String as Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.0, buf)
    }
}
