//! PostGIS source adapter.

mod pool;
mod row;
mod source;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use self::pool::{PgPool, POOL_SIZE_DEFAULT};
pub use self::source::PgSource;

pub type PgResult<T> = Result<T, PgError>;

#[derive(thiserror::Error, Debug)]
pub enum PgError {
    #[error("Invalid PostGIS connection string: {0}")]
    BadDsn(#[source] tokio_postgres::Error),

    #[error("Unable to build PostGIS connection pool for [{1}]: {0}")]
    PoolBuild(#[source] deadpool_postgres::BuildError, String),

    #[error("Unable to get PostGIS connection for [{1}]: {0}")]
    PoolConn(#[source] deadpool_postgres::PoolError, String),

    #[error("PostGIS query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("PostGIS query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Layer must configure exactly one of 'table' and 'tableExpression'")]
    AmbiguousRelation,

    #[error("Unable to decode geometry column '{0}': {1}")]
    BadGeometry(String, String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgConfig {
    /// `key=value` connection string, e.g. `host=db user=tilery dbname=gis`.
    pub dsn: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Relation to read from. Exactly one of `table`/`tableExpression`.
    #[serde(default)]
    pub table: Option<String>,
    /// Raw sub-select standing in for a table.
    #[serde(default)]
    pub table_expression: Option<String>,
    /// Geometry column, selected as WKB.
    pub geometry_field: String,
    /// `{property name → SQL expression}` projected onto features.
    #[serde(default)]
    pub source_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub pool_size: Option<usize>,
}
