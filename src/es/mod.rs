//! Elasticsearch source adapter, speaking the index's vector-tile search
//! endpoint.

mod source;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use self::source::EsSource;

pub type EsResult<T> = Result<T, EsError>;

#[derive(thiserror::Error, Debug)]
pub enum EsError {
    #[error("Elasticsearch request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Elasticsearch returned {0} for {1}")]
    UnexpectedStatus(reqwest::StatusCode, String),

    #[error("Layer requires at least one Elasticsearch host")]
    NoHostsConfigured,

    #[error("Unable to decode vector-tile search response: {0}")]
    BadTile(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsConfig {
    /// Cluster base URLs, tried in order.
    pub hosts: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub index: String,
    /// Document field holding the feature geometry.
    pub geometry_field: String,
    /// `{property name → document field path}` projected onto features.
    #[serde(default)]
    pub source_fields: BTreeMap<String, String>,
}
