//! Query traits for reading ticket tables from a remote store.
//!
//! The engine issues two kinds of upstream calls: a dictionary query that
//! describes the columns of one or more tables, and a paged table query that
//! returns raw rows. Both are expressed through [`TableSource`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One row as returned by the remote store, keyed by (possibly dotted) field name.
pub type RawRecord = Map<String, Value>;

/// A single page request against a ticket table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// Source table name (e.g. `incident`).
    pub table: String,
    /// Field keys to return, dotted keys included.
    pub fields: Vec<String>,
    /// Maximum number of rows in the page.
    pub limit: usize,
    /// Number of rows to skip.
    pub offset: usize,
}

impl TableQuery {
    /// Comma separated field list as the remote API expects it.
    #[must_use]
    pub fn fields_param(&self) -> String {
        self.fields.join(",")
    }
}

/// A dictionary metadata request covering one or more table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryQuery {
    /// Table names whose columns should be described.
    pub tables: Vec<String>,
}

impl DictionaryQuery {
    /// Creates a query for `table` together with the base type it inherits columns from.
    #[must_use]
    pub fn with_base(table: &str, base: &str) -> Self {
        Self {
            tables: vec![table.to_string(), base.to_string()],
        }
    }

    /// Encoded filter in the remote query syntax, e.g. `name=incident^ORname=task`.
    #[must_use]
    pub fn encoded_filter(&self) -> String {
        self.tables
            .iter()
            .map(|t| format!("name={t}"))
            .collect::<Vec<_>>()
            .join("^OR")
    }
}

/// Errors reported by a [`TableSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request never produced a response (connection, timeout, TLS).
    #[error("Request to {url} failed: {message}")]
    Transport {
        /// Request URL
        url: String,
        /// Underlying transport failure
        message: String,
    },

    /// The remote store answered with a non-success status and no error payload.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The remote store reported an error payload (`{"error": {"message": ...}}`).
    #[error("{message}{}", detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Remote {
        /// Message reported by the remote store
        message: String,
        /// Optional detail reported by the remote store
        detail: Option<String>,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response from {url}: {message}")]
    Decode {
        /// Request URL
        url: String,
        /// Decoder failure
        message: String,
    },
}

/// Read access to a remote ticket table store.
///
/// Implementations perform exactly one upstream call per method invocation and
/// never retry; the engine treats any error as fatal for the request.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Returns the dictionary rows describing the columns of the requested tables.
    async fn query_dictionary(&self, query: &DictionaryQuery)
    -> Result<Vec<RawRecord>, SourceError>;

    /// Returns one page of rows from a table, in server order.
    async fn query_table(&self, query: &TableQuery) -> Result<Vec<RawRecord>, SourceError>;
}

#[async_trait]
impl<T> TableSource for Arc<T>
where
    T: TableSource + ?Sized,
{
    async fn query_dictionary(
        &self,
        query: &DictionaryQuery,
    ) -> Result<Vec<RawRecord>, SourceError> {
        (**self).query_dictionary(query).await
    }

    async fn query_table(&self, query: &TableQuery) -> Result<Vec<RawRecord>, SourceError> {
        (**self).query_table(query).await
    }
}

/// Describes a JSON value kind for log and error messages.
#[must_use]
pub fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
