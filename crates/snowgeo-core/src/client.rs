//! HTTP client for the ServiceNow Table API.
//!
//! Dictionary queries go to `api/now/table/sys_dictionary` with an encoded
//! `sysparm_query` filter; table pages go to `api/now/table/<table>` with
//! `sysparm_limit`, `sysparm_offset` and `sysparm_fields`. Each call is a
//! single authenticated GET; failures are reported, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client as HttpClient;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use snowgeo_core_common::{
    DictionaryQuery, RawRecord, SourceError, TableQuery, TableSource, describe_value,
};
use url::Url;

use crate::config::ClientSettings;
use crate::error::{ConfigError, Result};

/// Table holding column metadata.
pub const DICTIONARY_TABLE: &str = "sys_dictionary";

const TABLE_API_PATH: &str = "api/now/table/";
const DEFAULT_ERROR_MESSAGE: &str = "Error querying table.";
const MAX_ERROR_BODY: usize = 512;

/// ServiceNow Table API client.
#[derive(Debug, Clone)]
pub struct ServiceNowClient {
    http_client: Arc<HttpClient>,
    base_url: Url,
    username: String,
    password: String,
}

impl ServiceNowClient {
    /// Builds a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        info!("Connecting to ServiceNow instance at {}", settings.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("snowgeo/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidOption {
                option: "url".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client: Arc::new(http_client),
            base_url: normalize_base(settings.base_url),
            username: settings.username,
            password: settings.password,
        })
    }

    /// Instance base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the dictionary query for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the URL cannot be built.
    pub fn dictionary_url(&self, query: &DictionaryQuery) -> std::result::Result<Url, SourceError> {
        let mut url = self.table_url(DICTIONARY_TABLE)?;
        url.query_pairs_mut()
            .append_pair("sysparm_query", &query.encoded_filter());
        Ok(url)
    }

    /// URL of one page request.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the URL cannot be built.
    pub fn page_url(&self, query: &TableQuery) -> std::result::Result<Url, SourceError> {
        let mut url = self.table_url(&query.table)?;
        url.query_pairs_mut()
            .append_pair("sysparm_limit", &query.limit.to_string())
            .append_pair("sysparm_offset", &query.offset.to_string())
            .append_pair("sysparm_fields", &query.fields_param());
        Ok(url)
    }

    fn table_url(&self, table: &str) -> std::result::Result<Url, SourceError> {
        self.base_url
            .join(TABLE_API_PATH)
            .and_then(|api| api.join(table))
            .map_err(|e| SourceError::Transport {
                url: self.base_url.to_string(),
                message: e.to_string(),
            })
    }

    async fn get(&self, url: Url) -> std::result::Result<Vec<RawRecord>, SourceError> {
        debug!("GET {url}");
        let response = self
            .http_client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        parse_response(url.as_str(), status, &body).inspect_err(|e| {
            error!("Error querying ServiceNow table {url}: {e}");
        })
    }
}

#[async_trait]
impl TableSource for ServiceNowClient {
    async fn query_dictionary(
        &self,
        query: &DictionaryQuery,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        let url = self.dictionary_url(query)?;
        self.get(url).await
    }

    async fn query_table(
        &self,
        query: &TableQuery,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        let url = self.page_url(query)?;
        self.get(url).await
    }
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Interprets a Table API response body.
///
/// An `error` object wins over the status code; its `message` defaults to
/// `"Error querying table."`. Otherwise a non-success status is an error, and
/// a success body yields its `result` array (empty when absent).
///
/// # Errors
///
/// Returns [`SourceError`] for error payloads, non-success statuses, and
/// undecodable bodies.
pub fn parse_response(
    url: &str,
    status: u16,
    body: &str,
) -> std::result::Result<Vec<RawRecord>, SourceError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(error) = parsed.as_ref().and_then(|v| v.get("error"))
        && !error.is_null()
    {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
            .to_string();
        let detail = error
            .get("detail")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        return Err(SourceError::Remote { message, detail });
    }

    if !(200..300).contains(&status) {
        return Err(SourceError::Status {
            url: url.to_string(),
            status,
            body: truncate(body, MAX_ERROR_BODY),
        });
    }

    let Some(value) = parsed else {
        return Err(SourceError::Decode {
            url: url.to_string(),
            message: "response body is not JSON".to_string(),
        });
    };

    match value.get("result") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| {
                row.as_object().cloned().ok_or_else(|| SourceError::Decode {
                    url: url.to_string(),
                    message: format!("expected an object row, got {}", describe_value(row)),
                })
            })
            .collect(),
        Some(other) => Err(SourceError::Decode {
            url: url.to_string(),
            message: format!("expected a result array, got {}", describe_value(other)),
        }),
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(base: &str) -> ServiceNowClient {
        ServiceNowClient::new(ClientSettings {
            base_url: Url::parse(base).unwrap(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        assert_eq!(
            client("https://example.service-now.com").base_url().as_str(),
            "https://example.service-now.com/"
        );
        assert_eq!(
            client("https://example.com/sn?x=1").base_url().as_str(),
            "https://example.com/sn/"
        );
    }

    #[test]
    fn test_dictionary_url() {
        let url = client("https://example.service-now.com/")
            .dictionary_url(&DictionaryQuery::with_base("incident", "task"))
            .unwrap();
        assert_eq!(url.path(), "/api/now/table/sys_dictionary");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![(
            "sysparm_query".to_string(),
            "name=incident^ORname=task".to_string()
        )]);
    }

    #[test]
    fn test_page_url() {
        let url = client("https://example.service-now.com/base")
            .page_url(&TableQuery {
                table: "sc_request".to_string(),
                fields: vec!["sys_id".to_string(), "location.latitude".to_string()],
                limit: 100,
                offset: 200,
            })
            .unwrap();
        assert_eq!(url.path(), "/base/api/now/table/sc_request");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![
            ("sysparm_limit".to_string(), "100".to_string()),
            ("sysparm_offset".to_string(), "200".to_string()),
            (
                "sysparm_fields".to_string(),
                "sys_id,location.latitude".to_string()
            ),
        ]);
    }

    #[test]
    fn test_parse_result_rows() {
        let rows = parse_response(
            "u",
            200,
            r#"{"result": [{"sys_id": "a"}, {"sys_id": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["sys_id"], "b");

        assert!(parse_response("u", 200, "{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_payload() {
        let err = parse_response(
            "u",
            400,
            r#"{"error": {"message": "Invalid table widgets", "detail": null}, "status": "failure"}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid table widgets");

        let err = parse_response("u", 200, r#"{"error": {}}"#).unwrap_err();
        assert_eq!(err.to_string(), "Error querying table.");

        let err = parse_response("u", 403, r#"{"error": {"message": "Forbidden", "detail": "ACL"}}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Forbidden (ACL)");
    }

    #[test]
    fn test_parse_status_and_decode_errors() {
        let err = parse_response("u", 502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 502, .. }));

        let err = parse_response("u", 200, "not json").unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));

        let err = parse_response("u", 200, r#"{"result": {"sys_id": "a"}}"#).unwrap_err();
        assert!(err.to_string().contains("expected a result array, got object"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
