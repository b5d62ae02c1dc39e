//! HTTP fetcher for the remote reference table.
//!
//! One `fetch()` is one GET with bounded connect and request timeouts.
//! There is no retry here: each scheduled tick or pull-through refresh is an
//! independent attempt, and the cache decides what a failure means.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::payload::{parse_payload, PayloadShape};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::table::Table;

/// Anything that can produce a fresh copy of the table.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn fetch(&self) -> Result<Table>;

    /// Human-readable location, used in log fields.
    fn describe(&self) -> String;
}

/// Fetcher for a table published over HTTP(S).
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
    shape: PayloadShape,
}

impl HttpSource {
    pub fn new(
        url: impl Into<String>,
        shape: PayloadShape,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            shape,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.source_url.clone(),
            config.payload.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(CacheError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl TableSource for HttpSource {
    async fn fetch(&self) -> Result<Table> {
        let started = Instant::now();

        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.bytes().await?;
        let table = parse_payload(&body, &self.shape)?;

        debug!(
            url = %self.url,
            records = table.len(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched lookup table"
        );
        Ok(table)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, shape: PayloadShape) -> HttpSource {
        HttpSource::new(
            format!("{}/lookup_table.json", server.uri()),
            shape,
            Duration::from_secs(2),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_array_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup_table.json"))
            .and(header_matcher("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"country":"US","branch":"B1","legal_entity":"E1"}]"#,
            ))
            .mount(&server)
            .await;

        let table = source(&server, PayloadShape::Array).fetch().await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].get("legal_entity"), Some("E1"));
    }

    #[tokio::test]
    async fn test_fetch_wrapped_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"lookup":[{"country_code":"US","giw_branch":"B1","lvid":"L1"}]}"#,
            ))
            .mount(&server)
            .await;

        let shape = PayloadShape::Wrapped {
            field: "lookup".to_string(),
        };
        let table = source(&server, shape).fetch().await.unwrap();
        assert_eq!(table.records()[0].get("giw_branch"), Some("B1"));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = source(&server, PayloadShape::Array).fetch().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let err = source(&server, PayloadShape::Array).fetch().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Decode);
        assert!(!err.is_shape_error());
    }

    #[tokio::test]
    async fn test_fetch_wrong_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rows":[]}"#))
            .mount(&server)
            .await;

        let err = source(&server, PayloadShape::Array).fetch().await.unwrap_err();
        assert!(err.is_shape_error());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[]")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = source(&server, PayloadShape::Array).fetch().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        // Bind then drop a server so the port is closed
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let source = HttpSource::new(
            format!("{}/gone.json", uri),
            PayloadShape::Array,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .unwrap();

        let err = source.fetch().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
    }
}
