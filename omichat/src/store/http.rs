//! HTTP implementation of [`RemoteStore`].
//!
//! Talks to the spreadsheet-backed script endpoint. Reads carry a
//! cache-busting `t` query parameter, pings a `ping` parameter. Writes are
//! sent as `text/plain` JSON, the content type the script endpoint expects.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use omichat_proto::api::{self, SendRequest, SendResponse};
use omichat_proto::message::Message;

use super::{RemoteStore, StoreError};

/// Content type used for write requests.
const WRITE_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// Remote store reached over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpStore {
    http: Client,
    endpoint: Url,
}

impl HttpStore {
    /// Build a store client for `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Network`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, endpoint })
    }

    /// Return the endpoint this store talks to.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint URL with one extra query pair holding the current time.
    fn url_with_stamp(&self, key: &str) -> Url {
        let mut url = self.endpoint().clone();
        url.query_pairs_mut()
            .append_pair(key, &chrono::Utc::now().timestamp_millis().to_string());
        url
    }
}

impl RemoteStore for HttpStore {
    async fn fetch_messages(&self) -> Result<Vec<Message>, StoreError> {
        let response = self
            .http
            .get(self.url_with_stamp("t"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "message feed returned non-success status");
            return Err(StoreError::Protocol(format!("HTTP {status}")));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let messages = api::decode_feed(&body)?;
        tracing::trace!(count = messages.len(), "fetched message feed");
        Ok(messages)
    }

    async fn post_message(&self, request: &SendRequest) -> Result<SendResponse, StoreError> {
        let body = api::encode_send(request)?;
        let response = self
            .http
            .post(self.endpoint().clone())
            .header(CONTENT_TYPE, WRITE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "message write returned non-success status");
            return Err(StoreError::Protocol(format!("HTTP {status}")));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(api::decode_send_response(&bytes)?)
    }

    async fn ping(&self) -> bool {
        match self.http.get(self.url_with_stamp("ping")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(err = %e, "store ping failed");
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.endpoint().to_string()
    }
}

/// Classify a reqwest error: body decoding problems are protocol errors,
/// everything else means the request never completed.
fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_decode() {
        StoreError::Protocol(e.to_string())
    } else {
        StoreError::Network(e.to_string())
    }
}
