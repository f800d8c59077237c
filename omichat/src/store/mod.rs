//! Remote message store abstraction.
//!
//! Defines the [`RemoteStore`] trait the sync loop and send path talk to.
//! Concrete implementations:
//! - [`http::HttpStore`]: the spreadsheet-backed HTTP endpoint
//! - [`loopback::LoopbackStore`]: in-process store for tests and offline demo

pub mod http;
pub mod loopback;

use omichat_proto::api::{CodecError, SendRequest, SendResponse};
use omichat_proto::message::Message;

/// Errors that can occur when talking to the remote store.
///
/// The sync loop treats both variants the same way (one more consecutive
/// failure); they are kept apart for logging and display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The request did not complete (DNS, connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The request completed but the response was unusable: non-success
    /// HTTP status, malformed JSON, or an unexpected body shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Async access to the remote message store.
///
/// The store is treated as opaque: the only assumption is that each message
/// carries a comparable id. Reads return the full list every time.
pub trait RemoteStore: Send + Sync {
    /// Fetch every message the store currently holds, in store order.
    fn fetch_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Append one message.
    ///
    /// A response with `success == false` is returned as `Ok`; the caller
    /// decides what a rejection means.
    fn post_message(
        &self,
        request: &SendRequest,
    ) -> impl std::future::Future<Output = Result<SendResponse, StoreError>> + Send;

    /// Lightweight reachability check. Never fails, only reports.
    fn ping(&self) -> impl std::future::Future<Output = bool> + Send;

    /// Human-readable description of where this store lives.
    fn describe(&self) -> String;
}

impl<T: RemoteStore> RemoteStore for std::sync::Arc<T> {
    async fn fetch_messages(&self) -> Result<Vec<Message>, StoreError> {
        self.as_ref().fetch_messages().await
    }

    async fn post_message(&self, request: &SendRequest) -> Result<SendResponse, StoreError> {
        self.as_ref().post_message(request).await
    }

    async fn ping(&self) -> bool {
        self.as_ref().ping().await
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}
