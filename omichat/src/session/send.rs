//! Send path for [`Session`].
//!
//! An outgoing message is echoed into history before the write request goes
//! out, so it shows up immediately. The echo keeps its temporary id whatever
//! the store answers; only its delivery state changes. A failed or rejected
//! write leaves the echo in place, marked [`Delivery::Failed`].

use chrono::SecondsFormat;

use omichat_proto::api::SendRequest;
use omichat_proto::message::{ValidationError, validate_body};
use omichat_proto::snapshot::{Delivery, HistoryEntry};

use crate::store::{RemoteStore, StoreError};

use super::{Session, SessionEvent};

/// Errors that can occur when sending a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message body was rejected before anything was sent.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The write request failed.
    #[error("send failed: {0}")]
    Store(#[from] StoreError),

    /// The store answered but did not accept the message.
    #[error("store rejected the message")]
    Rejected,

    /// Nobody is logged in.
    #[error("no active session")]
    NotActive,
}

impl<S: RemoteStore + 'static> Session<S> {
    /// Sends `raw_body` as the logged-in user.
    ///
    /// 1. Trim and validate the body.
    /// 2. Append a [`Delivery::Pending`] echo with a temporary id and persist.
    /// 3. Post `{user, message, session, version}` to the store.
    /// 4. On acceptance mark the echo [`Delivery::Sent`] and advance the
    ///    last-seen id to the id the store assigned; otherwise mark it
    ///    [`Delivery::Failed`].
    ///
    /// Returns the echo in its final state.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Validation`] for an empty body (no state
    /// changes), [`SendError::NotActive`] if nobody is logged in, and
    /// [`SendError::Store`] or [`SendError::Rejected`] if the write did not
    /// go through. In the last two cases the echo stays in history.
    pub async fn send(&self, raw_body: &str) -> Result<HistoryEntry, SendError> {
        let body = validate_body(raw_body)?;
        let inner = &self.inner;
        let sent_at = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let (token, user, mut echo, stamped) = inner
            .with_active(|active| {
                let echo = active.recon.echo_local(&body, sent_at);
                (
                    active.token,
                    active.user.clone(),
                    echo,
                    inner.stamp(active),
                )
            })
            .ok_or(SendError::NotActive)?;
        inner.persist(stamped);
        inner.emit(SessionEvent::Echoed(echo.clone()));

        let request = SendRequest {
            user,
            message: body,
            session: inner.config.session_id.clone(),
            version: inner.config.client_version.clone(),
        };
        let temp_id = echo.message.id;
        let result = match inner.store.post_message(&request).await {
            Ok(response) if response.success => Ok(response.id),
            Ok(_) => Err(SendError::Rejected),
            Err(e) => Err(SendError::Store(e)),
        };

        let delivery = if result.is_ok() {
            Delivery::Sent
        } else {
            Delivery::Failed
        };
        let stamped = inner.with_session(token, |active| {
            match &result {
                Ok(server_id) => active.recon.confirm_send(temp_id, *server_id),
                Err(_) => active.recon.fail_send(temp_id),
            }
            inner.stamp(active)
        });
        match stamped {
            Some(stamped) => {
                inner.persist(stamped);
                inner.emit(SessionEvent::DeliveryChanged {
                    id: temp_id,
                    delivery,
                });
            }
            None => tracing::debug!(id = %temp_id, "send finished after session ended"),
        }

        echo.delivery = delivery;
        match result {
            Ok(server_id) => {
                tracing::debug!(
                    temp_id = %temp_id,
                    server_id = ?server_id.map(|id| id.as_i64()),
                    "message sent"
                );
                Ok(echo)
            }
            Err(e) => {
                tracing::warn!(temp_id = %temp_id, error = %e, "message not delivered");
                Err(e)
            }
        }
    }
}
