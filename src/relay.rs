//! Consumer contract for the signaling relay.
//!
//! The relay is a server-side message bus keyed by call id. It owns call
//! record creation, fills routing fields on forwarded signals from the
//! authenticated sender, and fans status updates out to both participants.
//! It is consumed here, never reimplemented: the host application's transport
//! layer implements [`SignalingRelay`] for requests and drives
//! [`CallManager::handle_event`](crate::CallManager::handle_event) with the
//! pushes it receives (`call:incoming`, `call:initiated`, `call:status`,
//! `call:signal`).
//!
//! The relay must deliver signaling messages for a given call in send order
//! per direction. The client does not defend against reordering within a
//! call, only against cross-call contamination.

use async_trait::async_trait;
use thiserror::Error;

use crate::signaling::CallSignaling;
use crate::types::{CallId, CallType, ConversationId, UserId};

#[derive(Debug, Error)]
pub enum RelayError {
    /// Transport to the relay is down or the request timed out.
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    /// The relay refused the request.
    #[error("relay rejected request: {0}")]
    Rejected(String),
}

/// Requests this client can make of the relay.
///
/// Any `Err` is treated as an immediate failure of the attempted action; the
/// caller funnels it into call status `failed`. Nothing is retried.
#[async_trait]
pub trait SignalingRelay: Send + Sync {
    /// Ask the relay to create a call record. The relay responds out of band
    /// with `call:initiated` (to us) and `call:incoming` (to the receiver);
    /// the call id is not known until then.
    async fn initiate_call(
        &self,
        receiver_id: &UserId,
        call_type: CallType,
        conversation_id: &ConversationId,
    ) -> Result<(), RelayError>;

    /// Tell the relay the call was picked up. Fans out status `answered`.
    async fn answer_call(&self, call_id: &CallId) -> Result<(), RelayError>;

    /// Tell the relay the call was refused. Fans out status `declined`.
    async fn decline_call(&self, call_id: &CallId) -> Result<(), RelayError>;

    /// Tell the relay the call is over. Fans out status `ended`.
    async fn end_call(&self, call_id: &CallId) -> Result<(), RelayError>;

    /// Forward a negotiation payload to the other participant. The relay
    /// fills `from`/`to` from the authenticated session and the call record.
    async fn send_signal(&self, signal: CallSignaling) -> Result<(), RelayError>;
}
