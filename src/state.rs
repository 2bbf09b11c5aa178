//! Call state machine implementation.
//!
//! The state alphabet is [`CallStatus`]; "idle" is represented by the manager
//! holding no [`ActiveCall`] at all. At most one non-terminal call exists at
//! a time.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Call, CallDirection, CallId, CallStatus, CallType, ConversationId, UserId};

/// The single in-flight call as seen by this client.
///
/// An outgoing call starts as a placeholder with `id: None`: the relay is
/// authoritative for call ids, so the record is only bound to an id once the
/// relay confirms initiation. Media must never be negotiated against an
/// unconfirmed id.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCall {
    pub id: Option<CallId>,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub call_type: CallType,
    pub conversation_id: ConversationId,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    /// Low-level transport has reported connected. Tracked separately from
    /// `status` because the connection can complete before the `answered`
    /// broadcast is processed, or vice versa.
    pub media_connected: bool,
}

impl ActiveCall {
    /// Outgoing placeholder, before the relay has confirmed the call record.
    pub fn new_outgoing(
        caller_id: UserId,
        receiver_id: UserId,
        call_type: CallType,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            id: None,
            caller_id,
            receiver_id,
            call_type,
            conversation_id,
            direction: CallDirection::Outgoing,
            status: CallStatus::Pending,
            created_at: Utc::now(),
            answered_at: None,
            media_connected: false,
        }
    }

    /// Incoming call, ringing locally.
    pub fn new_incoming(call: Call) -> Self {
        Self {
            id: Some(call.id),
            caller_id: call.caller_id,
            receiver_id: call.receiver_id,
            call_type: call.call_type,
            conversation_id: call.conversation_id,
            direction: CallDirection::Incoming,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
            answered_at: None,
            media_connected: false,
        }
    }

    /// Replace the outgoing placeholder with the relay-confirmed record.
    pub fn confirm(&mut self, call: Call, status: CallStatus) {
        self.id = Some(call.id);
        self.caller_id = call.caller_id;
        self.receiver_id = call.receiver_id;
        self.call_type = call.call_type;
        self.conversation_id = call.conversation_id;
        self.status = status;
    }

    pub fn is_initiator(&self) -> bool {
        self.direction == CallDirection::Outgoing
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the placeholder is still waiting for `call:initiated`.
    pub fn is_unconfirmed(&self) -> bool {
        self.id.is_none()
    }

    /// Signaling isolation check: only messages for this call's confirmed id
    /// may touch any state.
    pub fn matches(&self, call_id: &CallId) -> bool {
        self.id.as_ref() == Some(call_id)
    }

    /// Apply a relay-broadcast (or locally decided) status.
    ///
    /// Re-applying the current status is a no-op, as is any terminal status
    /// arriving after the call is already terminal; both happen under the
    /// unordered fan-out from two independent event sources. Backward moves
    /// are rejected.
    pub fn apply_status(&mut self, next: CallStatus) -> Result<(), InvalidTransition> {
        if next == self.status {
            return Ok(());
        }
        if self.status.is_terminal() {
            if next.is_terminal() {
                // Late duplicate fan-out for an already-finished call.
                return Ok(());
            }
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let allowed = match (self.status, next) {
            (CallStatus::Pending, CallStatus::Ringing | CallStatus::Answered) => true,
            (CallStatus::Ringing, CallStatus::Answered) => true,
            (_, status) if status.is_terminal() => true,
            _ => false,
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        if next == CallStatus::Answered {
            self.answered_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id.clone(),
            caller_id: self.caller_id.clone(),
            receiver_id: self.receiver_id.clone(),
            call_type: self.call_type,
            conversation_id: self.conversation_id.clone(),
            direction: self.direction,
            status: self.status,
            media_connected: self.media_connected,
        }
    }
}

/// Immutable view of the current call for the presentation adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub id: Option<CallId>,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub call_type: CallType,
    pub conversation_id: ConversationId,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub media_connected: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct InvalidTransition {
    pub from: CallStatus,
    pub to: CallStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}
