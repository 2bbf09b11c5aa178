//! Wire types for relay pushes and media negotiation payloads.
//!
//! Negotiation payloads (SDP descriptions, ICE candidates) are opaque to this
//! crate: they are carried between the two peers without interpretation beyond
//! handing them to the platform's negotiation primitives.

use serde::{Deserialize, Serialize};

use crate::types::{Call, CallId, CallStatus, UserId};

/// A session description produced by one side of the offer/answer handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// `"offer"` or `"answer"`. Mirrored from the payload discriminant so the
    /// blob round-trips through the platform unchanged.
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// A proposed network path for the peer-to-peer connection.
///
/// Follows the RFC 5245 candidate string format plus the SDP bookkeeping
/// fields the platform needs to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Negotiation payload, discriminated by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidateInit),
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
        }
    }
}

/// Signaling message carrying one negotiation payload for one call.
///
/// `from` and `to` are filled by the relay from the authenticated sender and
/// the call record. A client never asserts its own identity here, which keeps
/// addressing unforgeable and the client payload-agnostic about routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSignaling {
    #[serde(flatten)]
    pub payload: SignalPayload,
    pub call_id: CallId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
}

impl CallSignaling {
    /// Build an outbound message. Routing fields are left empty for the relay
    /// to fill in.
    pub fn new(payload: SignalPayload, call_id: CallId) -> Self {
        Self {
            payload,
            call_id,
            from: None,
            to: None,
        }
    }
}

/// Closed set of relay pushes consumed by this crate.
///
/// The relay is stateless per message; every push carries enough context to
/// be dispatched against the single active call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RelayEvent {
    /// Pushed to the receiver when a call record is created.
    #[serde(rename = "call:incoming")]
    Incoming { call: Call },
    /// Pushed to the caller once the relay has created the call record. This
    /// is the first time the caller learns the real call id.
    #[serde(rename = "call:initiated")]
    Initiated { call: Call, status: CallStatus },
    /// Status fan-out to both participants.
    #[serde(rename = "call:status")]
    Status {
        #[serde(rename = "callId")]
        call_id: CallId,
        status: CallStatus,
    },
    /// A forwarded negotiation payload from the other participant.
    #[serde(rename = "call:signal")]
    Signal { signal: CallSignaling },
}
