//! Wire message envelope carried inside carrier frames.
//!
//! Four kinds of traffic cross a carrier: requests, replies, liveness
//! hellos, and goodbye notices. The envelope is serde-encoded; the Xrl and
//! argument payloads travel in their canonical text syntax so the envelope
//! stays independent of the atom model.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{WireError, XrlError, XrlErrorCode};
use crate::xrl::{Xrl, XrlArgs};

/// One message on a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    Request {
        seqno: u32,
        xrl: String,
    },
    Reply {
        seqno: u32,
        error: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        args: String,
    },
    /// Periodic liveness. Never replied to, never occupies a seqno.
    Hello,
    Bye {
        reason: String,
    },
}

impl WireMessage {
    pub fn request(seqno: u32, xrl: &Xrl) -> Self {
        Self::Request {
            seqno,
            xrl: xrl.to_string(),
        }
    }

    /// A reply for a resolved or unresolved request alike.
    pub fn reply(seqno: u32, error: &XrlError, args: &XrlArgs) -> Self {
        Self::Reply {
            seqno,
            error: error.code.as_u32(),
            note: error.note.clone(),
            args: args.to_string(),
        }
    }

    pub fn ok_reply(seqno: u32, args: &XrlArgs) -> Self {
        Self::Reply {
            seqno,
            error: XrlErrorCode::Okay.as_u32(),
            note: None,
            args: args.to_string(),
        }
    }

    /// Encodes for framing. The returned buffer is immutable; the carrier
    /// writes it as-is.
    pub fn encode(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).expect("wire message serializes"))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// The decoded interesting half of a reply.
#[derive(Debug, Clone)]
pub struct ReplyEnvelope {
    pub error: XrlError,
    pub args: XrlArgs,
}

impl ReplyEnvelope {
    /// Interprets the raw reply fields. An unparsable args payload is peer
    /// misbehavior and surfaces as a wire error.
    pub fn from_wire(error: u32, note: Option<String>, args: &str) -> Result<Self, WireError> {
        let args: XrlArgs = args.parse()?;
        Ok(Self {
            error: XrlError {
                code: XrlErrorCode::from_u32(error),
                note,
            },
            args,
        })
    }

    #[must_use]
    pub fn ok(args: XrlArgs) -> Self {
        Self {
            error: XrlError::bare(XrlErrorCode::Okay),
            args,
        }
    }

    #[must_use]
    pub fn failed(error: XrlError) -> Self {
        Self {
            error,
            args: XrlArgs::new(),
        }
    }
}
