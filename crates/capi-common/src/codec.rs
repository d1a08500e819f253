// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Encoding and decoding of the textual RPC envelope.
//!
//! Every frame on the wire, in either direction, is a JSON object of the shape
//! `{"command": ..., "request_id": ..., "payload": {...}}`, optionally with a `status` block on
//! responses. The codec knows nothing about the transport.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::status::Status;

/// The body of a request, response or event.
pub type Payload = Map<String, Value>;

/// Marker in a command name which identifies a server-pushed event. Events never consume
/// request ids.
const EVENT_MARKER: &str = "Event";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("could not encode frame: {0}")]
    CouldNotEncode(String),
    #[error("unexpected attribute format: {0}")]
    UnexpectedAttributes(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    #[serde(default)]
    pub request_id: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Envelope {
    #[must_use]
    pub fn new(command: impl Into<String>, request_id: u32, payload: Payload) -> Self {
        Self {
            command: command.into(),
            request_id,
            payload,
            status: None,
        }
    }

    /// True for server-pushed events, which are never matched against pending requests.
    #[must_use]
    pub fn is_event(&self) -> bool {
        is_event(&self.command)
    }

    /// The failure status carried by this frame, if any. A `(0, 0)` status is success.
    #[must_use]
    pub fn failure(&self) -> Option<Status> {
        self.status.filter(|status| !status.is_success())
    }
}

#[must_use]
pub fn is_event(command: &str) -> bool {
    command.contains(EVENT_MARKER)
}

/// Produce the compact text form of a request.
pub fn encode(command: &str, request_id: u32, payload: &Payload) -> Result<String, CodecError> {
    #[derive(Serialize)]
    struct Outbound<'a> {
        command: &'a str,
        request_id: u32,
        payload: &'a Payload,
    }
    serde_json::to_string(&Outbound {
        command,
        request_id,
        payload,
    })
    .map_err(|e| CodecError::CouldNotEncode(e.to_string()))
}

/// Parse a received frame. Callers drop frames which fail to decode; the server is known to emit
/// the occasional corrupt one.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}
