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

use capi_common::StatusError;
use strum::Display;
use thiserror::Error;

/// The request a server-reported failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RequestKind {
    #[strum(to_string = "Authentication failed")]
    Authenticate,
    #[strum(to_string = "Failed to connect to chat")]
    JoinChannel,
    #[strum(to_string = "Failed to send message")]
    SendMessage,
    #[strum(to_string = "Failed to send emote")]
    SendEmote,
    #[strum(to_string = "Failed to send whisper")]
    SendWhisper,
    #[strum(to_string = "Failed to disconnect")]
    Disconnect,
    #[strum(to_string = "Failed to ban user")]
    Ban,
    #[strum(to_string = "Failed to unban user")]
    Unban,
    #[strum(to_string = "Failed to kick user")]
    Kick,
    #[strum(to_string = "Failed to set moderator")]
    SetModerator,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("could not connect to {endpoint}: {reason}")]
    CouldNotConnect { endpoint: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("not connected")]
    NotConnected,
    #[error("could not encode request: {0}")]
    Encode(String),
    #[error("chat target not found: {0}")]
    TargetNotFound(String),
    #[error("{kind}: {status}")]
    Status {
        kind: RequestKind,
        status: StatusError,
    },
}
