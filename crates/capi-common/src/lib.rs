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

//! Entities shared between the chat API client and the hosts which drive it: the JSON request
//! envelope, server status codes, the set of known protocol commands, and the snapshot of a user
//! visible in the channel.

pub use codec::{CodecError, Envelope, Payload, decode, encode, is_event};
pub use command::{ChatMessageKind, ProtocolCommand};
pub use status::{Status, StatusError, status_reason};
pub use user::ChatUser;

mod codec;
mod command;
mod status;
pub mod tracing;
mod user;

/// The public bot API endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://connect-bot.classic.blizzard.com/v1/rpc/chat";
