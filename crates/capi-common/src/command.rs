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

use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Every command name the client sends or knows how to handle. Inbound frames are classified
/// into one of these once, at the codec boundary; anything else is logged and ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, IntoStaticStr,
)]
pub enum ProtocolCommand {
    #[strum(serialize = "Botapiauth.AuthenticateRequest")]
    AuthenticateRequest,
    #[strum(serialize = "Botapiauth.AuthenticateResponse")]
    AuthenticateResponse,
    #[strum(serialize = "Botapichat.ConnectRequest")]
    ConnectRequest,
    #[strum(serialize = "Botapichat.ConnectResponse")]
    ConnectResponse,
    #[strum(serialize = "Botapichat.ConnectEventRequest")]
    ConnectEvent,
    #[strum(serialize = "Botapichat.DisconnectRequest")]
    DisconnectRequest,
    #[strum(serialize = "Botapichat.DisconnectResponse")]
    DisconnectResponse,
    #[strum(serialize = "Botapichat.DisconnectEventRequest")]
    DisconnectEvent,
    #[strum(serialize = "Botapichat.UserUpdateEventRequest")]
    UserUpdateEvent,
    #[strum(serialize = "Botapichat.UserLeaveEventRequest")]
    UserLeaveEvent,
    #[strum(serialize = "Botapichat.MessageEventRequest")]
    MessageEvent,
    #[strum(serialize = "Botapichat.SendMessageRequest")]
    SendMessageRequest,
    #[strum(serialize = "Botapichat.SendMessageResponse")]
    SendMessageResponse,
    #[strum(serialize = "Botapichat.SendEmoteRequest")]
    SendEmoteRequest,
    #[strum(serialize = "Botapichat.SendEmoteResponse")]
    SendEmoteResponse,
    #[strum(serialize = "Botapichat.SendWhisperRequest")]
    SendWhisperRequest,
    #[strum(serialize = "Botapichat.SendWhisperResponse")]
    SendWhisperResponse,
    #[strum(serialize = "Botapichat.BanUserRequest")]
    BanUserRequest,
    #[strum(serialize = "Botapichat.BanUserResponse")]
    BanUserResponse,
    #[strum(serialize = "Botapichat.UnbanUserRequest")]
    UnbanUserRequest,
    #[strum(serialize = "Botapichat.UnbanUserResponse")]
    UnbanUserResponse,
    #[strum(serialize = "Botapichat.KickUserRequest")]
    KickUserRequest,
    #[strum(serialize = "Botapichat.KickUserResponse")]
    KickUserResponse,
    #[strum(serialize = "Botapichat.SendSetModeratorRequest")]
    SetModeratorRequest,
    #[strum(serialize = "Botapichat.SendSetModeratorResponse")]
    SetModeratorResponse,
}

impl ProtocolCommand {
    /// Classify a received command name. `None` for names this client has no handler for.
    #[must_use]
    pub fn classify(command: &str) -> Option<Self> {
        command.parse().ok()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// The `type` field of a message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ChatMessageKind {
    /// Ordinary talk in the channel.
    Channel,
    Emote,
    /// A whisper received from another user.
    Whisper,
    ServerInfo,
    ServerError,
}
