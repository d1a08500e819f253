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

use capi_common::{ChatUser, Envelope};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumCount, EnumIter};

use crate::client::ChatClient;
use crate::dispatcher::PriorityDispatcher;
use crate::errors::ClientError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumCount, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
    JoinedChat,
    UserJoined,
    UserUpdated,
    UserLeft,
    /// Subscribers that act on what was said, such as command parsing, should register below
    /// any filter that may veto, and check [`crate::Veto::is_vetoed`] in case a filter shares
    /// their priority.
    UserTalk,
    BotMessageSent,
    WhisperSent,
    WhisperReceived,
    UserEmote,
    ServerInfo,
    ServerError,
    ProtocolMessageSent,
    ProtocolMessageReceived,
    LeftChat,
    ClientError,
}

/// What a client reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The channel join was confirmed. `user` is the bot itself, if its identity is known yet.
    JoinedChat {
        channel: String,
        user: Option<ChatUser>,
    },
    /// Someone entered after the initial roster was complete.
    UserJoined(ChatUser),
    /// `flags` and `attributes` are as the server sent them. `roster_complete` is set on the one
    /// update which marks the end of the initial roster.
    UserUpdated {
        user: ChatUser,
        flags: Option<Vec<String>>,
        attributes: Option<Value>,
        roster_complete: bool,
    },
    UserLeft(ChatUser),
    UserTalk {
        user: Option<ChatUser>,
        message: String,
    },
    UserEmote {
        user: Option<ChatUser>,
        message: String,
    },
    WhisperReceived {
        user: Option<ChatUser>,
        message: String,
    },
    ServerInfo(String),
    ServerError(String),
    BotMessageSent {
        message: String,
        emote: bool,
    },
    WhisperSent {
        target: Option<ChatUser>,
        message: String,
    },
    ProtocolMessageSent(Envelope),
    ProtocolMessageReceived(Envelope),
    LeftChat,
    ClientError(ClientError),
}

impl ClientEvent {
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            ClientEvent::JoinedChat { .. } => EventCategory::JoinedChat,
            ClientEvent::UserJoined(_) => EventCategory::UserJoined,
            ClientEvent::UserUpdated { .. } => EventCategory::UserUpdated,
            ClientEvent::UserLeft(_) => EventCategory::UserLeft,
            ClientEvent::UserTalk { .. } => EventCategory::UserTalk,
            ClientEvent::UserEmote { .. } => EventCategory::UserEmote,
            ClientEvent::WhisperReceived { .. } => EventCategory::WhisperReceived,
            ClientEvent::ServerInfo(_) => EventCategory::ServerInfo,
            ClientEvent::ServerError(_) => EventCategory::ServerError,
            ClientEvent::BotMessageSent { .. } => EventCategory::BotMessageSent,
            ClientEvent::WhisperSent { .. } => EventCategory::WhisperSent,
            ClientEvent::ProtocolMessageSent(_) => EventCategory::ProtocolMessageSent,
            ClientEvent::ProtocolMessageReceived(_) => EventCategory::ProtocolMessageReceived,
            ClientEvent::LeftChat => EventCategory::LeftChat,
            ClientEvent::ClientError(_) => EventCategory::ClientError,
        }
    }
}

/// The argument every subscriber receives: the event and the client that raised it.
pub struct ChatEvent {
    pub client: ChatClient,
    pub event: ClientEvent,
}

/// One dispatcher per [`EventCategory`].
pub struct ClientEvents {
    dispatchers: [PriorityDispatcher<ChatEvent>; EventCategory::COUNT],
}

impl Default for ClientEvents {
    fn default() -> Self {
        Self {
            dispatchers: std::array::from_fn(|_| PriorityDispatcher::default()),
        }
    }
}

impl ClientEvents {
    #[must_use]
    pub fn on(&self, category: EventCategory) -> &PriorityDispatcher<ChatEvent> {
        &self.dispatchers[category as usize]
    }

    /// Route `event` to the subscribers of its category. False if one of them vetoed.
    pub fn dispatch(&self, event: &ChatEvent) -> bool {
        self.on(event.event.category()).dispatch(event)
    }
}
