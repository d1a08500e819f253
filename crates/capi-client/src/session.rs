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

//! Connection-scoped state and the transitions driven by inbound messages.
//!
//! [`Session::handle`] never performs I/O. It returns [`Action`]s which the client carries out
//! once its locks are released, so subscribers can call straight back into the client.

use std::collections::BTreeMap;
use std::time::Instant;

use capi_common::{ChatMessageKind, ChatUser, Payload, ProtocolCommand, Status};
use serde_json::Value;
use strum::Display;
use tracing::{debug, info, trace, warn};

use crate::correlator::Request;
use crate::errors::{ClientError, RequestKind};
use crate::events::ClientEvent;

/// Game clients whose `ProgramId` is expected in user attributes.
const KNOWN_PROGRAMS: [&str; 2] = ["W2BN", "SEXP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    JoiningChannel,
    Active,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Emit(ClientEvent),
    Send(ProtocolCommand, Payload),
    /// Tear the connection down locally.
    ForceDisconnect,
}

#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    channel: Option<String>,
    local_user: Option<u64>,
    username: Option<String>,
    users: BTreeMap<u64, ChatUser>,
    received_roster: bool,
    last_inbound: Option<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channel: None,
            local_user: None,
            username: None,
            users: BTreeMap::new(),
            received_roster: false,
            last_inbound: None,
        }
    }
}

impl Session {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Connection state change");
            self.state = state;
        }
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn local_user(&self) -> Option<&ChatUser> {
        self.local_user.and_then(|id| self.users.get(&id))
    }

    #[must_use]
    pub fn received_roster(&self) -> bool {
        self.received_roster
    }

    #[must_use]
    pub fn last_inbound(&self) -> Option<Instant> {
        self.last_inbound
    }

    pub fn touch(&mut self, at: Instant) {
        self.last_inbound = Some(at);
    }

    pub fn users(&self) -> impl Iterator<Item = &ChatUser> {
        self.users.values()
    }

    #[must_use]
    pub fn user_by_id(&self, id: u64) -> Option<&ChatUser> {
        self.users.get(&id)
    }

    /// Case-insensitive. A leading `*` (the realm marker on some names) is ignored.
    #[must_use]
    pub fn user_by_name(&self, name: &str) -> Option<&ChatUser> {
        let name = name.strip_prefix('*').unwrap_or(name);
        self.users
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(name))
    }

    /// Forget everything about the current connection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply one inbound message. `request` is the pending request it answered, if any.
    pub fn handle(
        &mut self,
        command: ProtocolCommand,
        request: Option<Request>,
        payload: &Payload,
        failure: Option<Status>,
    ) -> Vec<Action> {
        match command {
            ProtocolCommand::AuthenticateResponse => match failure {
                Some(status) => vec![failed(RequestKind::Authenticate, status)],
                None => {
                    self.set_state(ConnectionState::JoiningChannel);
                    vec![Action::Send(ProtocolCommand::ConnectRequest, Payload::new())]
                }
            },
            ProtocolCommand::ConnectResponse => failed_only(RequestKind::JoinChannel, failure),
            ProtocolCommand::ConnectEvent => {
                let channel = string_field(payload, "channel").unwrap_or_default();
                self.channel = Some(channel.clone());
                self.set_state(ConnectionState::Active);
                vec![Action::Emit(ClientEvent::JoinedChat {
                    channel,
                    user: self.local_user().cloned(),
                })]
            }
            ProtocolCommand::DisconnectEvent => {
                vec![Action::Emit(ClientEvent::LeftChat), Action::ForceDisconnect]
            }
            ProtocolCommand::UserUpdateEvent => self.user_update(payload),
            ProtocolCommand::UserLeaveEvent => {
                let Some(id) = payload.get("user_id").and_then(Value::as_u64) else {
                    debug!(?payload, "User leave without a user id");
                    return vec![];
                };
                match self.users.remove(&id) {
                    Some(user) => vec![Action::Emit(ClientEvent::UserLeft(user))],
                    None => {
                        debug!(id, "Unknown user left");
                        vec![]
                    }
                }
            }
            ProtocolCommand::MessageEvent => self.message(payload),
            ProtocolCommand::SendMessageResponse => {
                self.sent(RequestKind::SendMessage, request, failure, |_, request| {
                    ClientEvent::BotMessageSent {
                        message: string_field(&request.payload, "message").unwrap_or_default(),
                        emote: false,
                    }
                })
            }
            ProtocolCommand::SendEmoteResponse => {
                self.sent(RequestKind::SendEmote, request, failure, |_, request| {
                    ClientEvent::BotMessageSent {
                        message: string_field(&request.payload, "message").unwrap_or_default(),
                        emote: true,
                    }
                })
            }
            ProtocolCommand::SendWhisperResponse => {
                self.sent(RequestKind::SendWhisper, request, failure, |session, request| {
                    ClientEvent::WhisperSent {
                        target: request
                            .payload
                            .get("user_id")
                            .and_then(Value::as_u64)
                            .and_then(|id| session.user_by_id(id))
                            .cloned(),
                        message: string_field(&request.payload, "message").unwrap_or_default(),
                    }
                })
            }
            ProtocolCommand::DisconnectResponse => failed_only(RequestKind::Disconnect, failure),
            ProtocolCommand::BanUserResponse => failed_only(RequestKind::Ban, failure),
            ProtocolCommand::UnbanUserResponse => failed_only(RequestKind::Unban, failure),
            ProtocolCommand::KickUserResponse => failed_only(RequestKind::Kick, failure),
            ProtocolCommand::SetModeratorResponse => {
                failed_only(RequestKind::SetModerator, failure)
            }
            // Requests only ever travel outbound.
            ProtocolCommand::AuthenticateRequest
            | ProtocolCommand::ConnectRequest
            | ProtocolCommand::DisconnectRequest
            | ProtocolCommand::SendMessageRequest
            | ProtocolCommand::SendEmoteRequest
            | ProtocolCommand::SendWhisperRequest
            | ProtocolCommand::BanUserRequest
            | ProtocolCommand::UnbanUserRequest
            | ProtocolCommand::KickUserRequest
            | ProtocolCommand::SetModeratorRequest => {
                debug!(%command, "Ignoring request-shaped message from server");
                vec![]
            }
        }
    }

    fn sent<F>(
        &self,
        kind: RequestKind,
        request: Option<Request>,
        failure: Option<Status>,
        completed: F,
    ) -> Vec<Action>
    where
        F: FnOnce(&Self, &Request) -> ClientEvent,
    {
        if let Some(status) = failure {
            return vec![failed(kind, status)];
        }
        match request {
            Some(request) => vec![Action::Emit(completed(self, &request))],
            None => {
                debug!(%kind, "Completion for a request that is no longer pending");
                vec![]
            }
        }
    }

    fn user_update(&mut self, payload: &Payload) -> Vec<Action> {
        let Some(id) = payload.get("user_id").and_then(Value::as_u64) else {
            debug!(?payload, "User update without a user id");
            return vec![];
        };
        let flags: Option<Vec<String>> = payload.get("flag").and_then(Value::as_array).map(|f| {
            f.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
        let attributes = payload.get("attribute").filter(|a| !a.is_null()).cloned();

        let event = match self.users.get_mut(&id) {
            Some(user) => {
                let mut changed = false;
                if let Some(flags) = &flags
                    && user.flags != *flags
                {
                    user.flags = flags.clone();
                    changed = true;
                }
                if let Some(attributes) = &attributes {
                    changed |= merge_attributes(user, attributes);
                }
                // The bot's own entry is sent again, unchanged, once the initial roster is over.
                let roster_complete =
                    !changed && !self.received_roster && self.local_user == Some(id);
                if roster_complete {
                    self.received_roster = true;
                }
                (changed || roster_complete).then(|| ClientEvent::UserUpdated {
                    user: user.clone(),
                    flags,
                    attributes,
                    roster_complete,
                })
            }
            None => {
                let name = string_field(payload, "toon_name").unwrap_or_default();
                let mut user = ChatUser::new(id, name);
                if let Some(flags) = &flags {
                    user.flags = flags.clone();
                }
                if let Some(attributes) = &attributes {
                    merge_attributes(&mut user, attributes);
                }
                if self.local_user.is_none() {
                    debug!(id, name = %user.name, "Local identity assigned");
                    self.local_user = Some(id);
                    self.username = Some(user.name.clone());
                }
                let event = if self.received_roster {
                    ClientEvent::UserJoined(user.clone())
                } else {
                    ClientEvent::UserUpdated {
                        user: user.clone(),
                        flags,
                        attributes,
                        roster_complete: false,
                    }
                };
                self.users.insert(id, user);
                Some(event)
            }
        };

        if let Some(user) = self.users.get(&id) {
            report_unusual_attributes(user);
        }
        event.map(Action::Emit).into_iter().collect()
    }

    fn message(&self, payload: &Payload) -> Vec<Action> {
        let user_id = payload.get("user_id").and_then(Value::as_u64);
        let user = user_id.and_then(|id| self.users.get(&id)).cloned();
        let message = string_field(payload, "message").unwrap_or_default();
        let Some(kind) = payload
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<ChatMessageKind>().ok())
        else {
            debug!(?payload, "Message event of unknown type");
            return vec![];
        };
        // Our own emotes are echoed back; the emote response already reported them.
        if kind == ChatMessageKind::Emote && user_id.is_some() && user_id == self.local_user {
            trace!("Skipping echo of own emote");
            return vec![];
        }
        let event = match kind {
            ChatMessageKind::Channel => ClientEvent::UserTalk { user, message },
            ChatMessageKind::Emote => ClientEvent::UserEmote { user, message },
            ChatMessageKind::Whisper => ClientEvent::WhisperReceived { user, message },
            ChatMessageKind::ServerInfo => ClientEvent::ServerInfo(message),
            ChatMessageKind::ServerError => ClientEvent::ServerError(message),
        };
        vec![Action::Emit(event)]
    }
}

fn failed(kind: RequestKind, status: Status) -> Action {
    Action::Emit(ClientEvent::ClientError(ClientError::Status {
        kind,
        status: status.to_error(),
    }))
}

fn failed_only(kind: RequestKind, failure: Option<Status>) -> Vec<Action> {
    failure.map(|status| failed(kind, status)).into_iter().collect()
}

fn string_field(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn merge_attributes(user: &mut ChatUser, attributes: &Value) -> bool {
    match user.apply_attributes(attributes) {
        Ok(changed) => changed,
        Err(e) => {
            warn!(user = %user.name, error = %e, "Ignoring user attributes");
            false
        }
    }
}

/// The attribute set is still evolving server side, so anything new is worth a note.
fn report_unusual_attributes(user: &ChatUser) {
    if user.attributes.is_empty() {
        return;
    }
    let program = user.program_id();
    if let Some(program) = program
        && !KNOWN_PROGRAMS.contains(&program)
    {
        info!(user = %user.name, program, "New ProgramId seen");
    }
    if user.attributes.len() > 1 || program.is_none() {
        info!(user = %user.name, attributes = ?user.attributes, "New user attributes seen");
    }
}
