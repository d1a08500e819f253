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

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use capi_common::{ChatUser, DEFAULT_ENDPOINT, Envelope, Payload, ProtocolCommand, decode, encode};
use chrono::Local;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::correlator::RequestCorrelator;
use crate::dispatcher::{Handler, Veto};
use crate::errors::ClientError;
use crate::events::{ChatEvent, ClientEvent, ClientEvents, EventCategory};
use crate::session::{Action, ConnectionState, Session};
use crate::transport::{self, Frame, Received, Transport, WsReader};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
        }
    }
}

/// Identifies a user in the current channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(u64),
    /// Case-insensitive, leading `*` ignored.
    Name(String),
}

impl Display for UserRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "#{id}"),
            UserRef::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<u64> for UserRef {
    fn from(id: u64) -> Self {
        UserRef::Id(id)
    }
}

impl From<&str> for UserRef {
    fn from(name: &str) -> Self {
        UserRef::Name(name.to_string())
    }
}

impl From<String> for UserRef {
    fn from(name: String) -> Self {
        UserRef::Name(name)
    }
}

impl From<&ChatUser> for UserRef {
    fn from(user: &ChatUser) -> Self {
        UserRef::Id(user.id)
    }
}

/// The write side: pending requests and the transport they go out on. Held together so that
/// allocating an id and writing its frame happen as one step.
#[derive(Default)]
struct Outbound {
    requests: RequestCorrelator,
    transport: Option<Arc<dyn Transport>>,
    /// Bumped on every attach and forced reset. Frames read under an older generation belong to
    /// a connection that no longer exists.
    generation: u64,
}

struct ClientInner {
    config: ClientConfig,
    session: Mutex<Session>,
    outbound: Mutex<Outbound>,
    events: ClientEvents,
}

/// A connection to the chat API. Cheap to clone; clones share the connection.
///
/// Inbound messages are processed serially by a single receive task, which is also where
/// subscriber callbacks run. Outbound operations may be called from anywhere, callbacks
/// included. The session and outbound locks are never held together, and neither is held
/// while callbacks run.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                session: Mutex::new(Session::default()),
                outbound: Mutex::new(Outbound::default()),
                events: ClientEvents::default(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn events(&self) -> &ClientEvents {
        &self.inner.events
    }

    /// Subscribe to one category of event.
    pub fn on<F>(&self, category: EventCategory, priority: i32, f: F) -> Handler<ChatEvent>
    where
        F: Fn(&ChatEvent, &Veto) + Send + Sync + 'static,
    {
        self.inner.events.on(category).register_fn(priority, f)
    }

    /// Open the transport and start authenticating. Any existing connection is torn down first.
    /// Completion of the handshake is reported through events, not through this result.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Disconnected {
            self.disconnect(true);
        }
        let endpoint = &self.inner.config.endpoint;
        debug!(%endpoint, "Connecting to chat API");
        let (transport, reader) = match transport::open(endpoint).await {
            Ok(opened) => opened,
            Err(e) => {
                self.emit(ClientEvent::ClientError(e.clone()));
                return Err(e);
            }
        };
        let generation = self.attach(transport)?;
        tokio::spawn(receive_loop(self.clone(), reader, generation));
        Ok(())
    }

    /// Adopt an open transport and send the authentication request.
    pub(crate) fn attach(&self, transport: Arc<dyn Transport>) -> Result<u64, ClientError> {
        let generation = {
            let mut outbound = self.inner.outbound.lock();
            outbound.generation += 1;
            outbound.requests.clear();
            outbound.transport = Some(transport);
            outbound.generation
        };
        self.inner
            .session
            .lock()
            .set_state(ConnectionState::Connecting);

        let mut payload = Payload::new();
        payload.insert(
            "api_key".to_string(),
            Value::String(self.inner.config.api_key.clone()),
        );
        if let Err(e) = self.send(ProtocolCommand::AuthenticateRequest, payload) {
            self.disconnect(true);
            return Err(e);
        }
        self.inner
            .session
            .lock()
            .set_state(ConnectionState::Authenticating);
        Ok(generation)
    }

    /// With `force`, drop the transport and all connection state at once. Otherwise ask the
    /// server to end the session and wait for its disconnect event.
    pub fn disconnect(&self, force: bool) {
        if force {
            let transport = {
                let mut outbound = self.inner.outbound.lock();
                outbound.requests.clear();
                outbound.generation += 1;
                outbound.transport.take()
            };
            if let Some(transport) = transport {
                transport.close();
            }
            self.inner.session.lock().reset();
            debug!("Connection reset");
        } else {
            if self.inner.outbound.lock().transport.is_none() {
                self.disconnect(true);
                return;
            }
            // Set first: the server's disconnect event may arrive before the send returns.
            self.inner
                .session
                .lock()
                .set_state(ConnectionState::Disconnecting);
            if let Err(e) = self.send(ProtocolCommand::DisconnectRequest, Payload::new()) {
                debug!(error = %e, "Could not request disconnect, resetting instead");
                self.disconnect(true);
            }
        }
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        let open = self
            .inner
            .outbound
            .lock()
            .transport
            .as_ref()
            .is_some_and(|t| t.is_open());
        open && self.state() != ConnectionState::Disconnected
    }

    #[must_use]
    pub fn last_inbound(&self) -> Option<Instant> {
        self.inner.session.lock().last_inbound()
    }

    /// Send a transport-level ping, by default carrying the current local time.
    pub fn ping(&self, payload: Option<String>) -> Result<(), ClientError> {
        let payload = payload
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string());
        let transport = self.inner.outbound.lock().transport.clone();
        let result = match transport {
            Some(transport) => transport.ping(payload.into_bytes()),
            None => Err(ClientError::NotConnected),
        };
        if let Err(e) = &result {
            self.emit(ClientEvent::ClientError(e.clone()));
        }
        result
    }

    /// Send an arbitrary request. Returns the id it was sent under.
    pub fn request(&self, command: &str, payload: Payload) -> Result<u32, ClientError> {
        let sent = {
            let mut outbound = self.inner.outbound.lock();
            match outbound.transport.clone() {
                None => Err(ClientError::NotConnected),
                Some(transport) => {
                    let id = outbound.requests.allocate(command, payload.clone());
                    let written = encode(command, id, &payload)
                        .map_err(|e| ClientError::Encode(e.to_string()))
                        .and_then(|text| transport.send_text(text));
                    match written {
                        Ok(()) => Ok(id),
                        Err(e) => {
                            outbound.requests.resolve(id);
                            Err(e)
                        }
                    }
                }
            }
        };
        match sent {
            Ok(id) => {
                debug!(command, request_id = id, "Sent request");
                self.emit(ClientEvent::ProtocolMessageSent(Envelope::new(
                    command, id, payload,
                )));
                Ok(id)
            }
            Err(e) => {
                warn!(command, error = %e, "Request not sent");
                self.emit(ClientEvent::ClientError(e.clone()));
                Err(e)
            }
        }
    }

    fn send(&self, command: ProtocolCommand, payload: Payload) -> Result<u32, ClientError> {
        self.request(command.name(), payload)
    }

    /// Say `message` in the channel. With a target, it goes to that user as a whisper, or as an
    /// emote if the target is the bot itself.
    pub fn chat(&self, message: &str, target: Option<&UserRef>) -> Result<u32, ClientError> {
        let mut payload = message_payload(message);
        let Some(target) = target else {
            return self.send(ProtocolCommand::SendMessageRequest, payload);
        };
        let user = self.require_user(target)?;
        let is_self = self
            .username()
            .is_some_and(|me| me.eq_ignore_ascii_case(&user.name));
        if is_self {
            self.send(ProtocolCommand::SendEmoteRequest, payload)
        } else {
            payload.insert("user_id".to_string(), Value::from(user.id));
            self.send(ProtocolCommand::SendWhisperRequest, payload)
        }
    }

    /// Send each line of `text` as its own message.
    pub fn send_lines(&self, text: &str, target: Option<&UserRef>) -> Result<Vec<u32>, ClientError> {
        text.replace('\r', "")
            .split('\n')
            .map(|line| self.chat(line, target))
            .collect()
    }

    pub fn emote(&self, message: &str) -> Result<u32, ClientError> {
        self.send(ProtocolCommand::SendEmoteRequest, message_payload(message))
    }

    pub fn whisper(&self, target: &UserRef, message: &str) -> Result<u32, ClientError> {
        let user = self.require_user(target)?;
        let mut payload = message_payload(message);
        payload.insert("user_id".to_string(), Value::from(user.id));
        self.send(ProtocolCommand::SendWhisperRequest, payload)
    }

    /// Ban `target`, or with `kick` only remove them from the channel.
    pub fn ban(&self, target: &UserRef, kick: bool) -> Result<u32, ClientError> {
        let user = self.require_user(target)?;
        let command = if kick {
            ProtocolCommand::KickUserRequest
        } else {
            ProtocolCommand::BanUserRequest
        };
        self.send(command, user_id_payload(&user))
    }

    /// Banned users are not in the channel, so this goes by name alone.
    pub fn unban(&self, name: &str) -> Result<u32, ClientError> {
        let mut payload = Payload::new();
        payload.insert("toon_name".to_string(), Value::from(name));
        self.send(ProtocolCommand::UnbanUserRequest, payload)
    }

    pub fn set_moderator(&self, target: &UserRef) -> Result<u32, ClientError> {
        let user = self.require_user(target)?;
        self.send(ProtocolCommand::SetModeratorRequest, user_id_payload(&user))
    }

    #[must_use]
    pub fn get_user(&self, user: &UserRef) -> Option<ChatUser> {
        let session = self.inner.session.lock();
        let found = match user {
            UserRef::Id(id) => session.user_by_id(*id),
            UserRef::Name(name) => session.user_by_name(name),
        };
        found.cloned()
    }

    fn require_user(&self, target: &UserRef) -> Result<ChatUser, ClientError> {
        self.get_user(target).ok_or_else(|| {
            let e = ClientError::TargetNotFound(target.to_string());
            self.emit(ClientEvent::ClientError(e.clone()));
            e
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state()
    }

    #[must_use]
    pub fn channel(&self) -> Option<String> {
        self.inner.session.lock().channel().map(str::to_string)
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.inner.session.lock().username().map(str::to_string)
    }

    #[must_use]
    pub fn users(&self) -> Vec<ChatUser> {
        self.inner.session.lock().users().cloned().collect()
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.outbound.lock().requests.len()
    }

    /// Hand `event` to its subscribers. False if one of them vetoed it.
    pub fn emit(&self, event: ClientEvent) -> bool {
        self.inner.events.dispatch(&ChatEvent {
            client: self.clone(),
            event,
        })
    }

    pub(crate) fn handle_frame(&self, generation: u64, frame: Frame) {
        if self.inner.outbound.lock().generation != generation {
            trace!(generation, "Dropping frame from a previous connection");
            return;
        }
        self.inner.session.lock().touch(Instant::now());
        if let Frame::Text(text) = frame {
            self.handle_text(generation, &text);
        }
    }

    fn handle_text(&self, generation: u64, bytes: &[u8]) {
        // The server occasionally sends garbage; skipping it is all there is to do.
        let envelope = match decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!(error = %e, "Dropping undecodable frame");
                return;
            }
        };
        trace!(command = %envelope.command, request_id = envelope.request_id, "Received");

        // Re-checked under the lock: a reset may have happened since the frame was accepted,
        // and its request id could already belong to the next connection.
        let request = {
            let mut outbound = self.inner.outbound.lock();
            if outbound.generation != generation {
                trace!(generation, "Dropping message from a previous connection");
                return;
            }
            if envelope.is_event() {
                None
            } else {
                outbound.requests.resolve(envelope.request_id)
            }
        };
        self.emit(ClientEvent::ProtocolMessageReceived(envelope.clone()));
        let Some(command) = ProtocolCommand::classify(&envelope.command) else {
            debug!(command = %envelope.command, "No handler for command");
            return;
        };
        let actions = self.inner.session.lock().handle(
            command,
            request,
            &envelope.payload,
            envelope.failure(),
        );
        self.perform(actions);
    }

    fn perform(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Emit(event) => {
                    self.emit(event);
                }
                Action::Send(command, payload) => {
                    if let Err(e) = self.send(command, payload) {
                        debug!(%command, error = %e, "Follow-up request failed");
                    }
                }
                Action::ForceDisconnect => self.disconnect(true),
            }
        }
    }

    /// The receive loop for `generation` ended without being asked to. A read failure is
    /// reported to subscribers; a peer close only shows through `connected()`.
    pub(crate) fn connection_lost(&self, generation: u64, failure: Option<String>) {
        if self.inner.outbound.lock().generation != generation {
            return;
        }
        match failure {
            Some(reason) => {
                warn!(%reason, "Connection failed");
                self.emit(ClientEvent::ClientError(ClientError::Transport(reason)));
            }
            None => warn!("Connection closed by peer"),
        }
        self.disconnect(true);
    }
}

fn message_payload(message: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("message".to_string(), Value::from(message));
    payload
}

fn user_id_payload(user: &ChatUser) -> Payload {
    let mut payload = Payload::new();
    payload.insert("user_id".to_string(), Value::from(user.id));
    payload
}

async fn receive_loop(client: ChatClient, mut reader: WsReader, generation: u64) {
    loop {
        match reader.recv().await {
            Received::Frame(frame) => client.handle_frame(generation, frame),
            Received::Corrupt => trace!("Skipping frame with invalid UTF-8"),
            Received::Cancelled => break,
            Received::Closed => {
                client.connection_lost(generation, None);
                break;
            }
            Received::Failed(reason) => {
                client.connection_lost(generation, Some(reason));
                break;
            }
        }
    }
    debug!(generation, "Receive loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{PRIORITY_HIGH, PRIORITY_NORMAL};
    use crate::errors::RequestKind;
    use bytes::Bytes;
    use capi_common::Status;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
        pings: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
    }

    impl RecordingTransport {
        fn commands(&self) -> Vec<String> {
            self.sent.lock().iter().map(|e| e.command.clone()).collect()
        }

        fn last(&self) -> Envelope {
            self.sent.lock().last().cloned().unwrap()
        }
    }

    impl Transport for RecordingTransport {
        fn send_text(&self, text: String) -> Result<(), ClientError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(ClientError::NotConnected);
            }
            self.sent.lock().push(decode(text.as_bytes()).unwrap());
            Ok(())
        }

        fn ping(&self, payload: Vec<u8>) -> Result<(), ClientError> {
            self.pings.lock().push(payload);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        client: ChatClient,
        transport: Arc<RecordingTransport>,
        generation: u64,
    }

    impl Harness {
        fn new() -> Self {
            let client = ChatClient::new(ClientConfig::new("secret-key"));
            let transport = Arc::new(RecordingTransport::default());
            let generation = client.attach(transport.clone()).unwrap();
            Self {
                client,
                transport,
                generation,
            }
        }

        fn receive(&self, frame: Value) {
            self.client.handle_frame(
                self.generation,
                Frame::Text(Bytes::from(frame.to_string())),
            );
        }

        fn user(&self, id: u64, name: &str) {
            self.receive(json!({
                "command": "Botapichat.UserUpdateEventRequest",
                "request_id": 0,
                "payload": {"user_id": id, "toon_name": name, "flag": []}
            }));
        }

        /// Authenticated, joined, roster delivered.
        fn joined() -> Self {
            let h = Self::new();
            h.receive(json!({
                "command": "Botapiauth.AuthenticateResponse",
                "request_id": 1,
                "payload": {},
                "status": {"area": 0, "code": 0}
            }));
            h.receive(json!({
                "command": "Botapichat.ConnectResponse",
                "request_id": 1,
                "payload": {}
            }));
            h.user(1, "Bot#1234");
            h.receive(json!({
                "command": "Botapichat.ConnectEventRequest",
                "request_id": 0,
                "payload": {"channel": "Op Bot"}
            }));
            h.user(2, "Someone#5678");
            h.user(1, "Bot#1234");
            h
        }

        fn record(&self, category: EventCategory) -> Arc<Mutex<Vec<ClientEvent>>> {
            let seen: Arc<Mutex<Vec<ClientEvent>>> = Arc::default();
            let sink = seen.clone();
            self.client.on(category, PRIORITY_NORMAL, move |e, _| {
                sink.lock().push(e.event.clone());
            });
            seen
        }
    }

    #[test]
    fn test_handshake() {
        let h = Harness::new();
        assert_eq!(h.client.state(), ConnectionState::Authenticating);
        let auth = h.transport.last();
        assert_eq!(auth.command, "Botapiauth.AuthenticateRequest");
        assert_eq!(auth.request_id, 1);
        assert_eq!(auth.payload.get("api_key"), Some(&json!("secret-key")));

        let joined = h.record(EventCategory::JoinedChat);
        h.receive(json!({
            "command": "Botapiauth.AuthenticateResponse",
            "request_id": 1,
            "payload": {}
        }));
        assert_eq!(h.client.state(), ConnectionState::JoiningChannel);
        let connect = h.transport.last();
        assert_eq!(connect.command, "Botapichat.ConnectRequest");
        // Id 1 was answered, so it is free again.
        assert_eq!(connect.request_id, 1);

        h.user(1, "Bot#1234");
        h.receive(json!({
            "command": "Botapichat.ConnectEventRequest",
            "request_id": 0,
            "payload": {"channel": "Op Bot"}
        }));
        assert_eq!(h.client.state(), ConnectionState::Active);
        assert_eq!(h.client.channel().as_deref(), Some("Op Bot"));
        assert!(h.client.connected());
        assert_eq!(
            *joined.lock(),
            vec![ClientEvent::JoinedChat {
                channel: "Op Bot".to_string(),
                user: Some(ChatUser::new(1, "Bot#1234")),
            }]
        );
    }

    #[test]
    fn test_auth_failure() {
        let h = Harness::new();
        let errors = h.record(EventCategory::ClientError);
        h.receive(json!({
            "command": "Botapiauth.AuthenticateResponse",
            "request_id": 1,
            "payload": null,
            "status": {"area": 8, "code": 2}
        }));
        assert_eq!(h.client.state(), ConnectionState::Authenticating);
        assert_eq!(h.transport.commands().len(), 1);
        assert_eq!(
            *errors.lock(),
            vec![ClientEvent::ClientError(ClientError::Status {
                kind: RequestKind::Authenticate,
                status: Status::new(8, 2).to_error(),
            })]
        );
    }

    #[test]
    fn test_roster_then_join() {
        let h = Harness::joined();
        let joins = h.record(EventCategory::UserJoined);
        let updates = h.record(EventCategory::UserUpdated);
        h.user(3, "Newcomer#9");
        assert_eq!(joins.lock().len(), 1);
        assert!(updates.lock().is_empty());
        assert_eq!(h.client.users().len(), 3);
    }

    #[test]
    fn test_forced_disconnect_clears_pending() {
        let h = Harness::joined();
        h.client.chat("one", None).unwrap();
        h.client.chat("two", None).unwrap();
        h.client.chat("three", None).unwrap();
        assert_eq!(h.client.pending_requests(), 3);

        h.client.disconnect(true);
        assert_eq!(h.client.pending_requests(), 0);
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(h.client.users().is_empty());
        assert!(h.client.channel().is_none());
        assert!(h.transport.closed.load(Ordering::SeqCst));
        assert!(!h.client.connected());
        assert_eq!(
            h.client.chat("four", None),
            Err(ClientError::NotConnected)
        );
    }

    #[test]
    fn test_graceful_disconnect() {
        let h = Harness::joined();
        let left = h.record(EventCategory::LeftChat);
        h.client.disconnect(false);
        assert_eq!(h.client.state(), ConnectionState::Disconnecting);
        assert_eq!(h.transport.last().command, "Botapichat.DisconnectRequest");

        h.receive(json!({
            "command": "Botapichat.DisconnectEventRequest",
            "request_id": 0,
            "payload": {}
        }));
        assert_eq!(left.lock().len(), 1);
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(h.transport.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_graceful_disconnect_without_transport() {
        let client = ChatClient::new(ClientConfig::new("key"));
        client.disconnect(false);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_graceful_disconnect_on_closed_transport() {
        let h = Harness::joined();
        h.transport.close();
        h.client.disconnect(false);
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(h.client.users().is_empty());
        assert!(h.client.channel().is_none());
    }

    #[test]
    fn test_receive_failure_is_reported() {
        let h = Harness::joined();
        let errors = h.record(EventCategory::ClientError);
        h.client
            .connection_lost(h.generation, Some("connection reset by peer".to_string()));
        assert_eq!(
            *errors.lock(),
            vec![ClientEvent::ClientError(ClientError::Transport(
                "connection reset by peer".to_string()
            ))]
        );
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(!h.client.connected());
    }

    #[test]
    fn test_peer_close_is_silent() {
        let h = Harness::joined();
        let errors = h.record(EventCategory::ClientError);
        h.client.connection_lost(h.generation, None);
        assert!(errors.lock().is_empty());
        assert_eq!(h.client.state(), ConnectionState::Disconnected);
        assert!(h.transport.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_loss_of_previous_connection_ignored() {
        let h = Harness::joined();
        let errors = h.record(EventCategory::ClientError);
        h.client
            .connection_lost(h.generation - 1, Some("old socket".to_string()));
        assert!(errors.lock().is_empty());
        assert_eq!(h.client.state(), ConnectionState::Active);
    }

    #[test]
    fn test_stale_response_does_not_reach_next_connection() {
        let h = Harness::new();
        let old_generation = h.generation;
        h.client.disconnect(true);
        let next = Arc::new(RecordingTransport::default());
        h.client.attach(next.clone()).unwrap();
        assert_eq!(h.client.pending_requests(), 1);

        let stale = json!({
            "command": "Botapiauth.AuthenticateResponse",
            "request_id": 1,
            "payload": {}
        });
        h.client
            .handle_text(old_generation, stale.to_string().as_bytes());
        assert_eq!(h.client.pending_requests(), 1);
        assert_eq!(h.client.state(), ConnectionState::Authenticating);
        assert_eq!(next.commands(), vec!["Botapiauth.AuthenticateRequest"]);
    }

    #[test]
    fn test_concurrent_requests_get_distinct_ids() {
        let h = Harness::joined();
        let client = &h.client;
        let ids: Vec<u32> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|worker| {
                    scope.spawn(move || {
                        (0..25)
                            .map(|i| {
                                client
                                    .request(
                                        "Botapichat.SendMessageRequest",
                                        message_payload(&format!("{worker}-{i}")),
                                    )
                                    .unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });
        let distinct: BTreeSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 200);
        assert_eq!(distinct.len(), 200);
        assert_eq!(h.client.pending_requests(), 200);
    }

    #[test]
    fn test_chat_targets() {
        let h = Harness::joined();

        h.client.chat("hello", None).unwrap();
        assert_eq!(h.transport.last().command, "Botapichat.SendMessageRequest");

        h.client.chat("waves", Some(&"bot#1234".into())).unwrap();
        let emote = h.transport.last();
        assert_eq!(emote.command, "Botapichat.SendEmoteRequest");
        assert!(emote.payload.get("user_id").is_none());

        h.client.chat("psst", Some(&"*someone#5678".into())).unwrap();
        let whisper = h.transport.last();
        assert_eq!(whisper.command, "Botapichat.SendWhisperRequest");
        assert_eq!(whisper.payload.get("user_id"), Some(&json!(2)));
        assert_eq!(whisper.payload.get("message"), Some(&json!("psst")));

        let errors = h.record(EventCategory::ClientError);
        let sent_before = h.transport.commands().len();
        assert_eq!(
            h.client.chat("hello?", Some(&"nobody".into())),
            Err(ClientError::TargetNotFound("nobody".to_string()))
        );
        assert_eq!(h.transport.commands().len(), sent_before);
        assert_eq!(errors.lock().len(), 1);
    }

    #[test]
    fn test_moderation_requests() {
        let h = Harness::joined();
        h.client.ban(&UserRef::Id(2), false).unwrap();
        assert_eq!(h.transport.last().command, "Botapichat.BanUserRequest");
        h.client.ban(&"someone#5678".into(), true).unwrap();
        assert_eq!(h.transport.last().command, "Botapichat.KickUserRequest");
        h.client.set_moderator(&UserRef::Id(2)).unwrap();
        let op = h.transport.last();
        assert_eq!(op.command, "Botapichat.SendSetModeratorRequest");
        assert_eq!(op.payload.get("user_id"), Some(&json!(2)));

        h.client.unban("Gone#1").unwrap();
        let unban = h.transport.last();
        assert_eq!(unban.command, "Botapichat.UnbanUserRequest");
        assert_eq!(unban.payload.get("toon_name"), Some(&json!("Gone#1")));

        assert!(h.client.ban(&UserRef::Id(99), false).is_err());
    }

    #[test]
    fn test_send_lines() {
        let h = Harness::joined();
        let before = h.transport.commands().len();
        let ids = h.client.send_lines("first\r\nsecond\nthird", None).unwrap();
        assert_eq!(ids.len(), 3);
        let sent = h.transport.sent.lock();
        let messages: Vec<_> = sent[before..]
            .iter()
            .map(|e| e.payload.get("message").cloned().unwrap())
            .collect();
        assert_eq!(messages, vec![json!("first"), json!("second"), json!("third")]);
    }

    #[test]
    fn test_whisper_completion() {
        let h = Harness::joined();
        let whispers = h.record(EventCategory::WhisperSent);
        let id = h.client.whisper(&UserRef::Id(2), "psst").unwrap();
        h.receive(json!({
            "command": "Botapichat.SendWhisperResponse",
            "request_id": id,
            "payload": {},
            "status": {"area": 0, "code": 0}
        }));
        assert_eq!(
            *whispers.lock(),
            vec![ClientEvent::WhisperSent {
                target: Some(ChatUser::new(2, "Someone#5678")),
                message: "psst".to_string(),
            }]
        );
        assert_eq!(h.client.pending_requests(), 0);
    }

    #[test]
    fn test_corrupt_frames_are_dropped() {
        let h = Harness::new();
        let received = h.record(EventCategory::ProtocolMessageReceived);
        assert!(h.client.last_inbound().is_none());

        h.client
            .handle_frame(h.generation, Frame::Text(Bytes::from_static(b"{\"comm")));
        h.client
            .handle_frame(h.generation, Frame::Text(Bytes::from_static(&[0xff, 0xfe])));
        assert!(received.lock().is_empty());
        assert!(h.client.last_inbound().is_some());

        h.receive(json!({
            "command": "Botapiauth.AuthenticateResponse",
            "request_id": 1,
            "payload": {}
        }));
        assert_eq!(received.lock().len(), 1);
        assert_eq!(h.client.state(), ConnectionState::JoiningChannel);
    }

    #[test]
    fn test_control_frames_count_as_inbound() {
        let h = Harness::new();
        h.client.handle_frame(h.generation, Frame::Control);
        assert!(h.client.last_inbound().is_some());
    }

    #[test]
    fn test_stale_generation_ignored() {
        let h = Harness::new();
        h.client.handle_frame(h.generation + 1, Frame::Control);
        assert!(h.client.last_inbound().is_none());
    }

    #[test]
    fn test_events_do_not_consume_request_ids() {
        let h = Harness::new();
        assert_eq!(h.client.pending_requests(), 1);
        h.receive(json!({
            "command": "Botapichat.UserUpdateEventRequest",
            "request_id": 1,
            "payload": {"user_id": 1, "toon_name": "Bot#1234"}
        }));
        assert_eq!(h.client.pending_requests(), 1);
    }

    #[test]
    fn test_veto_reported_to_producer() {
        let h = Harness::joined();
        h.client
            .on(EventCategory::UserTalk, PRIORITY_HIGH, |_, veto| veto.veto());
        let vetoed = !h.client.emit(ClientEvent::UserTalk {
            user: None,
            message: "!ping".to_string(),
        });
        assert!(vetoed);
    }

    #[test]
    fn test_ping() {
        let h = Harness::new();
        h.client.ping(Some("now".to_string())).unwrap();
        h.client.ping(None).unwrap();
        let pings = h.transport.pings.lock();
        assert_eq!(pings[0], b"now".to_vec());
        assert!(!pings[1].is_empty());
    }

    #[test]
    fn test_not_connected() {
        let client = ChatClient::new(ClientConfig::new("key"));
        assert!(!client.connected());
        assert_eq!(client.ping(None), Err(ClientError::NotConnected));
        assert_eq!(
            client.request("Botapichat.ConnectRequest", Payload::new()),
            Err(ClientError::NotConnected)
        );
    }
}
