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

use std::sync::Arc;
use std::time::{Duration, Instant};

use capi_auth::{PermissionDatabase, SnapshotError};
use capi_client::{
    ChatClient, ClientConfig, ClientEvent, EventCategory, PRIORITY_LOW, PRIORITY_NORMAL, UserRef,
};
use capi_common::ChatUser;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::commands::{
    CommandInvocation, CommandOutcome, CommandRegistry, CommandSource, parse_command,
};
use crate::config::InstanceConfig;

/// State shared between an instance and the event handlers it installs on its client.
struct Shared {
    name: String,
    config: InstanceConfig,
    database: RwLock<PermissionDatabase>,
    commands: CommandRegistry<ChatClient>,
    joined_at: Mutex<Option<Instant>>,
}

/// One bot: a chat connection, its permission database and its commands.
pub struct BotInstance {
    client: ChatClient,
    shared: Arc<Shared>,
}

impl BotInstance {
    pub fn new(name: &str, config: InstanceConfig) -> Result<Self, SnapshotError> {
        let database = match &config.database_file {
            Some(path) => PermissionDatabase::load(path)?,
            None => PermissionDatabase::new(),
        };
        let client = ChatClient::new(ClientConfig {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        });
        let instance = Self {
            client,
            shared: Arc::new(Shared {
                name: name.to_string(),
                config,
                database: RwLock::new(database),
                commands: CommandRegistry::default(),
                joined_at: Mutex::new(None),
            }),
        };
        instance.hook_events();
        Ok(instance)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    #[must_use]
    pub fn database(&self) -> &RwLock<PermissionDatabase> {
        &self.shared.database
    }

    #[must_use]
    pub fn commands(&self) -> &CommandRegistry<ChatClient> {
        &self.shared.commands
    }

    /// Time since the channel was last joined.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        let joined_at = *self.shared.joined_at.lock();
        joined_at.map(|at| at.elapsed())
    }

    pub async fn start(&self) -> bool {
        debug!(instance = %self.name(), endpoint = %self.shared.config.endpoint, "Connecting");
        match self.client.connect().await {
            Ok(()) => {
                debug!(instance = %self.name(), "Connection established");
                true
            }
            Err(e) => {
                warn!(instance = %self.name(), error = %e, "Could not connect");
                false
            }
        }
    }

    pub fn stop(&self, force: bool) -> Result<(), SnapshotError> {
        debug!(instance = %self.name(), "Shutting down instance");
        self.client.disconnect(force);
        self.save()
    }

    /// Write the permission database back to its snapshot file, if it has one.
    pub fn save(&self) -> Result<(), SnapshotError> {
        match &self.shared.config.database_file {
            Some(path) => {
                self.shared.database.read().save(path)?;
                debug!(instance = %self.name(), ?path, "Saved permission database");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Run a line typed at the console. Returns the invocation if the line was a command.
    pub fn execute_local(&self, line: &str) -> Option<CommandInvocation> {
        run_command(&self.client, &self.shared, line, CommandSource::Local, None)
    }

    fn hook_events(&self) {
        let client = &self.client;

        let shared = self.shared.clone();
        client.on(EventCategory::JoinedChat, PRIORITY_NORMAL, move |e, _| {
            if let ClientEvent::JoinedChat { channel, user } = &e.event {
                *shared.joined_at.lock() = Some(Instant::now());
                let name = user.as_ref().map(|u| u.name.as_str()).unwrap_or("?");
                info!(instance = %shared.name, user = %name, %channel, "Logged on");
            }
        });

        let shared = self.shared.clone();
        client.on(EventCategory::LeftChat, PRIORITY_NORMAL, move |_, _| {
            *shared.joined_at.lock() = None;
            warn!(instance = %shared.name, "Disconnected from chat");
        });

        let name = self.shared.name.clone();
        client.on(EventCategory::ClientError, PRIORITY_NORMAL, move |e, _| {
            if let ClientEvent::ClientError(err) = &e.event {
                error!(instance = %name, error = %err, "Client error");
            }
        });

        let name = self.shared.name.clone();
        client.on(EventCategory::ProtocolMessageSent, PRIORITY_NORMAL, move |e, _| {
            if let ClientEvent::ProtocolMessageSent(envelope) = &e.event {
                debug!(instance = %name, ?envelope, "Sent message");
            }
        });

        let name = self.shared.name.clone();
        client.on(EventCategory::ProtocolMessageReceived, PRIORITY_NORMAL, move |e, _| {
            if let ClientEvent::ProtocolMessageReceived(envelope) = &e.event {
                debug!(instance = %name, ?envelope, "Received message");
            }
        });

        // Commands run last so anything at a higher priority can veto them. A veto from an
        // earlier handler at the same priority is honoured too.
        let shared = self.shared.clone();
        client.on(EventCategory::UserTalk, PRIORITY_LOW, move |e, veto| {
            if veto.is_vetoed() {
                return;
            }
            if let ClientEvent::UserTalk {
                user: Some(user),
                message,
            } = &e.event
            {
                run_command(&e.client, &shared, message, CommandSource::Public, Some(user));
            }
        });

        let shared = self.shared.clone();
        client.on(EventCategory::WhisperReceived, PRIORITY_LOW, move |e, veto| {
            if veto.is_vetoed() {
                return;
            }
            if let ClientEvent::WhisperReceived {
                user: Some(user),
                message,
            } = &e.event
            {
                run_command(&e.client, &shared, message, CommandSource::Private, Some(user));
            }
        });
    }
}

fn run_command(
    client: &ChatClient,
    shared: &Shared,
    message: &str,
    source: CommandSource,
    user: Option<&ChatUser>,
) -> Option<CommandInvocation> {
    let mut invocation = parse_command(message, source, &shared.config.trigger)?;
    invocation.user = user.cloned();
    let outcome = shared
        .commands
        .execute(client, &mut invocation, &shared.database);
    if outcome != CommandOutcome::Executed {
        debug!(instance = %shared.name, command = %invocation.command, ?outcome, "Command not run");
    }
    deliver(client, &shared.name, &invocation);
    Some(invocation)
}

/// Send a command's responses back where it came from.
fn deliver(client: &ChatClient, instance: &str, invocation: &CommandInvocation) {
    for response in &invocation.responses {
        let sent = match (invocation.source, &invocation.user) {
            (CommandSource::Public, _) => client.send_lines(response, None),
            (CommandSource::Private, Some(user)) => {
                client.send_lines(response, Some(&UserRef::from(user)))
            }
            (CommandSource::Private, None) => continue,
            (CommandSource::Local | CommandSource::Internal, _) => {
                info!(instance, "{response}");
                continue;
            }
        };
        if let Err(e) = sent {
            warn!(instance, error = %e, "Could not deliver command response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capi_auth::Identity;
    use capi_client::PRIORITY_HIGH;
    use pretty_assertions::assert_eq;

    fn config() -> InstanceConfig {
        InstanceConfig {
            api_key: "key".to_string(),
            endpoint: "wss://localhost/chat".to_string(),
            trigger: "!".to_string(),
            enabled: true,
            database_file: None,
        }
    }

    fn talk(instance: &BotInstance, name: &str, message: &str) -> bool {
        instance.client().emit(ClientEvent::UserTalk {
            user: Some(ChatUser::new(5, name)),
            message: message.to_string(),
        })
    }

    fn counting_instance() -> (BotInstance, Arc<Mutex<Vec<String>>>) {
        let instance = BotInstance::new("test", config()).unwrap();
        let ran: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = ran.clone();
        instance
            .commands()
            .register("echo", Some("commands.internal.echo"), move |_, inv| {
                log.lock().push(inv.args.join(" "));
            });
        instance
            .database()
            .write()
            .add(Identity::user("Member#1").member_of("user"));
        (instance, ran)
    }

    #[test]
    fn test_channel_command_runs() {
        let (instance, ran) = counting_instance();
        assert!(talk(&instance, "Member#1", "!echo hello there"));
        assert_eq!(*ran.lock(), vec!["hello there"]);
    }

    #[test]
    fn test_whispered_command_runs() {
        let (instance, ran) = counting_instance();
        instance.client().emit(ClientEvent::WhisperReceived {
            user: Some(ChatUser::new(5, "member#1")),
            message: "!echo psst".to_string(),
        });
        assert_eq!(*ran.lock(), vec!["psst"]);
    }

    #[test]
    fn test_veto_suppresses_command() {
        let (instance, ran) = counting_instance();
        instance
            .client()
            .on(EventCategory::UserTalk, PRIORITY_HIGH, |_, veto| veto.veto());
        assert!(!talk(&instance, "Member#1", "!echo hello"));
        assert!(ran.lock().is_empty());
    }

    #[test]
    fn test_non_commands_are_ignored() {
        let (instance, ran) = counting_instance();
        talk(&instance, "Member#1", "just chatting");
        talk(&instance, "Member#1", "/echo wrong trigger");
        assert!(ran.lock().is_empty());
    }

    #[test]
    fn test_console_command() {
        let (instance, ran) = counting_instance();
        let inv = instance.execute_local("/echo from console").unwrap();
        assert_eq!(inv.source, CommandSource::Local);
        assert_eq!(*ran.lock(), vec!["from console"]);

        let inv = instance.execute_local("/nothing").unwrap();
        assert_eq!(inv.responses, vec![crate::commands::UNRECOGNIZED_COMMAND]);
        assert!(instance.execute_local("echo").is_none());
    }

    #[test]
    fn test_snapshot_saved_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        let mut config = config();
        config.database_file = Some(path.clone());

        let instance = BotInstance::new("main", config.clone()).unwrap();
        instance
            .database()
            .write()
            .add(Identity::user("Someone#1").member_of("admin"));
        instance.stop(true).unwrap();

        let reloaded = BotInstance::new("main", config).unwrap();
        assert!(
            reloaded
                .database()
                .read()
                .check_user("someone#1", "commands.anything")
                .unwrap()
        );
    }

    #[test]
    fn test_uptime_follows_channel() {
        let instance = BotInstance::new("test", config()).unwrap();
        assert!(instance.uptime().is_none());
        instance.client().emit(ClientEvent::JoinedChat {
            channel: "Op Bot".to_string(),
            user: None,
        });
        assert!(instance.uptime().is_some());
        instance.client().emit(ClientEvent::LeftChat);
        assert!(instance.uptime().is_none());
    }
}
