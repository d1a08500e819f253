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

//! Parsing chat lines into commands, and deciding whether they may run.

use std::collections::HashMap;
use std::sync::Arc;

use capi_auth::{Identity, PermissionDatabase, ROOT_IDENTITY};
use capi_common::ChatUser;
use parking_lot::RwLock;
use strum::Display;
use tracing::{info, warn};

pub const CONSOLE_TRIGGER: &str = "/";
pub const PERMISSION_DENIED: &str = "You do not have permission to use that command.";
pub const UNRECOGNIZED_COMMAND: &str = "Unrecognized command.";

/// Where a command line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CommandSource {
    /// Said in the channel.
    Public,
    /// Whispered to the bot.
    Private,
    /// Typed at the bot's console.
    Local,
    /// Issued by the bot itself.
    Internal,
}

impl CommandSource {
    /// Console and internal commands run with root authority.
    #[must_use]
    pub fn is_console(self) -> bool {
        matches!(self, CommandSource::Local | CommandSource::Internal)
    }
}

/// A parsed command, plus the responses its handler produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub source: CommandSource,
    pub trigger: String,
    pub user: Option<ChatUser>,
    pub responses: Vec<String>,
}

impl CommandInvocation {
    pub fn respond(&mut self, text: impl Into<String>) {
        self.responses.push(text.into());
    }
}

/// Recognise `message` as a command. Console sources use `/`, chat sources `trigger`.
#[must_use]
pub fn parse_command(
    message: &str,
    source: CommandSource,
    trigger: &str,
) -> Option<CommandInvocation> {
    let trigger = if source.is_console() {
        CONSOLE_TRIGGER
    } else {
        trigger
    };
    if trigger.is_empty() {
        return None;
    }
    let mut words = message.strip_prefix(trigger)?.split_whitespace();
    // A space straight after the trigger is not a command.
    if message[trigger.len()..].starts_with(char::is_whitespace) {
        return None;
    }
    let command = words.next()?.to_string();
    Some(CommandInvocation {
        command,
        args: words.map(str::to_string).collect(),
        source,
        trigger: trigger.to_string(),
        user: None,
        responses: vec![],
    })
}

pub type CommandHandler<C> = Arc<dyn Fn(&C, &mut CommandInvocation) + Send + Sync>;

pub struct CommandDefinition<C> {
    pub name: String,
    /// Node the caller must hold. `None` lets anyone run it.
    pub permission: Option<String>,
    handler: CommandHandler<C>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Executed,
    Denied { user: String, permission: String },
    /// The caller has no entry in the permission database.
    UnknownUser(String),
    Unrecognized,
}

/// Commands by lower-cased name. `C` is whatever handlers need to act on, the chat client in
/// practice.
pub struct CommandRegistry<C> {
    commands: RwLock<HashMap<String, Arc<CommandDefinition<C>>>>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> CommandRegistry<C> {
    pub fn register<F>(&self, name: &str, permission: Option<&str>, handler: F)
    where
        F: Fn(&C, &mut CommandInvocation) + Send + Sync + 'static,
    {
        self.commands.write().insert(
            name.to_lowercase(),
            Arc::new(CommandDefinition {
                name: name.to_string(),
                permission: permission.map(str::to_string),
                handler: Arc::new(handler),
            }),
        );
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(&name.to_lowercase())
    }

    /// Run `invocation` if its caller may. Chat callers are looked up in `database` by name;
    /// console callers run as root. Denials and unknown commands are answered through
    /// [`CommandInvocation::respond`].
    ///
    /// No lock is held while the handler runs.
    pub fn execute(
        &self,
        context: &C,
        invocation: &mut CommandInvocation,
        database: &RwLock<PermissionDatabase>,
    ) -> CommandOutcome {
        let definition = self
            .commands
            .read()
            .get(&invocation.command.to_lowercase())
            .cloned();
        let Some(definition) = definition else {
            invocation.respond(UNRECOGNIZED_COMMAND);
            return CommandOutcome::Unrecognized;
        };

        let run_as = if invocation.source.is_console() {
            ROOT_IDENTITY.to_string()
        } else {
            invocation
                .user
                .as_ref()
                .map(|u| u.name.clone())
                .unwrap_or_default()
        };
        info!(
            command = %definition.name,
            user = %run_as,
            args = ?invocation.args,
            "Attempting to run command"
        );

        if let Some(permission) = &definition.permission {
            let db = database.read();
            let identity = if invocation.source.is_console() {
                Some(
                    db.root()
                        .cloned()
                        .unwrap_or_else(|| Identity::user(ROOT_IDENTITY)),
                )
            } else {
                db.user(&run_as).cloned()
            };
            match identity {
                Some(identity) if db.check(&identity, permission) => {}
                Some(identity) => {
                    drop(db);
                    warn!(user = %identity.name, %permission, "Access denied, missing permission");
                    invocation.respond(PERMISSION_DENIED);
                    return CommandOutcome::Denied {
                        user: identity.name,
                        permission: permission.clone(),
                    };
                }
                None => {
                    warn!(user = %run_as, "Access denied, no permissions");
                    return CommandOutcome::UnknownUser(run_as);
                }
            }
        }

        (definition.handler)(context, invocation);
        CommandOutcome::Executed
    }
}
