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

//! Client for the chat bot API.
//!
//! A [`ChatClient`] holds one websocket connection: it authenticates, joins the bot's channel,
//! keeps track of who is in it, and reports everything that happens as [`ClientEvent`]s through
//! per-category [`PriorityDispatcher`]s. A [`Supervisor`] watches any number of clients and
//! reconnects the ones that go quiet.

pub use client::{ChatClient, ClientConfig, UserRef};
pub use correlator::{Request, RequestCorrelator};
pub use dispatcher::{
    Handler, PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_NORMAL, PriorityDispatcher, Veto,
};
pub use errors::{ClientError, RequestKind};
pub use events::{ChatEvent, ClientEvent, ClientEvents, EventCategory};
pub use session::ConnectionState;
pub use supervisor::{Recovery, Supervised, Supervisor, SupervisorConfig, SweepOutcome};
pub use transport::Transport;

mod client;
mod correlator;
mod dispatcher;
mod errors;
mod events;
mod session;
mod supervisor;
mod transport;
