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

//! Command authorization.
//!
//! Users and groups are both [`Identity`] records held in a [`PermissionDatabase`], keyed by
//! lower-cased name. Each carries an ordered map of permission nodes (dot separated, `*`
//! matching any run of characters) to allow/deny, plus the names of the groups it belongs to.
//! Group memberships are looked up through the database at check time, so editing a group is
//! immediately visible to every member.

pub use database::{MAX_GROUP_DEPTH, PermissionDatabase};
pub use identity::{Identity, IdentityKind, ROOT_IDENTITY};
pub use pattern::node_matches;
pub use snapshot::{DatabaseSnapshot, IdentityRecord, SnapshotError, TIMESTAMP_FORMAT};

mod database;
mod identity;
mod pattern;
mod snapshot;
