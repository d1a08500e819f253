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

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::warn;

use crate::identity::{Identity, IdentityKind, ROOT_IDENTITY};
use crate::pattern::node_matches;

/// How deep group-of-group memberships are followed. Membership graphs are allowed to contain
/// cycles; this is what stops them.
pub const MAX_GROUP_DEPTH: usize = 16;

/// The index of every known user and group, keyed by lower-cased name.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionDatabase {
    groups: HashMap<String, Identity>,
    users: HashMap<String, Identity>,
}

impl Default for PermissionDatabase {
    fn default() -> Self {
        let mut db = Self::empty();
        db.add(Identity::group("Admin").allowing(["commands.*"]));
        db.add(
            Identity::group("Moderator")
                .allowing(["commands.moderation.*"])
                .member_of("user"),
        );
        db.add(Identity::group("User").allowing(["commands.internal.*"]));
        db.add(Identity::user(ROOT_IDENTITY).allowing(["*"]));
        db
    }
}

impl PermissionDatabase {
    /// A database holding only the default groups and the root identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A database with nothing in it at all, not even root.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            groups: HashMap::new(),
            users: HashMap::new(),
        }
    }

    /// Insert or replace an identity. Returns what it replaced.
    pub fn add(&mut self, identity: Identity) -> Option<Identity> {
        let key = identity.key();
        match identity.kind {
            IdentityKind::Group => self.groups.insert(key, identity),
            IdentityKind::User => self.users.insert(key, identity),
        }
    }

    pub fn remove(&mut self, name: &str, kind: IdentityKind) -> Option<Identity> {
        let key = name.to_lowercase();
        match kind {
            IdentityKind::Group => self.groups.remove(&key),
            IdentityKind::User => self.users.remove(&key),
        }
    }

    #[must_use]
    pub fn user(&self, name: &str) -> Option<&Identity> {
        self.users.get(&name.to_lowercase())
    }

    pub fn user_mut(&mut self, name: &str) -> Option<&mut Identity> {
        self.users.get_mut(&name.to_lowercase())
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Identity> {
        self.groups.get(&name.to_lowercase())
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Identity> {
        self.groups.get_mut(&name.to_lowercase())
    }

    pub fn users(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Identity> {
        self.groups.values()
    }

    #[must_use]
    pub fn root(&self) -> Option<&Identity> {
        self.user(ROOT_IDENTITY)
    }

    /// Does `identity` hold `node`?
    ///
    /// Direct permissions are consulted first: any matching direct deny is final. Otherwise the
    /// identity holds the node if a direct allow matched or any of its groups holds it.
    #[must_use]
    pub fn check(&self, identity: &Identity, node: &str) -> bool {
        if identity.is_root() {
            return true;
        }
        self.resolve(identity, node, 0)
    }

    /// Check a user by name. `None` if there is no such user.
    #[must_use]
    pub fn check_user(&self, name: &str, node: &str) -> Option<bool> {
        self.user(name).map(|user| self.check(user, node))
    }

    fn resolve(&self, identity: &Identity, node: &str, depth: usize) -> bool {
        let mut allowed = false;
        for (pattern, allow) in &identity.permissions {
            if node_matches(pattern, node) {
                if !allow {
                    return false;
                }
                allowed = true;
            }
        }
        if allowed {
            return true;
        }
        if depth >= MAX_GROUP_DEPTH {
            warn!(identity = %identity.name, node, "Group nesting too deep, ignoring remaining groups");
            return false;
        }
        identity
            .groups
            .iter()
            .filter_map(|name| self.group(name))
            .any(|group| self.resolve(group, node, depth + 1))
    }

    /// Every node `identity` is granted, deduplicated: everything its groups grant plus its own
    /// allows, minus the exact node strings it denies directly. A deny of `commands.*` does not
    /// remove `commands.ban` here, even though it would refuse it in [`Self::check`].
    #[must_use]
    pub fn effective_permissions(&self, identity: &Identity) -> Vec<String> {
        self.collect_permissions(identity, 0).into_iter().collect()
    }

    fn collect_permissions(&self, identity: &Identity, depth: usize) -> IndexSet<String> {
        let mut granted = IndexSet::new();
        if depth < MAX_GROUP_DEPTH {
            for group in identity.groups.iter().filter_map(|name| self.group(name)) {
                granted.extend(self.collect_permissions(group, depth + 1));
            }
        } else {
            warn!(identity = %identity.name, "Group nesting too deep, ignoring remaining groups");
        }
        for (node, allow) in &identity.permissions {
            if *allow {
                granted.insert(node.clone());
            } else {
                granted.shift_remove(node);
            }
        }
        granted
    }

    /// Display names of the groups `identity` belongs to which actually exist.
    #[must_use]
    pub fn group_names(&self, identity: &Identity) -> Vec<String> {
        identity
            .groups
            .iter()
            .filter_map(|name| self.group(name))
            .map(|group| group.name.clone())
            .collect()
    }
}
