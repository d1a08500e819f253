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

use chrono::{Local, NaiveDateTime};
use indexmap::{IndexMap, IndexSet};

/// Name of the identity console and internal executions run as. It holds `*` and is never
/// consulted against its permission map.
pub const ROOT_IDENTITY: &str = "%root%";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    User,
    Group,
}

/// A named principal: a user or a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub kind: IdentityKind,
    /// Permission node -> allowed. Insertion ordered.
    pub permissions: IndexMap<String, bool>,
    /// Lower-cased names of the groups this identity belongs to. Resolved through the database
    /// when checked; names with no matching group are skipped.
    pub groups: IndexSet<String>,
    pub added: NaiveDateTime,
    pub modified: Option<NaiveDateTime>,
    pub modified_by: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: IdentityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            permissions: IndexMap::new(),
            groups: IndexSet::new(),
            added: Local::now().naive_local(),
            modified: None,
            modified_by: None,
        }
    }

    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, IdentityKind::User)
    }

    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, IdentityKind::Group)
    }

    /// Builder form: grant each of `nodes`.
    #[must_use]
    pub fn allowing<'a>(mut self, nodes: impl IntoIterator<Item = &'a str>) -> Self {
        for node in nodes {
            self.permissions.insert(node.to_string(), true);
        }
        self
    }

    /// Builder form: add a group membership.
    #[must_use]
    pub fn member_of(mut self, group: &str) -> Self {
        self.groups.insert(group.to_lowercase());
        self
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind == IdentityKind::Group
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.kind == IdentityKind::User && self.name.eq_ignore_ascii_case(ROOT_IDENTITY)
    }

    /// Set a node to allow or deny, recording who changed it.
    pub fn set_permission(&mut self, node: &str, allow: bool, modified_by: Option<&str>) {
        self.permissions.insert(node.to_string(), allow);
        self.touch(modified_by);
    }

    /// Remove a node entirely (neither allowed nor denied). Returns whether it was present.
    pub fn unset_permission(&mut self, node: &str, modified_by: Option<&str>) -> bool {
        let removed = self.permissions.shift_remove(node).is_some();
        if removed {
            self.touch(modified_by);
        }
        removed
    }

    pub fn add_group(&mut self, group: &str, modified_by: Option<&str>) -> bool {
        let added = self.groups.insert(group.to_lowercase());
        if added {
            self.touch(modified_by);
        }
        added
    }

    pub fn remove_group(&mut self, group: &str, modified_by: Option<&str>) -> bool {
        let removed = self.groups.shift_remove(&group.to_lowercase());
        if removed {
            self.touch(modified_by);
        }
        removed
    }

    fn touch(&mut self, modified_by: Option<&str>) {
        self.modified = Some(Local::now().naive_local());
        self.modified_by = modified_by.map(str::to_string);
    }
}
