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

//! The serializable form of the permission database.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::database::PermissionDatabase;
use crate::identity::{Identity, IdentityKind};

/// Format of the `added` and `modified` fields.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid timestamp {value:?} on {name}: {source}")]
    BadTimestamp {
        name: String,
        value: String,
        source: chrono::ParseError,
    },
    #[error("could not read or write permission snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse permission snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Groups and users keyed by their display names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    #[serde(default)]
    pub groups: BTreeMap<String, IdentityRecord>,
    #[serde(default)]
    pub users: BTreeMap<String, IdentityRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(default)]
    pub permissions: IndexMap<String, bool>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

impl IdentityRecord {
    fn from_identity(identity: &Identity) -> Self {
        Self {
            permissions: identity.permissions.clone(),
            groups: identity.groups.iter().cloned().collect(),
            added: Some(identity.added.format(TIMESTAMP_FORMAT).to_string()),
            modified: identity
                .modified
                .map(|m| m.format(TIMESTAMP_FORMAT).to_string()),
            modified_by: identity.modified_by.clone(),
        }
    }

    fn to_identity(&self, name: &str, kind: IdentityKind) -> Result<Identity, SnapshotError> {
        let mut identity = Identity::new(name, kind);
        identity.permissions = self.permissions.clone();
        identity.groups = self.groups.iter().map(|g| g.to_lowercase()).collect();
        identity.added = match &self.added {
            Some(added) => parse_timestamp(name, added)?,
            None => Local::now().naive_local(),
        };
        identity.modified = self
            .modified
            .as_deref()
            .map(|modified| parse_timestamp(name, modified))
            .transpose()?;
        identity.modified_by = self.modified_by.clone();
        Ok(identity)
    }
}

fn parse_timestamp(name: &str, value: &str) -> Result<NaiveDateTime, SnapshotError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        SnapshotError::BadTimestamp {
            name: name.to_string(),
            value: value.to_string(),
            source,
        }
    })
}

impl PermissionDatabase {
    #[must_use]
    pub fn snapshot(&self) -> DatabaseSnapshot {
        DatabaseSnapshot {
            groups: self
                .groups()
                .map(|g| (g.name.clone(), IdentityRecord::from_identity(g)))
                .collect(),
            users: self
                .users()
                .map(|u| (u.name.clone(), IdentityRecord::from_identity(u)))
                .collect(),
        }
    }

    /// Build a database from a snapshot. The defaults are laid down first, so a snapshot which
    /// omits them still gets the stock groups and root; a snapshot entry of the same name wins.
    pub fn from_snapshot(snapshot: &DatabaseSnapshot) -> Result<Self, SnapshotError> {
        let mut db = Self::default();
        for (name, record) in &snapshot.groups {
            db.add(record.to_identity(name, IdentityKind::Group)?);
        }
        for (name, record) in &snapshot.users {
            db.add(record.to_identity(name, IdentityKind::User)?);
        }
        Ok(db)
    }

    /// Load from a JSON snapshot file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            debug!(?path, "No permission snapshot found, using defaults");
            return Ok(Self::default());
        }
        let snapshot: DatabaseSnapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Self::from_snapshot(&snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.snapshot())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_load_from_config_shape() {
        let snapshot: DatabaseSnapshot = serde_json::from_value(json!({
            "groups": {
                "Ops": {
                    "permissions": {"commands.moderation.*": true},
                    "groups": ["User"],
                    "added": "2017-06-01 12:30:00"
                }
            },
            "users": {
                "Someone#1234": {
                    "permissions": {"commands.moderation.ban": false},
                    "groups": ["ops", "missing"],
                    "added": "2017-06-02 08:00:00",
                    "modified": "2017-06-03 09:15:00",
                    "modified_by": "%root%"
                }
            }
        }))
        .unwrap();

        let db = PermissionDatabase::from_snapshot(&snapshot).unwrap();
        assert!(db.group("admin").is_some());

        let user = db.user("someone#1234").unwrap();
        assert_eq!(user.name, "Someone#1234");
        assert_eq!(user.modified_by.as_deref(), Some("%root%"));
        assert!(db.check(user, "commands.moderation.kick"));
        assert!(db.check(user, "commands.internal.help"));
        assert!(!db.check(user, "commands.moderation.ban"));
        assert_eq!(db.group_names(user), vec!["Ops".to_string()]);
    }

    #[test]
    fn test_bad_timestamp() {
        let snapshot: DatabaseSnapshot = serde_json::from_value(json!({
            "users": {"Someone": {"added": "yesterday"}}
        }))
        .unwrap();
        assert!(matches!(
            PermissionDatabase::from_snapshot(&snapshot),
            Err(SnapshotError::BadTimestamp { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");

        let mut db = PermissionDatabase::new();
        let mut user = Identity::user("Someone").member_of("moderator");
        user.set_permission("commands.say", true, Some("%root%"));
        db.add(user);
        db.save(&path).unwrap();

        let loaded = PermissionDatabase::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), db.snapshot());
        assert!(loaded.check_user("someone", "commands.moderation.ban").unwrap());
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let db = PermissionDatabase::load(&dir.path().join("absent.json")).unwrap();
        let snapshot = db.snapshot();
        assert_eq!(
            snapshot.groups.keys().collect::<Vec<_>>(),
            vec!["Admin", "Moderator", "User"]
        );
        assert_eq!(snapshot.users.keys().collect::<Vec<_>>(), vec!["%root%"]);
    }
}
