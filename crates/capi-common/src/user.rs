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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::codec::CodecError;

/// A snapshot of a user currently visible in the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: u64,
    pub name: String,
    pub flags: Vec<String>,
    pub attributes: BTreeMap<String, Value>,
}

impl ChatUser {
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: vec![],
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    /// Merge attributes from a user update. The server sends either a list of
    /// `{"key": .., "value": ..}` objects or a flat object. Returns whether anything changed.
    pub fn apply_attributes(&mut self, attributes: &Value) -> Result<bool, CodecError> {
        let before = self.attributes.clone();
        match attributes {
            Value::Array(items) => {
                for item in items {
                    let Value::Object(item) = item else {
                        return Err(CodecError::UnexpectedAttributes(format!(
                            "attribute item is not an object: {item}"
                        )));
                    };
                    let key = match item.get("key") {
                        Some(Value::String(key)) => key.clone(),
                        Some(other) => other.to_string(),
                        None => continue,
                    };
                    let value = item.get("value").cloned().unwrap_or(Value::Null);
                    self.attributes.insert(key, value);
                }
            }
            Value::Object(map) => {
                for (key, value) in map {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                return Err(CodecError::UnexpectedAttributes(other.to_string()));
            }
        }
        Ok(self.attributes != before)
    }

    /// The `ProgramId` attribute, i.e. the game client the user is logged on with.
    #[must_use]
    pub fn program_id(&self) -> Option<&str> {
        self.attributes.get("ProgramId").and_then(Value::as_str)
    }
}
