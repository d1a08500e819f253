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
use std::fmt::{Display, Formatter};

/// The `status` block attached to a server response. `(0, 0)` is success; anything else is a
/// failure described by [`status_reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub area: i64,
    #[serde(default)]
    pub code: i64,
}

impl Status {
    pub const SUCCESS: Status = Status { area: 0, code: 0 };

    #[must_use]
    pub fn new(area: i64, code: i64) -> Self {
        Self { area, code }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Human readable reason, `"Unknown (area-code)"` when the pair is not in the table.
    #[must_use]
    pub fn reason(&self) -> String {
        match status_reason(self.area, self.code) {
            Some(reason) => reason.to_string(),
            None => format!("Unknown ({}-{})", self.area, self.code),
        }
    }

    #[must_use]
    pub fn to_error(&self) -> StatusError {
        StatusError {
            area: self.area,
            code: self.code,
            reason: self.reason(),
        }
    }
}

/// Look up the reason string for a status pair, by area then code.
#[must_use]
pub fn status_reason(area: i64, code: i64) -> Option<&'static str> {
    match area {
        6 => match code {
            5 => Some("Request timed out"),
            8 => Some("Rate limit exceeded"),
            _ => None,
        },
        8 => match code {
            1 => Some("Not connected to chat"),
            2 => Some("Bad request"),
            _ => None,
        },
        _ => None,
    }
}

/// A server-reported failure, mapped through the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub area: i64,
    pub code: i64,
    pub reason: String,
}

impl Display for StatusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}-{})", self.reason, self.area, self.code)
    }
}

impl std::error::Error for StatusError {}
