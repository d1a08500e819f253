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

use std::collections::BTreeMap;
use std::time::SystemTime;

use capi_common::Payload;

/// An outbound call still waiting for its response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u32,
    pub command: String,
    pub payload: Payload,
    pub sent_at: SystemTime,
}

/// Outstanding requests keyed by id. Ids are the smallest free positive integers, so an id is
/// handed out again as soon as its response has been seen.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: BTreeMap<u32, Request>,
}

impl RequestCorrelator {
    pub fn allocate(&mut self, command: &str, payload: Payload) -> u32 {
        let mut id = 1;
        for &taken in self.pending.keys() {
            if taken != id {
                break;
            }
            id += 1;
        }
        self.pending.insert(
            id,
            Request {
                id,
                command: command.to_string(),
                payload,
                sent_at: SystemTime::now(),
            },
        );
        id
    }

    pub fn resolve(&mut self, id: u32) -> Option<Request> {
        self.pending.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Request> {
        self.pending.get(&id)
    }

    /// Drop everything outstanding. Nobody is told; responses that arrive later match nothing.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
