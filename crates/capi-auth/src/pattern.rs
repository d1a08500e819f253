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

use regex::RegexBuilder;
use tracing::warn;

/// Does the permission `node` (which may contain `*` wildcards) cover `target`?
///
/// Everything other than `*` is literal; `*` matches any run of characters, dots included, so
/// `commands.*` covers `commands.moderation.ban`. The whole target must match, case-insensitively.
#[must_use]
pub fn node_matches(node: &str, target: &str) -> bool {
    let body = node
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match RegexBuilder::new(&format!("^(?:{body})$"))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(target),
        Err(e) => {
            warn!(node, error = %e, "Unusable permission node");
            false
        }
    }
}
