//! Route matching logic.
//!
//! # Responsibilities
//! - Match a request method against an endpoint's method set
//! - Match a path against a pattern (literals, `{name}` segments, trailing `*`)
//! - Apply module-hint disambiguation for multi-provider interfaces
//!
//! # Design Decisions
//! - No regex; a small backtracking matcher bounds cost by path length
//! - `{name}` matches exactly one non-empty segment (terminated by `/`)
//! - `*` backtracks over any remainder, including empty
//! - Hint comparison is exact module-id equality; prefix resolution is the
//!   dynamic lookup's job, not the matcher's

use crate::routing::entry::RoutingEntry;

/// True when the path matches the pattern.
///
/// Patterns consist of literal characters, single-segment parameters
/// `{name}`, and at most one trailing `*`.
pub fn match_pattern(pattern: &str, path: &str) -> bool {
    match_bytes(pattern.as_bytes(), path.as_bytes())
}

fn match_bytes(pattern: &[u8], path: &[u8]) -> bool {
    if pattern.is_empty() {
        return path.is_empty();
    }

    match pattern[0] {
        b'*' => {
            // Backtrack: try every suffix of the path, shortest first.
            (0..=path.len()).any(|i| match_bytes(&pattern[1..], &path[i..]))
        }
        b'{' => {
            let close = match pattern.iter().position(|&b| b == b'}') {
                Some(i) => i,
                None => return false, // unterminated parameter never matches
            };
            let rest = &pattern[close + 1..];
            // Consume one non-empty segment.
            let seg_end = path.iter().position(|&b| b == b'/').unwrap_or(path.len());
            if seg_end == 0 {
                return false;
            }
            match_bytes(rest, &path[seg_end..])
        }
        literal => !path.is_empty() && path[0] == literal && match_bytes(&pattern[1..], &path[1..]),
    }
}

/// Full candidate check: method set, path pattern, hint disambiguation.
pub fn entry_matches(
    entry: &RoutingEntry,
    method: &str,
    path: &str,
    module_hint: Option<&str>,
) -> bool {
    if !entry.endpoint.methods.allows(method) {
        return false;
    }
    if !match_pattern(&entry.endpoint.path_pattern, path) {
        return false;
    }
    hint_allows(entry, module_hint)
}

/// Module-hint disambiguation.
///
/// Multi-provider entries match only when the hint names them. Ordinary
/// entries match regardless of hint presence, unless a present hint names a
/// different module.
fn hint_allows(entry: &RoutingEntry, module_hint: Option<&str>) -> bool {
    if entry.is_multiple() {
        module_hint == Some(entry.module_id.as_str())
    } else {
        match module_hint {
            Some(hint) => hint == entry.module_id,
            None => true,
        }
    }
}
