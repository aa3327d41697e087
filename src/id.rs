/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Identifier types and allocation.
//!
//! Session identifiers are externally visible and must stay unique across
//! process restarts, so they are backed by `uuid` the way the rest of this
//! workspace uses `uuid` for process-unique ids. Component identifiers are
//! scoped to a single session, double as the DOM element id of the
//! component's root element (see the design notes on component vs. DOM
//! identity), and are cheap to mint, so a session keeps a monotonic counter
//! the same way this crate's actor registry hands out sequential suffixes
//! per namespace.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, opaque identifier for one live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// Unique, opaque identifier for a pending `get`-family request within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// Component identifier. Doubles as the DOM id of the component's root element,
/// so it is restricted to the character class valid for an HTML `id` attribute
/// token used in `querySelector`/`getElementById`: ASCII letters, digits, `-`,
/// `_`, `.`, and `:`, not starting with a digit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        if !is_valid_dom_id(&raw) {
            return Err(format!("\"{raw}\" is not a valid DOM element id"));
        }
        Ok(ComponentId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

fn is_valid_dom_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Hands out sequential, per-session component ids with a caller-chosen prefix,
/// for components that don't need an application-meaningful identifier.
#[derive(Debug, Default)]
pub struct NameGenerator {
    next: AtomicU64,
}

impl NameGenerator {
    pub fn new() -> Self {
        NameGenerator { next: AtomicU64::new(0) }
    }

    pub fn next_name(&self, prefix: &str) -> ComponentId {
        let suffix = self.next.fetch_add(1, Ordering::Relaxed);
        ComponentId(format!("{prefix}{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_dom_ids() {
        assert!(ComponentId::new("root").is_ok());
        assert!(ComponentId::new("counter-1").is_ok());
        assert!(ComponentId::new("_private").is_ok());
        assert!(ComponentId::new("1counter").is_err());
        assert!(ComponentId::new("has space").is_err());
        assert!(ComponentId::new("").is_err());
    }

    #[test]
    fn name_generator_is_sequential_and_thread_safe() {
        use std::thread;

        let generator = std::sync::Arc::new(NameGenerator::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        tx.send(generator.next_name("c")).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        drop(tx);
        let mut seen: Vec<ComponentId> = rx.iter().collect();
        seen.sort_by_key(|id| id.as_str()[1..].parse::<u64>().unwrap());
        for (i, id) in seen.iter().enumerate() {
            assert_eq!(id.as_str(), format!("c{i}"));
        }
    }
}
