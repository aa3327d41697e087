/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Error taxonomy for the component runtime, session manager, and safety layer.
//!
//! Mirrors the hand-rolled-enum idiom used elsewhere in this codebase
//! (see `session_history::AliveOrDeadPipeline`) rather than reaching for a
//! derive-macro error crate: each variant carries whatever context its
//! caller needs to log or surface it.

use std::fmt;

use crate::id::ComponentId;

/// Errors surfaced by driver operations, session teardown, and the safety layer.
#[derive(Debug, Clone)]
pub enum LiveViewError {
    /// Malformed envelope, oversize payload, or invalid identifier. Fatal to the session.
    ProtocolError(String),
    /// Persistent rate-limit violation. Fatal to the session.
    RateExceeded { session: String },
    /// `mount_child` was called with an identifier already present in the session's table.
    IdentifierConflict(ComponentId),
    /// A file-backed template could not be found under the configured template root.
    TemplateNotFound(String),
    /// A template failed to parse or reference a variable the component does not expose.
    TemplateInvalid(String),
    /// `evaluate_script` was rejected by the deny-list.
    ScriptBlocked(String),
    /// The session was torn down while a `get`-family call was in flight.
    SessionGone,
    /// A `get`-family call did not receive a reply before its deadline.
    Timeout,
    /// A handler panicked or returned an error; captured and counted, not propagated.
    HandlerFault { component: ComponentId, message: String },
}

impl fmt::Display for LiveViewError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LiveViewError::ProtocolError(reason) => write!(fmt, "protocol error: {reason}"),
            LiveViewError::RateExceeded { session } => {
                write!(fmt, "rate limit exceeded for session {session}")
            }
            LiveViewError::IdentifierConflict(id) => {
                write!(fmt, "component identifier already in use: {id}")
            }
            LiveViewError::TemplateNotFound(path) => write!(fmt, "template not found: {path}"),
            LiveViewError::TemplateInvalid(reason) => write!(fmt, "invalid template: {reason}"),
            LiveViewError::ScriptBlocked(reason) => write!(fmt, "script blocked: {reason}"),
            LiveViewError::SessionGone => write!(fmt, "session was torn down"),
            LiveViewError::Timeout => write!(fmt, "timed out waiting for client reply"),
            LiveViewError::HandlerFault { component, message } => {
                write!(fmt, "handler fault in component {component}: {message}")
            }
        }
    }
}

impl std::error::Error for LiveViewError {}
