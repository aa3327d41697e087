/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Runtime configuration.
//!
//! A plain struct plus `Default`, in the style this codebase's own
//! configuration layer uses (a struct with sane defaults, no external
//! config-file DSL) rather than pulling in a configuration crate.

use std::path::PathBuf;
use std::time::Duration;

/// Knobs from the external interface table: inbound byte ceiling, rate
/// limiting, `get`-reply timeout, template root, and script deny-list.
#[derive(Clone, Debug)]
pub struct Config {
    /// Inbound event payloads larger than this are rejected with `ProtocolError`.
    pub max_payload_bytes: usize,
    /// Leaky-bucket refill rate, in events per second.
    pub rate_limit_refill_per_sec: f64,
    /// Leaky-bucket capacity.
    pub rate_limit_capacity: u32,
    /// Window over which repeated rate-limit violations accumulate before
    /// the session is torn down with `RateExceeded`.
    pub rate_limit_violation_window: Duration,
    /// Violations within `rate_limit_violation_window` tolerated before teardown.
    pub rate_limit_violation_budget: u32,
    /// Cap on a blocked `get`-family call.
    pub get_reply_timeout: Duration,
    /// Base directory file-backed templates are resolved against.
    pub template_root: PathBuf,
    /// Substrings that cause `evaluate_script` to fail with `ScriptBlocked`.
    pub script_deny_list: Vec<String>,
    /// Handler faults tolerated per session before... nothing; per §7 a
    /// `HandlerFault` never tears a session down, but the budget is still
    /// tracked so applications/diagnostics can observe a misbehaving component.
    pub handler_fault_budget: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_payload_bytes: 64 * 1024,
            rate_limit_refill_per_sec: 1.0,
            rate_limit_capacity: 5,
            rate_limit_violation_window: Duration::from_secs(10),
            rate_limit_violation_budget: 3,
            get_reply_timeout: Duration::from_secs(5),
            template_root: PathBuf::from("templates"),
            script_deny_list: default_script_deny_list(),
            handler_fault_budget: 50,
        }
    }
}

impl Config {
    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn with_rate_limit(mut self, refill_per_sec: f64, capacity: u32) -> Self {
        self.rate_limit_refill_per_sec = refill_per_sec;
        self.rate_limit_capacity = capacity;
        self
    }

    pub fn with_get_reply_timeout(mut self, timeout: Duration) -> Self {
        self.get_reply_timeout = timeout;
        self
    }

    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = root.into();
        self
    }

    pub fn with_script_deny_list(mut self, deny_list: Vec<String>) -> Self {
        self.script_deny_list = deny_list;
        self
    }
}

fn default_script_deny_list() -> Vec<String> {
    [
        "document.write",
        "document.writeln",
        "eval(",
        "Function(",
        "innerHTML",
        "outerHTML",
        "execScript",
        "<script",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.max_payload_bytes > 0);
        assert!(config.rate_limit_capacity > 0);
        assert!(!config.script_deny_list.is_empty());
    }

    #[test]
    fn builder_overrides_apply() {
        let config = Config::default()
            .with_max_payload_bytes(1024)
            .with_rate_limit(2.0, 10)
            .with_template_root("assets/templates");
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.rate_limit_capacity, 10);
        assert_eq!(config.template_root, PathBuf::from("assets/templates"));
    }
}
