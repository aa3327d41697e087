/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Safety layer: inbound event validation, per-session rate limiting, the
//! script allow/deny policy for `evaluate_script`, and HTML sanitization for
//! application code embedding untrusted text.
//!
//! Path-traversal-safe template resolution lives in [`crate::template`]; it
//! is grounded on the same "never trust a caller-supplied path" posture but
//! belongs with the loader that owns the filesystem, not here.

use std::time::{Duration, Instant};

use crate::error::LiveViewError;
use crate::protocol::EventEnvelope;

/// Matches the allowed character class for event names: letters, digits,
/// dot, underscore, dash.
fn is_valid_token(token: &str, max_len: usize) -> bool {
    !token.is_empty()
        && token.len() <= max_len
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

const MAX_EVENT_NAME_LEN: usize = 128;
const MAX_COMPONENT_ID_LEN: usize = 128;

/// Validates a raw inbound envelope against the event-name character class,
/// the configured payload byte ceiling, and — checking raw bytes first since
/// it's the cheapest rejection — the component-id character class.
/// Violations are always fatal to the session (`ProtocolError`).
pub fn validate_event(envelope: &EventEnvelope, raw_len: usize, max_payload_bytes: usize) -> Result<(), LiveViewError> {
    if raw_len > max_payload_bytes {
        return Err(LiveViewError::ProtocolError(format!(
            "payload of {raw_len} bytes exceeds ceiling of {max_payload_bytes} bytes"
        )));
    }
    if !is_valid_token(&envelope.event, MAX_EVENT_NAME_LEN) {
        return Err(LiveViewError::ProtocolError(format!(
            "invalid event name: \"{}\"",
            envelope.event
        )));
    }
    // ComponentId::new already enforces the DOM-id character class (which
    // allows ':', unlike event names); re-validate only the length here so a
    // crafted raw id can't bypass that ceiling before a table lookup.
    if let Some(id) = &envelope.id {
        if id.as_str().is_empty() || id.as_str().len() > MAX_COMPONENT_ID_LEN {
            return Err(LiveViewError::ProtocolError(format!("invalid component id: \"{id}\"")));
        }
    }
    Ok(())
}

/// Per-session leaky-bucket rate limiter over inbound events.
///
/// Exceeding the bucket drops the offending event and counts it; repeated
/// exceedance within `violation_window` tears the session down with
/// `RateExceeded`. Modeled as a token bucket: `tokens` drains by one per
/// accepted event and refills continuously at `refill_per_sec`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
    violation_window: Duration,
    violation_budget: u32,
    violations: Vec<Instant>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64, violation_window: Duration, violation_budget: u32) -> Self {
        RateLimiter {
            capacity: capacity as f64,
            refill_per_sec,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            violation_window,
            violation_budget,
            violations: Vec::new(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Returns `Ok(true)` if the event is accepted, `Ok(false)` if it should
    /// be dropped (bucket empty, but the session survives), or `Err` if
    /// repeated violations within the window mean the session must be torn down.
    pub fn admit(&mut self, now: Instant) -> Result<bool, LiveViewError> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(true);
        }
        self.violations.retain(|&t| now.duration_since(t) <= self.violation_window);
        self.violations.push(now);
        if self.violations.len() as u32 > self.violation_budget {
            return Err(LiveViewError::RateExceeded { session: String::new() });
        }
        Ok(false)
    }
}

/// Deny-list based policy for `evaluate_script`. Denied sources fail the
/// call with `ScriptBlocked`; allowed sources are forwarded verbatim.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    deny_list: Vec<String>,
}

impl ScriptPolicy {
    pub fn new(deny_list: Vec<String>) -> Self {
        ScriptPolicy { deny_list }
    }

    pub fn check(&self, source: &str) -> Result<(), LiveViewError> {
        for needle in &self.deny_list {
            if source.contains(needle.as_str()) {
                return Err(LiveViewError::ScriptBlocked(format!(
                    "source matches denied substring \"{needle}\""
                )));
            }
        }
        Ok(())
    }
}

/// Escapes text for safe embedding into HTML. Application code uses this to
/// interpolate untrusted strings into a rendered template; it is not used
/// internally by the protocol codec, which never interprets component state.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ComponentId;
    use crate::protocol::EventKind;

    fn envelope(event: &str, id: &str) -> EventEnvelope {
        EventEnvelope {
            kind: EventKind::Data,
            id_ret: None,
            event: event.to_string(),
            id: Some(ComponentId::new(id).unwrap_or_else(|_| ComponentId::new("x").unwrap())),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn rejects_event_name_outside_character_class() {
        let bad = envelope("click me", "root");
        assert!(validate_event(&bad, 0, 1024).is_err());
    }

    #[test]
    fn accepts_well_formed_event() {
        let good = envelope("Click", "root");
        assert!(validate_event(&good, 0, 1024).is_ok());
    }

    #[test]
    fn payload_exactly_at_ceiling_is_accepted_and_ceiling_plus_one_rejected() {
        let e = envelope("Click", "root");
        assert!(validate_event(&e, 1024, 1024).is_ok());
        assert!(validate_event(&e, 1025, 1024).is_err());
    }

    #[test]
    fn rate_limiter_drops_after_bucket_empties_then_refills() {
        let mut limiter = RateLimiter::new(5, 1.0, Duration::from_secs(10), 100);
        let start = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.admit(start).unwrap(), true);
        }
        // bucket now empty; next event within the same instant is dropped, not fatal
        assert_eq!(limiter.admit(start).unwrap(), false);
        // after a full refill period, capacity is restored
        let later = start + Duration::from_secs(6);
        assert_eq!(limiter.admit(later).unwrap(), true);
    }

    #[test]
    fn rate_limiter_tears_down_session_after_repeated_violations() {
        let mut limiter = RateLimiter::new(1, 0.0, Duration::from_secs(10), 2);
        let now = Instant::now();
        assert_eq!(limiter.admit(now).unwrap(), true);
        assert_eq!(limiter.admit(now).unwrap(), false);
        assert_eq!(limiter.admit(now).unwrap(), false);
        assert!(limiter.admit(now).is_err());
    }

    #[test]
    fn script_policy_rejects_exact_deny_substring_and_accepts_near_miss() {
        let policy = ScriptPolicy::new(vec!["document.write".to_string()]);
        assert!(policy.check("document.write('x')").is_err());
        assert!(policy.check("document.writx('x')").is_ok());
    }

    #[test]
    fn sanitize_escapes_html_metacharacters() {
        assert_eq!(
            sanitize("<script>alert('hi')</script>"),
            "&lt;script&gt;alert(&#39;hi&#39;)&lt;/script&gt;"
        );
    }
}
