/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Collaboration rooms: named multi-session fan-out over a shared state blob.
//!
//! Grounded on this workspace's network fan-out shape: a member table
//! guarded by a lock held only across the iteration that decides who to
//! notify, never across the send itself or any user code, the same posture
//! this crate's resource-availability broadcast uses when it walks its
//! stream table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::SessionId;
use crate::session::SessionHandle;

/// A message a room delivers to (some subset of) its members. Carried on
/// each session's free-form application channel, not the mutation-command
/// sink — rooms are collaboration plumbing, not DOM mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    #[serde(rename = "presence.join")]
    PresenceJoin {
        user_id: String,
        display: String,
        color: String,
    },
    #[serde(rename = "presence.leave")]
    PresenceLeave { user_id: String },
    #[serde(rename = "broadcast")]
    Broadcast {
        action: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "state.update")]
    StateUpdate { state: serde_json::Value, revision: u64 },
}

const PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe",
];

/// Deterministic, stable-across-process color assignment keyed on user id,
/// so the same user always lands on the same color without a lookup table.
fn color_for_user(user_id: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in user_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    PALETTE[(hash as usize) % PALETTE.len()].to_string()
}

struct Member {
    handle: SessionHandle,
    user_id: String,
    display: String,
    color: String,
}

struct RoomState {
    members: HashMap<SessionId, Member>,
    blob: serde_json::Value,
    revision: u64,
}

/// A named fan-out object. Holds no reference to the registry that created
/// it; membership and state both live behind a single lock since join,
/// leave, and sync all need a consistent view of "who gets notified".
pub struct Room {
    name: String,
    state: RwLock<RoomState>,
}

impl Room {
    fn new(name: impl Into<String>) -> Self {
        Room {
            name: name.into(),
            state: RwLock::new(RoomState {
                members: HashMap::new(),
                blob: serde_json::Value::Null,
                revision: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.state.read().members.contains_key(&session_id)
    }

    fn deliver(target: &SessionHandle, event: &RoomEvent) {
        if let Ok(value) = serde_json::to_value(event) {
            target.send_app_event(value);
        }
    }

    /// Registers `session` as a member, delivers the current state blob and
    /// revision to it directly, then notifies every other member.
    pub fn join(&self, session: SessionHandle, user_id: impl Into<String>, display: impl Into<String>) {
        let user_id = user_id.into();
        let display = display.into();
        let color = color_for_user(&user_id);
        let mut state = self.state.write();
        let joiner = session.clone();
        state.members.insert(
            session.id(),
            Member {
                handle: session,
                user_id: user_id.clone(),
                display: display.clone(),
                color: color.clone(),
            },
        );
        let snapshot = RoomEvent::StateUpdate {
            state: state.blob.clone(),
            revision: state.revision,
        };
        Self::deliver(&joiner, &snapshot);
        let announcement = RoomEvent::PresenceJoin { user_id, display, color };
        for member in state.members.values() {
            if member.handle.id() != joiner.id() {
                Self::deliver(&member.handle, &announcement);
            }
        }
    }

    /// Removes `session_id`, announcing `presence.leave` to the remaining
    /// members. Returns `true` if the room is now empty.
    pub fn leave(&self, session_id: SessionId) -> bool {
        let mut state = self.state.write();
        let Some(member) = state.members.remove(&session_id) else {
            return state.members.is_empty();
        };
        let announcement = RoomEvent::PresenceLeave { user_id: member.user_id };
        for member in state.members.values() {
            Self::deliver(&member.handle, &announcement);
        }
        state.members.is_empty()
    }

    /// Forwards `action`/`payload` to every member but `sender`. Delivery
    /// order relative to other broadcasts from the same sender is preserved
    /// because each member's app channel is itself FIFO.
    pub fn broadcast(&self, sender: SessionId, action: impl Into<String>, payload: serde_json::Value) {
        let event = RoomEvent::Broadcast {
            action: action.into(),
            payload,
        };
        let state = self.state.read();
        for member in state.members.values() {
            if member.handle.id() != sender {
                Self::deliver(&member.handle, &event);
            }
        }
    }

    /// Atomically replaces the shared state blob, bumps the revision, and
    /// announces `state.update` to every member including the sender.
    pub fn sync_state(&self, new_state: serde_json::Value) -> u64 {
        let mut state = self.state.write();
        state.blob = new_state.clone();
        state.revision += 1;
        let revision = state.revision;
        let event = RoomEvent::StateUpdate {
            state: new_state,
            revision,
        };
        for member in state.members.values() {
            Self::deliver(&member.handle, &event);
        }
        revision
    }
}

/// Process-wide table of rooms, created lazily on first join and dropped
/// once the last member leaves. A room holds no persistent storage, so
/// dropping it is simply discarding its state.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Joins `room_name`, creating it if absent. The registry's write lock is
    /// held across the join so a concurrent `leave` that empties this exact
    /// room can't evict it out from under the new member (see `leave`).
    pub fn join(
        &self,
        room_name: &str,
        session: SessionHandle,
        user_id: impl Into<String>,
        display: impl Into<String>,
    ) -> Arc<Room> {
        let mut rooms = self.rooms.write();
        let room = rooms
            .entry(room_name.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_name)))
            .clone();
        room.join(session, user_id, display);
        room
    }

    pub fn get(&self, room_name: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(room_name).cloned()
    }

    /// Removes `session_id` from `room_name`, evicting the room if it is now
    /// empty. Holds the registry's write lock across both the leave and the
    /// eviction check so a concurrent `join` can't land in the room between
    /// it emptying and being evicted.
    pub fn leave(&self, room_name: &str, session_id: SessionId) {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get(room_name).cloned() else {
            return;
        };
        if room.leave(session_id) {
            rooms.remove(room_name);
        }
    }

    /// Removes `session_id` from every room it participates in. Called from
    /// session teardown.
    pub fn leave_all(&self, session_id: SessionId) {
        let names: Vec<String> = self
            .rooms
            .read()
            .iter()
            .filter(|(_, room)| room.contains(session_id))
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            self.leave(&name, session_id);
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::Component;
    use crate::id::ComponentId;
    use crate::session::SessionManager;
    use std::sync::Arc as StdArc;

    struct Blank;
    impl Component for Blank {
        fn render(&self, id: &ComponentId) -> String {
            format!("<div id=\"{id}\"></div>")
        }
    }

    async fn session(manager: &SessionManager) -> (SessionHandle, tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>) {
        let accepted = manager
            .accept_connection(ComponentId::new("root").unwrap(), Blank, None)
            .await
            .unwrap();
        (accepted.handle, accepted.app_events)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member_but_sender_exactly_once() {
        let manager = SessionManager::new(StdArc::new(Config::default()));
        let (a, mut a_rx) = session(&manager).await;
        let (b, mut b_rx) = session(&manager).await;
        let (c, mut c_rx) = session(&manager).await;
        let registry = RoomRegistry::new();
        registry.join("r", a.clone(), "u1", "Alice");
        registry.join("r", b.clone(), "u2", "Bob");
        registry.join("r", c.clone(), "u3", "Carol");

        // drain the state.update + presence.join noise from joining
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}
        while c_rx.try_recv().is_ok() {}

        let room = registry.get("r").unwrap();
        room.broadcast(a.id(), "move", serde_json::json!({"card": "c1", "to": "done"}));

        assert!(a_rx.try_recv().is_err());
        let b_event = b_rx.recv().await.unwrap();
        assert_eq!(b_event["type"], "broadcast");
        let c_event = c_rx.recv().await.unwrap();
        assert_eq!(c_event["type"], "broadcast");
    }

    #[tokio::test]
    async fn revision_strictly_increases_and_late_joiner_sees_latest_state() {
        let manager = SessionManager::new(StdArc::new(Config::default()));
        let (a, _a_rx) = session(&manager).await;
        let registry = RoomRegistry::new();
        registry.join("r", a.clone(), "u1", "Alice");
        let room = registry.get("r").unwrap();
        let rev1 = room.sync_state(serde_json::json!({"x": 1}));
        let rev2 = room.sync_state(serde_json::json!({"x": 2}));
        assert!(rev2 > rev1);

        // a keeps the room alive; a late joiner reconciles from the snapshot,
        // not a round-trip to a.
        let (b, mut b_rx) = session(&manager).await;
        registry.join("r", b.clone(), "u2", "Bob");
        let snapshot = b_rx.recv().await.unwrap();
        assert_eq!(snapshot["type"], "state.update");
        assert_eq!(snapshot["revision"], rev2);
        assert_eq!(snapshot["state"]["x"], 2);
    }

    #[tokio::test]
    async fn state_is_discarded_once_the_last_member_leaves() {
        let manager = SessionManager::new(StdArc::new(Config::default()));
        let (a, _a_rx) = session(&manager).await;
        let registry = RoomRegistry::new();
        registry.join("r", a.clone(), "u1", "Alice");
        let room = registry.get("r").unwrap();
        room.sync_state(serde_json::json!({"x": 1}));
        registry.leave("r", a.id());
        assert!(registry.get("r").is_none());

        let (b, mut b_rx) = session(&manager).await;
        registry.join("r", b.clone(), "u2", "Bob");
        let snapshot = b_rx.recv().await.unwrap();
        assert_eq!(snapshot["state"], serde_json::Value::Null);
        assert_eq!(snapshot["revision"], 0);
    }
}
