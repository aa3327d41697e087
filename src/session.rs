/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Session manager: owns the process-wide table of live sessions, routes
//! inbound events to the right driver, and pumps outbound commands back to
//! each connection.
//!
//! Grounded on this workspace's registry-plus-per-connection-worker shape:
//! a single process-wide table guarded by a synchronous lock (never held
//! across an `.await`), with a cheap, cloneable handle type threaded through
//! everything that needs to reach back into a session (drivers, rooms,
//! background tasks) instead of passing the registry itself around.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::config::Config;
use crate::driver::{AnyDriver, Component, DriverCell};
use crate::error::LiveViewError;
use crate::id::{ComponentId, RequestId, SessionId};
use crate::protocol::{Command, EventEnvelope, GetSubType};
use crate::room::RoomRegistry;
use crate::safety::{self, RateLimiter, ScriptPolicy};
use crate::template::{TemplateLoader, TemplateSource};

/// Cooperative cancellation signal for a torn-down session. Not backed by a
/// dedicated crate: `Notify` plus a flag is the whole of what's needed, and
/// this workspace reaches for a crate only when the hand-rolled version
/// would grow real state machinery.
#[derive(Clone)]
pub struct CancellationToken {
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    fn new() -> Self {
        CancellationToken {
            notify: Arc::new(Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

type DriverTable = Arc<RwLock<FxHashMap<ComponentId, Arc<dyn AnyDriver>>>>;
type PendingTable = Arc<Mutex<HashMap<RequestId, oneshot::Sender<String>>>>;

struct SessionInner {
    id: SessionId,
    table: DriverTable,
    outbound: mpsc::UnboundedSender<Command>,
    /// Free-form channel for application use — rooms deliver presence and
    /// broadcast traffic here rather than on the mutation-command sink.
    app_events: mpsc::UnboundedSender<serde_json::Value>,
    pending: PendingTable,
    rate_limiter: Mutex<RateLimiter>,
    script_policy: Arc<ScriptPolicy>,
    template_loader: Arc<TemplateLoader>,
    cancellation: CancellationToken,
    get_reply_timeout: Duration,
    max_payload_bytes: usize,
    /// Handler faults never tear a session down; this is tracked purely so
    /// applications/diagnostics can observe a misbehaving component.
    handler_faults: AtomicU32,
}

/// Cheap, cloneable reference to a live session. Drivers, rooms, and
/// background tasks hold this rather than the session or the manager.
#[derive(Clone)]
pub struct SessionHandle(Arc<SessionInner>);

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.0.id
    }

    pub(crate) fn table(&self) -> &RwLock<FxHashMap<ComponentId, Arc<dyn AnyDriver>>> {
        &self.0.table
    }

    pub fn template_loader(&self) -> &Arc<TemplateLoader> {
        &self.0.template_loader
    }

    pub fn script_policy(&self) -> &ScriptPolicy {
        &self.0.script_policy
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.0.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancellation.is_cancelled()
    }

    /// Count of handler faults observed so far. Monotonic; never reset.
    pub fn handler_fault_count(&self) -> u32 {
        self.0.handler_faults.load(Ordering::Relaxed)
    }

    pub(crate) fn send_command(&self, command: Command) -> Result<(), LiveViewError> {
        self.0
            .outbound
            .send(command)
            .map_err(|_| LiveViewError::SessionGone)
    }

    /// Delivers one value on this session's free-form application channel.
    /// Silently dropped if the session's receiver end has already been
    /// dropped — a room fanning out to a session mid-teardown is not an error.
    pub fn send_app_event(&self, value: serde_json::Value) {
        let _ = self.0.app_events.send(value);
    }

    /// Issues a `get` query, blocks the caller until the matching reply
    /// arrives (or the configured timeout elapses, or the session is torn
    /// down), and returns the value the client reported.
    pub(crate) async fn get(
        &self,
        target: ComponentId,
        sub_type: GetSubType,
        name: Option<String>,
    ) -> Result<String, LiveViewError> {
        let id_ret = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.0.pending.lock().insert(id_ret, tx);
        if let Err(e) = self.send_command(Command::Get {
            id: target,
            sub_type,
            id_ret,
            value: name,
        }) {
            self.0.pending.lock().remove(&id_ret);
            return Err(e);
        }
        let cancelled = self.cancellation();
        tokio::select! {
            result = tokio::time::timeout(self.0.get_reply_timeout, rx) => {
                match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(_)) => Err(LiveViewError::SessionGone),
                    Err(_) => {
                        self.0.pending.lock().remove(&id_ret);
                        Err(LiveViewError::Timeout)
                    }
                }
            }
            _ = cancelled.cancelled() => {
                self.0.pending.lock().remove(&id_ret);
                Err(LiveViewError::SessionGone)
            }
        }
    }

    fn resolve_pending(&self, id_ret: RequestId, value: String) {
        if let Some(tx) = self.0.pending.lock().remove(&id_ret) {
            let _ = tx.send(value);
        }
    }

    fn fail_all_pending(&self) {
        for (_, tx) in self.0.pending.lock().drain() {
            drop(tx);
        }
    }

    /// Validates, rate-limits, and routes one inbound frame: either resolves
    /// a waiting `get` call, or dispatches an event to the target driver.
    /// Errors from this call are always session-fatal; the caller is
    /// responsible for tearing the session down.
    pub async fn dispatch_inbound(&self, raw: &str) -> Result<(), LiveViewError> {
        if raw.len() > self.0.max_payload_bytes {
            return Err(LiveViewError::ProtocolError(format!(
                "payload of {} bytes exceeds ceiling of {} bytes",
                raw.len(),
                self.0.max_payload_bytes
            )));
        }
        let envelope: EventEnvelope = serde_json::from_str(raw)
            .map_err(|e| LiveViewError::ProtocolError(format!("malformed envelope: {e}")))?;
        safety::validate_event(&envelope, raw.len(), self.0.max_payload_bytes)?;

        let admitted = self.0.rate_limiter.lock().admit(Instant::now()).map_err(|_| {
            LiveViewError::RateExceeded {
                session: self.id().to_string(),
            }
        })?;
        if !admitted {
            return Ok(());
        }

        if let Some(_kind) = envelope.get_reply_kind() {
            if let Some(id_ret) = envelope.id_ret {
                let value = envelope
                    .payload()
                    .as_text()
                    .map(str::to_owned)
                    .unwrap_or_else(|| envelope.data.to_string());
                self.resolve_pending(id_ret, value);
                return Ok(());
            }
        }

        let Some(target_id) = envelope.id.clone() else {
            return Err(LiveViewError::ProtocolError(
                "event envelope missing target component id".to_string(),
            ));
        };
        let driver = self.0.table.read().get(&target_id).cloned();
        let Some(driver) = driver else {
            tracing::warn!(target = %target_id, event = %envelope.event, "event for unknown component dropped");
            return Ok(());
        };
        match driver.dispatch_event(envelope.event.clone(), envelope.payload()).await {
            Ok(crate::driver::DispatchOutcome::NoHandler) => {
                tracing::warn!(target = %target_id, event = %envelope.event, "no handler registered, event dropped");
                Ok(())
            }
            Ok(crate::driver::DispatchOutcome::Handled) => Ok(()),
            Err(LiveViewError::HandlerFault { component, message }) => {
                self.0.handler_faults.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%component, %message, "handler fault");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}

/// A live connection: the handle plus bookkeeping the manager needs to tear
/// it down. Most callers only ever touch [`SessionHandle`].
pub struct Session {
    handle: SessionHandle,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }
}

/// Result of accepting a new connection: the session handle, the mounted
/// root driver (type-erased — the manager is generic over the root
/// component only for the duration of this call), and the outbound command
/// stream to forward to the client transport.
pub struct AcceptedSession {
    pub handle: SessionHandle,
    pub root: Arc<dyn AnyDriver>,
    pub outbound: mpsc::UnboundedReceiver<Command>,
    pub app_events: mpsc::UnboundedReceiver<serde_json::Value>,
}

/// Process-wide registry of live sessions.
pub struct SessionManager {
    config: Arc<Config>,
    template_loader: Arc<TemplateLoader>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    rooms: Arc<RoomRegistry>,
}

impl SessionManager {
    pub fn new(config: Arc<Config>) -> Self {
        let template_loader = Arc::new(TemplateLoader::new(config.template_root.clone()));
        SessionManager {
            config,
            template_loader,
            sessions: RwLock::new(HashMap::new()),
            rooms: Arc::new(RoomRegistry::new()),
        }
    }

    pub fn session(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Accepts a new connection, mounts `root_component` as the root driver,
    /// and performs its initial render. The returned outbound receiver must
    /// be pumped by the caller's transport loop.
    pub async fn accept_connection<C: Component>(
        &self,
        root_id: ComponentId,
        root_component: C,
        template: Option<TemplateSource>,
    ) -> Result<AcceptedSession, LiveViewError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            id: SessionId::new(),
            table: Arc::new(RwLock::new(FxHashMap::default())),
            outbound: outbound_tx,
            app_events: app_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            rate_limiter: Mutex::new(RateLimiter::new(
                self.config.rate_limit_capacity,
                self.config.rate_limit_refill_per_sec,
                self.config.rate_limit_violation_window,
                self.config.rate_limit_violation_budget,
            )),
            script_policy: Arc::new(ScriptPolicy::new(self.config.script_deny_list.clone())),
            template_loader: self.template_loader.clone(),
            cancellation: CancellationToken::new(),
            get_reply_timeout: self.config.get_reply_timeout,
            max_payload_bytes: self.config.max_payload_bytes,
            handler_faults: AtomicU32::new(0),
        });
        let handle = SessionHandle(inner);
        self.sessions.write().insert(handle.id(), handle.clone());

        let root = DriverCell::new(root_id.clone(), handle.clone(), root_component, template);
        let erased: Arc<dyn AnyDriver> = root.clone();
        handle.table().write().insert(root_id, erased.clone());
        root.invoke_mounted().await;

        let root_handle = crate::driver::DriverHandle::for_root(erased.clone(), handle.clone());
        root_handle.commit().await?;

        Ok(AcceptedSession {
            handle,
            root: erased,
            outbound: outbound_rx,
            app_events: app_rx,
        })
    }

    /// Tears a session down: cancels background tasks, fails any in-flight
    /// `get` calls with `SessionGone`, removes it from every room, and drops
    /// its component table. Idempotent.
    pub async fn teardown(&self, session_id: SessionId) {
        let handle = self.sessions.write().remove(&session_id);
        if let Some(handle) = handle {
            handle.0.cancellation.cancel();
            handle.fail_all_pending();
            self.rooms.leave_all(session_id);
            handle.table().write().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Component;

    struct Flaky;
    impl Component for Flaky {
        fn render(&self, id: &ComponentId) -> String {
            format!("<div id=\"{id}\"></div>")
        }

        fn mounted(&mut self, handle: &crate::driver::DriverHandle) {
            handle
                .set_event_handler("Fail", |_handle, _payload| async move {
                    Err(LiveViewError::ProtocolError("boom".to_string()))
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn handler_fault_is_captured_and_session_survives() {
        let manager = SessionManager::new(Arc::new(Config::default()));
        let accepted = manager
            .accept_connection(ComponentId::new("root").unwrap(), Flaky, None)
            .await
            .unwrap();
        let handle = accepted.handle;
        let mut outbound = accepted.outbound;
        outbound.recv().await.unwrap(); // drain the initial fill

        let raw = serde_json::json!({
            "type": "data",
            "event": "Fail",
            "id": "root",
            "data": null,
        })
        .to_string();

        assert!(handle.dispatch_inbound(&raw).await.is_ok());
        assert_eq!(handle.handler_fault_count(), 1);
        assert!(manager.session(handle.id()).is_some());
    }

    #[tokio::test]
    async fn unknown_event_name_is_dropped_without_error() {
        let manager = SessionManager::new(Arc::new(Config::default()));
        let accepted = manager
            .accept_connection(ComponentId::new("root").unwrap(), Flaky, None)
            .await
            .unwrap();
        let mut outbound = accepted.outbound;
        outbound.recv().await.unwrap();

        let raw = serde_json::json!({
            "type": "data",
            "event": "NoSuchHandler",
            "id": "root",
            "data": null,
        })
        .to_string();

        assert!(accepted.handle.dispatch_inbound(&raw).await.is_ok());
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_protocol_error() {
        let manager = SessionManager::new(Arc::new(Config::default()));
        let accepted = manager
            .accept_connection(ComponentId::new("root").unwrap(), Flaky, None)
            .await
            .unwrap();
        let result = accepted.handle.dispatch_inbound("not json").await;
        assert!(matches!(result, Err(LiveViewError::ProtocolError(_))));
    }
}
