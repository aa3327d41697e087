/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! General component-driver infrastructure.
//!
//! Grounded on this workspace's actor-registry pattern: a dynamically typed
//! `ActorRegistry` holds `Box<dyn Actor + Send>` and downcasts through `Any`
//! to recover the concrete type on demand. Here every live component in a
//! session is similarly stored behind a single object-safe [`AnyDriver`]
//! trait (rather than threading a generic component type through the
//! session and room layers), while the concrete, generic [`DriverCell<C>`]
//! holds the strongly typed component value, its handler table, and its
//! children.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::LiveViewError;
use crate::id::ComponentId;
use crate::protocol::{Command, EventPayload, GetSubType};
use crate::session::SessionHandle;
use crate::template::TemplateSource;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The user-defined payload behind a driver: state plus render plus
/// handlers. No language-prescribed shape beyond those two capabilities —
/// handlers are registered dynamically through [`DriverHandle::set_event_handler`],
/// not as trait methods, since a component's event vocabulary is not known
/// until runtime.
pub trait Component: Send + 'static {
    /// Pure function of the component's current state plus its own
    /// identifier (injected so the template can reference it, e.g. to wire
    /// up `onclick="send('<id>', 'Click')"`).
    fn render(&self, id: &ComponentId) -> String;

    /// Called once, after the driver is registered in the session's table,
    /// before any event can reach it. Usually issues the initial render via
    /// `handle.commit()`. Default does nothing (a component that is purely
    /// reactive to explicit driver calls from its parent needs no entry work).
    fn mounted(&mut self, handle: &DriverHandle) {
        let _ = handle;
    }
}

/// Outcome of routing one inbound event to a driver's handler table.
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered for this event name; the caller logs a warning and drops it.
    NoHandler,
}

type HandlerFn = dyn Fn(DriverHandle, EventPayload) -> BoxFuture<'static, Result<(), LiveViewError>>
    + Send
    + Sync;

/// Object-safe face of a driver, used for session-wide storage, parent/child
/// traversal, and dynamic dispatch, independent of the concrete component type.
pub trait AnyDriver: Send + Sync {
    fn id(&self) -> &ComponentId;
    fn children(&self) -> &RwLock<FxHashMap<ComponentId, Arc<dyn AnyDriver>>>;
    fn render(self: Arc<Self>) -> BoxFuture<'static, String>;
    fn dispatch_event(
        self: Arc<Self>,
        event_name: String,
        payload: EventPayload,
    ) -> BoxFuture<'static, Result<DispatchOutcome, LiveViewError>>;
    fn set_handler(&self, name: String, handler: Arc<HandlerFn>);
    fn as_any(&self) -> &dyn Any;
}

/// Wraps one component instance. See the data model: a back-reference to the
/// owning session, a handler table, a children map, and an optional template.
pub struct DriverCell<C: Component> {
    id: ComponentId,
    session: SessionHandle,
    template: Option<TemplateSource>,
    handlers: RwLock<HashMap<String, Arc<HandlerFn>>>,
    children: RwLock<FxHashMap<ComponentId, Arc<dyn AnyDriver>>>,
    component: AsyncMutex<C>,
}

impl<C: Component> DriverCell<C> {
    pub fn new(
        id: ComponentId,
        session: SessionHandle,
        component: C,
        template: Option<TemplateSource>,
    ) -> Arc<Self> {
        Arc::new(DriverCell {
            id,
            session,
            template,
            handlers: RwLock::new(HashMap::new()),
            children: RwLock::new(FxHashMap::default()),
            component: AsyncMutex::new(component),
        })
    }

    pub fn template(&self) -> Option<&TemplateSource> {
        self.template.as_ref()
    }

    fn handle(self: &Arc<Self>) -> DriverHandle {
        DriverHandle {
            id: self.id.clone(),
            session: self.session.clone(),
            owner: Arc::downgrade(&(self.clone() as Arc<dyn AnyDriver>)),
        }
    }

    pub(crate) async fn invoke_mounted(self: &Arc<Self>) {
        let handle = self.handle();
        let mut component = self.component.lock().await;
        component.mounted(&handle);
    }
}

impl<C: Component> AnyDriver for DriverCell<C> {
    fn id(&self) -> &ComponentId {
        &self.id
    }

    fn children(&self) -> &RwLock<FxHashMap<ComponentId, Arc<dyn AnyDriver>>> {
        &self.children
    }

    fn render(self: Arc<Self>) -> BoxFuture<'static, String> {
        Box::pin(async move {
            let component = self.component.lock().await;
            component.render(&self.id)
        })
    }

    fn dispatch_event(
        self: Arc<Self>,
        event_name: String,
        payload: EventPayload,
    ) -> BoxFuture<'static, Result<DispatchOutcome, LiveViewError>> {
        Box::pin(async move {
            let handler = self.handlers.read().get(&event_name).cloned();
            let Some(handler) = handler else {
                return Ok(DispatchOutcome::NoHandler);
            };
            let handle = self.handle();
            // A handler that propagates an error (rather than handling it
            // itself) is a fault, never a session-fatal condition — errors
            // like `ScriptBlocked`/`IdentifierConflict` are meant to be
            // decided by the handler, not escalated by the dispatcher.
            if let Err(e) = handler(handle, payload).await {
                return Err(LiveViewError::HandlerFault {
                    component: self.id.clone(),
                    message: e.to_string(),
                });
            }
            Ok(DispatchOutcome::Handled)
        })
    }

    fn set_handler(&self, name: String, handler: Arc<HandlerFn>) {
        self.handlers.write().insert(name, handler);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle passed to `mounted`, to handler closures, and to background tasks
/// a component spawns. Cheap to clone; carries a weak back-reference to the
/// driver it was minted from so `mount_child`/`set_event_handler` can reach
/// its children map and handler table without the caller needing to know
/// the component's concrete type.
#[derive(Clone)]
pub struct DriverHandle {
    id: ComponentId,
    session: SessionHandle,
    owner: Weak<dyn AnyDriver>,
}

impl DriverHandle {
    /// Builds a handle for an already-erased driver, for callers (the
    /// session manager, rooms) that hold an `Arc<dyn AnyDriver>` rather than
    /// the concrete `DriverCell<C>`.
    pub(crate) fn for_root(owner: Arc<dyn AnyDriver>, session: SessionHandle) -> Self {
        DriverHandle {
            id: owner.id().clone(),
            session,
            owner: Arc::downgrade(&owner),
        }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn session_id(&self) -> crate::id::SessionId {
        self.session.id()
    }

    fn owner(&self) -> Result<Arc<dyn AnyDriver>, LiveViewError> {
        self.owner.upgrade().ok_or(LiveViewError::SessionGone)
    }

    /// Attaches a child driver under this one and registers it in the
    /// session's table. Fails with `IdentifierConflict` if the id is in use.
    /// Invokes the child's lifecycle entry point, then performs its initial
    /// render — mounting never renders by itself, the entry point does.
    pub async fn mount_child<NewC: Component>(
        &self,
        id: ComponentId,
        component: NewC,
        template: Option<TemplateSource>,
    ) -> Result<DriverHandle, LiveViewError> {
        let child = DriverCell::new(id.clone(), self.session.clone(), component, template);
        let erased: Arc<dyn AnyDriver> = child.clone();
        {
            let mut table = self.session.table().write();
            if table.contains_key(&id) {
                return Err(LiveViewError::IdentifierConflict(id));
            }
            table.insert(id.clone(), erased.clone());
        }
        if let Ok(owner) = self.owner() {
            owner.children().write().insert(id.clone(), erased.clone());
        }
        child.invoke_mounted().await;
        let child_handle = child.handle();
        child_handle.commit().await?;
        Ok(child_handle)
    }

    /// Re-renders the component and emits a `fill` command for its own root
    /// element. Idempotent: byte-identical output still emits the command.
    pub async fn commit(&self) -> Result<(), LiveViewError> {
        let owner = self.owner()?;
        let html = owner.render().await;
        self.session.send_command(Command::Fill {
            id: self.id.clone(),
            value: html,
        })
    }

    pub fn fill(&self, target: &ComponentId, html: impl Into<String>) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Fill {
            id: target.clone(),
            value: html.into(),
        })
    }

    pub fn set_text(&self, target: &ComponentId, text: impl Into<String>) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Text {
            id: target.clone(),
            value: text.into(),
        })
    }

    /// Sets an input-like element's `value` directly, distinct from `fill`'s
    /// innerHTML replacement.
    pub fn set_value(&self, target: &ComponentId, value: impl Into<String>) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Set {
            id: target.clone(),
            value: value.into(),
        })
    }

    pub fn set_style(
        &self,
        target: &ComponentId,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Style {
            id: target.clone(),
            propertie: property.into(),
            value: value.into(),
        })
    }

    pub fn set_property(
        &self,
        target: &ComponentId,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Propertie {
            id: target.clone(),
            propertie: property.into(),
            value: value.into(),
        })
    }

    pub fn set_attribute(
        &self,
        target: &ComponentId,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Attribute {
            id: target.clone(),
            propertie: attribute.into(),
            value: value.into(),
        })
    }

    pub fn remove(&self, target: &ComponentId) -> Result<(), LiveViewError> {
        self.session.send_command(Command::Remove { id: target.clone() })
    }

    pub fn add_node(&self, target: &ComponentId, html: impl Into<String>) -> Result<(), LiveViewError> {
        self.session.send_command(Command::AddNode {
            id: target.clone(),
            value: html.into(),
        })
    }

    /// Routes `source` through the safety layer's script policy before
    /// emitting a `script` command. Fails with `ScriptBlocked` and emits
    /// nothing on rejection.
    pub fn evaluate_script(&self, source: impl Into<String>) -> Result<(), LiveViewError> {
        let source = source.into();
        self.session.script_policy().check(&source)?;
        self.session.send_command(Command::Script { value: source })
    }

    pub async fn get_value(&self, target: &ComponentId) -> Result<String, LiveViewError> {
        self.get(target, GetSubType::Value).await
    }

    pub async fn get_property(&self, target: &ComponentId, name: &str) -> Result<String, LiveViewError> {
        self.get_named(target, GetSubType::Propertie, name).await
    }

    pub async fn get_html(&self, target: &ComponentId) -> Result<String, LiveViewError> {
        self.get(target, GetSubType::Html).await
    }

    pub async fn get_style(&self, target: &ComponentId, name: &str) -> Result<String, LiveViewError> {
        self.get_named(target, GetSubType::Style, name).await
    }

    pub async fn get_attribute(&self, target: &ComponentId, name: &str) -> Result<String, LiveViewError> {
        self.get_named(target, GetSubType::Attribute, name).await
    }

    async fn get(&self, target: &ComponentId, sub_type: GetSubType) -> Result<String, LiveViewError> {
        self.session.get(target.clone(), sub_type, None).await
    }

    async fn get_named(
        &self,
        target: &ComponentId,
        sub_type: GetSubType,
        name: &str,
    ) -> Result<String, LiveViewError> {
        self.session.get(target.clone(), sub_type, Some(name.to_string())).await
    }

    /// Installs an event handler. Replacing an existing name is allowed.
    pub fn set_event_handler<F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<(), LiveViewError>
    where
        F: Fn(DriverHandle, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), LiveViewError>> + Send + 'static,
    {
        let owner = self.owner()?;
        let boxed: Arc<HandlerFn> = Arc::new(move |handle, payload| {
            Box::pin(handler(handle, payload)) as BoxFuture<'static, Result<(), LiveViewError>>
        });
        owner.set_handler(name.into(), boxed);
        Ok(())
    }

    /// Spawns a cooperative background task (clock ticks, timers,
    /// collaborative notifications) that observes this session's
    /// cancellation signal. The task communicates with the component only
    /// through this handle, per the design note on background tasks.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancelled = self.session.cancellation();
        tokio::task::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = future => {}
            }
        })
    }

    /// Whether the owning session has been torn down. Background tasks
    /// should poll or select on this to stop promptly.
    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled()
    }
}
