/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Core runtime for a server-rendered, component-based live view web
//! framework: browsers receive an HTML shell, upgrade to a persistent
//! bidirectional channel, and every DOM mutation thereafter is commanded by
//! server-side components in response to forwarded client events.
//!
//! Module map, leaves first:
//! - [`protocol`]: the wire shapes exchanged in both directions.
//! - [`safety`]: input validation, rate limiting, and the script policy.
//! - [`template`]: path-safe template resolution and caching.
//! - [`driver`]: component identity, state, event dispatch, and rendering.
//! - [`session`]: the per-connection driver graph and its teardown.
//! - [`room`]: named multi-session fan-out with shared state and presence.
//! - [`page`]: binds a URL path to a root-component factory.
//!
//! The concrete HTTP router, WebSocket library, and HTML templating engine
//! are external collaborators this crate relies on but does not define.

pub mod config;
pub mod driver;
pub mod error;
pub mod id;
pub mod page;
pub mod protocol;
pub mod room;
pub mod safety;
pub mod session;
pub mod template;

pub use config::Config;
pub use driver::{AnyDriver, Component, DispatchOutcome, DriverHandle};
pub use error::LiveViewError;
pub use id::{ComponentId, RequestId, SessionId};
pub use page::{PageController, RouteFactory, ShellOptions};
pub use protocol::{Command, EventEnvelope, EventPayload, GetSubType};
pub use room::{Room, RoomEvent, RoomRegistry};
pub use session::{AcceptedSession, Session, SessionHandle, SessionManager};
pub use template::{TemplateLoader, TemplateSource};
