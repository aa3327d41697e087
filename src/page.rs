/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Page controller: binds a URL path to a root-component factory, serves
//! the initial HTML shell, and hands channel upgrades off to the session
//! manager.
//!
//! The concrete HTTP router and WebSocket library are external
//! collaborators; this module only decides what to serve and who to call,
//! the same division this workspace draws between its server loop (accept,
//! spawn, dispatch) and the transport it runs on top of.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::driver::{BoxFuture, Component};
use crate::error::LiveViewError;
use crate::id::ComponentId;
use crate::session::{AcceptedSession, SessionManager};

/// A nullary constructor for a fresh root component. Factories must not
/// share mutable state across invocations — any shared state belongs in a
/// room.
pub trait RouteFactory: Send + Sync {
    fn mount<'a>(
        &'a self,
        manager: &'a SessionManager,
        root_id: ComponentId,
    ) -> BoxFuture<'a, Result<AcceptedSession, LiveViewError>>;
}

impl<F, C> RouteFactory for F
where
    F: Fn() -> C + Send + Sync,
    C: Component,
{
    fn mount<'a>(
        &'a self,
        manager: &'a SessionManager,
        root_id: ComponentId,
    ) -> BoxFuture<'a, Result<AcceptedSession, LiveViewError>> {
        Box::pin(async move { manager.accept_connection(root_id, (self)(), None).await })
    }
}

/// Shell-rendering knobs for one registered route. Distinct from
/// [`crate::config::Config`], which governs the session/safety layer — these
/// are presentation details the page controller owns outright.
#[derive(Clone, Debug)]
pub struct ShellOptions {
    pub title: String,
    pub lang: String,
    pub mount_target_id: String,
    pub client_runtime_asset_url: String,
    pub upgrade_path_suffix: String,
}

impl Default for ShellOptions {
    fn default() -> Self {
        ShellOptions {
            title: "Live View".to_string(),
            lang: "en".to_string(),
            mount_target_id: "app".to_string(),
            client_runtime_asset_url: "/assets/runtime.js".to_string(),
            upgrade_path_suffix: "/ws".to_string(),
        }
    }
}

struct Route {
    factory: Arc<dyn RouteFactory>,
    shell: ShellOptions,
}

/// Binds registered paths to factories and owns the session manager they
/// mount into.
pub struct PageController {
    sessions: Arc<SessionManager>,
    routes: RwLock<HashMap<String, Route>>,
}

impl PageController {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        PageController {
            sessions,
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn register(&self, path: impl Into<String>, factory: impl RouteFactory + 'static, shell: ShellOptions) {
        self.routes.write().insert(
            path.into(),
            Route {
                factory: Arc::new(factory),
                shell,
            },
        );
    }

    /// Renders the HTML shell for `path`, or `None` if no route is bound there.
    pub fn render_shell(&self, path: &str) -> Option<String> {
        let routes = self.routes.read();
        let route = routes.get(path)?;
        Some(render_shell_html(path, &route.shell))
    }

    /// Hands an accepted channel upgrade on `path` to the bound factory,
    /// mounting a fresh root component under `root_id`.
    pub async fn upgrade(
        &self,
        path: &str,
        root_id: ComponentId,
    ) -> Result<AcceptedSession, LiveViewError> {
        let factory = {
            let routes = self.routes.read();
            routes
                .get(path)
                .map(|route| route.factory.clone())
                .ok_or_else(|| LiveViewError::ProtocolError(format!("no route registered for {path}")))?
        };
        factory.mount(&self.sessions, root_id).await
    }
}

fn render_shell_html(path: &str, shell: &ShellOptions) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"{lang}\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <script src=\"{asset}\" defer></script>\n\
         </head>\n\
         <body>\n\
         <div id=\"{mount}\" data-upgrade-url=\"{path}{suffix}\"></div>\n\
         </body>\n\
         </html>\n",
        lang = shell.lang,
        title = shell.title,
        asset = shell.client_runtime_asset_url,
        mount = shell.mount_target_id,
        path = path,
        suffix = shell.upgrade_path_suffix,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct Hello;
    impl Component for Hello {
        fn render(&self, id: &ComponentId) -> String {
            format!("<div id=\"{id}\">hello</div>")
        }
    }

    #[test]
    fn shell_embeds_mount_target_asset_url_and_upgrade_path() {
        let controller = PageController::new(Arc::new(SessionManager::new(Arc::new(Config::default()))));
        controller.register("/home", || Hello, ShellOptions::default());
        let html = controller.render_shell("/home").unwrap();
        assert!(html.contains("id=\"app\""));
        assert!(html.contains("/assets/runtime.js"));
        assert!(html.contains("data-upgrade-url=\"/home/ws\""));
    }

    #[test]
    fn unregistered_path_has_no_shell() {
        let controller = PageController::new(Arc::new(SessionManager::new(Arc::new(Config::default()))));
        assert!(controller.render_shell("/missing").is_none());
    }

    #[tokio::test]
    async fn upgrade_mounts_a_fresh_root_for_each_call() {
        let controller = PageController::new(Arc::new(SessionManager::new(Arc::new(Config::default()))));
        controller.register("/home", || Hello, ShellOptions::default());
        let first = controller
            .upgrade("/home", ComponentId::new("root").unwrap())
            .await
            .unwrap();
        let second = controller
            .upgrade("/home", ComponentId::new("root").unwrap())
            .await
            .unwrap();
        assert_ne!(first.handle.id(), second.handle.id());
    }

    #[tokio::test]
    async fn upgrade_on_unregistered_path_fails() {
        let controller = PageController::new(Arc::new(SessionManager::new(Arc::new(Config::default()))));
        let result = controller.upgrade("/missing", ComponentId::new("root").unwrap()).await;
        assert!(result.is_err());
    }
}
