use std::collections::HashMap;
use std::sync::Arc;

use crate::http::handler::{ContinueHandler, Handler, NotFoundHandler};
use crate::http::request::Request;

/// Picks the handler responsible for a request.
///
/// Implementations are shared across worker threads; richer routing
/// (capturing patterns, static content, authentication) plugs in here
/// without the core caring.
pub trait HandlerFactory: Send + Sync {
    fn handler(&self, request: &Request) -> Arc<dyn Handler>;
}

/// Absolute-path route table with a 404 fallback.
pub struct RouteMap {
    routes: HashMap<String, Arc<dyn Handler>>,
    not_found: Arc<dyn Handler>,
    continue_handler: Arc<dyn Handler>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: Arc::new(NotFoundHandler),
            continue_handler: Arc::new(ContinueHandler),
        }
    }

    pub fn add_route(&mut self, path: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.routes.insert(path.into(), Arc::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteMap {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerFactory for RouteMap {
    fn handler(&self, request: &Request) -> Arc<dyn Handler> {
        if request.expect_continue {
            return Arc::clone(&self.continue_handler);
        }
        self.routes
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.not_found))
    }
}
