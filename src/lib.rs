//! Server-side "codebehind" pages: templates whose root element names
//! a controller get parsed, bound to that controller and have their
//! click handlers wired to server methods before they are sent out.

pub mod boxed_error;
pub mod error;
pub mod util;
pub mod path;
pub mod url_encoding;
pub mod in_threadpool;
pub mod cache;
pub mod descriptor;
pub mod request;
pub mod controller;
pub mod rewriter;
pub mod client;
pub mod binder;
pub mod loader;
pub mod engine;
pub mod view;
pub mod config;
pub mod router;
pub mod webutils;
pub mod server;

use std::sync::Arc;

use scoped_thread_pool::Pool;
use serde_json::Value;

use crate::binder::EventBinder;
use crate::cache::DocumentStore;
use crate::config::Config;
use crate::controller::{ControllerFactory, PageInstance};
use crate::engine::{Engine, RenderOutcome};
use crate::error::{CodebehindErrorKind, Result};
use crate::loader::{ControllerLoader, ControllerSource, PreloadReport};
use crate::request::{RenderOptions, RequestContext};
use crate::view::ViewRenderer;

pub use crate::error::CodebehindError;

/// One application: its caches, controllers and views. Independent
/// instances don't share anything.
pub struct Codebehind {
    config: Config,
    views: Arc<dyn ViewRenderer>,
    engine: Engine,
}

impl Codebehind {
    pub fn new(
        config: Config,
        views: Arc<dyn ViewRenderer>,
        controllers: Arc<dyn ControllerSource>,
        fallback_controllers: Option<Arc<dyn ControllerSource>>,
    ) -> Self {
        Self::with_binder(config, views, controllers, fallback_controllers,
                          EventBinder::default())
    }

    pub fn with_binder(
        config: Config,
        views: Arc<dyn ViewRenderer>,
        controllers: Arc<dyn ControllerSource>,
        fallback_controllers: Option<Arc<dyn ControllerSource>>,
        binder: EventBinder,
    ) -> Self {
        let store = Arc::new(DocumentStore::new(config.cache_capacity));
        let mut loader = ControllerLoader::new(store.clone(), controllers);
        if let Some(fallback) = fallback_controllers {
            loader = loader.with_fallback(fallback);
        }
        let engine = Engine::new(store, Arc::new(loader), binder);
        Codebehind { config, views, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        self.engine.store()
    }

    pub fn loader(&self) -> &Arc<ControllerLoader> {
        self.engine.loader()
    }

    pub fn views(&self) -> &Arc<dyn ViewRenderer> {
        &self.views
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Render the view `name` and run it through the engine.
    pub fn render(&self, name: &str, options: RenderOptions) -> Result<RenderOutcome> {
        let html = self.views.render(name).map_err(
            |error| CodebehindErrorKind::View { name: name.into(), error })?;
        self.engine.render_request(name, &html, options)
    }

    /// Render the view `name` for the page instance a route handler
    /// created, handing the live page back (see
    /// `PageInstance::finish`).
    pub fn compose(&self, name: &str, request: RequestContext, page: Box<PageInstance>)
                   -> Result<RenderOutcome> {
        self.render(name, RenderOptions::router(request, page))
    }

    /// Run an API handler of `factory` (see `Engine::dispatch_api`).
    pub fn invoke_api(&self, factory: Arc<dyn ControllerFactory>, request: RequestContext)
                      -> Result<Value> {
        self.engine.dispatch_api(factory, request)
    }

    pub fn preload(&self, pool: &Pool) -> PreloadReport {
        self.loader().preload(pool)
    }
}
