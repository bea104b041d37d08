//! Mapping request paths to views and attached controllers.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use chj_util::{debug, trace};

use crate::controller::{ControllerFactory, PageInstance};
use crate::engine::{Engine, RenderOutcome};
use crate::error::{self, CodebehindErrorKind};
use crate::path::{route_key, view_name_for_path};
use crate::request::{RenderOptions, RequestContext};
use crate::Codebehind;

#[derive(Clone)]
pub enum Route {
    /// Render a view by name.
    View(String),
    /// A controller mounted at a path: its API handlers are invoked
    /// directly, everything else renders its view.
    Attach(Arc<dyn ControllerFactory>),
}

impl Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::View(name) => f.debug_tuple("View").field(name).finish(),
            Route::Attach(factory) => f.debug_tuple("Attach").field(&factory.name()).finish(),
        }
    }
}

/// What the router did with a request.
#[derive(Debug)]
pub enum Handled {
    Page(error::Result<RenderOutcome>),
    Api(error::Result<Value>),
}

#[derive(Debug, Default)]
pub struct Router {
    routes: BTreeMap<String, Route>,
    make_routes: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fall back to the view named like the request path, if it
    /// exists.
    pub fn make_routes(mut self, on: bool) -> Self {
        self.make_routes = on;
        self
    }

    /// Using path *strings*, and chaining.
    pub fn add(&mut self, path: &str, route: Route) -> Result<&mut Self> {
        let key = route_key(path);
        if let Some(old) = self.routes.get(&key) {
            bail!("already contained an entry for {path:?}: {old:?}")
        }
        self.routes.insert(key, route);
        Ok(self)
    }

    pub fn add_view(&mut self, path: &str, view: &str) -> Result<&mut Self> {
        self.add(path, Route::View(view.into()))
    }

    pub fn attach(&mut self, path: &str, factory: Arc<dyn ControllerFactory>)
                  -> Result<&mut Self> {
        self.add(path, Route::Attach(factory))
    }

    pub fn get(&self, path: &str) -> Option<&Route> {
        self.routes.get(&route_key(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `None` if nothing is routed at `request.path`.
    pub fn dispatch(&self, app: &Codebehind, request: RequestContext) -> Option<Handled> {
        match self.get(&request.path) {
            Some(Route::View(view)) => {
                trace!("{:?} -> view {view:?}", request.path);
                Some(Handled::Page(app.render(view, RenderOptions::request(request))))
            }
            Some(Route::Attach(factory)) => Some(attached(app, factory.clone(), request)),
            None if self.make_routes => {
                let view = view_name_for_path(&request.path)?;
                if app.views().exists(&view) {
                    trace!("{:?} -> made route to view {view:?}", request.path);
                    Some(Handled::Page(app.render(&view, RenderOptions::request(request))))
                } else {
                    None
                }
            }
            None => None
        }
    }
}

fn attached(app: &Codebehind, factory: Arc<dyn ControllerFactory>, request: RequestContext)
            -> Handled {
    if Engine::is_api_call(&*factory, &request) {
        debug!("{:?}: api call to {}", request.path, factory.name());
        return Handled::Api(app.invoke_api(factory, request))
    }
    let view = match factory.view() {
        Some(view) => view.to_owned(),
        None => return Handled::Page(Err(CodebehindErrorKind::View {
            name: factory.name().into(),
            error: anyhow::anyhow!("attached controller {} has no view", factory.name())
        }.into()))
    };
    let page = match PageInstance::create(factory, request.clone()) {
        Ok(page) => Box::new(page),
        Err(e) => return Handled::Page(Err(e))
    };
    Handled::Page(app.render(&view, RenderOptions {
        context: Some(request),
        page: Some(page),
        router_style: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::controller::{Controller, ControllerClass};
    use crate::loader::ModuleDir;
    use crate::view::MemoryViews;

    #[derive(Default)]
    struct Home;
    impl Controller for Home {}

    fn app() -> Codebehind {
        let views = MemoryViews::new()
            .with("home", "<html runat=server language=js codebehind=Home>\
                           <body><p>home</p></body></html>")
            .with("docs/intro", "<p>plain</p>");
        let home = ControllerClass::<Home>::with_default("Home").view("home").build();
        Codebehind::new(Config::default(), Arc::new(views),
                        Arc::new(ModuleDir::new("test").controller(home)), None)
    }

    #[test]
    fn t_add_duplicate() -> Result<()> {
        let mut r = Router::new();
        r
            .add_view("/", "home")?
            .add_view("/about/", "about")?;
        assert_eq!(r.add_view("//about", "other").err().unwrap().to_string(),
                   "already contained an entry for \"//about\": View(\"about\")");
        assert_eq!(r.len(), 2);
        Ok(())
    }

    #[test]
    fn t_dispatch() -> Result<()> {
        let app = app();
        let mut r = Router::new();
        r.add_view("/", "home")?;
        match r.dispatch(&app, RequestContext::get("/")) {
            Some(Handled::Page(Ok(RenderOutcome::Html(html)))) =>
                assert!(html.contains("<p>home</p>")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(r.dispatch(&app, RequestContext::get("/docs/intro")).is_none());

        let r = Router::new().make_routes(true);
        match r.dispatch(&app, RequestContext::get("/docs/intro")) {
            Some(Handled::Page(Ok(RenderOutcome::PassThrough(html)))) =>
                assert_eq!(html, "<p>plain</p>"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(r.dispatch(&app, RequestContext::get("/nope")).is_none());
        assert!(r.dispatch(&app, RequestContext::get("/../home")).is_none());
        Ok(())
    }
}
