//! Controllers ("codebehind" classes), their handler registries and
//! the per-request page they work on.
//!
//! A controller type implements `Controller` for its lifecycle hooks.
//! Its server-invocable methods are registered explicitly on a
//! `ControllerClass`, together with how to construct it; mixins are
//! `Partial`s whose handlers get merged into a class when it is
//! built. The resulting `ControllerFactory` is what the loader hands
//! out and the engine instantiates per request.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use adom::{Document, Match, NodeId};
use kstring::KString;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use chj_util::{debug, trace};

use crate::binder::strip_server_markers;
use crate::descriptor::EventDescriptor;
use crate::error::{CodebehindError, CodebehindErrorKind, Result};
use crate::request::RequestContext;


// ------------------------------------------------------------------
// Hooks

/// Lifecycle hooks, all optional. `start` runs on the first (event
/// less) request of a page, `end` before a full page is serialized,
/// `errored` when a dispatched handler (or `start`) failed.
pub trait Controller: Send + 'static {
    fn init(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn start(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn end(&mut self, _page: &mut Page) -> anyhow::Result<()> {
        Ok(())
    }

    fn errored(&mut self, _page: &mut Page, _error: &CodebehindError) {}

    /// Called right before a handler runs.
    fn before_exec(&mut self, _page: &mut Page, _ctx: &ExecContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The event object handed to handlers.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// The element that was clicked, if the event came from one (API
    /// calls don't).
    pub source: Option<NodeId>,
    pub target: Option<NodeId>,
    pub info: EventDescriptor,
}

impl ServerEvent {
    pub fn new(source: Option<NodeId>, info: EventDescriptor) -> Self {
        ServerEvent { source, target: source, info }
    }
}

pub struct ExecContext<'a> {
    pub handler: &'a HandlerInfo,
    pub event: &'a ServerEvent,
    pub args: &'a [Value],
}


// ------------------------------------------------------------------
// Handler registries

/// Positional arguments of a handler, decoded from the JSON array the
/// client sent.
pub trait HandlerArgs: Sized {
    /// `None`: any number.
    const ARITY: Option<usize>;

    fn from_args(args: Vec<Value>) -> Result<Self, String>;
}

impl HandlerArgs for () {
    const ARITY: Option<usize> = Some(0);

    fn from_args(_args: Vec<Value>) -> Result<Self, String> {
        Ok(())
    }
}

impl<T: DeserializeOwned> HandlerArgs for Vec<T> {
    const ARITY: Option<usize> = None;

    fn from_args(args: Vec<Value>) -> Result<Self, String> {
        serde_json::from_value(Value::Array(args)).map_err(|e| e.to_string())
    }
}

macro_rules! tuple_handler_args {
    ($n:expr; $($t:ident),+) => {
        impl<$($t: DeserializeOwned),+> HandlerArgs for ($($t,)+) {
            const ARITY: Option<usize> = Some($n);

            fn from_args(mut args: Vec<Value>) -> Result<Self, String> {
                // Missing trailing arguments are null, as they'd be
                // undefined in the caller's world.
                args.resize($n, Value::Null);
                serde_json::from_value(Value::Array(args)).map_err(|e| e.to_string())
            }
        }
    }
}

tuple_handler_args!(1; A);
tuple_handler_args!(2; A, B);
tuple_handler_args!(3; A, B, C);
tuple_handler_args!(4; A, B, C, D);
tuple_handler_args!(5; A, B, C, D, E);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub name: KString,
    /// Number of positional arguments, `None` if variadic.
    pub arity: Option<usize>,
    /// The class or partial that registered the handler.
    pub owner: KString,
    /// Callable directly from client script via `serverEvents`, and
    /// through API dispatch on attached routes.
    pub api: bool,
}

type HandlerFn<C> =
    dyn Fn(&mut C, &mut Page, &ServerEvent, Vec<Value>) -> Result<Option<Value>> + Send + Sync;

pub struct Handler<C> {
    pub info: HandlerInfo,
    f: Arc<HandlerFn<C>>,
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        Handler { info: self.info.clone(), f: self.f.clone() }
    }
}

fn wrap_handler<C, A, R, F>(name: &str, f: F) -> Arc<HandlerFn<C>>
where C: 'static,
      A: HandlerArgs,
      R: Serialize,
      F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
{
    let name = KString::from_ref(name);
    Arc::new(move |c: &mut C, page: &mut Page, event: &ServerEvent, args: Vec<Value>|
             -> Result<Option<Value>> {
        if let Some(n) = A::ARITY {
            if args.len() > n {
                return Err(CodebehindErrorKind::ArgumentMismatch {
                    handler: name.clone(),
                    message: format!("expected at most {n} arguments, got {}", args.len()),
                }.into());
            }
        }
        let args = A::from_args(args).map_err(
            |message| CodebehindErrorKind::ArgumentMismatch {
                handler: name.clone(),
                message,
            })?;
        let r = f(c, page, event, args).map_err(
            |e| CodebehindError::handler_execution(&name, e))?;
        let v = serde_json::to_value(r).map_err(
            |e| CodebehindError::handler_execution(&name, e.into()))?;
        Ok(if v.is_null() { None } else { Some(v) })
    })
}

/// Handlers by name, in registration order.
pub struct HandlerRegistry<C> {
    handlers: Vec<Handler<C>>,
}

impl<C> Clone for HandlerRegistry<C> {
    fn clone(&self) -> Self {
        HandlerRegistry { handlers: self.handlers.clone() }
    }
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        HandlerRegistry { handlers: Vec::new() }
    }
}

impl<C: 'static> HandlerRegistry<C> {
    pub fn get(&self, name: &str) -> Option<&Handler<C>> {
        self.handlers.iter().find(|h| h.info.name.as_str() == name)
    }

    /// Add a handler, replacing one of the same name.
    pub fn insert(&mut self, handler: Handler<C>) {
        let name = handler.info.name.clone();
        if let Some(slot) = self.handlers.iter_mut().find(|h| h.info.name == name) {
            *slot = handler;
        } else {
            self.handlers.push(handler);
        }
    }

    /// Add the handlers of `other` whose names aren't taken yet.
    pub fn merge_missing(&mut self, other: &HandlerRegistry<C>) {
        for h in &other.handlers {
            if self.get(&h.info.name).is_none() {
                self.handlers.push(h.clone());
            }
        }
    }

    pub fn register<A, R, F>(&mut self, owner: &str, name: &str, api: bool, f: F)
    where A: HandlerArgs,
          R: Serialize,
          F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
    {
        self.insert(Handler {
            info: HandlerInfo {
                name: KString::from_ref(name),
                arity: A::ARITY,
                owner: KString::from_ref(owner),
                api,
            },
            f: wrap_handler(name, f),
        })
    }

    pub fn infos(&self) -> Vec<HandlerInfo> {
        self.handlers.iter().map(|h| h.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}


// ------------------------------------------------------------------
// Partials (mixins)

/// A set of handlers meant to be included into controller classes,
/// never used as a page's controller by itself. Generic mixins are
/// written as functions `fn foo<C: FooCapable>() -> Partial<C>`.
pub struct Partial<C> {
    name: KString,
    handlers: HandlerRegistry<C>,
}

impl<C: Controller> Partial<C> {
    pub fn new(name: &str) -> Self {
        Partial { name: KString::from_ref(name), handlers: HandlerRegistry::default() }
    }

    pub fn handler<A, R, F>(mut self, name: &str, f: F) -> Self
    where A: HandlerArgs,
          R: Serialize,
          F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
    {
        self.handlers.register(&self.name, name, false, f);
        self
    }

    pub fn api_handler<A, R, F>(mut self, name: &str, f: F) -> Self
    where A: HandlerArgs,
          R: Serialize,
          F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
    {
        self.handlers.register(&self.name, name, true, f);
        self
    }

    /// Mark every handler of this partial as an API handler.
    pub fn handlers_all_api(mut self) -> Self {
        for h in &mut self.handlers.handlers {
            h.info.api = true;
        }
        self
    }

    pub fn registry(&self) -> &HandlerRegistry<C> {
        &self.handlers
    }
}

/// What the loader sees of a partial.
pub trait PartialModule: Send + Sync {
    fn name(&self) -> &str;
    fn handlers(&self) -> Vec<HandlerInfo>;
}

impl<C: Controller> PartialModule for Partial<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn handlers(&self) -> Vec<HandlerInfo> {
        self.handlers.infos()
    }
}


// ------------------------------------------------------------------
// Classes and factories

type Constructor<C> = dyn Fn(&RequestContext) -> anyhow::Result<C> + Send + Sync;

/// Builder for a controller type's runtime description.
pub struct ControllerClass<C: Controller> {
    name: KString,
    ctor: Arc<Constructor<C>>,
    handlers: HandlerRegistry<C>,
    included: HandlerRegistry<C>,
    title: Option<String>,
    view: Option<String>,
}

impl<C: Controller> ControllerClass<C> {
    pub fn new(
        name: &str,
        ctor: impl Fn(&RequestContext) -> anyhow::Result<C> + Send + Sync + 'static
    ) -> Self {
        ControllerClass {
            name: KString::from_ref(name),
            ctor: Arc::new(ctor),
            handlers: HandlerRegistry::default(),
            included: HandlerRegistry::default(),
            title: None,
            view: None,
        }
    }

    pub fn with_default(name: &str) -> Self
    where C: Default
    {
        Self::new(name, |_| Ok(C::default()))
    }

    /// Set into `<title>` when the page starts.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The view rendered for GET requests to an attached route.
    pub fn view(mut self, view: &str) -> Self {
        self.view = Some(view.into());
        self
    }

    /// A handler reachable from `server.<name>(..)` in click
    /// expressions.
    pub fn handler<A, R, F>(mut self, name: &str, f: F) -> Self
    where A: HandlerArgs,
          R: Serialize,
          F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
    {
        self.handlers.register(&self.name, name, false, f);
        self
    }

    /// A handler that is also exposed as `serverEvents.<name>(..)` and
    /// answers API posts.
    pub fn api_handler<A, R, F>(mut self, name: &str, f: F) -> Self
    where A: HandlerArgs,
          R: Serialize,
          F: Fn(&mut C, &mut Page, &ServerEvent, A) -> anyhow::Result<R> + Send + Sync + 'static
    {
        self.handlers.register(&self.name, name, true, f);
        self
    }

    /// Merge a mixin's handlers. The class's own handlers win on name
    /// clashes, regardless of order.
    pub fn include(mut self, partial: &Partial<C>) -> Self {
        self.included.merge_missing(&partial.handlers);
        self
    }

    pub fn build(self) -> Arc<dyn ControllerFactory> {
        let ControllerClass { name, ctor, mut handlers, included, title, view } = self;
        handlers.merge_missing(&included);
        Arc::new(ClassFactory {
            class: Arc::new(ClassData { name, ctor, handlers, title, view })
        })
    }
}

struct ClassData<C: Controller> {
    name: KString,
    ctor: Arc<Constructor<C>>,
    handlers: HandlerRegistry<C>,
    title: Option<String>,
    view: Option<String>,
}

struct ClassFactory<C: Controller> {
    class: Arc<ClassData<C>>,
}

/// The type-erased class, as cached and loaded.
pub trait ControllerFactory: Send + Sync {
    fn name(&self) -> &str;
    fn title(&self) -> Option<&str>;
    fn view(&self) -> Option<&str>;
    /// All handlers, in registration order (own before included).
    fn handlers(&self) -> Vec<HandlerInfo>;
    fn handler_info(&self, name: &str) -> Option<HandlerInfo>;
    fn instantiate(&self, request: &RequestContext) -> Result<Box<dyn ControllerInstance>>;
}

impl<C: Controller> ControllerFactory for ClassFactory<C> {
    fn name(&self) -> &str {
        &self.class.name
    }

    fn title(&self) -> Option<&str> {
        self.class.title.as_deref()
    }

    fn view(&self) -> Option<&str> {
        self.class.view.as_deref()
    }

    fn handlers(&self) -> Vec<HandlerInfo> {
        self.class.handlers.infos()
    }

    fn handler_info(&self, name: &str) -> Option<HandlerInfo> {
        self.class.handlers.get(name).map(|h| h.info.clone())
    }

    fn instantiate(&self, request: &RequestContext) -> Result<Box<dyn ControllerInstance>> {
        let controller = (self.class.ctor)(request)
            .map_err(|e| CodebehindError::lifecycle("constructor", e))?;
        Ok(Box::new(Bound { controller, class: self.class.clone() }))
    }
}

/// A live controller object.
pub trait ControllerInstance: Send {
    fn init(&mut self, page: &mut Page) -> anyhow::Result<()>;
    fn start(&mut self, page: &mut Page) -> anyhow::Result<()>;
    fn end(&mut self, page: &mut Page) -> anyhow::Result<()>;
    fn errored(&mut self, page: &mut Page, error: &CodebehindError);
    fn before_exec(&mut self, page: &mut Page, ctx: &ExecContext) -> anyhow::Result<()>;
    /// `None` if there's no handler of that name.
    fn invoke(
        &mut self,
        name: &str,
        page: &mut Page,
        event: &ServerEvent,
        args: Vec<Value>,
    ) -> Option<Result<Option<Value>>>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Bound<C: Controller> {
    controller: C,
    class: Arc<ClassData<C>>,
}

impl<C: Controller> ControllerInstance for Bound<C> {
    fn init(&mut self, page: &mut Page) -> anyhow::Result<()> {
        self.controller.init(page)
    }

    fn start(&mut self, page: &mut Page) -> anyhow::Result<()> {
        self.controller.start(page)
    }

    fn end(&mut self, page: &mut Page) -> anyhow::Result<()> {
        self.controller.end(page)
    }

    fn errored(&mut self, page: &mut Page, error: &CodebehindError) {
        self.controller.errored(page, error)
    }

    fn before_exec(&mut self, page: &mut Page, ctx: &ExecContext) -> anyhow::Result<()> {
        self.controller.before_exec(page, ctx)
    }

    fn invoke(
        &mut self,
        name: &str,
        page: &mut Page,
        event: &ServerEvent,
        args: Vec<Value>,
    ) -> Option<Result<Option<Value>>> {
        let f = self.class.handlers.get(name)?.f.clone();
        Some(f(&mut self.controller, page, event, args))
    }

    fn as_any(&self) -> &dyn Any {
        &self.controller
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.controller
    }
}


// ------------------------------------------------------------------
// Pages

/// `{success, result}` or `{success, error}`, the API response of a
/// handler that doesn't return a value itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a controller works with during one request.
pub struct Page {
    request: RequestContext,
    document: Option<Document>,
    /// The markup the document was parsed from.
    html: Option<Arc<str>>,
    /// `[id][runat=server]` elements by id.
    elements: BTreeMap<String, NodeId>,
    result: Option<PageResult>,
}

impl Page {
    /// A page without document, as used for API calls.
    pub fn new(request: RequestContext) -> Self {
        Page {
            request,
            document: None,
            html: None,
            elements: BTreeMap::new(),
            result: None,
        }
    }

    /// Take ownership of the parsed document and index its
    /// server-bound elements.
    pub fn attach_document(&mut self, document: Document, html: Arc<str>) {
        self.elements = document.find_all(&Match::any().has("id").eq("runat", "server"))
            .into_iter()
            .filter_map(|n| Some((document.attr(n, "id")?.to_owned(), n)))
            .collect();
        self.document = Some(document);
        self.html = Some(html);
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }

    pub fn xdocument(&self) -> Result<&Document> {
        self.document.as_ref().ok_or_else(|| CodebehindErrorKind::NoDocument.into())
    }

    pub fn xdocument_mut(&mut self) -> Result<&mut Document> {
        self.document.as_mut().ok_or_else(|| CodebehindErrorKind::NoDocument.into())
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn element_ids(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(|s| s.as_str())
    }

    /// The server-bound element with this id.
    pub fn element(&self, id: &str) -> Option<NodeId> {
        self.elements.get(id).copied()
    }

    fn xelement(&self, id: &str) -> Result<NodeId> {
        self.element(id).ok_or_else(
            || CodebehindErrorKind::UnknownElement { id: id.into() }.into())
    }

    /// The `value` attribute of a server-bound element.
    pub fn value(&self, id: &str) -> Option<&str> {
        let n = self.element(id)?;
        self.document.as_ref()?.attr(n, "value")
    }

    pub fn set_value(&mut self, id: &str, value: &str) -> Result<()> {
        let n = self.xelement(id)?;
        self.xdocument_mut()?.set_attr(n, "value", value)?;
        Ok(())
    }

    pub fn text(&self, id: &str) -> Option<String> {
        let n = self.element(id)?;
        Some(self.document.as_ref()?.text(n))
    }

    pub fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        let n = self.xelement(id)?;
        self.xdocument_mut()?.set_text(n, text)?;
        Ok(())
    }

    pub fn set_attr(&mut self, id: &str, name: &str, value: &str) -> Result<()> {
        let n = self.xelement(id)?;
        self.xdocument_mut()?.set_attr(n, name, value)?;
        Ok(())
    }

    pub fn title(&self) -> Option<String> {
        let doc = self.document.as_ref()?;
        Some(doc.text(doc.first_element_named("title")?))
    }

    /// Set the text of `<title>`; a document without one is left
    /// alone.
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let doc = self.xdocument_mut()?;
        if let Some(t) = doc.first_element_named("title") {
            doc.set_text(t, title)?;
        }
        Ok(())
    }

    pub fn success(&mut self, result: impl Serialize) -> Result<()> {
        let result = serde_json::to_value(result).map_err(anyhow::Error::from)?;
        self.result = Some(PageResult { success: true, result: Some(result), error: None });
        Ok(())
    }

    pub fn failure(&mut self, error: &str) {
        self.result = Some(PageResult { success: false, result: None, error: Some(error.into()) });
    }

    pub fn result(&self) -> Option<&PageResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<PageResult> {
        self.result.take()
    }

    pub(crate) fn take_document(&mut self) -> Option<Document> {
        self.document.take()
    }
}

/// Where a page instance is in its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    TemplateResolved,
    ControllerBound,
    Populated,
    Initialized,
    EventDispatched,
    Started,
    Finalized,
}

/// A controller together with its page.
pub struct PageInstance {
    factory: Arc<dyn ControllerFactory>,
    controller: Box<dyn ControllerInstance>,
    page: Page,
    state: LifecycleState,
}

impl PageInstance {
    pub fn create(factory: Arc<dyn ControllerFactory>, request: RequestContext) -> Result<Self> {
        let controller = factory.instantiate(&request)?;
        let mut instance = PageInstance {
            factory,
            controller,
            page: Page::new(request),
            state: LifecycleState::Idle,
        };
        instance.advance(LifecycleState::ControllerBound);
        Ok(instance)
    }

    pub fn factory(&self) -> &Arc<dyn ControllerFactory> {
        &self.factory
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn controller<C: Controller>(&self) -> Option<&C> {
        self.controller.as_any().downcast_ref()
    }

    pub fn controller_mut<C: Controller>(&mut self) -> Option<&mut C> {
        self.controller.as_any_mut().downcast_mut()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn advance(&mut self, state: LifecycleState) {
        trace!("{}: {:?} -> {:?}", self.factory.name(), self.state, state);
        self.state = state;
    }

    /// Replace the request a reused instance sees.
    pub(crate) fn set_request(&mut self, request: RequestContext) {
        self.page.request = request;
    }

    pub(crate) fn init(&mut self) -> Result<()> {
        self.controller.init(&mut self.page)
            .map_err(|e| CodebehindError::lifecycle("init", e))
    }

    /// The class title, then the `start` hook.
    pub(crate) fn start(&mut self) -> Result<()> {
        if let Some(title) = self.factory.title() {
            self.page.set_title(title)?;
        }
        self.controller.start(&mut self.page)
            .map_err(|e| CodebehindError::lifecycle("start", e))
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        self.controller.end(&mut self.page)
            .map_err(|e| CodebehindError::lifecycle("end", e))
    }

    pub(crate) fn errored(&mut self, error: &CodebehindError) {
        self.controller.errored(&mut self.page, error)
    }

    /// Run the handler `exec`, after the `before_exec` hook.
    pub fn dispatch(
        &mut self,
        exec: &str,
        event: &ServerEvent,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let not_found = || -> CodebehindError {
            CodebehindErrorKind::HandlerNotFound { name: KString::from_ref(exec) }.into()
        };
        let info = self.factory.handler_info(exec).ok_or_else(not_found)?;
        self.controller.before_exec(
            &mut self.page,
            &ExecContext { handler: &info, event, args: &args }
        ).map_err(|e| CodebehindError::handler_execution(exec, e))?;
        debug!("dispatching {}.{}({} args)", self.factory.name(), exec, args.len());
        self.controller.invoke(exec, &mut self.page, event, args)
            .ok_or_else(not_found)?
    }

    /// Finish a page kept alive by a route handler: run `end`, drop
    /// the server markers and serialize the whole document.
    pub fn finish(mut self) -> Result<String> {
        self.end()?;
        let mut doc = self.page.take_document()
            .ok_or_else(|| CodebehindError::from(CodebehindErrorKind::NoDocument))?;
        let root = doc.root();
        strip_server_markers(&mut doc, root);
        self.advance(LifecycleState::Finalized);
        Ok(doc.to_html())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        n: i64,
        seen: Vec<String>,
    }

    impl Controller for Counter {
        fn before_exec(&mut self, _page: &mut Page, ctx: &ExecContext) -> anyhow::Result<()> {
            self.seen.push(ctx.handler.name.to_string());
            Ok(())
        }
    }

    impl Counter {
        fn add(&mut self, _page: &mut Page, _event: &ServerEvent, (k,): (i64,))
               -> anyhow::Result<i64> {
            self.n += k;
            Ok(self.n)
        }
    }

    trait Resettable {
        fn reset(&mut self);
    }

    impl Resettable for Counter {
        fn reset(&mut self) {
            self.n = 0;
        }
    }

    fn resetting<C: Controller + Resettable>() -> Partial<C> {
        Partial::new("Resetting")
            .handler("reset", |c: &mut C, _page: &mut Page, _event: &ServerEvent, _args: ()| {
                c.reset();
                Ok(())
            })
            .handler("add", |_c: &mut C, _page: &mut Page, _event: &ServerEvent, _args: ()|
                     -> anyhow::Result<()> {
                anyhow::bail!("shadowed by the class")
            })
    }

    fn counter_class() -> Arc<dyn ControllerFactory> {
        ControllerClass::<Counter>::with_default("Counter")
            .include(&resetting().handlers_all_api())
            .api_handler("add", Counter::add)
            .handler("fail", |_c: &mut Counter, _page: &mut Page, _event: &ServerEvent, _args: ()|
                     -> anyhow::Result<()> {
                anyhow::bail!("nope")
            })
            .build()
    }

    fn event() -> ServerEvent {
        ServerEvent::new(None, EventDescriptor::default())
    }

    #[test]
    fn t_registry_and_mixins() {
        let class = counter_class();
        let infos = class.handlers();
        let names: Vec<(&str, &str, bool, Option<usize>)> = infos.iter()
            .map(|h| (h.name.as_str(), h.owner.as_str(), h.api, h.arity))
            .collect();
        assert_eq!(names, vec![
            ("add", "Counter", true, Some(1)),
            ("fail", "Counter", false, Some(0)),
            ("reset", "Resetting", true, Some(0)),
        ]);
        assert!(class.handler_info("nope").is_none());
    }

    #[test]
    fn t_dispatch() -> Result<()> {
        let mut pi = PageInstance::create(counter_class(), RequestContext::get("/"))?;
        assert_eq!(pi.state(), LifecycleState::ControllerBound);
        assert_eq!(pi.dispatch("add", &event(), vec![json!(5)])?, Some(json!(5)));
        assert_eq!(pi.dispatch("add", &event(), vec![json!(2)])?, Some(json!(7)));
        assert_eq!(pi.dispatch("reset", &event(), vec![])?, None);
        assert_eq!(pi.controller::<Counter>().map(|c| c.n), Some(0));
        assert_eq!(pi.controller::<Counter>().map(|c| c.seen.len()), Some(3));

        let e = pi.dispatch("missing", &event(), vec![]).unwrap_err();
        assert!(matches!(*e, CodebehindErrorKind::HandlerNotFound { .. }));
        let e = pi.dispatch("add", &event(), vec![json!(1), json!(2)]).unwrap_err();
        assert!(matches!(*e, CodebehindErrorKind::ArgumentMismatch { .. }));
        let e = pi.dispatch("add", &event(), vec![json!("x")]).unwrap_err();
        assert!(matches!(*e, CodebehindErrorKind::ArgumentMismatch { .. }));
        let e = pi.dispatch("add", &event(), vec![]).unwrap_err();
        assert!(matches!(*e, CodebehindErrorKind::ArgumentMismatch { .. }));
        let e = pi.dispatch("fail", &event(), vec![]).unwrap_err();
        assert!(matches!(*e, CodebehindErrorKind::HandlerExecution { .. }));
        assert_eq!(e.client_message(), "nope");
        Ok(())
    }

    #[test]
    fn t_optional_args_are_null_padded() -> Result<()> {
        let class = ControllerClass::<Counter>::with_default("C")
            .api_handler("greet",
                         |_c: &mut Counter, _p: &mut Page, _e: &ServerEvent,
                          (name, punct): (String, Option<String>)| {
                             Ok(format!("hi {name}{}", punct.unwrap_or_default()))
                         })
            .build();
        let mut pi = PageInstance::create(class, RequestContext::get("/"))?;
        assert_eq!(pi.dispatch("greet", &event(), vec![json!("a")])?, Some(json!("hi a")));
        assert_eq!(pi.dispatch("greet", &event(), vec![json!("a"), json!("!")])?,
                   Some(json!("hi a!")));
        Ok(())
    }

    #[test]
    fn t_page_elements_and_result() -> Result<()> {
        let html = "<html><head><title>x</title></head><body>\
                    <input id=name runat=server value=a><span id=msg runat=server></span>\
                    <p id=plain></p></body></html>";
        let mut page = Page::new(RequestContext::get("/"));
        assert!(page.set_title("t").is_err());
        page.attach_document(Document::parse(html), Arc::from(html));
        assert_eq!(page.element_ids().collect::<Vec<_>>(), vec!["msg", "name"]);
        assert!(page.element("plain").is_none());
        assert_eq!(page.value("name"), Some("a"));
        page.set_value("name", "b")?;
        page.set_text("msg", "hello")?;
        assert_eq!(page.text("msg").as_deref(), Some("hello"));
        page.set_title("New")?;
        assert_eq!(page.title().as_deref(), Some("New"));
        assert!(page.set_text("plain", "x").is_err());

        page.success(json!({"n": 1}))?;
        assert_eq!(serde_json::to_value(page.result())
                   .map_err(anyhow::Error::from)?,
                   json!({"success": true, "result": {"n": 1}}));
        page.failure("bad");
        assert_eq!(serde_json::to_value(page.take_result())
                   .map_err(anyhow::Error::from)?,
                   json!({"success": false, "error": "bad"}));
        Ok(())
    }
}
