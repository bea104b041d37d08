//! The page lifecycle: from the markup a view produced to the
//! response payload.

use std::sync::Arc;

use adom::{Document, Match, NodeId};
use serde_json::Value;

use chj_util::{debug, time_guard, trace, warn};

use crate::binder::{inject, strip_server_markers, EventBinder, XID_ATTR};
use crate::cache::DocumentStore;
use crate::controller::{ControllerFactory, LifecycleState, PageInstance, ServerEvent};
use crate::descriptor::{EventDescriptor, PartialResponse};
use crate::error::{CodebehindError, CodebehindErrorKind, Result};
use crate::loader::ControllerLoader;
use crate::request::{field_value_string, RenderOptions, RequestContext};

/// Root element attributes turning a template into a codebehind page.
pub const RUNAT_ATTR: &str = "runat";
pub const LANGUAGE_ATTR: &str = "language";
pub const CODEBEHIND_ATTR: &str = "codebehind";

pub enum RenderOutcome {
    /// Not a codebehind template (or no request context): the markup
    /// as it came in.
    PassThrough(String),
    Html(String),
    /// Update panel round trip.
    Partial(PartialResponse),
    /// Router style: the live page, to be finished by the caller.
    Composed(Box<PageInstance>),
}

impl std::fmt::Debug for RenderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderOutcome::PassThrough(s) => f.debug_tuple("PassThrough").field(s).finish(),
            RenderOutcome::Html(s) => f.debug_tuple("Html").field(s).finish(),
            RenderOutcome::Partial(p) => f.debug_tuple("Partial").field(p).finish(),
            RenderOutcome::Composed(p) => f.debug_tuple("Composed")
                .field(&p.factory().name()).finish(),
        }
    }
}

/// The controller name if `<html>` carries all three control
/// attributes (which are removed then), `None` otherwise.
pub fn take_control_attributes(doc: &mut Document) -> Option<String> {
    let root = doc.find(&Match::tag("html"))?;
    if doc.attr(root, RUNAT_ATTR) != Some("server")
        || doc.attr(root, LANGUAGE_ATTR) != Some("js")
    {
        return None;
    }
    let name = doc.attr(root, CODEBEHIND_ATTR).filter(|n| !n.is_empty())?.to_owned();
    for a in [CODEBEHIND_ATTR, LANGUAGE_ATTR, RUNAT_ATTR] {
        doc.remove_attr(root, a);
    }
    Some(name)
}

/// The lowercased method of the form enclosing `n` (`get` if the form
/// doesn't say), `None` outside forms.
fn form_method(doc: &Document, n: NodeId) -> Option<String> {
    let form = doc.closest(n, &Match::tag("form"))?;
    Some(doc.attr(form, "method").unwrap_or("get").to_ascii_lowercase())
}

fn in_update_panel(doc: &Document, n: NodeId) -> bool {
    doc.closest(n, &Match::any().eq("updatepanel", "true")).is_some()
}

/// Write incoming field values into the `value` of server-bound
/// elements with the same `name`. Query fields go to elements not in
/// a POST form, body fields to elements not in a GET form or inside
/// an update panel (partial round trips always post). Body values are
/// applied last. Returns the number of attributes set.
pub fn populate(doc: &mut Document, request: &RequestContext) -> Result<usize> {
    let mut n_set = 0;
    for (k, v) in &request.query {
        n_set += set_values(doc, k, v, |doc: &Document, n: NodeId| {
            form_method(doc, n).as_deref() != Some("post")
        })?;
    }
    for (k, v) in &request.body {
        n_set += set_values(doc, k, &field_value_string(v), |doc: &Document, n: NodeId| {
            form_method(doc, n).as_deref() != Some("get") || in_update_panel(doc, n)
        })?;
    }
    Ok(n_set)
}

fn set_values(
    doc: &mut Document,
    name: &str,
    value: &str,
    accept: impl Fn(&Document, NodeId) -> bool
) -> Result<usize> {
    let mut n_set = 0;
    for n in doc.find_all(&Match::any().eq("name", name).eq("runat", "server")) {
        if accept(doc, n) {
            doc.set_attr(n, "value", value)?;
            n_set += 1;
        }
    }
    Ok(n_set)
}

pub struct Engine {
    store: Arc<DocumentStore>,
    loader: Arc<ControllerLoader>,
    binder: EventBinder,
}

impl Engine {
    pub fn new(store: Arc<DocumentStore>, loader: Arc<ControllerLoader>, binder: EventBinder)
               -> Self {
        Engine { store, loader, binder }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn loader(&self) -> &Arc<ControllerLoader> {
        &self.loader
    }

    /// Run the page lifecycle for the template `name`, whose markup
    /// the view renderer produced as `html`. The cached markup wins
    /// over `html` once `name` has been seen.
    pub fn render_request(&self, name: &str, html: &str, options: RenderOptions)
                          -> Result<RenderOutcome> {
        let RenderOptions { context, page, router_style } = options;
        let request = match context {
            Some(request) => request,
            None => return Ok(RenderOutcome::PassThrough(html.into()))
        };
        time_guard!("render_request");

        let template = self.store.templates.get_or_insert_with(name, || Arc::from(html));
        let mut doc = Document::parse(&template);
        let controller_name = match take_control_attributes(&mut doc) {
            Some(n) => n,
            None => {
                trace!("{name:?} is not a codebehind template");
                return Ok(RenderOutcome::PassThrough(html.into()))
            }
        };

        let mut instance = match page {
            Some(mut instance) => {
                instance.set_request(request.clone());
                instance
            }
            None => {
                let factory = self.loader.resolve(&controller_name)?;
                Box::new(PageInstance::create(factory, request.clone())?)
            }
        };
        instance.page_mut().attach_document(doc, template);
        instance.advance(LifecycleState::ControllerBound);

        let n = populate(instance.page_mut().xdocument_mut()?, &request)?;
        trace!("populated {n} values");
        instance.advance(LifecycleState::Populated);

        instance.init()?;
        instance.advance(LifecycleState::Initialized);

        let handlers = instance.factory().handlers();
        {
            let doc = instance.page_mut().xdocument_mut()?;
            let client = self.binder.bind(doc, &handlers)?;
            inject(doc, &client)?;
        }

        let update_panel = match self.run_event_or_start(&mut instance, &request) {
            Ok(update_panel) => update_panel,
            Err(e) => {
                warn!("{name:?} ({}): {e}", instance.factory().name());
                instance.errored(&e);
                return Err(e);
            }
        };

        if router_style {
            return Ok(RenderOutcome::Composed(instance));
        }

        if let Some(panel_id) = update_panel {
            let doc = instance.page_mut().xdocument_mut()?;
            let panel = doc.find(&Match::any().eq("id", &panel_id).eq("updatepanel", "true"));
            let response = match panel {
                Some(panel) => {
                    strip_server_markers(doc, panel);
                    PartialResponse::panel(&panel_id, doc.inner_html(panel))
                }
                None => {
                    warn!("update panel {panel_id:?} not found in {name:?}");
                    PartialResponse::panel_not_found()
                }
            };
            instance.advance(LifecycleState::Finalized);
            return Ok(RenderOutcome::Partial(response));
        }

        Ok(RenderOutcome::Html(instance.finish()?))
    }

    /// `start` on first load, the handler named by the descriptor
    /// otherwise. Returns the update panel the event came from.
    fn run_event_or_start(&self, instance: &mut PageInstance, request: &RequestContext)
                          -> Result<Option<String>> {
        let descriptor = match request.event_descriptor()? {
            Some(d) => d,
            None => {
                instance.start()?;
                instance.advance(LifecycleState::Started);
                return Ok(None)
            }
        };
        let update_panel = descriptor.update_panel.clone();
        if let Some(exec) = descriptor.exec.clone() {
            let source = descriptor.clicked.as_deref().and_then(|xid| {
                instance.page().document()?.find(&Match::any().eq(XID_ATTR, xid))
            });
            let args = descriptor.args.clone();
            let event = ServerEvent::new(source, descriptor);
            instance.dispatch(&exec, &event, args)?;
            instance.advance(LifecycleState::EventDispatched);
        }
        Ok(update_panel)
    }

    /// Run an API handler without a document: the handler's return
    /// value, else what it put into the result slot, else null.
    pub fn dispatch_api(&self, factory: Arc<dyn ControllerFactory>, request: RequestContext)
                        -> Result<Value> {
        let descriptor = request.event_descriptor()?.unwrap_or_default();
        let exec = descriptor.exec.clone().ok_or_else(|| -> CodebehindError {
            CodebehindErrorKind::InvalidEventDescriptor(
                <serde_json::Error as serde::de::Error>::missing_field("exec")).into()
        })?;
        let mut instance = PageInstance::create(factory, request)?;
        let args = descriptor.args.clone();
        let event = ServerEvent::new(None, descriptor);
        debug!("api call {}.{exec}", instance.factory().name());
        match instance.dispatch(&exec, &event, args) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => match instance.page_mut().take_result() {
                Some(r) => Ok(serde_json::to_value(r).map_err(anyhow::Error::from)?),
                None => Ok(Value::Null)
            },
            Err(e) => {
                instance.errored(&e);
                Err(e)
            }
        }
    }

    /// Whether `request` is an API call for `factory`: a descriptor
    /// without clicked element naming one of its API handlers.
    pub fn is_api_call(factory: &dyn ControllerFactory, request: &RequestContext) -> bool {
        match request.event_descriptor() {
            Ok(Some(EventDescriptor { clicked: None, exec: Some(exec), .. })) =>
                factory.handler_info(&exec).map(|h| h.api).unwrap_or(false),
            _ => false
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientAssets;
    use crate::controller::{Controller, ControllerClass, Page};
    use crate::loader::ModuleDir;
    use crate::rewriter::RegexClickRewriter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn value_of(doc: &Document, id: &str) -> Option<String> {
        doc.attr(doc.element_by_id(id)?, "value").map(|s| s.to_owned())
    }

    #[test]
    fn t_control_attributes() {
        let mut doc = Document::parse(
            "<html runat=server language=js codebehind=Home lang=en></html>");
        assert_eq!(take_control_attributes(&mut doc).as_deref(), Some("Home"));
        assert_eq!(doc.to_html(), "<html lang=\"en\"><head></head><body></body></html>");
        for html in ["<html runat=server language=js></html>",
                     "<html runat=server codebehind=Home></html>",
                     "<html language=js codebehind=Home></html>",
                     "<html runat=client language=js codebehind=Home></html>"] {
            let mut doc = Document::parse(html);
            assert_eq!(take_control_attributes(&mut doc), None, "{html}");
        }
    }

    #[test]
    fn t_control_attributes_only_on_html() {
        // On a fragment's root element they don't count.
        let src = "<div runat=server language=js codebehind=Home><p>x</p></div>";
        let mut doc = Document::parse(src);
        assert_eq!(take_control_attributes(&mut doc), None);
        let div = doc.find(&Match::tag("div")).unwrap();
        assert_eq!(doc.attr(div, CODEBEHIND_ATTR), Some("Home"));
    }

    const FORMS: &str = "<html><body>\
        <form id=g><input id=g1 name=a runat=server></form>\
        <form id=p method=POST><input id=p1 name=a runat=server>\
          <div updatepanel=true id=panel><input id=p2 name=b runat=server></div></form>\
        <form id=g2 method=get><div updatepanel=true id=gp>\
          <input id=g3 name=b runat=server></div></form>\
        <input id=free name=a runat=server><input id=nomark name=a>\
        </body></html>";

    #[test]
    fn t_populate_query_and_body() -> Result<()> {
        let mut doc = Document::parse(FORMS);
        let req = RequestContext::post("/")
            .with_query("a", "q")
            .with_query("b", "qb")
            .with_field("a", "body")
            .with_field("b", json!(7));
        populate(&mut doc, &req)?;
        assert_eq!(value_of(&doc, "g1").as_deref(), Some("q"));
        assert_eq!(value_of(&doc, "p1").as_deref(), Some("body"));
        assert_eq!(value_of(&doc, "p2").as_deref(), Some("7"));
        assert_eq!(value_of(&doc, "g3").as_deref(), Some("7"));
        assert_eq!(value_of(&doc, "free").as_deref(), Some("body"));
        assert_eq!(value_of(&doc, "nomark"), None);
        Ok(())
    }

    #[test]
    fn t_populate_query_is_not_taken_from_body() -> Result<()> {
        // A GET form gets the query value even when the body has a
        // field of the same name.
        let mut doc = Document::parse(FORMS);
        let req = RequestContext::get("/").with_query("a", "from-query")
            .with_field("a", "from-body");
        populate(&mut doc, &req)?;
        assert_eq!(value_of(&doc, "g1").as_deref(), Some("from-query"));
        Ok(())
    }

    #[derive(Default)]
    struct Recorder {
        log: Vec<&'static str>,
    }

    impl Controller for Recorder {
        fn init(&mut self, _page: &mut Page) -> anyhow::Result<()> {
            self.log.push("init");
            Ok(())
        }
        fn start(&mut self, _page: &mut Page) -> anyhow::Result<()> {
            self.log.push("start");
            Ok(())
        }
        fn end(&mut self, _page: &mut Page) -> anyhow::Result<()> {
            self.log.push("end");
            Ok(())
        }
        fn errored(&mut self, _page: &mut Page, _error: &CodebehindError) {
            self.log.push("errored");
        }
    }

    fn recorder_class() -> Arc<dyn ControllerFactory> {
        ControllerClass::<Recorder>::with_default("Recorder")
            .handler("poke", |c: &mut Recorder, _p: &mut Page, e: &ServerEvent, _a: ()| {
                c.log.push(if e.source.is_some() { "poke(source)" } else { "poke" });
                Ok(())
            })
            .build()
    }

    fn engine() -> Engine {
        let store = Arc::new(DocumentStore::new(10));
        let loader = Arc::new(ControllerLoader::new(
            store.clone(), Arc::new(ModuleDir::new("test").controller(recorder_class()))));
        Engine::new(store, loader,
                    EventBinder::new(Arc::new(RegexClickRewriter), ClientAssets::none()))
    }

    const PAGE: &str = "<html runat=server language=js codebehind=Recorder><body>\
        <form runat=server method=post>\
        <button runat=server onclick=\"server.poke()\">x</button></form></body></html>";

    fn composed(outcome: RenderOutcome) -> Box<PageInstance> {
        match outcome {
            RenderOutcome::Composed(p) => p,
            o => panic!("expected a composed page, got {o:?}")
        }
    }

    #[test]
    fn t_lifecycle_order_and_states() -> Result<()> {
        let e = engine();
        let req = RequestContext::get("/");
        let factory = e.loader().resolve("Recorder")?;
        let page = Box::new(PageInstance::create(factory, req.clone())?);
        let p = composed(e.render_request("recorder", PAGE, RenderOptions::router(req, page))?);
        assert_eq!(p.state(), LifecycleState::Started);
        assert_eq!(p.controller::<Recorder>().map(|c| c.log.clone()),
                   Some(vec!["init", "start"]));

        let req = RequestContext::post("/").with_event(
            &EventDescriptor::click("__element_xid0", "poke", vec![]));
        let factory = e.loader().resolve("Recorder")?;
        let page = Box::new(PageInstance::create(factory, req.clone())?);
        let p = composed(e.render_request("recorder", PAGE, RenderOptions::router(req, page))?);
        assert_eq!(p.state(), LifecycleState::EventDispatched);
        assert_eq!(p.controller::<Recorder>().map(|c| c.log.clone()),
                   Some(vec!["init", "poke(source)"]));
        let html = p.finish()?;
        assert!(!html.contains("runat"));
        Ok(())
    }

    #[test]
    fn t_descriptor_without_exec_does_nothing() -> Result<()> {
        let e = engine();
        let req = RequestContext::post("/").with_field("__eventElement", r#"{"args":[]}"#);
        match e.render_request("recorder", PAGE, RenderOptions::request(req))? {
            RenderOutcome::Html(html) => assert!(html.contains("<button")),
            o => panic!("unexpected {o:?}")
        }
        Ok(())
    }

    #[test]
    fn t_bad_descriptor_is_an_error() {
        let e = engine();
        let req = RequestContext::post("/").with_field("__eventElement", "{oops");
        let err = e.render_request("recorder", PAGE, RenderOptions::request(req)).unwrap_err();
        assert!(matches!(*err, CodebehindErrorKind::InvalidEventDescriptor(_)));
    }

    #[test]
    fn t_template_cache_wins() -> Result<()> {
        let e = engine();
        e.render_request("recorder", PAGE, RenderOptions::request(RequestContext::get("/")))?;
        // Later renders of the same name use the cached markup.
        match e.render_request("recorder", "<p>other</p>",
                               RenderOptions::request(RequestContext::get("/")))? {
            RenderOutcome::Html(html) => assert!(html.contains("<button")),
            o => panic!("unexpected {o:?}")
        }
        assert_eq!(e.store().stats().templates.keys, vec!["recorder"]);
        Ok(())
    }

    #[test]
    fn t_dispatch_api() -> Result<()> {
        let e = engine();
        let class = ControllerClass::<Recorder>::with_default("Api")
            .api_handler("sum", |_c: &mut Recorder, _p: &mut Page, _e: &ServerEvent,
                                 xs: Vec<i64>| Ok(xs.iter().sum::<i64>()))
            .api_handler("mark", |_c: &mut Recorder, p: &mut Page, _e: &ServerEvent, _a: ()| {
                p.success("done")?;
                Ok(())
            })
            .api_handler("nothing", |_c: &mut Recorder, _p: &mut Page, _e: &ServerEvent, _a: ()| {
                Ok(())
            })
            .build();
        let call = |exec: &str, args: Vec<Value>| RequestContext::post("/")
            .with_json_body(json!({"__eventElement": EventDescriptor::call(exec, args)}));
        assert!(Engine::is_api_call(&*class, &call("sum", vec![])));
        assert!(!Engine::is_api_call(&*class, &call("other", vec![])));
        assert_eq!(e.dispatch_api(class.clone(), call("sum", vec![json!(1), json!(2)]))?,
                   json!(3));
        assert_eq!(e.dispatch_api(class.clone(), call("mark", vec![]))?,
                   json!({"success": true, "result": "done"}));
        assert_eq!(e.dispatch_api(class.clone(), call("nothing", vec![]))?, Value::Null);
        let err = e.dispatch_api(class, call("missing", vec![])).unwrap_err();
        assert!(matches!(*err, CodebehindErrorKind::HandlerNotFound { .. }));
        Ok(())
    }
}
