use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;

use codebehind::config::Config;
use codebehind::controller::{Controller, ControllerClass, ControllerFactory, Page,
                             PageInstance, ServerEvent, LifecycleState};
use codebehind::descriptor::{EventDescriptor, PartialResponse};
use codebehind::engine::RenderOutcome;
use codebehind::error::CodebehindErrorKind;
use codebehind::loader::ModuleDir;
use codebehind::request::{RenderOptions, RequestContext};
use codebehind::view::MemoryViews;
use codebehind::{Codebehind, CodebehindError};

const HOME: &str = "<!DOCTYPE html>\
    <html runat=server language=js codebehind=Home>\
    <head><title>Home</title></head><body>\
    <p id=status runat=server></p>\
    <form runat=server method=post>\
    <input id=name name=name runat=server>\
    <button runat=server onclick=\"server.submit()\">Go</button></form>\
    </body></html>";

const PANEL: &str = "<html runat=server language=js codebehind=Home><body>\
    <div id=panelA updatepanel=true>\
    <span id=out runat=server>0</span>\
    <button runat=server onclick=\"server.bump(2)\">+</button></div>\
    <p>outside</p></body></html>";

const NOTES: &str = "<html runat=server language=js codebehind=Home>\
    <head><title>Tom &amp; <Jerry></title></head><body>\
    <p id=status runat=server></p>\
    <textarea name=t>Use <b> for bold</textarea></body></html>";

const PLAIN: &str = "<html><body><p runat=server>not a page</p></body></html>";

struct Home {
    errors: Arc<AtomicUsize>,
    fail_start: bool,
}

impl Controller for Home {
    fn start(&mut self, page: &mut Page) -> anyhow::Result<()> {
        if self.fail_start {
            anyhow::bail!("not today")
        }
        page.set_text("status", "started")?;
        Ok(())
    }

    fn errored(&mut self, _page: &mut Page, _error: &CodebehindError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    app: Codebehind,
    errors: Arc<AtomicUsize>,
}

fn home_class(errors: Arc<AtomicUsize>) -> Arc<dyn ControllerFactory> {
    ControllerClass::new("Home", move |req: &RequestContext| {
        Ok(Home { errors: errors.clone(), fail_start: req.query.contains_key("fail") })
    })
        .handler("submit", |_c: &mut Home, page: &mut Page, _e: &ServerEvent, ()|
                 -> anyhow::Result<()> {
            page.set_title("Submitted")?;
            Ok(())
        })
        .handler("boom", |_c: &mut Home, _page: &mut Page, _e: &ServerEvent, ()|
                 -> anyhow::Result<()> {
            anyhow::bail!("x")
        })
        .handler("bump", |_c: &mut Home, page: &mut Page, _e: &ServerEvent, (k,): (i64,)|
                 -> anyhow::Result<()> {
            let n: i64 = page.text("out").unwrap_or_default().parse()?;
            page.set_text("out", &(n + k).to_string())?;
            Ok(())
        })
        .build()
}

fn fixture() -> Fixture {
    let errors = Arc::new(AtomicUsize::new(0));
    let views = MemoryViews::new()
        .with("home", HOME)
        .with("panel", PANEL)
        .with("notes", NOTES)
        .with("plain", PLAIN);
    let app = Codebehind::new(
        Config::default(),
        Arc::new(views),
        Arc::new(ModuleDir::new("test").controller(home_class(errors.clone()))),
        None);
    Fixture { app, errors }
}

fn html(outcome: RenderOutcome) -> String {
    match outcome {
        RenderOutcome::Html(html) => html,
        o => panic!("expected HTML, got {o:?}")
    }
}

fn partial(outcome: RenderOutcome) -> PartialResponse {
    match outcome {
        RenderOutcome::Partial(p) => p,
        o => panic!("expected a partial response, got {o:?}")
    }
}

#[test]
fn t_first_load() -> Result<()> {
    let f = fixture();
    let out = html(f.app.render("home", RenderOptions::request(RequestContext::get("/")))?);
    assert!(out.contains("<p id=\"status\">started</p>"));
    for marker in ["runat", "codebehind=", "language="] {
        assert!(!out.contains(marker), "{marker} in {out}");
    }
    assert!(out.contains("<script>const serverEvents = {}; const clientEvents = {};"));
    assert!(out.contains("name=\"__eventElement\""));
    assert_eq!(f.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn t_postback_runs_handler() -> Result<()> {
    let f = fixture();
    let req = RequestContext::post("/")
        .with_field("name", "Ann")
        .with_event(&EventDescriptor::click("__element_xid0", "submit", vec![]));
    let out = html(f.app.render("home", RenderOptions::request(req))?);
    assert!(out.contains("<title>Submitted</title>"));
    // No start on postbacks.
    assert!(out.contains("<p id=\"status\"></p>"));
    assert!(out.contains("value=\"Ann\""));
    assert_eq!(f.errors.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn t_unknown_handler() {
    let f = fixture();
    let req = RequestContext::post("/")
        .with_event(&EventDescriptor::click("__element_xid0", "nope", vec![]));
    let err = f.app.render("home", RenderOptions::request(req)).unwrap_err();
    assert!(matches!(*err, CodebehindErrorKind::HandlerNotFound { .. }));
    assert_eq!(err.to_string(), "Function nope not found in codebehind");
    assert_eq!(f.errors.load(Ordering::SeqCst), 1);
}

#[test]
fn t_failing_handler() {
    let f = fixture();
    let req = RequestContext::post("/")
        .with_event(&EventDescriptor::click("__element_xid0", "boom", vec![]));
    let err = f.app.render("home", RenderOptions::request(req)).unwrap_err();
    assert!(matches!(*err, CodebehindErrorKind::HandlerExecution { .. }));
    assert_eq!(err.to_string(), "handler \"boom\" failed: x");
    assert_eq!(err.client_message(), "x");
    assert_eq!(f.errors.load(Ordering::SeqCst), 1);
}

#[test]
fn t_failing_start() {
    let f = fixture();
    let req = RequestContext::get("/").with_query("fail", "1");
    let err = f.app.render("home", RenderOptions::request(req)).unwrap_err();
    assert!(matches!(*err, CodebehindErrorKind::Lifecycle { hook: "start", .. }));
    assert_eq!(err.to_string(), "start hook failed: not today");
    assert_eq!(f.errors.load(Ordering::SeqCst), 1);
}

#[test]
fn t_update_panel() -> Result<()> {
    let f = fixture();
    let req = RequestContext::post("/").with_json_body(json!({
        "__eventElement": EventDescriptor::click("__element_xid0", "bump", vec![json!(2)])
            .with_update_panel("panelA"),
    }));
    let p = partial(f.app.render("panel", RenderOptions::request(req))?);
    assert!(p.success);
    assert_eq!(p.panel_id.as_deref(), Some("panelA"));
    let inner = p.html.unwrap_or_default();
    assert!(inner.starts_with("<span id=\"out\">2</span>"), "{inner}");
    assert!(!inner.contains("runat"));
    assert!(!inner.contains("outside"));
    Ok(())
}

#[test]
fn t_update_panel_not_found() -> Result<()> {
    let f = fixture();
    let req = RequestContext::post("/").with_json_body(json!({
        "__eventElement": EventDescriptor::click("__element_xid0", "bump", vec![json!(1)])
            .with_update_panel("elsewhere"),
    }));
    let p = partial(f.app.render("panel", RenderOptions::request(req))?);
    assert_eq!(p, PartialResponse::panel_not_found());
    assert_eq!(serde_json::to_value(&p)?,
               json!({"success": false, "error": "UpdatePanel not found"}));
    Ok(())
}

#[test]
fn t_pass_through() -> Result<()> {
    let f = fixture();
    match f.app.render("plain", RenderOptions::request(RequestContext::get("/")))? {
        RenderOutcome::PassThrough(out) => assert_eq!(out, PLAIN),
        o => panic!("unexpected {o:?}")
    }
    // Without request context even codebehind templates pass.
    match f.app.render("home", RenderOptions::plain())? {
        RenderOutcome::PassThrough(out) => assert_eq!(out, HOME),
        o => panic!("unexpected {o:?}")
    }
    Ok(())
}

#[test]
fn t_router_style() -> Result<()> {
    let f = fixture();
    let req = RequestContext::get("/");
    let page = Box::new(PageInstance::create(home_class(f.errors.clone()), req.clone())?);
    let page = match f.app.compose("home", req, page)? {
        RenderOutcome::Composed(page) => page,
        o => panic!("unexpected {o:?}")
    };
    assert_eq!(page.state(), LifecycleState::Started);
    assert_eq!(page.page().text("status").as_deref(), Some("started"));
    let out = page.finish()?;
    assert!(out.contains("started") && !out.contains("runat"));
    Ok(())
}

#[test]
fn t_text_only_elements_survive() -> Result<()> {
    let f = fixture();
    let req = RequestContext::get("/");
    let page = Box::new(PageInstance::create(home_class(f.errors.clone()), req.clone())?);
    let page = match f.app.compose("notes", req, page)? {
        RenderOutcome::Composed(page) => page,
        o => panic!("unexpected {o:?}")
    };
    assert_eq!(page.page().title().as_deref(), Some("Tom & <Jerry>"));
    let out = page.finish()?;
    assert!(out.contains("<title>Tom &amp; &lt;Jerry&gt;</title>"), "{out}");
    assert!(out.contains("<textarea name=\"t\">Use &lt;b&gt; for bold</textarea>"), "{out}");
    assert!(!out.contains("</b>"));
    Ok(())
}

#[test]
fn t_get_populates_from_query() -> Result<()> {
    let f = fixture();
    // The form posts, so a query value doesn't reach it.
    let req = RequestContext::get("/").with_query("name", "Q");
    let out = html(f.app.render("home", RenderOptions::request(req))?);
    assert!(!out.contains("value=\"Q\""));
    assert_eq!(f.app.store().stats().templates.keys, vec!["home"]);
    assert_eq!(f.app.store().stats().controllers.keys, vec!["Home"]);
    Ok(())
}

#[test]
fn t_independent_instances() -> Result<()> {
    let a = fixture();
    let b = fixture();
    a.app.render("home", RenderOptions::request(RequestContext::get("/")))?;
    assert!(a.app.store().stats().active);
    assert!(!b.app.store().stats().active);
    Ok(())
}
