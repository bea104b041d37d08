//! Turning `onclick="server.foo(..)"` attributes into generated client
//! script.
//!
//! Every `[onclick][runat=server]` element gets a synthetic
//! `__element_xid`, its scope (update panel or server form) gets a
//! hidden `__eventElement` carrier field, and each `server.<method>`
//! call in its click expression is replaced by a call into the
//! `clientEvents` table. The closures in that table write the event
//! descriptor into the carrier and, for update panels, start the
//! partial round trip.

use std::sync::Arc;

use adom::{Document, Match, NodeId};
use serde::Serialize;

use chj_util::{debug, warn};

use crate::client::ClientAssets;
use crate::controller::HandlerInfo;
use crate::descriptor::EVENT_FIELD;
use crate::error::{CodebehindErrorKind, Result};
use crate::rewriter::{ExpressionRewriter, RegexClickRewriter};

pub const XID_ATTR: &str = "__element_xid";

/// The generated `<script>` and `<style>` contents for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientScript {
    pub script: String,
    pub style: Option<String>,
}

/// Where the descriptor of a click goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    Panel { node: NodeId, id: String },
    Form(NodeId),
}

impl EventScope {
    pub fn node(&self) -> NodeId {
        match self {
            EventScope::Panel { node, .. } => *node,
            EventScope::Form(node) => *node,
        }
    }

    pub fn panel_id(&self) -> Option<&str> {
        match self {
            EventScope::Panel { id, .. } => Some(id),
            EventScope::Form(_) => None,
        }
    }
}

fn panel_by_id(doc: &Document, id: &str) -> Option<NodeId> {
    doc.find(&Match::any().eq("id", id).eq("updatepanel", "true"))
}

fn panel_scope(doc: &Document, panel_id: &str) -> Option<EventScope> {
    panel_by_id(doc, panel_id).map(|node| EventScope::Panel { node, id: panel_id.into() })
}

fn server_form(doc: &Document, elt: NodeId) -> Option<EventScope> {
    doc.closest(elt, &Match::tag("form").eq("runat", "server")).map(EventScope::Form)
}

/// The scope of an interactive element: the enclosing update panel,
/// else the panel named by its own `for` attribute, else the panel
/// named by the closest `for` on an ancestor, else the enclosing
/// server form. `for` references to missing panels are ignored, and
/// so is an enclosing panel without `id` (the form is used then).
pub fn resolve_scope(doc: &Document, elt: NodeId) -> Option<EventScope> {
    if let Some(node) = doc.closest(elt, &Match::any().eq("updatepanel", "true")) {
        return match doc.attr(node, "id") {
            Some(id) => Some(EventScope::Panel { node, id: id.into() }),
            None => server_form(doc, elt)
        }
    }
    if let Some(scope) = doc.attr(elt, "for").and_then(|f| panel_scope(doc, f)) {
        return Some(scope);
    }
    if let Some(scope) = doc.closest(elt, &Match::any().has("for"))
        .and_then(|n| doc.attr(n, "for"))
        .and_then(|f| panel_scope(doc, f))
    {
        return Some(scope);
    }
    server_form(doc, elt)
}

/// The id of the scope's carrier field, appending one if the scope
/// has none yet.
pub fn ensure_carrier(doc: &mut Document, scope: NodeId, counter: &mut usize)
                      -> Result<String> {
    let existing = doc.find_in(
        scope, &Match::tag("input").eq("type", "hidden").eq("name", EVENT_FIELD));
    if let Some(hidden) = existing {
        if let Some(id) = doc.attr(hidden, "id") {
            return Ok(id.to_owned());
        }
        let id = format!("{EVENT_FIELD}{}", *counter);
        *counter += 1;
        doc.set_attr(hidden, "id", &id)?;
        return Ok(id)
    }
    let id = format!("{EVENT_FIELD}{}", *counter);
    *counter += 1;
    let hidden = doc.create_element(
        "input", &[("type", "hidden"), ("name", EVENT_FIELD), ("id", &id)]);
    doc.append_child(scope, hidden)?;
    Ok(id)
}

/// Remove the `runat` markers below `scope`.
pub fn strip_server_markers(doc: &mut Document, scope: NodeId) {
    for n in doc.descendants(scope) {
        doc.remove_attr(n, "runat");
    }
}

/// The static part of a click's descriptor; `args` is spliced in as
/// raw script text.
#[derive(Serialize)]
struct ClickTemplate<'a> {
    event: &'static str,
    clicked: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "updatePanel", skip_serializing_if = "Option::is_none")]
    update_panel: Option<&'a str>,
    exec: &'a str,
}

impl<'a> ClickTemplate<'a> {
    /// A script object literal: the JSON of the static fields plus
    /// `"args":[<raw>]`.
    fn with_raw_args(&self, raw_args: &str) -> String {
        let mut s = js_string_or_object(self);
        s.pop();
        s.push_str(",\"args\":[");
        s.push_str(raw_args);
        s.push_str("]}");
        s
    }
}

fn js_string_or_object(v: &impl Serialize) -> String {
    // Plain strings and options thereof always serialize.
    serde_json::to_string(v).unwrap_or_default()
}

fn js_string(s: &str) -> String {
    js_string_or_object(&s)
}

fn server_event_stub(name: &str) -> String {
    format!("(...args) => {{ return server_event({}, args); }}", js_string(name))
}

/// Insertion-ordered name -> script table without duplicate names.
#[derive(Default)]
struct ScriptTable {
    entries: Vec<(String, String)>,
}

impl ScriptTable {
    fn insert_missing(&mut self, key: &str, value: impl FnOnce() -> String) {
        if !self.entries.iter().any(|(k, _)| k == key) {
            self.entries.push((key.to_owned(), value()));
        }
    }

    fn assignments<'s>(&'s self, table: &'s str) -> impl Iterator<Item = String> + 's {
        self.entries.iter()
            .map(move |(k, v)| format!("{table}[{}] = {v};", js_string(k)))
    }
}

fn describe(doc: &Document, elt: NodeId) -> String {
    let tag = doc.tag_name(elt).unwrap_or("?");
    match (doc.attr(elt, "id"), doc.attr(elt, "name")) {
        (Some(id), _) => format!("<{tag} id={id:?}>"),
        (None, Some(name)) => format!("<{tag} name={name:?}>"),
        (None, None) => format!("<{tag}>"),
    }
}

/// Keep the generated code from closing its `<script>` element.
fn escape_script_text(s: &str) -> String {
    s.replace("</", "<\\/")
}

pub struct EventBinder {
    rewriter: Arc<dyn ExpressionRewriter>,
    assets: ClientAssets,
}

impl Default for EventBinder {
    fn default() -> Self {
        EventBinder::new(Arc::new(RegexClickRewriter), ClientAssets::embedded())
    }
}

impl EventBinder {
    pub fn new(rewriter: Arc<dyn ExpressionRewriter>, assets: ClientAssets) -> Self {
        EventBinder { rewriter, assets }
    }

    pub fn assets(&self) -> &ClientAssets {
        &self.assets
    }

    /// Bind all interactive server elements of `doc` and generate the
    /// page script. `handlers` are the controller's handlers; the API
    /// ones get `serverEvents` stubs even when no element calls them.
    pub fn bind(&self, doc: &mut Document, handlers: &[HandlerInfo]) -> Result<ClientScript> {
        let mut server_events = ScriptTable::default();
        for h in handlers.iter().filter(|h| h.api) {
            server_events.insert_missing(&h.name, || server_event_stub(&h.name));
        }
        let mut client_events = ScriptTable::default();
        let mut listeners: Vec<String> = Vec::new();
        let mut carrier_counter = 0;

        let interactive = doc.find_all(&Match::any().has("onclick").eq("runat", "server"));
        for (i, elt) in interactive.into_iter().enumerate() {
            let xid = format!("{XID_ATTR}{i}");
            doc.set_attr(elt, XID_ATTR, &xid)?;

            let scope = match resolve_scope(doc, elt) {
                Some(scope) => scope,
                None => {
                    let element = describe(doc, elt);
                    warn!("no event scope for {element}");
                    return Err(CodebehindErrorKind::Scope { element }.into())
                }
            };
            let hidden_id = ensure_carrier(doc, scope.node(), &mut carrier_counter)?;
            let hidden = js_string(&hidden_id);

            let onclick = doc.remove_attr(elt, "onclick").map(|s| s.to_string()).unwrap_or_default();
            let postclick = doc.remove_attr(elt, "postclick");
            let (pre, post) = match scope.panel_id() {
                Some(_) => ("event.preventDefault(); ".to_owned(),
                            format!(" __updatePanel({hidden}, self);")),
                None => (String::new(), String::new()),
            };

            let mut n_calls = 0;
            let rewritten = {
                let id = doc.attr(elt, "id");
                let name = doc.attr(elt, "name");
                let panel = scope.panel_id();
                let mut replace = |method: &str, raw_args: &str| -> String {
                    let descriptor = ClickTemplate {
                        event: "click",
                        clicked: &xid,
                        id,
                        name,
                        update_panel: panel,
                        exec: method,
                    }.with_raw_args(raw_args);
                    let key = format!("{xid}_{n_calls}");
                    n_calls += 1;
                    client_events.insert_missing(&key, || format!(
                        "function(self, event) {{ {pre}document.getElementById({hidden})\
                         .value=__js({descriptor});{post} }}"));
                    server_events.insert_missing(method, || server_event_stub(method));
                    format!("raiseServerEvent(this, {}, event)", js_string(&key))
                };
                self.rewriter.rewrite(&onclick, &mut replace)
            };

            let mut listener = vec![
                format!("{{ const elt = document.querySelector(\"[{XID_ATTR}='{xid}']\");"),
                format!("elt.addEventListener(\"click\", function (event) {{{rewritten}}});"),
            ];
            if let Some(postclick) = postclick.filter(|p| !p.is_empty()) {
                listener.push(format!(" elt.postclick = {postclick}; "));
            }
            listener.push("}".into());
            listeners.push(listener.join("\t"));
        }

        let mut init: Vec<String> = server_events.assignments("serverEvents")
            .chain(client_events.assignments("clientEvents"))
            .collect();
        if !listeners.is_empty() {
            init.push(listeners.join("\n"));
        }
        debug!("bound {} elements, {} server events, {} carriers",
               listeners.len(), server_events.entries.len(), carrier_counter);

        let mut script = escape_script_text(&format!(
            "const serverEvents = {{}}; const clientEvents = {{}};\n(function() {{{}}})();",
            init.join("\n")));
        if let Some(common) = &self.assets.script {
            script.push('\n');
            script.push_str(common);
        }
        Ok(ClientScript {
            script,
            style: self.assets.style.as_ref().map(|s| s.to_string()),
        })
    }
}

/// Append the script to `<body>` and the style to `<head>`. Without
/// those, the script goes last and the style first into the document
/// element (or the document itself).
pub fn inject(doc: &mut Document, client: &ClientScript) -> Result<()> {
    let fallback = doc.document_element().unwrap_or_else(|| doc.root());
    let script = doc.create_element("script", &[]);
    doc.set_text(script, &client.script)?;
    let body = doc.body().unwrap_or(fallback);
    doc.append_child(body, script)?;
    if let Some(css) = &client.style {
        let style = doc.create_element("style", &[]);
        doc.set_text(style, css)?;
        match doc.head() {
            Some(head) => doc.append_child(head, style)?,
            None => doc.prepend_child(fallback, style)?
        }
    }
    Ok(())
}
