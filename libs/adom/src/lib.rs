//! A mutable HTML document held in an arena.
//!
//! Nodes are referred to by `NodeId`s that are only meaningful for
//! the `Document` that created them. Parsing is html5ever's, thus
//! the tree is the one a browser builds (`<html>`, `<head>` and
//! `<body>` always exist). Attributes keep their source order.

mod parse;
mod select;
mod serialize;

use kstring::KString;

pub use select::Match;
pub use serialize::html_escape;

#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("can't append {child:?} to itself or one of its descendants")]
    Cycle { child: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: KString,
    /// In source order, additions are appended.
    pub attrs: Vec<(KString, KString)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(k, _)| k.as_str() == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(KString),
    Element(Element),
    Text(String),
    /// Text that is serialized without escaping (script and style
    /// contents).
    Raw(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Elements that never have contents nor a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Elements whose contents are not markup, and are serialized
/// unescaped.
pub const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

pub fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document (just the root node).
    pub fn new() -> Self {
        Document {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }]
        }
    }

    /// Parse a whole document. Never fails, broken markup is
    /// recovered from the way browsers do.
    pub fn parse(html: &str) -> Document {
        let mut doc = Document::new();
        parse::parse_document_into(&mut doc, html);
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The first element child of the root, normally `<html>`.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root()).iter().copied()
            .find(|id| self.is_element(*id))
    }

    /// The first element called `name`, in document order.
    pub fn first_element_named(&self, name: &str) -> Option<NodeId> {
        self.find(&Match::tag(name))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.first_element_named("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.first_element_named("body")
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element(_))
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id).kind {
            NodeKind::Element(e) => Some(e),
            _ => None
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element(e) => Ok(e),
            _ => Err(DomError::NotAnElement(id))
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let elt = self.element_mut(id)?;
        if let Some(slot) = elt.attrs.iter_mut().find(|(k, _)| k.as_str() == name) {
            slot.1 = KString::from_ref(value);
        } else {
            elt.attrs.push((KString::from_ref(name), KString::from_ref(value)));
        }
        Ok(())
    }

    /// Remove an attribute, returning its previous value. Non-elements
    /// don't have any, hence `None`.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<KString> {
        let elt = self.element_mut(id).ok()?;
        let i = elt.attrs.iter().position(|(k, _)| k.as_str() == name)?;
        Some(elt.attrs.remove(i).1)
    }

    /// All nodes below `id`, in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Text content of the node and its descendants.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut push = |n: NodeId| match self.kind(n) {
            NodeKind::Text(s) | NodeKind::Raw(s) => out.push_str(s),
            _ => ()
        };
        push(id);
        for n in self.descendants(id) {
            push(n);
        }
        out
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData { kind, parent: None, children: Vec::new() });
        id
    }

    /// A new element, not attached anywhere yet.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            name: KString::from_ref(name),
            attrs: attrs.iter()
                .map(|(k, v)| (KString::from_ref(k), KString::from_ref(v)))
                .collect(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_raw(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Raw(text.into()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    /// Detach a node from its parent; it stays valid and can be
    /// appended elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
    }

    /// Attach a fresh node, no checks.
    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Cycle { child });
        }
        match self.kind(parent) {
            NodeKind::Document | NodeKind::Element(_) => Ok(()),
            _ => Err(DomError::NotAnElement(parent))
        }
    }

    /// Move `child` (with its subtree) to the start of `parent`'s
    /// children.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(0, child);
        Ok(())
    }

    /// Move `child` (with its subtree) to the end of `parent`'s
    /// children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child);
        // Text directly following text would serialize the same but
        // make queries awkward.
        if let NodeKind::Text(s) = &self.node(child).kind {
            if let Some(last) = self.children(parent).last().copied() {
                if let NodeKind::Text(_) = self.kind(last) {
                    let s = s.clone();
                    if let NodeKind::Text(t) = &mut self.node_mut(last).kind {
                        t.push_str(&s);
                    }
                    return Ok(())
                }
            }
        }
        self.push_child(parent, child);
        Ok(())
    }

    /// Parse `html` as the contents of `parent` and append the
    /// resulting nodes to it.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Result<(), DomError> {
        let context = match self.kind(parent) {
            NodeKind::Element(e) => e.name.clone(),
            NodeKind::Document => KString::from_static("body"),
            _ => return Err(DomError::NotAnElement(parent))
        };
        parse::parse_fragment_into(self, parent, &context, html);
        Ok(())
    }

    /// Replace all children of `id` by a single text node (a raw one
    /// for script and style elements).
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        let raw = is_raw_text_element(self.element_mut(id)?.name.as_str());
        for c in self.children(id).to_vec() {
            self.detach(c);
        }
        if !text.is_empty() {
            let t = if raw { self.create_raw(text) } else { self.create_text(text) };
            self.append_child(id, t)?;
        }
        Ok(())
    }

    /// The first element with the given `id` attribute, in document
    /// order.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find(&Match::any().eq("id", id))
    }

    /// All attached elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root()).into_iter()
            .filter(|n| self.is_element(*n))
            .collect()
    }

    /// The elements matching `m` in document order.
    pub fn find_all(&self, m: &Match) -> Vec<NodeId> {
        self.find_all_in(self.root(), m)
    }

    /// The elements below `scope` (excluding it) matching `m`.
    pub fn find_all_in(&self, scope: NodeId, m: &Match) -> Vec<NodeId> {
        self.descendants(scope).into_iter()
            .filter(|n| m.matches(self, *n))
            .collect()
    }

    pub fn find(&self, m: &Match) -> Option<NodeId> {
        self.find_in(self.root(), m)
    }

    pub fn find_in(&self, scope: NodeId, m: &Match) -> Option<NodeId> {
        // Walk lazily, the common case is an early hit.
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if m.matches(self, n) {
                return Some(n);
            }
            stack.extend(self.children(n).iter().rev().copied());
        }
        None
    }

    /// `id` itself or its nearest ancestor matching `m`.
    pub fn closest(&self, id: NodeId, m: &Match) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if m.matches(self, n) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn t_parse_and_query() {
        let doc = Document::parse(
            "<html lang=en><body><form runat=server><p id=a>x</p></form></body></html>");
        let html = doc.document_element().unwrap();
        assert_eq!(doc.tag_name(html), Some("html"));
        assert_eq!(doc.attr(html, "lang"), Some("en"));
        let p = doc.element_by_id("a").unwrap();
        assert_eq!(doc.text(p), "x");
        let form = doc.closest(p, &Match::tag("form").eq("runat", "server")).unwrap();
        assert_eq!(doc.tag_name(form), Some("form"));
        assert_eq!(doc.closest(p, &Match::any().has("lang")), Some(html));
        assert_eq!(doc.body(), doc.parent(form));
    }

    #[test]
    fn t_attributes() -> Result<(), DomError> {
        let mut doc = Document::parse("<div z=0 b=2 a=1></div>");
        let div = doc.find(&Match::tag("div")).unwrap();
        doc.set_attr(div, "c", "3")?;
        doc.set_attr(div, "a", "one")?;
        assert_eq!(doc.remove_attr(div, "b").as_deref(), Some("2"));
        assert_eq!(doc.remove_attr(div, "b"), None);
        assert_eq!(doc.outer_html(div), r#"<div z="0" a="one" c="3"></div>"#);
        let text = doc.create_text("t");
        assert!(doc.set_attr(text, "a", "b").is_err());
        Ok(())
    }

    #[test]
    fn t_append_and_cycles() -> Result<(), DomError> {
        let mut doc = Document::parse("<ul><li>a</li></ul>");
        let ul = doc.find(&Match::tag("ul")).unwrap();
        doc.append_html(ul, "<li>b</li><li>c</li>")?;
        assert_eq!(doc.find_all_in(ul, &Match::tag("li")).len(), 3);
        let li = doc.find(&Match::tag("li")).unwrap();
        assert!(matches!(doc.append_child(li, ul), Err(DomError::Cycle { .. })));
        let t1 = doc.create_text("x");
        let t2 = doc.create_text("y");
        doc.append_child(li, t1)?;
        doc.append_child(li, t2)?;
        assert_eq!(doc.children(li).len(), 1);
        assert_eq!(doc.text(li), "axy");
        let first = doc.create_element("li", &[("id", "first")]);
        doc.prepend_child(ul, first)?;
        assert_eq!(doc.children(ul)[0], first);
        Ok(())
    }

    #[test]
    fn t_set_text() -> Result<(), DomError> {
        let mut doc = Document::parse("<title>Old <b>x</b></title><script></script>");
        let title = doc.find(&Match::tag("title")).unwrap();
        doc.set_text(title, "A & B")?;
        assert_eq!(doc.outer_html(title), "<title>A &amp; B</title>");
        let script = doc.find(&Match::tag("script")).unwrap();
        doc.set_text(script, "if (a < b) {}")?;
        assert_eq!(doc.outer_html(script), "<script>if (a < b) {}</script>");
        Ok(())
    }
}
