//! Tree building, by html5ever: the parsed `RcDom` is copied into the
//! arena.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use kstring::KString;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::{Document, Element, NodeId, NodeKind, is_raw_text_element};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

fn qualified(prefix: Option<&str>, local: &str) -> KString {
    match prefix {
        Some(p) => KString::from_string(format!("{p}:{local}")),
        None => KString::from_ref(local)
    }
}

/// Copy `handle` (with its subtree) below `parent`.
fn import(doc: &mut Document, parent: NodeId, handle: &Handle) {
    let kind = match &handle.data {
        NodeData::Document => {
            import_children(doc, parent, handle);
            return;
        }
        NodeData::Doctype { name, .. } => NodeKind::Doctype(KString::from_ref(name)),
        NodeData::Text { contents } => {
            let text = String::from(&**contents.borrow());
            match doc.tag_name(parent) {
                Some(n) if is_raw_text_element(n) => NodeKind::Raw(text),
                _ => NodeKind::Text(text)
            }
        }
        NodeData::Comment { contents } => NodeKind::Comment(String::from(&**contents)),
        NodeData::Element { name, attrs, template_contents, .. } => {
            let attrs = attrs.borrow().iter()
                .map(|a| (qualified(a.name.prefix.as_deref(), &a.name.local),
                          KString::from_ref(&a.value)))
                .collect();
            let id = doc.alloc(NodeKind::Element(Element {
                name: qualified(name.prefix.as_deref(), &name.local),
                attrs,
            }));
            doc.push_child(parent, id);
            // Template contents live in a separate fragment, they
            // serialize as children.
            if let Some(contents) = template_contents.borrow().as_ref() {
                import_children(doc, id, contents);
            }
            import_children(doc, id, handle);
            return;
        }
        // Not produced by the HTML syntax.
        NodeData::ProcessingInstruction { .. } => return,
    };
    let id = doc.alloc(kind);
    doc.push_child(parent, id);
}

fn import_children(doc: &mut Document, parent: NodeId, handle: &Handle) {
    for child in handle.children.borrow().iter() {
        import(doc, parent, child);
    }
}

pub(crate) fn parse_document_into(doc: &mut Document, html: &str) {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
    let root = doc.root();
    import(doc, root, &dom.document);
}

/// Parse `html` as the contents of an element called `context` and
/// append the nodes to `parent`.
pub(crate) fn parse_fragment_into(doc: &mut Document, parent: NodeId, context: &str,
                                  html: &str) {
    let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(context));
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
        .one(html);
    // The fragment ends up below a synthetic `<html>` element.
    let top = dom.document.children.borrow().first().cloned();
    if let Some(top) = top {
        import_children(doc, parent, &top);
    }
}
