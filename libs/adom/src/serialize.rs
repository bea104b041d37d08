//! Serialization back to markup.

use std::fmt::Write;

use crate::{Document, NodeId, NodeKind, is_void_element};

/// Escape text for use in element contents or (double-quoted)
/// attribute values.
pub fn html_escape(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c)
        }
    }
}

impl Document {
    fn print_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => self.print_children(id, out),
            NodeKind::Doctype(name) => {
                // (Writing to a String can't fail.)
                let _ = write!(out, "<!DOCTYPE {name}>");
            }
            NodeKind::Element(elt) => {
                out.push('<');
                out.push_str(&elt.name);
                for (k, v) in &elt.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    html_escape(v, out);
                    out.push('"');
                }
                out.push('>');
                if !is_void_element(&elt.name) {
                    self.print_children(id, out);
                    out.push_str("</");
                    out.push_str(&elt.name);
                    out.push('>');
                }
            }
            NodeKind::Text(s) => html_escape(s, out),
            NodeKind::Raw(s) => out.push_str(s),
            NodeKind::Comment(s) => {
                out.push_str("<!--");
                out.push_str(s);
                out.push_str("-->");
            }
        }
    }

    fn print_children(&self, id: NodeId, out: &mut String) {
        for &c in self.children(id) {
            self.print_node(c, out);
        }
    }

    /// The markup of the node including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.print_node(id, &mut out);
        out
    }

    /// The markup of the node's children.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.print_children(id, &mut out);
        out
    }

    /// The whole document, doctype included if there was one.
    pub fn to_html(&self) -> String {
        self.outer_html(self.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Match;

    #[test]
    fn t_html_escape() {
        let mut s = String::new();
        html_escape("<a href='x'>&\"</a>", &mut s);
        assert_eq!(s, "&lt;a href=&#39;x&#39;&gt;&amp;&quot;&lt;/a&gt;");
    }

    #[test]
    fn t_inner_outer() {
        let doc = Document::parse("<div id=p><b>x</b> y<input name=n></div>");
        let div = doc.find(&Match::tag("div")).unwrap();
        assert_eq!(doc.inner_html(div), "<b>x</b> y<input name=\"n\">");
        assert_eq!(doc.outer_html(div),
                   "<div id=\"p\"><b>x</b> y<input name=\"n\"></div>");
    }
}
