//! Element matching, a tiny subset of what CSS selectors do:
//! tag name plus attribute presence/equality.

use crate::{Document, NodeId};

#[derive(Debug, Clone, Copy)]
enum AttrTest<'a> {
    Present,
    Equals(&'a str),
}

/// `Match::tag("form").eq("runat", "server")` is `form[runat=server]`.
#[derive(Debug, Clone, Default)]
pub struct Match<'a> {
    tag: Option<&'a str>,
    attrs: Vec<(&'a str, AttrTest<'a>)>,
}

impl<'a> Match<'a> {
    /// Any element.
    pub fn any() -> Self {
        Match { tag: None, attrs: Vec::new() }
    }

    pub fn tag(name: &'a str) -> Self {
        Match { tag: Some(name), attrs: Vec::new() }
    }

    /// Require the attribute to be present.
    pub fn has(mut self, attr: &'a str) -> Self {
        self.attrs.push((attr, AttrTest::Present));
        self
    }

    /// Require the attribute to have exactly the given value.
    pub fn eq(mut self, attr: &'a str, value: &'a str) -> Self {
        self.attrs.push((attr, AttrTest::Equals(value)));
        self
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let elt = match doc.element(id) {
            Some(e) => e,
            None => return false
        };
        if let Some(tag) = self.tag {
            if !elt.name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, test)| {
            match (elt.attr(name), test) {
                (None, _) => false,
                (Some(_), AttrTest::Present) => true,
                (Some(v), AttrTest::Equals(want)) => v == *want,
            }
        })
    }
}
