//! What the engine gets to know about an HTTP request.

use std::collections::BTreeMap;

use kstring::KString;
use serde_json::Value;

use crate::controller::PageInstance;
use crate::descriptor::{EventDescriptor, EVENT_FIELD};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Other(KString),
}

impl HttpMethod {
    pub fn from_str(s: &str) -> Self {
        match s {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            _ => HttpMethod::Other(KString::from_ref(s))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Other(s) => s.as_str(),
        }
    }
}

/// Request data, decoupled from the HTTP server library.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub method: HttpMethod,
    /// Path without the query string, percent-decoded.
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Form fields (as strings) or the members of a JSON object body.
    pub body: BTreeMap<String, Value>,
}

impl RequestContext {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        RequestContext {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: BTreeMap::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Carry `descriptor` the way a full-page form submit does (as a
    /// JSON string).
    pub fn with_event(self, descriptor: &EventDescriptor) -> Self {
        let json = descriptor.to_json();
        self.with_field(EVENT_FIELD, json)
    }

    /// Add the members of a JSON object body; other JSON values are
    /// ignored (they can't name fields).
    pub fn with_json_body(mut self, body: Value) -> Self {
        if let Value::Object(map) = body {
            self.body.extend(map);
        }
        self
    }

    pub fn is_post(&self) -> bool {
        self.method == HttpMethod::Post
    }

    /// The event descriptor carried in the body, if any.
    pub fn event_descriptor(&self) -> Result<Option<EventDescriptor>> {
        match self.body.get(EVENT_FIELD) {
            Some(v) => EventDescriptor::from_field(v),
            None => Ok(None)
        }
    }

    /// Whether the client waits for a `PartialResponse` (an update
    /// panel round trip). Undecodable descriptors count as no.
    pub fn expects_partial(&self) -> bool {
        matches!(self.event_descriptor(),
                 Ok(Some(EventDescriptor { update_panel: Some(_), .. })))
    }
}

/// Body field values as markup attribute values.
pub fn field_value_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        v => v.to_string()
    }
}

/// How a view is being rendered.
#[derive(Default)]
pub struct RenderOptions {
    /// Absent for renders not tied to a request; those are never
    /// intercepted.
    pub context: Option<RequestContext>,
    /// A page instance created upstream (by a route handler) to be
    /// reused instead of constructing one.
    pub page: Option<Box<PageInstance>>,
    /// Hand the live page back instead of serializing it.
    pub router_style: bool,
}

impl RenderOptions {
    /// Rendering without request context (pass-through).
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn request(context: RequestContext) -> Self {
        RenderOptions {
            context: Some(context),
            page: None,
            router_style: false,
        }
    }

    pub fn router(context: RequestContext, page: Box<PageInstance>) -> Self {
        RenderOptions {
            context: Some(context),
            page: Some(page),
            router_style: true,
        }
    }
}
