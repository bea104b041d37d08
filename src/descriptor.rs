//! The JSON values exchanged with the generated client script.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Name of the hidden form field (or JSON body key) carrying the
/// serialized `EventDescriptor`.
pub const EVENT_FIELD: &str = "__eventElement";

/// Which server method to run, for which element, with what
/// arguments. Click events fill in all fields; the `serverEvents`
/// stubs only send `exec` and `args`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// The `__element_xid` of the element that was clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicked: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_panel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventDescriptor {
    /// A descriptor as sent by the `serverEvents` stubs.
    pub fn call(exec: &str, args: Vec<Value>) -> Self {
        EventDescriptor {
            exec: Some(exec.into()),
            args,
            ..Default::default()
        }
    }

    /// A descriptor as written by the click closures.
    pub fn click(clicked: &str, exec: &str, args: Vec<Value>) -> Self {
        EventDescriptor {
            event: Some("click".into()),
            clicked: Some(clicked.into()),
            exec: Some(exec.into()),
            args,
            ..Default::default()
        }
    }

    pub fn with_update_panel(mut self, panel_id: &str) -> Self {
        self.update_panel = Some(panel_id.into());
        self
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Interpret the carrier field's value: a JSON string for form
    /// posts, an embedded object for JSON posts. Empty or null means
    /// no event.
    pub fn from_field(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(Self::from_json(s)?)),
            v => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings and JSON values can't fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The reply to an update panel round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PartialResponse {
    pub fn panel(panel_id: &str, html: String) -> Self {
        PartialResponse {
            success: true,
            html: Some(html),
            panel_id: Some(panel_id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        PartialResponse {
            success: false,
            html: None,
            panel_id: None,
            error: Some(error.into()),
        }
    }

    pub fn panel_not_found() -> Self {
        Self::failure("UpdatePanel not found")
    }
}
