//! The runtime shared by all generated page scripts: `__js`,
//! `__updatePanel`, `server_event` and `raiseServerEvent`, plus the
//! styles hiding the `show="progress|success|failure"` regions until
//! a round trip toggles them.

use std::borrow::Cow;

pub const COMMON_SCRIPTS: &str = include_str!("client/common_scripts.js");
pub const COMMON_STYLES: &str = include_str!("client/common_styles.css");

#[derive(Debug, Clone)]
pub struct ClientAssets {
    pub script: Option<Cow<'static, str>>,
    pub style: Option<Cow<'static, str>>,
}

impl ClientAssets {
    /// The assets shipped with this crate.
    pub fn embedded() -> Self {
        ClientAssets {
            script: Some(Cow::Borrowed(COMMON_SCRIPTS)),
            style: Some(Cow::Borrowed(COMMON_STYLES)),
        }
    }

    /// No shared runtime at all (tests comparing generated script).
    pub fn none() -> Self {
        ClientAssets { script: None, style: None }
    }
}

impl Default for ClientAssets {
    fn default() -> Self {
        Self::embedded()
    }
}
