use kstring::KString;

use crate::def_boxed_error;

/// Everything that can make a render or a dispatch fail. Templates
/// that aren't codebehind-enabled and update panels that can't be
/// found are not errors, see `RenderOutcome::PassThrough` and
/// `PartialResponse::panel_not_found`.
#[derive(thiserror::Error, Debug)]
pub enum CodebehindErrorKind {
    #[error("controller \"{name}\" not found (tried {tried})")]
    ControllerNotFound { name: KString, tried: String },

    #[error("loading controller \"{name}\": {error:#}")]
    ControllerLoad { name: KString, error: anyhow::Error },

    #[error("module \"{name}\" is a partial controller and can't be used for a page")]
    NotAController { name: KString },

    #[error("element {element} with server click must be enclosed inside \
             a form or update panel running at the server")]
    Scope { element: String },

    #[error("Function {name} not found in codebehind")]
    HandlerNotFound { name: KString },

    #[error("handler \"{handler}\" failed: {error:#}")]
    HandlerExecution { handler: KString, error: anyhow::Error },

    #[error("{hook} hook failed: {error:#}")]
    Lifecycle { hook: &'static str, error: anyhow::Error },

    #[error("arguments for handler \"{handler}\": {message}")]
    ArgumentMismatch { handler: KString, message: String },

    #[error("invalid event descriptor: {0}")]
    InvalidEventDescriptor(#[from] serde_json::Error),

    #[error("no server-bound element with id {id:?}")]
    UnknownElement { id: String },

    #[error("page has no document (API invocation)")]
    NoDocument,

    #[error("view {name:?}: {error:#}")]
    View { name: String, error: anyhow::Error },

    #[error("document: {0}")]
    Dom(#[from] adom::DomError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

def_boxed_error!(CodebehindError, CodebehindErrorKind);

pub type Result<T, E = CodebehindError> = std::result::Result<T, E>;

impl CodebehindError {
    pub fn handler_execution(handler: &str, error: anyhow::Error) -> Self {
        CodebehindErrorKind::HandlerExecution {
            handler: KString::from_ref(handler),
            error
        }.into()
    }

    pub fn lifecycle(hook: &'static str, error: anyhow::Error) -> Self {
        CodebehindErrorKind::Lifecycle { hook, error }.into()
    }

    /// The message shown to clients, without the internals that the
    /// log gets.
    pub fn client_message(&self) -> String {
        match self.kind() {
            CodebehindErrorKind::HandlerExecution { error, .. } => format!("{error}"),
            CodebehindErrorKind::Lifecycle { error, .. } => format!("{error}"),
            _ => self.to_string()
        }
    }
}
