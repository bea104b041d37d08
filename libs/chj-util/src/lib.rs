//! Utilities shared between the codebehind crates.

pub mod warn;
pub mod time_guard;

// Re-exported so that the macros work without the user crate
// depending on `log` directly.
pub use log;
