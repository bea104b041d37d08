//! Producing template markup by name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::path::{extension_eq, path_append};

/// Renders a template name to markup. The engine intercepts what
/// this produces.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, name: &str) -> Result<String>;

    fn exists(&self, name: &str) -> bool;
}

/// Views as files `<dir>/<name>.<extension>` (names that already end
/// in the extension are taken as is).
pub struct FileViews {
    dir: PathBuf,
    extension: String,
}

impl FileViews {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        FileViews {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        if extension_eq(name, self.extension.as_str()) {
            path_append(&self.dir, &name)
        } else {
            path_append(&self.dir, &format!("{name}.{}", self.extension))
        }
    }
}

impl ViewRenderer for FileViews {
    fn render(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        std::fs::read_to_string(&path).with_context(
            || anyhow!("reading view {name:?} from {path:?}"))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}

/// Views held in memory.
#[derive(Default)]
pub struct MemoryViews(BTreeMap<String, String>);

impl MemoryViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, html: &str) -> Self {
        self.0.insert(name.into(), html.into());
        self
    }
}

impl ViewRenderer for MemoryViews {
    fn render(&self, name: &str) -> Result<String> {
        self.0.get(name).cloned().ok_or_else(|| anyhow!("no view {name:?}"))
    }

    fn exists(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}
