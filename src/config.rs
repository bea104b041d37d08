//! Settings, from the environment (`CODEBEHIND_*`); the server binary
//! lets command line options override them.

use std::path::PathBuf;
use std::thread;

use anyhow::Result;

use crate::cache::DEFAULT_CAPACITY;
use crate::util::{getenv_bool, getenv_or, getenv_parse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    pub views_dir: PathBuf,
    /// Without the dot.
    pub view_extension: String,
    /// Applies to both the template and the controller cache.
    pub cache_capacity: usize,
    /// Serve `<views_dir>/<path>.<view_extension>` for otherwise
    /// unrouted paths.
    pub make_routes: bool,
    /// Load all controllers at startup.
    pub preload: bool,
    pub worker_threads: usize,
}

fn default_worker_threads() -> usize {
    4 * thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:3000".into(),
            views_dir: "views".into(),
            view_extension: "html".into(),
            cache_capacity: DEFAULT_CAPACITY,
            make_routes: false,
            preload: true,
            worker_threads: default_worker_threads(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let d = Config::default();
        Ok(Config {
            listen_addr: getenv_or("CODEBEHIND_LISTEN", &d.listen_addr)?,
            views_dir: getenv_or("CODEBEHIND_VIEWS", &d.views_dir.to_string_lossy())?.into(),
            view_extension: getenv_or("CODEBEHIND_VIEW_EXT", &d.view_extension)?
                .trim_start_matches('.').into(),
            cache_capacity: getenv_parse("CODEBEHIND_CACHE_CAPACITY", d.cache_capacity)?,
            make_routes: getenv_bool("CODEBEHIND_MAKE_ROUTES", d.make_routes)?,
            preload: getenv_bool("CODEBEHIND_PRELOAD", d.preload)?,
            worker_threads: getenv_parse("CODEBEHIND_WORKERS", d.worker_threads)?,
        })
    }
}
