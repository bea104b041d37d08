//! Finding controller factories by name.
//!
//! Controllers are registered in `ModuleDir`s (or any other
//! `ControllerSource`); the loader tries the primary source, then the
//! fallback one, and memoizes hits in the store's controller cache.

use std::collections::BTreeMap;
use std::sync::mpsc::channel;
use std::sync::Arc;

use kstring::KString;
use scoped_thread_pool::Pool;

use chj_util::{debug, info, time_guard, warn};

use crate::cache::DocumentStore;
use crate::controller::{ControllerFactory, PartialModule};
use crate::error::{CodebehindError, CodebehindErrorKind, Result};

/// What a source yields for a name.
#[derive(Clone)]
pub enum Module {
    Controller(Arc<dyn ControllerFactory>),
    /// A mixin; loadable, but never a page's controller.
    Partial(Arc<dyn PartialModule>),
}

impl Module {
    pub fn is_partial(&self) -> bool {
        matches!(self, Module::Partial(_))
    }
}

pub trait ControllerSource: Send + Sync {
    /// For log and error messages.
    fn label(&self) -> &str;

    /// The names of all modules, `None` if the source doesn't exist.
    fn names(&self) -> Option<Vec<String>>;

    /// `Ok(None)` if there's no module of that name.
    fn load(&self, name: &str) -> anyhow::Result<Option<Module>>;
}

type LoadFn = dyn Fn() -> anyhow::Result<Module> + Send + Sync;

/// An in-process module directory. Loading runs the registered
/// closure each time (modules can do setup work when loaded).
pub struct ModuleDir {
    label: String,
    modules: BTreeMap<String, Arc<LoadFn>>,
}

impl ModuleDir {
    pub fn new(label: &str) -> Self {
        ModuleDir { label: label.into(), modules: BTreeMap::new() }
    }

    pub fn register(self, name: &str, module: Module) -> Self {
        self.register_with(name, move || Ok(module.clone()))
    }

    pub fn register_with(
        mut self,
        name: &str,
        load: impl Fn() -> anyhow::Result<Module> + Send + Sync + 'static
    ) -> Self {
        self.modules.insert(name.into(), Arc::new(load));
        self
    }

    /// Register a controller class under its own name.
    pub fn controller(self, factory: Arc<dyn ControllerFactory>) -> Self {
        let name = factory.name().to_owned();
        self.register(&name, Module::Controller(factory))
    }

    pub fn partial(self, partial: impl PartialModule + 'static) -> Self {
        let name = partial.name().to_owned();
        self.register(&name, Module::Partial(Arc::new(partial)))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ControllerSource for ModuleDir {
    fn label(&self) -> &str {
        &self.label
    }

    fn names(&self) -> Option<Vec<String>> {
        Some(self.modules.keys().cloned().collect())
    }

    fn load(&self, name: &str) -> anyhow::Result<Option<Module>> {
        match self.modules.get(name) {
            Some(load) => Ok(Some(load()?)),
            None => Ok(None)
        }
    }
}

/// A source that isn't there (e.g. no controller directory
/// configured).
pub struct MissingSource(pub String);

impl ControllerSource for MissingSource {
    fn label(&self) -> &str {
        &self.0
    }

    fn names(&self) -> Option<Vec<String>> {
        None
    }

    fn load(&self, _name: &str) -> anyhow::Result<Option<Module>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    Loaded,
    SkippedPartial,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadReport {
    pub source: String,
    /// The source doesn't exist, nothing was attempted.
    pub missing: bool,
    /// In the order the source listed them.
    pub outcomes: Vec<(String, PreloadOutcome)>,
}

impl PreloadReport {
    fn count(&self, f: impl Fn(&PreloadOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| f(o)).count()
    }

    pub fn successful(&self) -> usize {
        self.count(|o| !matches!(o, PreloadOutcome::Failed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Failed(_)))
    }

    pub fn outcome(&self, name: &str) -> Option<&PreloadOutcome> {
        self.outcomes.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }
}

pub struct ControllerLoader {
    store: Arc<DocumentStore>,
    primary: Arc<dyn ControllerSource>,
    fallback: Option<Arc<dyn ControllerSource>>,
}

impl ControllerLoader {
    pub fn new(store: Arc<DocumentStore>, primary: Arc<dyn ControllerSource>) -> Self {
        ControllerLoader { store, primary, fallback: None }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ControllerSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    fn tried(&self) -> String {
        match &self.fallback {
            Some(f) => format!("{}, {}", self.primary.label(), f.label()),
            None => self.primary.label().to_owned()
        }
    }

    /// Load `name` bypassing the cache: the primary source first, then
    /// the fallback. If neither has it, an error from the primary
    /// source takes precedence over one from the fallback.
    pub fn load(&self, name: &str) -> Result<Module> {
        let primary = self.primary.load(name);
        if let Ok(Some(m)) = primary {
            return Ok(m);
        }
        let fallback = match &self.fallback {
            Some(f) => f.load(name),
            None => Ok(None)
        };
        if let Ok(Some(m)) = fallback {
            debug!("controller {name:?} found in {}", self.fallback_label());
            return Ok(m);
        }
        let name = KString::from_ref(name);
        match (primary, fallback) {
            (Err(error), _) | (_, Err(error)) =>
                Err(CodebehindErrorKind::ControllerLoad { name, error }.into()),
            _ => Err(CodebehindErrorKind::ControllerNotFound { name, tried: self.tried() }.into())
        }
    }

    fn fallback_label(&self) -> &str {
        self.fallback.as_ref().map(|f| f.label()).unwrap_or("-")
    }

    /// The factory of the page controller `name`, memoized.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ControllerFactory>> {
        if let Some(f) = self.store.controllers.get(name) {
            return Ok(f);
        }
        match self.load(name)? {
            Module::Controller(f) => Ok(self.store.controllers.get_or_insert(name, f)),
            Module::Partial(_) => Err(CodebehindErrorKind::NotAController {
                name: KString::from_ref(name)
            }.into())
        }
    }

    /// Load every module of the primary source on `pool`, caching the
    /// controllers. Failures are reported, not returned.
    pub fn preload(&self, pool: &Pool) -> PreloadReport {
        let source = self.primary.label().to_owned();
        let names = match self.primary.names() {
            Some(names) => names,
            None => {
                warn!("controller source does not exist: {source}");
                return PreloadReport { source, missing: true, outcomes: Vec::new() };
            }
        };
        time_guard!("preload");
        info!("preloading {} controller modules from {source}", names.len());

        let (tx, rx) = channel();
        pool.scoped(|scope| {
            for (i, name) in names.iter().enumerate() {
                let tx = tx.clone();
                scope.execute(move || {
                    let r: Result<Module> = self.load(name);
                    // The receiver outlives the scope.
                    let _ = tx.send((i, r));
                });
            }
        });
        drop(tx);
        let mut results: Vec<(usize, Result<Module>)> = rx.try_iter().collect();
        results.sort_by_key(|(i, _)| *i);

        let outcomes: Vec<(String, PreloadOutcome)> = results.into_iter()
            .map(|(i, r)| {
                let name = names[i].clone();
                let outcome = self.record_preloaded(&name, r);
                (name, outcome)
            })
            .collect();
        let report = PreloadReport { source, missing: false, outcomes };
        info!("preloading complete: {} successful, {} failed",
              report.successful(), report.failed());
        report
    }

    fn record_preloaded(&self, name: &str, r: Result<Module, CodebehindError>) -> PreloadOutcome {
        match r {
            Ok(Module::Controller(f)) => {
                self.store.controllers.set(name, f);
                info!("✓ preloaded: {name}");
                PreloadOutcome::Loaded
            }
            Ok(Module::Partial(_)) => {
                debug!("skipping partial module {name}");
                PreloadOutcome::SkippedPartial
            }
            Err(e) => {
                warn!("✗ failed to preload {name}: {e}");
                PreloadOutcome::Failed(e.to_string())
            }
        }
    }
}
