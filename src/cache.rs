//! Bounded caches for template markup and controller factories.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use kstring::KString;
use serde::Serialize;

use chj_util::{debug, trace};

use crate::controller::ControllerFactory;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    /// In insertion order, oldest first.
    pub keys: Vec<String>,
}

struct CacheInner<V> {
    map: HashMap<KString, V>,
    /// Insertion order of the keys in `map`.
    order: VecDeque<KString>,
}

/// A map that forgets its oldest-inserted entry once it holds more
/// than `capacity` entries. Reads don't count as use, re-setting a
/// key keeps its original position.
pub struct BoundedCache<V> {
    label: &'static str,
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        BoundedCache {
            label,
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            })
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().expect("never poisoned")
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().map.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map.contains_key(key)
    }

    fn insert_locked(&self, inner: &mut CacheInner<V>, key: &str, value: V) {
        let key = KString::from_ref(key);
        if inner.map.insert(key.clone(), value).is_none() {
            trace!("{} cache: inserted {:?}", self.label, key.as_str());
            inner.order.push_back(key);
        }
        self.evict_if_over_capacity(inner);
    }

    fn evict_if_over_capacity(&self, inner: &mut CacheInner<V>) {
        if inner.map.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
                debug!("{} cache: evicted {:?}", self.label, oldest.as_str());
            }
        }
    }

    pub fn set(&self, key: &str, value: V) {
        let mut inner = self.lock();
        self.insert_locked(&mut inner, key, value);
    }

    /// The cached value for `key`, or `value` after storing it. One
    /// lock is held over the lookup, insertion and eviction.
    pub fn get_or_insert(&self, key: &str, value: V) -> V {
        self.get_or_insert_with(key, || value)
    }

    pub fn get_or_insert_with(&self, key: &str, create: impl FnOnce() -> V) -> V {
        let mut inner = self.lock();
        if let Some(v) = inner.map.get(key) {
            return v.clone();
        }
        let v = create();
        self.insert_locked(&mut inner, key, v.clone());
        v
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let v = inner.map.remove(key)?;
        inner.order.retain(|k| k.as_str() != key);
        Some(v)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            size: inner.map.len(),
            keys: inner.order.iter().map(|k| k.as_str().to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub templates: CacheStats,
    pub controllers: CacheStats,
    /// Whether any template has been cached yet.
    pub active: bool,
}

/// The two caches shared by all requests of one application
/// instance. They share their eviction policy, never their entries.
pub struct DocumentStore {
    /// Template name -> markup as the view renderer produced it
    /// (before any transformation; each request parses its own
    /// document from it).
    pub templates: BoundedCache<Arc<str>>,
    /// Controller name -> factory; partial modules never get in here.
    pub controllers: BoundedCache<Arc<dyn ControllerFactory>>,
}

impl DocumentStore {
    pub fn new(capacity: usize) -> Self {
        DocumentStore {
            templates: BoundedCache::new("template", capacity),
            controllers: BoundedCache::new("controller", capacity),
        }
    }

    pub fn stats(&self) -> StoreStats {
        let templates = self.templates.stats();
        let active = templates.size > 0;
        StoreStats {
            templates,
            controllers: self.controllers.stats(),
            active,
        }
    }

    pub fn clear(&self) {
        self.templates.clear();
        self.controllers.clear();
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
