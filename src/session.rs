//! Session Store - per-browser key/value persistence
//!
//! Holds the user's name, location and last classification across page
//! transitions. Everything is scoped to one browser session and wiped on a
//! hard reload.
//!
//! Components never touch storage directly: they receive a [`Session`], a
//! typed accessor over any [`SessionStore`], so tests can hand in a
//! [`MemorySessionStore`].

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{ClassificationResult, UserProfile};

pub const KEY_USER_NAME: &str = "userName";
pub const KEY_USER_LOCATION: &str = "userLocation";
pub const KEY_API_RESPONSE: &str = "apiResponse";

/// Raw string key/value storage
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
}

/// In-memory store, one per browser session
#[derive(Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    fn clear(&self) {
        self.values.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// How the current page was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationType {
    #[default]
    Navigate,
    Reload,
    BackForward,
}

impl NavigationType {
    /// Browsers revalidate the document on reload with `max-age=0`
    /// (soft reload) or `no-cache` (hard reload).
    pub fn from_cache_control(value: Option<&str>) -> Self {
        match value {
            Some(v) => {
                let v = v.to_ascii_lowercase();
                if v.contains("no-cache") || v.contains("max-age=0") {
                    NavigationType::Reload
                } else {
                    NavigationType::Navigate
                }
            }
            None => NavigationType::Navigate,
        }
    }
}

/// Typed view over a session store
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Fresh session backed by memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Called when a page of the flow is entered. A reload starts over.
    pub fn begin(&self, navigation: NavigationType) {
        if navigation == NavigationType::Reload {
            debug!("Reload detected, clearing session");
            self.store.clear();
        }
    }

    pub fn user_name(&self) -> Option<String> {
        self.store.get(KEY_USER_NAME).filter(|s| !s.is_empty())
    }

    pub fn set_user_name(&self, name: &str) {
        self.store.set(KEY_USER_NAME, name);
    }

    pub fn user_location(&self) -> Option<String> {
        self.store.get(KEY_USER_LOCATION).filter(|s| !s.is_empty())
    }

    pub fn set_user_location(&self, location: &str) {
        self.store.set(KEY_USER_LOCATION, location);
    }

    pub fn clear_user_location(&self) {
        self.store.remove(KEY_USER_LOCATION);
    }

    /// Both fields, if both were stored
    pub fn profile(&self) -> Option<UserProfile> {
        Some(UserProfile {
            name: self.user_name()?,
            location: self.user_location()?,
        })
    }

    /// Last classification. Unreadable data counts as absent.
    pub fn classification(&self) -> Option<ClassificationResult> {
        let raw = self.store.get(KEY_API_RESPONSE)?;
        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Discarding unreadable {}: {}", KEY_API_RESPONSE, e);
                None
            }
        }
    }

    pub fn set_classification(
        &self,
        result: &ClassificationResult,
    ) -> Result<(), serde_json::Error> {
        let raw = serde_json::to_string(result)?;
        self.store.set(KEY_API_RESPONSE, &raw);
        Ok(())
    }

    pub fn has_classification(&self) -> bool {
        self.store.get(KEY_API_RESPONSE).is_some()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Live browser sessions keyed by cookie id, least recently used evicted first
pub struct SessionRegistry<T> {
    clients: Mutex<LruCache<Uuid, Arc<T>>>,
}

impl<T: Default> SessionRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        let size = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            clients: Mutex::new(LruCache::new(size)),
        }
    }

    /// Look up a client, creating one when the id is missing or unknown.
    /// Returns the id to hand back to the browser.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Arc<T>) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = id {
            if let Some(client) = clients.get(&id) {
                return (id, client.clone());
            }
        }

        let id = Uuid::new_v4();
        let client = Arc::new(T::default());
        if let Some((evicted, _)) = clients.push(id, client.clone()) {
            if evicted != id {
                debug!("Evicted idle session {}", evicted);
            }
        }
        (id, client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
