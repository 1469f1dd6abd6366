//! Who is online: username to outbound channel.
//!
//! Every read and write of the map goes through the one mutex, so an
//! iteration can never observe a half applied register or unregister.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::delivery::{Channel, ChannelId};

#[derive(Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<String, Channel>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Insert or replace the channel for `name`.
    ///
    /// A replaced channel is only forgotten here, its connection keeps running
    /// until its own handler tears it down.
    pub async fn register(&self, name: &str, channel: Channel) {
        let mut mg = self.clients.lock().await;
        if let Some(prev) = mg.insert(name.to_owned(), channel) {
            info!(user = %name, prev_addr = %prev.addr(), "Replaced existing registration");
        }
        debug!(online = mg.len(), "registered {}", name);
    }

    // idempotent, true only if an entry was removed
    pub async fn unregister(&self, name: &str) -> bool {
        self.clients.lock().await.remove(name).is_some()
    }

    /// Remove `name` only while it still maps to channel `id`.
    ///
    /// Used on teardown so a displaced connection can't evict the newer
    /// registration that replaced it.
    pub async fn unregister_channel(&self, name: &str, id: ChannelId) -> bool {
        let mut mg = self.clients.lock().await;
        match mg.get(name) {
            Some(ch) if ch.id() == id => {
                mg.remove(name);
                true
            },
            _ => false,
        }
    }

    pub async fn lookup(&self, name: &str) -> Option<Channel> {
        self.clients.lock().await.get(name).cloned()
    }

    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.clients.lock().await.keys().cloned().collect()
    }

    /// Call `f` with every registered (name, channel) except `excluded`, under the lock.
    ///
    /// `f` must not block; channel delivery only enqueues so it is fine here.
    pub async fn for_each_except<F>(&self, excluded: Option<&str>, mut f: F)
    where
        F: FnMut(&str, &Channel),
    {
        let mg = self.clients.lock().await;

        for (name, ch) in mg.iter() {
            if excluded == Some(name.as_str()) { continue } // skip the excluded client
            f(name, ch);
        }
    }

    /// Build a value from the sorted names, then call `f` with it for every
    /// registered channel, all under one lock. Returns how many were online.
    ///
    /// Everyone `f` sees is in the names `make` saw, and nobody else is.
    pub async fn snapshot_for_each<T, M, F>(&self, make: M, mut f: F) -> usize
    where
        M: FnOnce(&BTreeSet<String>) -> T,
        F: FnMut(&T, &str, &Channel),
    {
        let mg = self.clients.lock().await;
        let names: BTreeSet<String> = mg.keys().cloned().collect();
        let value = make(&names);

        for (name, ch) in mg.iter() {
            f(&value, name, ch);
        }
        names.len()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
