//! In-process store substrate.
//!
//! Every client created from one [`MemoryHub`] sees the same keyspace and
//! channel space, so several cluster nodes inside one test process
//! coordinate exactly like separate processes sharing one external store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use roomcast_core::clock::{Clock, SystemClock};

use crate::{Batch, Command, Store, StoreError, StoreFactory, Subscription};

struct Entry {
    members: HashSet<String>,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

#[derive(Default)]
struct HubState {
    sets: HashMap<String, Entry>,
    channels: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Bytes>)>>,
    next_token: u64,
}

impl HubState {
    /// Drop `key` if its expiry has passed.
    fn purge(&mut self, key: &str, now_ms: i64) {
        if self.sets.get(key).is_some_and(|entry| entry.expired(now_ms)) {
            self.sets.remove(key);
        }
    }

    fn purge_all(&mut self, now_ms: i64) {
        self.sets.retain(|_, entry| !entry.expired(now_ms));
    }
}

struct HubInner {
    clock: Arc<dyn Clock>,
    state: Mutex<HubState>,
}

/// Shared in-memory keyspace plus pub/sub channels.
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Hub whose expiry decisions follow the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                clock,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// A fresh client handle onto this hub.
    pub fn client(&self) -> Arc<MemoryStore> {
        Arc::new(MemoryStore {
            hub: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
            tokens: Mutex::new(Vec::new()),
        })
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreFactory for MemoryHub {
    fn create(&self) -> Result<Arc<dyn Store>, StoreError> {
        Ok(self.client())
    }
}

/// One client handle onto a [`MemoryHub`].
pub struct MemoryStore {
    hub: Arc<HubInner>,
    closed: AtomicBool,
    /// Subscriptions this client registered, released on close.
    tokens: Mutex<Vec<(String, u64)>>,
}

impl MemoryStore {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let now = self.hub.clock.now_ms();
        let mut state = self.hub.state.lock();
        state.purge(key, now);
        Ok(state
            .sets
            .get(key)
            .map(|entry| entry.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_union(&self, keys: &[String]) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let now = self.hub.clock.now_ms();
        let mut state = self.hub.state.lock();

        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for key in keys {
            state.purge(key, now);
            if let Some(entry) = state.sets.get(key.as_str()) {
                for member in &entry.members {
                    if seen.insert(member.clone()) {
                        union.push(member.clone());
                    }
                }
            }
        }
        Ok(union)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let now = self.hub.clock.now_ms();
        let mut state = self.hub.state.lock();
        state.purge_all(now);
        Ok(state
            .sets
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        self.ensure_open()?;
        let now = self.hub.clock.now_ms();
        let mut state = self.hub.state.lock();

        // The whole batch runs under one lock acquisition, so observers see
        // either none of it or all of it.
        for command in batch.into_commands() {
            match command {
                Command::SetAdd { key, member } => {
                    state.purge(&key, now);
                    state
                        .sets
                        .entry(key)
                        .or_insert_with(|| Entry {
                            members: HashSet::new(),
                            expires_at_ms: None,
                        })
                        .members
                        .insert(member);
                }
                Command::SetRemove { key, member } => {
                    state.purge(&key, now);
                    let emptied = state.sets.get_mut(&key).is_some_and(|entry| {
                        entry.members.remove(&member);
                        entry.members.is_empty()
                    });
                    if emptied {
                        state.sets.remove(&key);
                    }
                }
                Command::Delete { key } => {
                    state.sets.remove(&key);
                }
                Command::Expire { key, ttl } => {
                    state.purge(&key, now);
                    if let Some(entry) = state.sets.get_mut(&key) {
                        entry.expires_at_ms = Some(now + ttl.as_millis() as i64);
                    }
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.hub.state.lock();
        if let Some(senders) = state.channels.get_mut(channel) {
            // Every subscriber gets the message, the publishing process's own
            // subscribers included; receivers that went away are pruned.
            senders.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.hub.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((token, tx));
        self.tokens.lock().push((channel.to_string(), token));
        Ok(Subscription::new(rx))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tokens = std::mem::take(&mut *self.tokens.lock());
        let mut state = self.hub.state.lock();
        for (channel, token) in tokens {
            if let Some(senders) = state.channels.get_mut(&channel) {
                senders.retain(|(t, _)| *t != token);
            }
        }
    }
}
