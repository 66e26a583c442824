//! Access token revocation.
//!
//! Access tokens are stateless, so logging out before natural expiry needs
//! a denylist. Entries live only as long as the token they revoke would
//! have, which bounds the store to one access-token lifetime per logout.

use crate::auth::clock::Clock;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// TTL-bounded set of revoked token strings
pub trait RevocationStore: Send + Sync {
    fn add(&self, token: &str, ttl: Duration) -> Result<()>;
    fn contains(&self, token: &str) -> Result<bool>;
}

/// In-process revocation store keyed by token digest
pub struct InMemoryRevocationStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn key(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Number of entries held, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Purge expired entries on a fixed interval for as long as the store is alive.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!("Purged {} expired revocation entries", removed);
                }
            }
        })
    }
}

impl RevocationStore for InMemoryRevocationStore {
    fn add(&self, token: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let ttl = chrono::Duration::from_std(ttl).context("Revocation TTL out of range")?;
        let expires_at = self.clock.now() + ttl;

        self.entries.lock().insert(Self::key(token), expires_at);
        Ok(())
    }

    fn contains(&self, token: &str) -> Result<bool> {
        let key = Self::key(token);
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                entries.remove(&key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
