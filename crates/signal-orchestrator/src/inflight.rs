//! Keyed "one in flight" guard.
//!
//! At most one pipeline run per symbol+timeframe. A second request while one
//! is outstanding is refused immediately; different keys never contend.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use signal_core::SymbolKey;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InFlight {
    pub operation: &'static str,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    active: Arc<DashMap<SymbolKey, InFlight>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` if a run for it is already active.
    /// The claim is released when the guard drops, including on early return.
    pub fn try_acquire(&self, key: &SymbolKey, operation: &'static str) -> Option<InFlightGuard> {
        match self.active.entry(key.clone()) {
            Entry::Occupied(existing) => {
                debug!(
                    "{} for {} refused: {} in flight since {}",
                    operation,
                    key,
                    existing.get().operation,
                    existing.get().started_at
                );
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    operation,
                    started_at: Utc::now(),
                });
                Some(InFlightGuard {
                    active: Arc::clone(&self.active),
                    key: key.clone(),
                })
            }
        }
    }

    pub fn is_active(&self, key: &SymbolKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<DashMap<SymbolKey, InFlight>>,
    key: SymbolKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}
