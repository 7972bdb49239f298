//! Registry - the set of attached destinations

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::chain::{ChainSender, DestinationChain};
use crate::error::{DestinationId, SpreaderError};
use crate::metrics::MetricsSnapshot;

/// Attached destinations keyed by sink identity
///
/// Always accessed under the spreader's registry lock. Once closed it
/// accepts no new destinations and hands its chains out for shutdown.
#[derive(Default)]
pub struct Registry {
    chains: HashMap<DestinationId, DestinationChain>,
    closed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_open(&self) -> Result<(), SpreaderError> {
        if self.closed {
            Err(SpreaderError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn contains(&self, id: DestinationId) -> bool {
        self.chains.contains_key(&id)
    }

    /// Publish a new chain for `id`
    ///
    /// `spawn` runs only when `id` is vacant, so a rejected duplicate never
    /// starts a worker for a sink that is already registered.
    pub fn register(
        &mut self,
        id: DestinationId,
        name: &str,
        spawn: impl FnOnce() -> DestinationChain,
    ) -> Result<&DestinationChain, SpreaderError> {
        match self.chains.entry(id) {
            Entry::Occupied(_) => Err(SpreaderError::duplicate(name)),
            Entry::Vacant(slot) => {
                let chain = spawn();
                debug_assert_eq!(chain.id(), id);
                Ok(slot.insert(chain))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DestinationChain> {
        self.chains.values()
    }

    /// Cloned senders, so waits can happen after the lock is released
    pub fn senders(&self) -> Vec<ChainSender> {
        self.chains.values().map(|c| c.sender().clone()).collect()
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.chains
            .values()
            .map(|c| (c.name().to_string(), c.metrics().snapshot()))
            .collect()
    }

    /// Mark closed and take every chain out
    pub fn close(&mut self) -> Vec<DestinationChain> {
        self.closed = true;
        self.chains.drain().map(|(_, chain)| chain).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
