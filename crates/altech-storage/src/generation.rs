use std::sync::atomic::{AtomicU64, Ordering};

/// Ticket identifying one logical save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SaveToken(u64);

/// Monotonic save counter for one writer (e.g. the debounced auto-save).
///
/// A writer takes a token before its async encrypt step and commits through
/// [`PersistenceGateway::persist_if_current`](crate::gateway::PersistenceGateway::persist_if_current);
/// if another save started in between, the older write is discarded.
#[derive(Debug, Default)]
pub struct SaveGeneration {
    latest: AtomicU64,
}

impl SaveGeneration {
    pub fn next(&self) -> SaveToken {
        SaveToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, token: SaveToken) -> bool {
        self.latest.load(Ordering::Acquire) == token.0
    }
}
