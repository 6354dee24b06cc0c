//! State ownership and the live read/dispatch seams.
//!
//! Components never hold a `CacheState` across an await. They hold a
//! [`CacheContext`] and call [`CacheContext::state`] again after every
//! suspension point.

use std::sync::Arc;

use honeycomb_core::{CacheConfig, Clock, EpochMs};
use tokio::sync::watch;
use tracing::trace;

use crate::action::CacheAction;
use crate::reducer;
use crate::state::CacheState;

/// Live accessor for the current state.
pub trait StateReader: Send + Sync {
    fn current(&self) -> Arc<CacheState>;
}

impl<F> StateReader for F
where
    F: Fn() -> Arc<CacheState> + Send + Sync,
{
    fn current(&self) -> Arc<CacheState> {
        self()
    }
}

/// Sink for state transitions.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, action: CacheAction);
}

/// Owns the state and applies actions one at a time.
///
/// Backed by a `watch` channel so observers can follow every change.
#[derive(Debug)]
pub struct CacheStore {
    tx: watch::Sender<Arc<CacheState>>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_state(CacheState::new(config))
    }

    pub fn with_state(state: CacheState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(state));
        Self { tx }
    }

    /// Change feed. The receiver always observes the latest state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheState>> {
        self.tx.subscribe()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl StateReader for CacheStore {
    fn current(&self) -> Arc<CacheState> {
        self.tx.borrow().clone()
    }
}

impl ActionDispatcher for CacheStore {
    fn dispatch(&self, action: CacheAction) {
        trace!(action = action.kind(), "Dispatching cache action");
        self.tx.send_modify(move |slot| {
            let previous = Arc::unwrap_or_clone(std::mem::take(slot));
            *slot = Arc::new(reducer::apply(previous, action));
        });
    }
}

/// Everything a component needs to read, change and timestamp the cache.
#[derive(Clone)]
pub struct CacheContext {
    state: Arc<dyn StateReader>,
    actions: Arc<dyn ActionDispatcher>,
    clock: Arc<dyn Clock>,
}

impl CacheContext {
    pub fn new(
        state: Arc<dyn StateReader>,
        actions: Arc<dyn ActionDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            actions,
            clock,
        }
    }

    pub fn from_store(store: Arc<CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: store.clone(),
            actions: store,
            clock,
        }
    }

    /// Current state. Call again after any await.
    pub fn state(&self) -> Arc<CacheState> {
        self.state.current()
    }

    pub fn dispatch(&self, action: CacheAction) {
        self.actions.dispatch(action);
    }

    pub fn now_ms(&self) -> EpochMs {
        self.clock.now_ms()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeycomb_core::{CoordId, SystemClock};

    #[test]
    fn test_dispatch_is_visible_to_next_read() {
        let store = CacheStore::default();
        store.dispatch(CacheAction::SetCenter(CoordId::from_raw("1,0")));
        assert_eq!(
            store.current().current_center,
            Some(CoordId::from_raw("1,0"))
        );
    }

    #[test]
    fn test_snapshots_are_not_mutated_by_later_dispatches() {
        let store = CacheStore::default();
        let before = store.current();
        store.dispatch(CacheAction::SetLoading(true));
        assert!(!before.is_loading);
        assert!(store.current().is_loading);
    }

    #[test]
    fn test_subscriber_sees_change() {
        let store = CacheStore::default();
        let mut rx = store.subscribe();
        store.dispatch(CacheAction::SetLoading(true));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loading);
    }

    #[test]
    fn test_context_reads_through_closure_reader() {
        let store = Arc::new(CacheStore::default());
        let reader_store = store.clone();
        let reader = move || reader_store.current();
        let ctx = CacheContext::new(Arc::new(reader), store.clone(), Arc::new(SystemClock));

        ctx.dispatch(CacheAction::SetLoading(true));
        assert!(ctx.state().is_loading);
    }
}
