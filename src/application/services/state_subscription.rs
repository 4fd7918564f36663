//! Observer handle for loader state changes.

use tokio::sync::mpsc;

use crate::domain::entities::LoadState;

/// Ordered stream of the states published by one loader.
///
/// The first value received is the loader's state at the moment the
/// subscription was registered; every later transition follows in order.
/// The stream ends when the loader is dropped.
#[derive(Debug)]
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<LoadState>,
}

impl StateSubscription {
    pub(crate) const fn new(rx: mpsc::UnboundedReceiver<LoadState>) -> Self {
        Self { rx }
    }

    /// Waits for the next published state.
    pub async fn next(&mut self) -> Option<LoadState> {
        self.rx.recv().await
    }

    /// Returns the next state if one has already been published.
    pub fn try_next(&mut self) -> Option<LoadState> {
        self.rx.try_recv().ok()
    }

    /// Waits until a state matching `predicate` is published and returns it.
    /// Returns `None` if the loader goes away first.
    pub async fn wait_for(&mut self, predicate: impl Fn(&LoadState) -> bool) -> Option<LoadState> {
        while let Some(state) = self.rx.recv().await {
            if predicate(&state) {
                return Some(state);
            }
        }
        None
    }

    /// Waits for the next `Loaded` or `Failed` state.
    pub async fn wait_settled(&mut self) -> Option<LoadState> {
        self.wait_for(|state| state.is_loaded() || state.is_failed())
            .await
    }
}
