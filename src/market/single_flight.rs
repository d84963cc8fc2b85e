use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::MarketError;

/// Per-key in-flight de-duplication.
///
/// The first caller for a key becomes the leader and runs the fetch; every
/// concurrent caller for the same key subscribes to the leader's broadcast
/// channel and receives the same result, success or failure. The slot is
/// removed when the fetch completes, so a later request starts fresh.
///
/// A cancelled waiter just drops its receiver. A cancelled leader drops its
/// [`SlotGuard`], which clears the slot; pending waiters observe the closed
/// channel and contend to become the new leader.
pub struct SingleFlight<T: Clone> {
    inflight: Mutex<HashMap<String, broadcast::Sender<Result<T, MarketError>>>>,
}

enum Role<T: Clone> {
    Leader(broadcast::Sender<Result<T, MarketError>>),
    Waiter(broadcast::Receiver<Result<T, MarketError>>),
}

struct SlotGuard<'a, T: Clone> {
    key: &'a str,
    registry: &'a SingleFlight<T>,
    armed: bool,
}

impl<'a, T: Clone> SlotGuard<'a, T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<'a, T: Clone> Drop for SlotGuard<'a, T> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove(self.key);
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with an outstanding fetch.
    pub fn len(&self) -> usize {
        self.inflight.lock().expect("in-flight lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str) {
        self.inflight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(key);
    }

    /// Claim the slot for `key`, or subscribe to whoever holds it.
    /// Lookup and subscription happen under one lock so a waiter can never
    /// miss the leader's completion.
    fn claim(&self, key: &str) -> Role<T> {
        let mut map = self.inflight.lock().expect("in-flight lock poisoned");
        match map.get(key) {
            Some(sender) => Role::Waiter(sender.subscribe()),
            None => {
                let (sender, _drop_me) = broadcast::channel(1);
                map.insert(key.to_string(), sender.clone());
                Role::Leader(sender)
            }
        }
    }

    /// Run `work` for `key`, de-duplicated across concurrent callers.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, MarketError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketError>>,
    {
        let mut work = Some(work);
        loop {
            match self.claim(key) {
                Role::Leader(sender) => {
                    let guard = SlotGuard {
                        key,
                        registry: self,
                        armed: true,
                    };
                    let work = work.take().expect("leader branch runs at most once");
                    let result = work().await;
                    // clear the slot before broadcasting so a request that
                    // arrives after completion starts a fresh fetch
                    self.remove(key);
                    guard.disarm();
                    let _ = sender.send(result.clone());
                    return result;
                }
                Role::Waiter(mut receiver) => {
                    debug!(key, "joining in-flight fetch");
                    match receiver.recv().await {
                        Ok(result) => return result,
                        // leader cancelled without completing; contend again
                        Err(broadcast::error::RecvError::Closed) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
