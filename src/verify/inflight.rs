use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// Coalesces concurrent calls that share a key.
///
/// The first caller for a key becomes the leader and runs the operation;
/// callers arriving while it is in flight await the leader's result instead
/// of issuing a duplicate call. A leader dropped before completing closes
/// its channel on the way out, so every waiter wakes with a closed-channel
/// error and falls back to running the operation itself.
#[derive(Debug)]
pub(crate) struct Inflight<K, T> {
    calls: Mutex<HashMap<K, broadcast::Sender<T>>>,
}

/// Removes the leader's map entry when the leader finishes or is dropped.
/// Removing the entry drops the sender, which is what wakes the waiters
/// when the leader never got to send.
struct Claim<'a, K: Eq + Hash, T> {
    calls: &'a Mutex<HashMap<K, broadcast::Sender<T>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, T> Claim<'_, K, T> {
    /// Take the entry out for a final send. Disarms the drop path.
    fn complete(mut self) -> Option<broadcast::Sender<T>> {
        let key = self.key.take()?;
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
    }
}

impl<K: Eq + Hash, T> Drop for Claim<'_, K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
        }
    }
}

impl<K, T> Inflight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F>(&self, key: K, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let waiter = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            match calls.get(&key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    calls.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            return match rx.recv().await {
                Ok(result) => result,
                // Leader dropped mid-flight; run the operation uncoalesced.
                Err(_) => op.await,
            };
        }

        // Leader path. The claim guarantees the map entry is removed even
        // if this future is dropped before `op` completes.
        let claim = Claim {
            calls: &self.calls,
            key: Some(key),
        };
        let result = op.await;
        if let Some(tx) = claim.complete() {
            let _ = tx.send(result.clone());
        }
        result
    }
}
