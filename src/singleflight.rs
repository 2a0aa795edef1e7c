//! Per-key single-flight coordination.
//!
//! Concurrent requests for the same not-yet-cached key collapse into exactly
//! one in-flight call: the first arrival becomes the leader and runs the
//! work, everyone else waits for the leader's outcome and receives a clone of
//! it. If the leader is cancelled before publishing, its claim is released
//! and one of the waiters is elected leader on retry, so nobody blocks
//! indefinitely.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use tokio::sync::watch;
use tracing::debug;

/// How a caller obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightOutcome<T> {
    /// This caller ran the work itself.
    Leader(T),
    /// This caller received the leader's published result.
    Shared(T),
}

impl<T> FlightOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            FlightOutcome::Leader(v) | FlightOutcome::Shared(v) => v,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, FlightOutcome::Leader(_))
    }
}

/// Group of in-flight calls keyed by string.
pub struct SingleFlight<T: Clone> {
    inflight: DashMap<String, watch::Receiver<Option<T>>>,
}

/// Releases the leader's claim when it goes out of scope, publish or not.
/// Dropping the claim also drops the watch sender, which wakes waiters so
/// they can re-elect.
struct FlightClaim<'a, T: Clone> {
    map: &'a DashMap<String, watch::Receiver<Option<T>>>,
    key: String,
}

impl<T: Clone> Drop for FlightClaim<'_, T> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Run `work` under single-flight semantics for `key`.
    ///
    /// At most one caller per key executes `work` at a time; the others
    /// receive the leader's result. The closure is invoked at most once per
    /// caller, and only if that caller ends up leading.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> FlightOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut work = Some(work);

        loop {
            let waiter = match self.inflight.entry(key.to_string()) {
                Entry::Occupied(occupied) => Some(occupied.get().clone()),
                Entry::Vacant(vacant) => {
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(rx);
                    // The map shard lock is released here; the claim guard
                    // owns cleanup from now on.
                    let claim = FlightClaim {
                        map: &self.inflight,
                        key: key.to_string(),
                    };
                    let work = work
                        .take()
                        .expect("single-flight leader is elected at most once");
                    let result = work().await;
                    let _ = tx.send(Some(result.clone()));
                    drop(claim);
                    return FlightOutcome::Leader(result);
                }
            };

            if let Some(mut rx) = waiter {
                loop {
                    if let Some(result) = rx.borrow_and_update().clone() {
                        return FlightOutcome::Shared(result);
                    }
                    if rx.changed().await.is_err() {
                        // Leader vanished without publishing. Check for a
                        // last-instant value, then go re-elect.
                        if let Some(result) = rx.borrow().clone() {
                            return FlightOutcome::Shared(result);
                        }
                        debug!(%key, "single-flight leader dropped; re-electing");
                        break;
                    }
                }
            }
        }
    }

    /// Number of keys currently in flight. For tests and diagnostics.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn lone_caller_leads() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let outcome = flights.run("k", || async { 42 }).await;
        assert_eq!(outcome, FlightOutcome::Leader(42));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_collapse_to_one_execution() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = Arc::clone(&flights);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flights
                    .run("k", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7u32
                    })
                    .await
                    .into_inner()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_keys_do_not_share_flights() {
        let flights: Arc<SingleFlight<String>> = Arc::new(SingleFlight::new());

        let a = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("a", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        "a".to_string()
                    })
                    .await
                    .into_inner()
            })
        };
        let b = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("b", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        "b".to_string()
                    })
                    .await
                    .into_inner()
            })
        };

        assert_eq!(a.await.unwrap(), "a");
        assert_eq!(b.await.unwrap(), "b");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_leader_releases_the_claim() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1u32
                    })
                    .await
            })
        };

        // Give the leader time to claim the key, then cancel it.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(flights.in_flight(), 1);
        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        // A later caller must not be wedged by the abandoned claim.
        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            flights.run("k", || async { 2u32 }),
        )
        .await
        .expect("flight should complete after leader cancellation");
        assert_eq!(outcome.into_inner(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiter_survives_leader_cancellation() {
        let flights: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1u32
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights.run("k", || async { 2u32 }).await.into_inner()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let _ = leader.await;

        // The waiter takes over leadership and runs its own work.
        let value = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should not be wedged")
            .unwrap();
        assert_eq!(value, 2);
    }
}
