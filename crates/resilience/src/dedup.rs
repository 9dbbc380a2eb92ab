//! Request deduplication
//!
//! Collapses identical requests issued within a short window into a single
//! network call. The first caller's future is spawned onto the runtime and
//! shared; later callers with the same key get a clone of the shared handle
//! and observe the same outcome.
//!
//! Entries expire by age, not by completion. Within the window a settled
//! call still answers new identical requests (this is what catches a
//! double-click); after the window a new call is always made, even if the
//! previous one has not finished yet.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock;

/// Handle to a spawned call that any number of callers can await.
pub type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Entry<T> {
    inserted_at: Instant,
    call: SharedCall<T>,
}

/// Keyed single-flight map with a fixed entry lifetime.
pub struct Deduplicator<T> {
    window: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A zero `window` disables deduplication: every call is made.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the outstanding call for `key`, or start one with `factory`.
    ///
    /// Lookup and insert happen under one lock with no await in between, so
    /// two concurrent callers can never both start a call for the same key.
    /// The started call runs on its own task: dropping every returned handle
    /// discards the result but does not cancel the request.
    pub fn dedupe<F, Fut>(&self, key: String, factory: F) -> SharedCall<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.window);

        if let Some(entry) = entries.get(&key) {
            debug!(key = %key, "joining in-flight request");
            metrics::counter!("gateway_dedup_hits_total").increment(1);
            return entry.call.clone();
        }

        let call = spawn_shared(factory());
        if !self.window.is_zero() {
            entries.insert(
                key,
                Entry {
                    inserted_at: now,
                    call: call.clone(),
                },
            );
        }
        call
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let entries = lock(&self.entries);
        let now = Instant::now();
        entries
            .values()
            .filter(|entry| now.duration_since(entry.inserted_at) < self.window)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn spawn_shared<T, Fut>(fut: Fut) -> SharedCall<T>
where
    T: Clone + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    async move {
        handle
            .await
            .map_err(|e| Error::Internal(format!("request task failed: {e}")))
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_secs(1);

    /// Factory that counts invocations and resolves to the invocation number
    /// after `delay`.
    fn counting_call(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, usize> {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(delay).await;
                n
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn identical_concurrent_calls_share_one_invocation() {
        let dedup = Deduplicator::new(WINDOW);
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(200);

        let a = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));
        let b = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));
        let c = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));

        let (a, b, c) = tokio::join!(a, b, c);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(c.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_make_distinct_calls() {
        let dedup = Deduplicator::new(WINDOW);
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(10);

        let a = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));
        let b = dedup.dedupe("GET /categories?page=2".into(), counting_call(&calls, delay));
        let (a, b) = tokio::join!(a, b);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(a.unwrap(), b.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_call_answers_until_window_elapses() {
        let dedup = Deduplicator::new(WINDOW);
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(10);

        let first = dedup
            .dedupe("POST /bookings#abc".into(), counting_call(&calls, delay))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = dedup
            .dedupe("POST /bookings#abc".into(), counting_call(&calls, delay))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_forces_a_fresh_call_even_if_outstanding() {
        let dedup = Deduplicator::new(WINDOW);
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = Duration::from_secs(5);

        let first = dedup.dedupe("GET /requests".into(), counting_call(&calls, slow));
        tokio::time::advance(Duration::from_millis(1500)).await;
        let second = dedup.dedupe("GET /requests".into(), counting_call(&calls, slow));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_still_completes() {
        let dedup: Deduplicator<()> = Deduplicator::new(WINDOW);
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let handle = dedup.dedupe("PATCH /profile".into(), move || async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(handle);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_disables_collapsing() {
        let dedup = Deduplicator::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(50);

        let a = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));
        let b = dedup.dedupe("GET /categories".into(), counting_call(&calls, delay));
        let _ = tokio::join!(a, b);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_pruned() {
        let dedup = Deduplicator::new(WINDOW);
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(10);

        let _ = dedup
            .dedupe("GET /a".into(), counting_call(&calls, delay))
            .await;
        let _ = dedup
            .dedupe("GET /b".into(), counting_call(&calls, delay))
            .await;
        assert_eq!(dedup.len(), 2);

        tokio::time::advance(WINDOW).await;
        assert!(dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_call_surfaces_as_internal_error() {
        let dedup: Deduplicator<u8> = Deduplicator::new(WINDOW);
        let result = dedup
            .dedupe("GET /boom".into(), || async {
                if true {
                    panic!("boom");
                }
                0u8
            })
            .await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
