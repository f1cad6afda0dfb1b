//! Coalescing work queue keyed by record identity.
//!
//! - A key added while already queued is not queued twice.
//! - A key added while being processed is queued again only once the
//!   worker calls [`WorkQueue::done`], so one key is never processed by
//!   two workers at the same time.
//! - [`WorkQueue::add_after`] records a timer entry rather than parking a
//!   task. If a key is scheduled twice, the earlier deadline wins.
//! - [`WorkQueue::add_rate_limited`] backs off exponentially per key until
//!   [`WorkQueue::forget`] resets the count.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

/// Bounds of the per-key retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `failures` (zero-based).
    pub fn delay(&self, failures: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(failures))
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
    shutdown: CancellationToken,
    timers: mpsc::UnboundedSender<(K, Duration)>,
    backoff: Backoff,
}

impl<K: Clone + Eq + Hash> Inner<K> {
    fn add(&self, key: K) {
        let mut state = self.state.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }
}

/// FIFO of keys awaiting reconciliation. Cheap to clone.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    /// Create a queue and its timer task. Must be called inside a Tokio
    /// runtime.
    pub fn new(name: impl Into<String>, backoff: Backoff) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            name: name.into(),
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            timers: tx,
            backoff,
        });
        tokio::spawn(run_timers(
            Arc::downgrade(&inner),
            rx,
            inner.shutdown.clone(),
        ));
        Self { inner }
    }

    /// Queue name, used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue a key now.
    pub fn add(&self, key: K) {
        self.inner.add(key);
    }

    /// Queue a key once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.inner.state.lock().shutting_down {
            return;
        }
        // The receiver lives as long as the timer task; a send error means
        // the queue is shutting down.
        let _ = self.inner.timers.send((key, delay));
    }

    /// Queue a key after its current backoff delay and bump its failure
    /// count.
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.inner.state.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.inner.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        tracing::debug!(queue = %self.inner.name, key = ?key, delay = ?delay, "rate-limited requeue");
        self.add_after(key, delay);
    }

    /// Reset the failure count of a key.
    pub fn forget(&self, key: &K) {
        self.inner.state.lock().failures.remove(key);
    }

    /// How many rate-limited requeues a key has accumulated.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner
            .state
            .lock()
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue shuts down.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut state = self.inner.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = self.inner.shutdown.cancelled() => {}
            }
        }
    }

    /// Mark a key as finished. If it was added again meanwhile it goes back
    /// on the queue.
    pub fn done(&self, key: &K) {
        let mut state = self.inner.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no keys are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and wake every waiting worker.
    pub fn shutdown(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shutdown`] was called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

async fn run_timers<K>(
    inner: Weak<Inner<K>>,
    mut requests: mpsc::UnboundedReceiver<(K, Duration)>,
    shutdown: CancellationToken,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    let mut timers: DelayQueue<K> = DelayQueue::new();
    let mut pending: HashMap<K, (tokio_util::time::delay_queue::Key, Instant)> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = requests.recv() => {
                let Some((key, delay)) = request else { break };
                let deadline = Instant::now() + delay;
                match pending.get(&key).cloned() {
                    Some((_, at)) if at <= deadline => {}
                    Some((timer, _)) => {
                        timers.reset_at(&timer, deadline);
                        pending.insert(key, (timer, deadline));
                    }
                    None => {
                        let timer = timers.insert_at(key.clone(), deadline);
                        pending.insert(key, (timer, deadline));
                    }
                }
            }
            Some(expired) = timers.next(), if !timers.is_empty() => {
                let key = expired.into_inner();
                pending.remove(&key);
                match inner.upgrade() {
                    Some(inner) => inner.add(key),
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new("test", Backoff::default())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let q = queue();
        q.add("a".to_string());
        q.add("b".to_string());
        assert_eq!(q.get().await.as_deref(), Some("a"));
        assert_eq!(q.get().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_duplicate_adds_coalesce() {
        let q = queue();
        q.add("a".to_string());
        q.add("a".to_string());
        q.add("a".to_string());
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn test_key_readded_while_processing_waits_for_done() {
        let q = queue();
        q.add("a".to_string());
        let key = q.get().await.unwrap();

        q.add("a".to_string());
        assert!(q.is_empty(), "in-flight key must not be handed out twice");

        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_does_not_requeue() {
        let q = queue();
        q.add("a".to_string());
        let key = q.get().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_fires_at_deadline() {
        let q = queue();
        q.add_after("a".to_string(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(q.is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(q.get().await.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let q = queue();
        q.add_after("a".to_string(), Duration::from_secs(30));
        q.add_after("a".to_string(), Duration::from_secs(5));
        q.add_after("a".to_string(), Duration::from_secs(20));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(q.get().await.as_deref(), Some("a"));
        q.done(&"a".to_string());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(q.is_empty());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff {
            base: Duration::from_millis(5),
            max: Duration::from_millis(30),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(5));
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(2), Duration::from_millis(20));
        assert_eq!(backoff.delay(3), Duration::from_millis(30));
        assert_eq!(backoff.delay(64), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_counts_and_forget() {
        let q = queue();
        let key = "a".to_string();
        q.add_rate_limited(key.clone());
        q.add_rate_limited(key.clone());
        assert_eq!(q.num_requeues(&key), 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(q.get().await, Some(key.clone()));
        q.forget(&key);
        assert_eq!(q.num_requeues(&key), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shutdown();
        assert_eq!(waiter.await.unwrap(), None);
        q.add("late".to_string());
        assert!(q.is_empty());
        assert!(q.is_shutting_down());
    }

    #[tokio::test]
    async fn test_two_workers_both_wake() {
        let q = queue();
        let a = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        let b = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add("x".to_string());
        q.add("y".to_string());
        let mut got = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        got.sort();
        assert_eq!(got, vec!["x".to_string(), "y".to_string()]);
    }
}
