use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{
    buffer::Buffer,
    error::{Result, StreamError},
    lifecycle::Lifecycle,
    merger::MergeOptions,
    stream::{Closable, Consumer, Producer},
};

/// A merger that spawns one forwarding task per attached source, all writing
/// into one shared buffer.
///
/// A forwarding task can be parked on a full buffer when the merger is closed.
/// Its write is then rejected and the value goes to an overflow queue instead,
/// which `get` serves once the shared buffer is drained. A value pulled from a
/// source after the close can still be delivered late this way.
///
/// ```rust
/// use std::sync::Arc;
/// use manifold::{source, Consumer, LazyMerger, Producer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let merger = LazyMerger::new(4, true);
/// merger.set_source(Arc::new(source::from_iter(1, vec!["a", "b"]))).unwrap();
/// merger.set_source(Arc::new(source::from_iter(1, vec!["c"]))).unwrap();
///
/// let mut values = Vec::new();
/// while let Some(value) = merger.get().await.unwrap() {
///     values.push(value);
/// }
/// values.sort();
///
/// assert_eq!(values, vec!["a", "b", "c"]);
/// # });
/// ```
pub struct LazyMerger<T> {
    inner: Arc<Inner<T>>,
}

type SourceId = u64;

struct Inner<T> {
    lifecycle: Lifecycle,
    autoclose: bool,
    buffer: Buffer<T>,
    sources: Mutex<Vec<SourceId>>,
    next_id: AtomicU64,
    overflow: Mutex<VecDeque<T>>,
    /// Forwarding tasks currently inside a buffer write.
    writes_in_flight: AtomicUsize,
    write_settled: Notify,
}

/// Marks one forwarding write as in flight for as long as it lives.
struct InFlight<'a, T>(&'a Inner<T>);

impl<'a, T> InFlight<'a, T> {
    fn enter(inner: &'a Inner<T>) -> Self {
        inner.writes_in_flight.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.0.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.write_settled.notify_waiters();
    }
}

impl<T> LazyMerger<T>
where
    T: Send + 'static,
{
    pub fn new(capacity: usize, autoclose: bool) -> Self {
        Self::with_options(MergeOptions {
            capacity,
            autoclose,
        })
    }

    pub fn with_options(options: MergeOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle: Lifecycle::new(),
                autoclose: options.autoclose,
                buffer: Buffer::new(options.capacity),
                sources: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                overflow: Mutex::new(VecDeque::new()),
                writes_in_flight: AtomicUsize::new(0),
                write_settled: Notify::new(),
            }),
        }
    }

    pub fn source_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    pub fn is_autoclose(&self) -> bool {
        self.inner.autoclose
    }

    /// Values rescued from writes rejected by a close, not yet read.
    pub fn overflow_len(&self) -> usize {
        self.inner.overflow.lock().len()
    }
}

impl<T> Inner<T>
where
    T: Send + 'static,
{
    async fn forward(self: Arc<Self>, id: SourceId, source: Arc<dyn Producer<T>>) {
        while !self.lifecycle.is_closed() {
            let value = match source.get().await {
                Ok(Some(value)) => value,
                Ok(None) => {
                    self.detach(id);
                    return;
                }
                Err(err) => {
                    warn!(source = id, error = %err, "source failed, forwarding stopped");
                    return;
                }
            };

            let _in_flight = InFlight::enter(&self);
            if let Err(rejected) = self.buffer.write(value).await {
                self.overflow.lock().push_back(rejected.into_inner());
                warn!(
                    source = id,
                    "merger closed while a write was pending, value moved to the overflow buffer"
                );
                return;
            }
        }
    }

    fn detach(&self, id: SourceId) {
        if !self.lifecycle.is_open() {
            return;
        }

        let now_empty = {
            let mut sources = self.sources.lock();
            let Some(position) = sources.iter().position(|&attached| attached == id) else {
                return;
            };
            sources.remove(position);
            debug!(source = id, sources = sources.len(), "source detached");
            sources.is_empty()
        };

        if self.autoclose && now_empty {
            debug!("last source detached, autoclosing");
            self.close();
        }
    }

    fn close(&self) {
        if !self.lifecycle.begin_close() {
            return;
        }

        let detached = std::mem::take(&mut *self.sources.lock());
        self.buffer.close();

        self.lifecycle.finish_close();
        debug!(sources = detached.len(), "lazy merger closed");
    }

    /// Next overflow value, once the shared buffer has ended.
    ///
    /// Waits for writes still in flight to settle, since each of them may yet
    /// be rejected into the overflow queue.
    async fn next_overflow(&self) -> Option<T> {
        loop {
            let settled = self.write_settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            let in_flight = self.writes_in_flight.load(Ordering::SeqCst);
            if let Some(value) = self.overflow.lock().pop_front() {
                return Some(value);
            }
            if in_flight == 0 {
                return None;
            }

            settled.await;
        }
    }
}

#[async_trait]
impl<T> Producer<T> for LazyMerger<T>
where
    T: Send + 'static,
{
    /// Reads the shared buffer, then the overflow queue, then ends.
    async fn get(&self) -> Result<Option<T>> {
        if let Some(value) = self.inner.buffer.read().await {
            return Ok(Some(value));
        }
        Ok(self.inner.next_overflow().await)
    }
}

impl<T> Consumer<T> for LazyMerger<T>
where
    T: Send + 'static,
{
    fn set_source(&self, source: Arc<dyn Producer<T>>) -> Result<()> {
        let id = {
            let mut sources = self.inner.sources.lock();
            if !self.inner.lifecycle.is_open() {
                return Err(StreamError::Closed);
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            sources.push(id);
            debug!(source = id, sources = sources.len(), "source attached");
            id
        };

        tokio::spawn(Arc::clone(&self.inner).forward(id, source));

        Ok(())
    }

    fn can_set_source(&self) -> bool {
        true
    }
}

impl<T> Closable for LazyMerger<T>
where
    T: Send + 'static,
{
    fn closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Detaches every source, without closing them, then closes the shared
    /// buffer. Values already buffered stay readable.
    fn close(&self) {
        self.inner.close();
    }
}

impl<T> Clone for LazyMerger<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::*;
    use crate::{
        source,
        test_utils::{drain, wait_until, FailingSource, PendingSource, ScriptedSource},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delivers_every_value_once_in_per_source_order() {
        let merger = LazyMerger::new(2, true);
        for source in 0..4u32 {
            let values: Vec<_> = (0..100u32).map(|i| (source, i)).collect();
            merger
                .set_source(Arc::new(ScriptedSource::new(values)))
                .unwrap();
        }

        let values = tokio::time::timeout(Duration::from_secs(5), drain(&merger))
            .await
            .unwrap();

        assert_eq!(values.len(), 400);
        let mut grouped: HashMap<u32, Vec<u32>> = HashMap::new();
        for (source, i) in values {
            grouped.entry(source).or_default().push(i);
        }
        for source in 0..4 {
            assert_eq!(grouped[&source], (0..100).collect::<Vec<_>>());
        }
        assert!(merger.closed());
    }

    #[tokio::test]
    async fn buffer_backed_sources_are_forwarded_too() {
        let merger = LazyMerger::new(1, true);
        merger
            .set_source(Arc::new(source::from_iter(1, vec![1, 2, 3])))
            .unwrap();

        assert_eq!(drain(&merger).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_write_is_served_from_overflow_after_buffered_values() {
        let merger = LazyMerger::new(1, true);
        let source = ScriptedSource::new(vec!["A", "B"]);
        merger.set_source(Arc::new(source.clone())).unwrap();

        // "A" fills the buffer, the write of "B" is parked
        assert!(wait_until(|| source.handed_out() == 2).await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        merger.close();

        assert_eq!(merger.get().await.unwrap(), Some("A"));
        assert_eq!(merger.get().await.unwrap(), Some("B"));
        assert_eq!(merger.get().await.unwrap(), None);
        assert_eq!(merger.overflow_len(), 0);
    }

    #[tokio::test]
    async fn autoclose_ends_the_stream_after_last_source() {
        let merger = LazyMerger::new(4, true);
        merger
            .set_source(Arc::new(ScriptedSource::new(vec![1])))
            .unwrap();
        merger
            .set_source(Arc::new(ScriptedSource::new(vec![2])))
            .unwrap();

        let mut values = drain(&merger).await;
        values.sort();

        assert_eq!(values, vec![1, 2]);
        assert!(merger.closed());
        assert_eq!(merger.source_count(), 0);
        assert_eq!(merger.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn without_autoclose_stays_open_and_accepts_new_sources() {
        let merger = LazyMerger::new(4, false);
        merger
            .set_source(Arc::new(ScriptedSource::new(vec![1])))
            .unwrap();

        assert_eq!(merger.get().await.unwrap(), Some(1));
        assert!(wait_until(|| merger.source_count() == 0).await);

        let idle = tokio::time::timeout(Duration::from_millis(50), merger.get()).await;
        assert!(idle.is_err());
        assert!(!merger.closed());

        merger
            .set_source(Arc::new(ScriptedSource::new(vec![2])))
            .unwrap();
        assert_eq!(merger.get().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn faulty_source_stays_attached_and_merger_stays_open() {
        let merger = LazyMerger::new(4, true);
        merger
            .set_source(Arc::new(FailingSource::new(vec![1, 2], 1)))
            .unwrap();

        assert_eq!(merger.get().await.unwrap(), Some(1));
        assert_eq!(merger.get().await.unwrap(), Some(2));

        let idle = tokio::time::timeout(Duration::from_millis(50), merger.get()).await;
        assert!(idle.is_err());
        assert_eq!(merger.source_count(), 1);
        assert!(!merger.closed());
    }

    #[tokio::test]
    async fn attach_after_close_is_rejected() {
        let merger = LazyMerger::<i32>::new(1, false);
        merger.close();

        let result = merger.set_source(Arc::new(ScriptedSource::new(vec![1])));

        assert!(matches!(result, Err(StreamError::Closed)));
        assert_eq!(merger.source_count(), 0);
        assert_eq!(merger.get().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_close_is_idempotent() {
        let merger = LazyMerger::<i32>::new(1, true);
        merger.set_source(Arc::new(PendingSource)).unwrap();
        merger.set_source(Arc::new(PendingSource)).unwrap();

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let merger = merger.clone();
                tokio::spawn(async move { merger.close() })
            })
            .collect();
        for closer in closers {
            closer.await.unwrap();
        }

        assert!(merger.closed());
        assert_eq!(merger.source_count(), 0);
        assert_eq!(merger.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_leaves_sources_untouched() {
        let merger = LazyMerger::new(1, false);
        let upstream = Buffer::new(4);
        merger.set_source(Arc::new(upstream.clone())).unwrap();

        merger.close();

        assert!(merger.closed());
        assert!(!upstream.is_closed());
        upstream.write(1).await.unwrap();
    }
}
