use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    buffer::{Buffer, TryRead},
    error::{Result, StreamError},
    lifecycle::Lifecycle,
    merger::MergeOptions,
    stream::{Closable, Consumer, Producer},
};

/// A merger that polls its sources round-robin from inside [`get`](Producer::get).
///
/// Each poll is a non-blocking read, so `get` spins (yielding to the runtime
/// between attempts) until some source has a value. In exchange no task is
/// spawned for buffer-backed sources; only other producers get a forwarding
/// task feeding a private buffer.
///
/// With no source attached `get` fails with [`StreamError::NoSources`] while
/// the merger is open, and returns end-of-stream once it is closed.
///
/// ```rust
/// use std::sync::Arc;
/// use manifold::{source, ActiveMerger, Consumer, Producer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let merger = ActiveMerger::new(true);
/// merger.set_source(Arc::new(source::from_iter(2, vec![1, 2]))).unwrap();
/// merger.set_source(Arc::new(source::from_iter(2, vec![10, 20]))).unwrap();
///
/// let mut values = Vec::new();
/// while let Some(value) = merger.get().await.unwrap() {
///     values.push(value);
/// }
/// values.sort();
///
/// assert_eq!(values, vec![1, 2, 10, 20]);
/// # });
/// ```
pub struct ActiveMerger<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    lifecycle: Lifecycle,
    autoclose: bool,
    capacity: usize,
    registry: Mutex<Registry<T>>,
}

struct Registry<T> {
    sources: Vec<Attached<T>>,
    /// Index of the source polled last.
    cursor: usize,
}

struct Attached<T> {
    buffer: Buffer<T>,
    /// The buffer was created by this merger for a forwarding task.
    owned: bool,
}

enum Attempt<T> {
    Value(T),
    Exhausted(Buffer<T>),
    NotReady,
    Starved,
}

impl<T> Registry<T> {
    fn advance(&mut self) -> Option<&Attached<T>> {
        if self.sources.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.sources.len();
        self.sources.get(self.cursor)
    }

    fn remove(&mut self, buffer: &Buffer<T>) -> Option<Attached<T>> {
        let position = self
            .sources
            .iter()
            .position(|attached| attached.buffer.same_buffer(buffer))?;
        let removed = self.sources.remove(position);

        // step back so the source that slid into `position` is visited next
        if position <= self.cursor {
            self.cursor = match self.cursor.checked_sub(1) {
                Some(cursor) => cursor,
                None => self.sources.len().saturating_sub(1),
            };
        }

        Some(removed)
    }
}

impl<T> ActiveMerger<T>
where
    T: Send + 'static,
{
    /// A merger whose per-source buffers hold a single value.
    pub fn new(autoclose: bool) -> Self {
        Self::with_options(MergeOptions::default().autoclose(autoclose))
    }

    pub fn with_options(options: MergeOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle: Lifecycle::new(),
                autoclose: options.autoclose,
                capacity: options.capacity,
                registry: Mutex::new(Registry {
                    sources: Vec::new(),
                    cursor: 0,
                }),
            }),
        }
    }

    pub fn source_count(&self) -> usize {
        self.inner.registry.lock().sources.len()
    }

    pub fn is_autoclose(&self) -> bool {
        self.inner.autoclose
    }
}

impl<T> Inner<T>
where
    T: Send + 'static,
{
    fn poll_next(&self) -> Attempt<T> {
        let mut registry = self.registry.lock();
        let Some(attached) = registry.advance() else {
            return Attempt::Starved;
        };

        match attached.buffer.try_read() {
            TryRead::Value(value) => Attempt::Value(value),
            TryRead::Closed => Attempt::Exhausted(attached.buffer.clone()),
            TryRead::Empty => Attempt::NotReady,
        }
    }

    fn detach(&self, buffer: &Buffer<T>) {
        if self.lifecycle.is_closed() {
            return;
        }

        let now_empty = {
            let mut registry = self.registry.lock();
            let Some(detached) = registry.remove(buffer) else {
                return;
            };
            if detached.owned {
                detached.buffer.close();
            }
            debug!(sources = registry.sources.len(), "source detached");
            registry.sources.is_empty()
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

        let detached = {
            let mut registry = self.registry.lock();
            registry.cursor = 0;
            std::mem::take(&mut registry.sources)
        };
        for attached in detached.iter().filter(|attached| attached.owned) {
            attached.buffer.close();
        }

        self.lifecycle.finish_close();
        debug!(sources = detached.len(), "active merger closed");
    }

    /// Pumps a producer without a buffer of its own into `buffer`.
    async fn forward(self: Arc<Self>, source: Arc<dyn Producer<T>>, buffer: Buffer<T>) {
        while !self.lifecycle.is_closed() {
            match source.get().await {
                Ok(Some(value)) => {
                    // rejected once the merger detached this source
                    if let Err(_e) = buffer.write(value).await {
                        break;
                    }
                }
                Ok(None) => {
                    buffer.close();
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "source failed, forwarding stopped");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl<T> Producer<T> for ActiveMerger<T>
where
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        loop {
            match self.inner.poll_next() {
                Attempt::Value(value) => return Ok(Some(value)),
                Attempt::Exhausted(buffer) => self.inner.detach(&buffer),
                Attempt::NotReady => tokio::task::yield_now().await,
                Attempt::Starved => break,
            }
        }

        if self.inner.lifecycle.is_open() {
            Err(StreamError::NoSources)
        } else {
            Ok(None)
        }
    }
}

impl<T> Consumer<T> for ActiveMerger<T>
where
    T: Send + 'static,
{
    fn set_source(&self, source: Arc<dyn Producer<T>>) -> Result<()> {
        let (attached, forward) = match source.buffer() {
            Some(buffer) => (
                Attached {
                    buffer,
                    owned: false,
                },
                None,
            ),
            None => {
                let buffer = Buffer::new(self.inner.capacity);
                (
                    Attached {
                        buffer: buffer.clone(),
                        owned: true,
                    },
                    Some((source, buffer)),
                )
            }
        };

        {
            let mut registry = self.inner.registry.lock();
            if !self.inner.lifecycle.is_open() {
                return Err(StreamError::Closed);
            }
            registry.sources.push(attached);
            debug!(sources = registry.sources.len(), "source attached");
        }

        if let Some((source, buffer)) = forward {
            tokio::spawn(Arc::clone(&self.inner).forward(source, buffer));
        }

        Ok(())
    }

    fn can_set_source(&self) -> bool {
        true
    }
}

impl<T> Closable for ActiveMerger<T>
where
    T: Send + 'static,
{
    fn closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Detaches every source, without closing them, then closes the merger.
    fn close(&self) {
        self.inner.close();
    }
}

impl<T> Clone for ActiveMerger<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
