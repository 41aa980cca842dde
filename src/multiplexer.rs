use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    buffer::Buffer,
    error::{Result, StreamError},
    lifecycle::Lifecycle,
    stream::{Closable, Consumer, Producer},
};

/// One source, many outputs. Every value pulled from the source is written to
/// every output, in output order.
///
/// Outputs are paced together: a write waits for room in each output in turn,
/// so a slow reader on one output holds back all of them. When the source ends
/// or faults, every output is closed and readers see end-of-stream. Closing the
/// multiplexer, or closing every output from the reading side, stops pulling
/// from the source.
///
/// ```rust
/// use std::sync::Arc;
/// use manifold::{source, Consumer, Multiplexer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let tee = Multiplexer::new(2, 2);
/// tee.set_source(Arc::new(source::from_iter(1, vec!["ping", "pong"]))).unwrap();
///
/// let left = tee.out(0).unwrap();
/// let right = tee.out(1).unwrap();
///
/// assert_eq!(left.read().await, Some("ping"));
/// assert_eq!(right.read().await, Some("ping"));
/// assert_eq!(left.read().await, Some("pong"));
/// assert_eq!(right.read().await, Some("pong"));
/// assert_eq!(left.read().await, None);
/// assert_eq!(right.read().await, None);
/// # });
/// ```
pub struct Multiplexer<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    outputs: Vec<Buffer<T>>,
    lifecycle: Lifecycle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Multiplexer<T>
where
    T: Clone + Send + 'static,
{
    /// `branches` outputs, each holding up to `capacity` values.
    pub fn new(capacity: usize, branches: usize) -> Self {
        let outputs = (0..branches).map(|_| Buffer::new(capacity)).collect();

        Self {
            inner: Arc::new(Inner {
                outputs,
                lifecycle: Lifecycle::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// The `index`-th output.
    pub fn out(&self, index: usize) -> Result<Buffer<T>> {
        self.inner
            .outputs
            .get(index)
            .cloned()
            .ok_or(StreamError::OutOfRange {
                index,
                branches: self.inner.outputs.len(),
            })
    }

    pub fn branches(&self) -> usize {
        self.inner.outputs.len()
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + 'static,
{
    async fn broadcast(self: Arc<Self>, source: Arc<dyn Producer<T>>) {
        let _close_outputs = CloseOnDrop(Arc::clone(&self));

        while self.lifecycle.is_open() {
            let value = match source.get().await {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "multiplexer source failed, closing outputs");
                    break;
                }
            };

            let mut delivered = false;
            for output in &self.outputs {
                // an output closed by its reader just stops receiving
                delivered |= output.write(value.clone()).await.is_ok();
            }

            if !delivered {
                debug!("every multiplexer output is closed, broadcast stopped");
                break;
            }
        }
    }

    fn close(&self) {
        if !self.lifecycle.begin_close() {
            return;
        }
        for output in &self.outputs {
            output.close();
        }
        self.lifecycle.finish_close();
        debug!(branches = self.outputs.len(), "multiplexer closed");
    }
}

/// Closes every output when the broadcast task ends, however it ends.
struct CloseOnDrop<T>(Arc<Inner<T>>)
where
    T: Clone + Send + 'static;

impl<T> Drop for CloseOnDrop<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.0.close();
    }
}

impl<T> Consumer<T> for Multiplexer<T>
where
    T: Clone + Send + 'static,
{
    fn set_source(&self, source: Arc<dyn Producer<T>>) -> Result<()> {
        let mut task = self.inner.task.lock();
        if !self.inner.lifecycle.is_open() {
            return Err(StreamError::Closed);
        }
        if task.is_some() {
            return Err(StreamError::SourceAlreadySet);
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(inner.broadcast(source)));
        debug!(branches = self.inner.outputs.len(), "multiplexer source attached");

        Ok(())
    }

    fn can_set_source(&self) -> bool {
        self.inner.lifecycle.is_open() && self.inner.task.lock().is_none()
    }
}

impl<T> Closable for Multiplexer<T>
where
    T: Clone + Send + 'static,
{
    fn closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Closes every output. The source itself is left untouched.
    fn close(&self) {
        self.inner.close();
    }
}

impl<T> Clone for Multiplexer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
