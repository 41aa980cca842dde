use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::{buffer::Buffer, error::Result};

/// Something values can be pulled from.
///
/// `get` resolves to:
/// - `Ok(Some(value))` for the next value,
/// - `Ok(None)` once the stream has ended,
/// - `Err(e)` for a fault local to this producer. A fault does not imply the
///   end of the stream.
#[async_trait]
pub trait Producer<T>: Send + Sync {
    /// Pull one item.
    async fn get(&self) -> Result<Option<T>>;

    /// The buffer backing this producer, if reading from it directly is
    /// equivalent to calling [`get`](Producer::get).
    fn buffer(&self) -> Option<Buffer<T>> {
        None
    }
}

#[async_trait]
impl<T, P> Producer<T> for Arc<P>
where
    P: Producer<T> + ?Sized,
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        (**self).get().await
    }

    fn buffer(&self) -> Option<Buffer<T>> {
        (**self).buffer()
    }
}

/// Something that takes its input from an upstream [`Producer`].
pub trait Consumer<T> {
    /// Attach `source` as an upstream.
    fn set_source(&self, source: Arc<dyn Producer<T>>) -> Result<()>;

    /// Whether [`set_source`](Consumer::set_source) can currently succeed.
    fn can_set_source(&self) -> bool;
}

/// Something that can be shut down from outside.
pub trait Closable {
    /// Whether [`close`](Closable::close) has completed.
    fn closed(&self) -> bool;

    /// Idempotent, never fails.
    fn close(&self);
}

/// A many-to-one stream: attach any number of sources, read one output.
pub trait Merger<T>: Producer<T> + Consumer<T> + Closable {}

impl<T, M> Merger<T> for M where M: Producer<T> + Consumer<T> + Closable {}

/// Adapt a producer into a [`Stream`].
///
/// Faults are yielded as `Err` items and the stream keeps going; it only ends
/// when the producer reports end-of-stream.
///
/// ```rust
/// use futures::StreamExt;
/// use manifold::{into_stream, source};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let values: Vec<_> = into_stream(source::from_iter(4, vec![1, 2, 3]))
///     .map(|item| item.unwrap())
///     .collect()
///     .await;
///
/// assert_eq!(values, vec![1, 2, 3]);
/// # });
/// ```
pub fn into_stream<T, P>(producer: P) -> impl Stream<Item = Result<T>> + Send
where
    P: Producer<T> + 'static,
    T: Send + 'static,
{
    futures::stream::unfold(producer, |producer| async move {
        match producer.get().await {
            Ok(Some(value)) => Some((Ok(value), producer)),
            Ok(None) => None,
            Err(err) => Some((Err(err), producer)),
        }
    })
}
