//! Producers seeded from plain Rust data.
//!
//! Each adapter spawns a task that pumps the input into a fresh [`Buffer`] and
//! closes it when the input runs out. The task stops early once a reader closes
//! the buffer.

use futures::{Stream, StreamExt};

use crate::buffer::Buffer;

/// Construct a buffer-backed producer from an [`IntoIterator`].
///
/// ```rust
/// use manifold::source;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let numbers = source::from_iter(1, vec![1, 2]);
///
/// assert_eq!(numbers.read().await, Some(1));
/// assert_eq!(numbers.read().await, Some(2));
/// assert_eq!(numbers.read().await, None);
/// # });
/// ```
pub fn from_iter<I>(capacity: usize, iter: I) -> Buffer<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let buffer = Buffer::new(capacity);
    let output = buffer.clone();

    tokio::spawn(async move {
        for item in iter {
            if let Err(_e) = output.write(item).await {
                break;
            }
        }
        output.close();
    });

    buffer
}

/// Construct a buffer-backed producer from a [`Stream`].
pub fn from_stream<S>(capacity: usize, stream: S) -> Buffer<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let buffer = Buffer::new(capacity);
    let output = buffer.clone();

    tokio::spawn(async move {
        tokio::pin!(stream);
        while let Some(item) = stream.next().await {
            if let Err(_e) = output.write(item).await {
                break;
            }
        }
        output.close();
    });

    buffer
}
