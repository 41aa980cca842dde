use async_channel::{Receiver, Sender, TryRecvError};
use async_trait::async_trait;

use crate::{
    error::Result,
    stream::{Closable, Producer},
};

/// A bounded FIFO shared by all of its clones.
///
/// Writes wait while the buffer is full, reads wait while it is empty. Closing
/// stops further writes, including writes already waiting for room, but every
/// value accepted before the close can still be read.
///
/// ```rust
/// use manifold::Buffer;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let buffer = Buffer::new(2);
/// buffer.write(1).await.unwrap();
/// buffer.close();
///
/// assert_eq!(buffer.write(2).await.unwrap_err().into_inner(), 2);
/// assert_eq!(buffer.read().await, Some(1));
/// assert_eq!(buffer.read().await, None);
/// # });
/// ```
#[derive(Debug)]
pub struct Buffer<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

/// A write rejected because the buffer was closed. Hands the value back.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("write into a closed buffer")]
pub struct WriteError<T>(pub T);

impl<T> WriteError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Outcome of a non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum TryRead<T> {
    Value(T),
    /// Open, but nothing is ready yet.
    Empty,
    /// Closed and fully drained.
    Closed,
}

impl<T> Buffer<T> {
    /// A buffer holding at most `capacity` values. A capacity of 0 is raised
    /// to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = async_channel::bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Waits for room and pushes `value`.
    ///
    /// Fails, returning the value, if the buffer is closed before the value
    /// could be stored.
    pub async fn write(&self, value: T) -> std::result::Result<(), WriteError<T>> {
        self.sender
            .send(value)
            .await
            .map_err(|async_channel::SendError(value)| WriteError(value))
    }

    pub fn try_read(&self) -> TryRead<T> {
        match self.receiver.try_recv() {
            Ok(value) => TryRead::Value(value),
            Err(TryRecvError::Empty) => TryRead::Empty,
            Err(TryRecvError::Closed) => TryRead::Closed,
        }
    }

    /// Waits for the next value. `None` once the buffer is closed and drained.
    pub async fn read(&self) -> Option<T> {
        self.receiver.recv().await.ok()
    }

    /// Returns `true` if this call closed the buffer.
    pub fn close(&self) -> bool {
        self.sender.close()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether both handles point at the same underlying queue.
    pub fn same_buffer(&self, other: &Buffer<T>) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl<T> Producer<T> for Buffer<T>
where
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        Ok(self.read().await)
    }

    fn buffer(&self) -> Option<Buffer<T>> {
        Some(self.clone())
    }
}

impl<T> Closable for Buffer<T> {
    fn closed(&self) -> bool {
        self.is_closed()
    }

    fn close(&self) {
        Buffer::close(self);
    }
}
