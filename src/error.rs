//! Error types shared by every stream combinator in the crate.

/// Root error type for stream operations.
///
/// Only structural misuse and global exhaustion reach a caller through this
/// type. Faults local to one attached source are logged by the task that
/// observed them and never surface on a merger's output.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream was closed before the operation was attempted.
    #[error("the stream is already closed")]
    Closed,

    /// An [`ActiveMerger`](crate::ActiveMerger) was polled with no attached
    /// sources while still open.
    ///
    /// The caller may attach a new source and poll again.
    #[error("no sources attached yet or all sources were detached and autoclose is not active")]
    NoSources,

    /// A single-source consumer already has its source.
    #[error("the source is already set")]
    SourceAlreadySet,

    /// A multiplexer output was requested past the number of branches.
    #[error("output {index} is out of range for {branches} branches")]
    OutOfRange { index: usize, branches: usize },

    /// A fault raised by a producer implementation.
    #[error("source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StreamError {
    /// Wrap an error raised inside a producer.
    pub fn upstream(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(error))
    }

    /// Build a producer fault from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Source(message.into())
    }

    /// Whether retrying the same call later can succeed without any other
    /// change to the stream than attaching a new source.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoSources)
    }
}

/// Shorthand for results of stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
