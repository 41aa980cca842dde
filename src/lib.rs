//! Fan-out and fan-in for pull-based async streams.
//!
//! Every stage in this crate speaks one small contract: a [`Producer`] is pulled
//! for its next value, end-of-stream, or a fault, and a [`Consumer`] attaches to
//! an upstream producer. Stages run as tokio tasks connected through bounded
//! [`Buffer`]s, so a slow reader applies backpressure all the way up.
//!
//! Main features:
//!
//! - [`Multiplexer`]: one source, N outputs, every value delivered to every output
//! - [`ActiveMerger`]: N sources read through a round-robin of non-blocking polls
//! - [`LazyMerger`]: N sources, one forwarding task each, into one shared buffer
//! - Sources can be attached and detached while the stream runs
//! - Optional autoclose when the last source goes away
//!
//! Example:
//!
//! ```rust
//! use std::sync::Arc;
//! use manifold::{source, Consumer, LazyMerger, Multiplexer, Producer};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tee = Multiplexer::<i32>::new(4, 2);
//! tee.set_source(Arc::new(source::from_iter(1, 1..=3))).unwrap();
//!
//! let merger = LazyMerger::new(8, true);
//! merger.set_source(Arc::new(tee.out(0).unwrap())).unwrap();
//! merger.set_source(Arc::new(tee.out(1).unwrap())).unwrap();
//!
//! let mut total = 0;
//! while let Some(value) = merger.get().await.unwrap() {
//!     total += value;
//! }
//!
//! assert_eq!(total, 12);
//! # });
//! ```
//!
//! ## Producers
//!
//! [`Producer::get`] resolves to `Ok(Some(value))`, `Ok(None)` at end-of-stream,
//! or `Err(_)` for a fault local to that producer. A fault does not end the
//! stream: a merger logs it, stops forwarding from that one source, and keeps
//! serving the others.
//!
//! A [`Buffer`] is itself a producer, and [`source`] turns iterators and
//! [`futures::Stream`]s into buffer-backed producers. [`into_stream`] goes the
//! other way.
//!
//! ## Closing
//!
//! Every combinator is [`Closable`]. Closing is idempotent and never fails.
//! Closing a merger detaches its sources but never closes them; they belong to
//! whoever created them.
//!
//! A [`LazyMerger`] closed while one of its forwarding tasks is parked on a full
//! buffer does not lose that value: the rejected write lands in an overflow
//! queue that `get` serves after the buffered values.
//!
//! ```rust
//! use std::sync::Arc;
//! use manifold::{source, ActiveMerger, Closable, Consumer, StreamError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let merger = ActiveMerger::<u8>::new(false);
//! merger.close();
//!
//! let attach = merger.set_source(Arc::new(source::from_iter(1, vec![1])));
//! assert!(matches!(attach, Err(StreamError::Closed)));
//! # });
//! ```
//!
//! ## Logging
//! Attach, detach and close events are emitted at `debug` level through
//! [`tracing`]; source faults and overflow rescues at `warn`. Install any
//! subscriber to see them.

mod buffer;
mod error;
mod lifecycle;
mod merger;
mod multiplexer;
pub mod source;
mod stream;

#[cfg(test)]
mod test_utils;

pub use buffer::{Buffer, TryRead, WriteError};
pub use error::{Result, StreamError};
pub use merger::{ActiveMerger, LazyMerger, MergeOptions};
pub use multiplexer::Multiplexer;
pub use stream::{into_stream, Closable, Consumer, Merger, Producer};
