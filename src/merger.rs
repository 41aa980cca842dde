//! Fan-in: many attached producers read as one.
//!
//! Two strategies are offered:
//!
//! - [`ActiveMerger`] polls its sources in turn with non-blocking reads from
//!   inside `get`. Buffer-backed sources are read directly, any other source
//!   gets one forwarding task that feeds a small private buffer.
//! - [`LazyMerger`] runs one forwarding task per source, all writing into a
//!   single shared buffer that `get` reads from.
//!
//! Both keep the relative order of each source's values. Values from different
//! sources interleave in no particular order.

pub mod active;
pub mod lazy;

pub use active::ActiveMerger;
pub use lazy::LazyMerger;

/// Construction options shared by both merger strategies.
///
/// ```rust
/// use manifold::MergeOptions;
///
/// let merger = MergeOptions::default().capacity(16).autoclose(false).lazy::<u32>();
/// assert!(!merger.is_autoclose());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Size of the buffer the merger writes into: the shared output buffer of a
    /// [`LazyMerger`], or each per-source buffer an [`ActiveMerger`] creates
    /// for sources that are not buffer-backed.
    pub capacity: usize,
    /// Close the merger once its last attached source is detached.
    pub autoclose: bool,
}

impl MergeOptions {
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    pub fn autoclose(self, autoclose: bool) -> Self {
        Self { autoclose, ..self }
    }

    pub fn active<T>(&self) -> ActiveMerger<T>
    where
        T: Send + 'static,
    {
        ActiveMerger::with_options(*self)
    }

    pub fn lazy<T>(&self) -> LazyMerger<T>
    where
        T: Send + 'static,
    {
        LazyMerger::with_options(*self)
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            capacity: 1,
            autoclose: true,
        }
    }
}
