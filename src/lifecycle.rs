use std::sync::atomic::{AtomicU8, Ordering};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Open/closing/closed bookkeeping embedded by value in every combinator.
///
/// Only one caller wins the transition out of the open phase, which is what
/// makes `close` idempotent under concurrent calls.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(OPEN))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire) == OPEN
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire) == CLOSED
    }

    /// Moves from open to closing. Returns `false` when another caller already
    /// started (or finished) closing.
    pub(crate) fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.0.store(CLOSED, Ordering::Release);
    }
}
