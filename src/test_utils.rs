use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::{Result, StreamError},
    stream::Producer,
};

/// A plain (not buffer-backed) producer that yields a fixed sequence and then
/// ends. Counts how many values it has handed out.
#[derive(Clone)]
pub struct ScriptedSource<T> {
    values: Arc<Mutex<VecDeque<T>>>,
    handed_out: Arc<AtomicUsize>,
}

impl<T> ScriptedSource<T> {
    pub fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values.into_iter().collect())),
            handed_out: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handed_out(&self) -> usize {
        self.handed_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> Producer<T> for ScriptedSource<T>
where
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        tokio::task::yield_now().await;

        let next = self.values.lock().pop_front();
        if next.is_some() {
            self.handed_out.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }
}

/// Yields `values`, then faults `faults` times, then ends.
pub struct FailingSource<T> {
    values: Mutex<VecDeque<T>>,
    faults: AtomicUsize,
}

impl<T> FailingSource<T> {
    pub fn new(values: impl IntoIterator<Item = T>, faults: usize) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            faults: AtomicUsize::new(faults),
        }
    }
}

#[async_trait]
impl<T> Producer<T> for FailingSource<T>
where
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        if let Some(value) = self.values.lock().pop_front() {
            return Ok(Some(value));
        }

        let remaining = self.faults.load(Ordering::SeqCst);
        if remaining > 0 {
            self.faults.store(remaining - 1, Ordering::SeqCst);
            return Err(StreamError::message("scripted fault"));
        }

        Ok(None)
    }
}

/// A producer that never yields anything and never ends.
pub struct PendingSource;

#[async_trait]
impl<T> Producer<T> for PendingSource
where
    T: Send + 'static,
{
    async fn get(&self) -> Result<Option<T>> {
        futures::future::pending().await
    }
}

/// Reads until end-of-stream. Panics on a fault.
pub async fn drain<T, P>(producer: &P) -> Vec<T>
where
    P: Producer<T> + ?Sized,
{
    let mut out = Vec::new();
    while let Some(value) = producer.get().await.unwrap() {
        out.push(value);
    }
    out
}

/// Polls `condition` until it holds or a second passes.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    condition()
}
