//! EntryFn - closure-backed entry point.
//!
//! Wraps `F: Fn(WorkerScope) -> Fut`; every spawn gets a fresh future, so no
//! state leaks between workers started from the same entry point.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::ports::EntryPoint;
use crate::worker::WorkerScope;

pub struct EntryFn<F> {
    f: F,
}

impl<F, Fut> EntryFn<F>
where
    F: Fn(WorkerScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Shorthand for `Arc::new(EntryFn::new(f))` as a trait object.
    pub fn arc(f: F) -> Arc<dyn EntryPoint> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> EntryPoint for EntryFn<F>
where
    F: Fn(WorkerScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    async fn run(&self, scope: WorkerScope) -> Result<(), WorkerError> {
        (self.f)(scope).await
    }
}
