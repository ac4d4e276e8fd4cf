//! EntryPoint port - worker が起動時に実行するコード

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::worker::WorkerScope;

/// Code executed inside a worker context.
///
/// - `Ok(())`: natural exit. Messages already posted are still delivered.
/// - `Err(_)` (or a panic): surfaces as one `error` event on the owner's
///   handle, then the worker is terminated.
///
/// Anything the entry point needs from the owner must arrive through
/// `scope.init_data()` or a message; there is no shared memory.
#[async_trait]
pub trait EntryPoint: Send + Sync + 'static {
    async fn run(&self, scope: WorkerScope) -> Result<(), WorkerError>;
}
