//! ModuleLoader port - locator → EntryPoint の解決

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EntryPoint;
use crate::error::WorkerError;

/// Opaque resource locator of an entry point (e.g. a resolved file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Resolves a locator to runnable code.
///
/// Called from inside the new worker context, never on the owner's call
/// stack; an `Err` becomes a `startup` error event.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, locator: &Locator) -> Result<Arc<dyn EntryPoint>, WorkerError>;
}
