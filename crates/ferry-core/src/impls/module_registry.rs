//! ModuleRegistry - in-memory の ModuleLoader
//!
//! 初期化時に登録し（mutable）、実行時は読むだけ（Arc で共有）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RegistryError, WorkerError};
use crate::ports::{EntryPoint, Locator, ModuleLoader};

#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<Locator, Arc<dyn EntryPoint>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        locator: impl Into<Locator>,
        entry: Arc<dyn EntryPoint>,
    ) -> Result<(), RegistryError> {
        let locator = locator.into();
        if self.entries.contains_key(&locator) {
            return Err(RegistryError::AlreadyRegistered(locator.to_string()));
        }
        self.entries.insert(locator, entry);
        Ok(())
    }

    /// Builder-style [`ModuleRegistry::register`].
    pub fn with(mut self, locator: impl Into<Locator>, entry: Arc<dyn EntryPoint>) -> Result<Self, RegistryError> {
        self.register(locator, entry)?;
        Ok(self)
    }

    pub fn get(&self, locator: &Locator) -> Option<Arc<dyn EntryPoint>> {
        self.entries.get(locator).cloned()
    }

    pub fn locators(&self) -> Vec<Locator> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, locator: &Locator) -> Result<Arc<dyn EntryPoint>, WorkerError> {
        self.get(locator).ok_or_else(|| WorkerError::Startup {
            locator: locator.to_string(),
            reason: "no entry point registered for locator".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::EntryFn;
    use crate::worker::WorkerScope;

    fn noop() -> Arc<dyn EntryPoint> {
        EntryFn::arc(|_scope: WorkerScope| async { Ok::<_, WorkerError>(()) })
    }

    #[test]
    fn register_and_get() {
        let mut registry = ModuleRegistry::new();
        registry.register("helpers/worker.js", noop()).unwrap();

        assert!(registry.get(&Locator::from("helpers/worker.js")).is_some());
        assert_eq!(registry.locators(), vec![Locator::from("helpers/worker.js")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn double_registration_is_rejected() {
        let result = ModuleRegistry::new()
            .with("a", noop())
            .unwrap()
            .with("a", noop());
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(l)) if l == "a"));
    }

    #[tokio::test]
    async fn loading_unknown_locator_is_a_startup_error() {
        let registry = ModuleRegistry::new();
        let err = match registry.load(&Locator::from("missing")).await {
            Ok(_) => panic!("expected a startup error"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "startup");
    }
}
