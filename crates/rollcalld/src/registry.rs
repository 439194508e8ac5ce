//! Model registry.
//!
//! Provider factories keyed by model name, owned by the daemon's
//! construction scope and injected into the engine — there is no global
//! mutable state to look providers up from. The registration order
//! matters: the first entry is the default model, and a model's fallback
//! is the first *other* entry.

use rollcall_core::ProviderFactory;
use std::sync::Arc;

pub struct ModelRegistry {
    entries: Vec<Arc<dyn ProviderFactory>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.entries.push(factory);
    }

    pub fn factory(&self, model: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.entries
            .iter()
            .find(|f| f.model_name() == model)
            .cloned()
    }

    /// The model tried when the caller does not request one.
    pub fn default_model(&self) -> Option<&str> {
        self.entries.first().map(|f| f.model_name())
    }

    pub fn model_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|f| f.model_name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProviderFactory>> {
        self.entries.iter()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
