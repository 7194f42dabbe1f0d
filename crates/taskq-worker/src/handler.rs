use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use taskq_core::TaskFailure;
use thiserror::Error;

/// Outcome of a task body: JSON-encoded value or failure payload
pub type HandlerResult = Result<Vec<u8>, TaskFailure>;

/// Execution body of a task definition
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Declared parameter names, in positional order
    fn params(&self) -> &'static [&'static str];

    /// Run the task on JSON-encoded positional arguments
    async fn execute(&self, args: Vec<u8>) -> HandlerResult;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Task name must not be empty")]
    EmptyName,
}

/// Task definitions by name. Names are unique and never rebound.
pub struct TaskRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<H: TaskHandler + 'static>(
        &self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
