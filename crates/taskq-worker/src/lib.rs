pub mod config;
pub mod executor;
pub mod handler;
pub mod tasks;
pub mod worker;

pub use config::{ViolinConfig, WorkerConfig};
pub use executor::TaskExecutor;
pub use handler::{HandlerResult, RegistryError, TaskHandler, TaskRegistry};
pub use tasks::{builtin_registry, run_violin};
pub use worker::Worker;
