pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, Backends, MemoryStore, PgStore};
pub use error::{WorkflowError, WorkflowResult};
pub use service::{Outbox, WorkflowAction, WorkflowEngine};
