pub mod adapters;
pub mod error;
pub mod handler;
mod listeners;
pub mod service;
pub mod task;

pub use adapters::{default_handlers, DocumentAdapter, ImageAdapter, TextAdapter};
pub use error::AnalysisError;
pub use handler::{HandlerMap, TaskHandler};
pub use listeners::Subscription;
pub use service::AnalysisQueue;
pub use task::{AnalysisTask, TaskContent, TaskId, TaskKind, TaskStatus};
