pub mod config;
pub mod error;
pub mod log;

// Orchestration core
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod facade;
pub mod inventory;
pub mod playbook;
pub mod report;

pub use error::{Error, Result};
pub use facade::{DiagnosticsRequest, Orchestrator, PlaybookRequest};
