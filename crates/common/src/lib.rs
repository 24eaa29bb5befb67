//! Cortexify Common Library
//!
//! Shared code for the Cortexify backend including:
//! - Database models and repository patterns
//! - Chat orchestration and session lifecycle
//! - LLM completion provider abstraction
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Outbound email
//! - Metrics and observability

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use chat::{ChatExchange, ChatService};
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
