// Comment Threads - threaded discussion storage for feed posts

// Core types and primitives
pub mod core;

// Comment rows and thread trees
pub mod models;

// Stores, ids, metrics and collaborator interfaces
pub mod infrastructure;

// Thread building and comment mutations
pub mod services;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use crate::core::{CommentId, PostId, UserId};
pub use app_state::AppState;
pub use config::{Config, ThreadConfig};
pub use error::{AppError, AppResult};
pub use models::{Comment, ThreadNode, ThreadStats};
pub use services::ThreadBuilder;
