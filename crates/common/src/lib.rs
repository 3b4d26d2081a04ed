//! Shared types for the saga orchestrator workspace.

pub mod types;

pub use types::{ArticleId, CommentId, ExecutionId, UserId};
