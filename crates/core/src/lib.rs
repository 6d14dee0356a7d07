//! # ragloom Core
//!
//! Domain types, collaborator traits, and error definitions for the ragloom
//! orchestration core. This crate does not depend on an async runtime; it
//! defines the model that the orchestrator crate implements against.
//!
//! ## Collaborators
//!
//! The embedding application supplies two contracts:
//! - [`ToolExecutor`] performs the real work of one tool invocation
//! - [`TokenEstimator`] approximates token counts for the target model

pub mod error;
pub mod message;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{BudgetError, GraphError, ToolError};
pub use message::{Message, Role};
pub use token::TokenEstimator;
pub use tool::{DependencyResults, ToolExecutor, ToolInvocation, ToolOutput};
