//! Token-bounded context assembly.
//!
//! Turns conversation history and successful tool results into one context
//! whose estimated size never exceeds the content budget.
//!
//! | Layer | Source | Trim strategy |
//! |-------|--------|---------------|
//! | 1. Tool results | Scheduler output | Lowest priority truncated/dropped first |
//! | 2. Conversation history | Chat storage | Oldest turns truncated/dropped first |
//!
//! With token-aware assembly disabled, a fixed-length fallback keeps the
//! last N turns and cuts the raw concatenation at a character limit.

pub mod assembler;
mod fallback;
pub mod segment;
pub mod token;
mod truncate;

pub use assembler::{
    AssembledContext, AssemblyMetadata, AssemblyMode, AssemblyPolicy, ContextAssembler,
    ContextBudget, DropInfo, LayerStats,
};
pub use segment::{ContextSegment, SegmentSource, ToolResult};
pub use token::CharRatioEstimator;
