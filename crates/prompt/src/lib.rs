//! Prompt system for docchat.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, seven of them built in
//! - Workspace overrides from `.docchat/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod library;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use library::{ids, PromptLibrary};
pub use loader::{list_prompts, load_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
