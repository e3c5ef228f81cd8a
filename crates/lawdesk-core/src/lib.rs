pub mod backend;
pub mod config;
pub mod conversation;
pub mod pacing;
pub mod pipeline;
pub mod prompts;
pub mod refine;
pub mod types;

pub use types::*;
