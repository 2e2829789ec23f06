//! pm-assist — AI chat core for a project-management workspace.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod prompt;
pub mod relay;
pub mod sse;
pub mod transcript;
