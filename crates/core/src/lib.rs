#![deny(unused)]
//! Core types, traits, and error definitions for cellbox.
//!
//! This crate provides the foundational building blocks shared by the
//! sandbox backends and the agent-facing tool adapter: the infrastructure
//! error type, the resolved configuration, and the `Tool` contract.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ContainerConfig, LanguageSpec, SandboxConfig, DEFAULT_LANGUAGE};
pub use error::{Error, Result};
pub use traits::Tool;
pub use types::ToolOutput;
