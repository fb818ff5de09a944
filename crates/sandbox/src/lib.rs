#![deny(unused)]
//! Isolated execution of untrusted code snippets.
//!
//! This crate runs dynamically generated code under a bounded time and
//! resource budget in one of several interchangeable backends and returns a
//! structured result no matter how the payload behaved.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Calling agent                           │
//! │    ↓ execute(code, language, timeout)    │
//! ├──────────────────────────────────────────┤
//! │  CodeExecutionTool (adapter)             │
//! │    ↓ ExecutionRequest                    │
//! ├──────────────────────────────────────────┤
//! │  SandboxFactory → Sandbox backend        │
//! │    LocalProcessSandbox (child process)   │
//! │    ContainerSandbox    (Docker/bollard)  │
//! ├──────────────────────────────────────────┤
//! │  Per-call scratch dir / container        │
//! │    timeout-killed, output-capped,        │
//! │    removed on every exit path            │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Payload misbehavior (nonzero exit, crash, timeout, OOM kill) is always
//! encoded in the returned [`ExecutionResult`]; only infrastructure
//! failures (daemon unreachable, interpreter missing, scratch I/O errors)
//! surface as `Err`.

pub mod container;
pub mod engine;
pub mod factory;
pub mod local;
pub mod tools;
pub mod types;

pub use container::ContainerSandbox;
pub use engine::{MockSandbox, Sandbox};
pub use factory::SandboxFactory;
pub use local::LocalProcessSandbox;
pub use tools::CodeExecutionTool;
pub use types::{ExecutionRequest, ExecutionResult, TIMEOUT_EXIT_CODE, TRUNCATION_MARKER};
