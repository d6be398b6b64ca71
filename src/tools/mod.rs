//! Tools module - tool registration and execution for the agent
//!
//! Contains the tool registry, the parallel dispatcher and the built-in tools.

pub mod builtin;
pub mod dispatcher;
pub mod registry;

pub use builtin::register_builtin_tools;
pub use dispatcher::ParallelDispatcher;
pub use registry::{ToolExecutor, ToolRegistry};
