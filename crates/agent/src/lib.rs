//! Agent runtime plumbing: the capability registry handed to the model transport, the
//! managed-agent installer, and the runtime context that prepares each run.
//!
//! # Run preparation
//!
//! 1. **Load** (`runtime`) - agent row plus its current version, when one can be read
//! 2. **Resolve** - managed or custom path through the core resolver
//! 3. **Pick a model** - configured, alias-resolved, or the catalog default
//! 4. **Collect tools** (`tools`) - schemas for the enabled tool flags
//!
//! The runtime decides which model and which parameters; it never performs the model call.

pub mod installer;
pub mod runtime;
pub mod tools;

pub use installer::{InstallError, InstallStats, InstallSummary, ManagedAgentInstaller};
pub use runtime::{AgentRuntime, RunPlan, RuntimeError, RuntimeParts};
pub use tools::{CapabilityRegistry, ToolError, ToolProvider, ToolSchema};
