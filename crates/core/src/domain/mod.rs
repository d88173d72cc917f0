pub mod agent;
pub mod tool_flags;
