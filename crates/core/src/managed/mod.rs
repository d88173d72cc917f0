pub mod catalog;
pub mod definition;

pub use catalog::{AgentKind, ManagedAgentCatalog};
pub use definition::{ManagedAgentDefinition, PromptSource, Restrictions};
