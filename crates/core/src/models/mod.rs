pub mod builtin;
pub mod catalog;
pub mod provider;
pub mod selector;

pub use catalog::{
    CatalogError, ModelCapability, ModelCatalog, ModelDescriptor, ModelPricing, ModelProvider,
};
pub use provider::ProviderAvailability;
pub use selector::{
    ModelInfo, ModelSelector, SelectionCriteria, TokenKind, TokenLimitCheck,
    DEFAULT_CONTEXT_WINDOW,
};
