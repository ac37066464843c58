//! Code-system provider contract and built-in providers (spec §4.1).

pub mod enumerated;
pub mod error;
pub mod hierarchical;
pub mod open;
pub mod provider;
pub mod supplement;

pub use enumerated::EnumeratedProvider;
pub use error::ProviderError;
pub use hierarchical::HierarchicalProvider;
pub use open::OpenProvider;
pub use provider::{
    Capability, CodeSystemProvider, ConceptContext, FilterDeclaration, Subsumption,
};
pub use supplement::SupplementedProvider;
