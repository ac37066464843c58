//! Canonical resource model, operation context, parameter ingestion and
//! caches shared by every layer of the terminology engine.

pub mod cache;
pub mod context;
pub mod error;
pub mod fhir;
pub mod params;
pub mod resource;
pub mod time;

pub use cache::expansion_cache::{ExpansionCache, expansion_key, hash_resource};
pub use cache::resource_cache::ResourceCache;
pub use context::{MAX_RECURSION_DEPTH, OperationContext, PathGuard};
pub use error::{Result, TxError};
pub use fhir::{FhirVersion, denormalize_on_egress, normalize_on_ingress};
pub use params::ParameterBag;
pub use resource::{
    CanonicalResource, CodeSystem, ConceptDefinition, ConceptProperty, ConceptReference,
    ConceptSet, ConceptSetFilter, ContentMode, Designation, PublicationStatus, ValueSet,
};
pub use time::{FhirDateTime, now_utc};
