//! Value-set expansion, code-checking, lookup and subsumes workers
//! (spec §4.2-4.4).

pub mod check;
pub mod expand;
pub mod lookup;
pub mod resolver;
pub mod subsumes;

pub use check::{CheckRequest, CheckResult, Checker, DisplayMode, DisplayVerdict};
pub use expand::{ExpandRequest, ExpandedConcept, Expander, ExpansionResult};
pub use lookup::{Lookup, LookupRequest, LookupResult};
pub use resolver::ResourceResolver;
pub use subsumes::{Subsumes, SubsumesRequest};
