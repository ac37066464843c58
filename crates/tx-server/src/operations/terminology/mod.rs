//! Terminology operations (spec §6):
//! - `$expand` - expand a `ValueSet` to its enumerated codes
//! - `$lookup` - look up a code in a `CodeSystem`
//! - `$validate-code` - validate a code against a `CodeSystem` or `ValueSet`
//! - `$subsumes` - test the subsumption relationship between two codes

pub mod expand;
pub mod lookup;
pub mod subsumes;
pub mod support;
pub mod validate_code;

pub use expand::ExpandHandler;
pub use lookup::LookupHandler;
pub use subsumes::SubsumesHandler;
pub use validate_code::{ValidateCodeSystemCodeHandler, ValidateValueSetCodeHandler};
