//! The two caches spec §4.5 describes: a client-keyed resource cache for
//! supplementary resources a request supplies, and a content-hash keyed
//! expansion cache for expensive `$expand` results.

pub mod expansion_cache;
pub mod resource_cache;
