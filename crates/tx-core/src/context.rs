//! Request-scoped operation state (spec §3/§5).
//!
//! Every terminology operation threads an `OperationContext` through its
//! call tree: it carries the requested languages, the deadline budget, a
//! step log for diagnostics, and the value-set expansion path used for
//! cycle detection. One context is built per incoming request and never
//! shared across requests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::cache::expansion_cache::ExpansionCache;
use crate::cache::resource_cache::ResourceCache;
use crate::error::TxError;

/// Guards against pathological concept/value-set reference graphs. Mirrors
/// the teacher's `validate_code.rs` recursion guard, generalized across the
/// expander and checker.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Per-request state threaded through every terminology operation.
pub struct OperationContext {
    pub request_id: Uuid,
    /// Preferred languages, most preferred first (from `Accept-Language` or
    /// an explicit `displayLanguage` parameter).
    pub languages: Vec<String>,
    started_at: Instant,
    deadline: Option<Duration>,
    /// `(elapsed_ms, note)` entries, surfaced both as `diagnostics` in the
    /// FHIR response and as `tracing::debug!` events.
    steps: Mutex<Vec<(u64, String)>>,
    /// Value sets currently being expanded, for cycle detection.
    path: Mutex<Vec<String>>,
    /// Opted-in bypass of the deadline and expansion-cache, never derived
    /// from ambient process state.
    pub debugging: bool,
    pub resource_cache: Arc<ResourceCache>,
    pub expansion_cache: Arc<ExpansionCache>,
}

impl OperationContext {
    /// Caches are shared across requests (hence `Arc`), unlike every other
    /// field here which is scoped to this one request.
    pub fn new(
        languages: Vec<String>,
        deadline: Option<Duration>,
        debugging: bool,
        resource_cache: Arc<ResourceCache>,
        expansion_cache: Arc<ExpansionCache>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            languages,
            started_at: Instant::now(),
            deadline,
            steps: Mutex::new(Vec::new()),
            path: Mutex::new(Vec::new()),
            debugging,
            resource_cache,
            expansion_cache,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Record a diagnostic step, both in the response-facing log and in
    /// process logs.
    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        let elapsed = self.elapsed_ms();
        tracing::debug!(request_id = %self.request_id, elapsed_ms = elapsed, note = %message, "step");
        self.steps.lock().unwrap().push((elapsed, message));
    }

    pub fn steps(&self) -> Vec<(u64, String)> {
        self.steps.lock().unwrap().clone()
    }

    /// Probe the deadline at `place`; returns `TooCostly` once the budget is
    /// exhausted, carrying the step log accumulated so far. A no-op while
    /// `debugging` is set.
    pub fn dead_check(&self, place: &str) -> Result<(), TxError> {
        if self.debugging {
            return Ok(());
        }
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        if self.started_at.elapsed() > deadline {
            self.note(format!("deadline exceeded at {place}"));
            return Err(TxError::too_costly(
                format!("operation exceeded its time budget at {place}"),
                self.steps(),
            ));
        }
        Ok(())
    }

    /// Push a value set onto the expansion path, failing with
    /// `CycleDetected` if it's already present. Returns a guard that pops it
    /// back off on drop.
    pub fn enter_value_set(&self, vurl: &str) -> Result<PathGuard<'_>, TxError> {
        let mut path = self.path.lock().unwrap();
        if path.iter().any(|p| p == vurl) {
            let mut cycle = path.clone();
            cycle.push(vurl.to_string());
            return Err(TxError::cycle_detected(cycle.join(" -> ")));
        }
        if path.len() >= MAX_RECURSION_DEPTH {
            return Err(TxError::too_costly(
                "value set reference depth exceeded",
                self.steps(),
            ));
        }
        path.push(vurl.to_string());
        Ok(PathGuard {
            ctx: self,
            popped: false,
        })
    }
}

/// Pops the entered value set back off [`OperationContext`]'s path on drop.
pub struct PathGuard<'a> {
    ctx: &'a OperationContext,
    popped: bool,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        if !self.popped {
            self.ctx.path.lock().unwrap().pop();
        }
    }
}
