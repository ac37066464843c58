//! Value-set code-checking (spec §4.3).
//!
//! A code is checked against a `ValueSet`'s expansion first when one is
//! present (cheapest path), falling back to walking its `compose`:
//! excludes are checked before includes, system-qualified membership is
//! preferred when the caller supplies a system, display validation is
//! case-insensitive by default, and a `normalised` (whitespace/punctuation
//! folded) mismatch is a warning rather than a hard failure.

use tx_core::{OperationContext, Result, TxError, ValueSet};

use crate::resolver::ResourceResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    CaseInsensitive,
    Exact,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckRequest<'a> {
    pub system: Option<&'a str>,
    pub code: &'a str,
    pub display: Option<&'a str>,
    pub display_mode: DisplayMode,
    /// Lenient mode also tolerates a `normalised` display mismatch without
    /// even a warning; the default only downgrades it to a warning.
    pub lenient_display_validation: bool,
    /// `inferSystem`: when `system` is absent, scan the compose's includes
    /// and adopt the one system whose code system contains `code`. If zero
    /// or more than one include qualifies, inference fails.
    pub infer_system: bool,
    /// `abstract`: when `false` (the default), a matched abstract concept
    /// is rejected rather than accepted.
    pub allow_abstract: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayVerdict {
    Matches,
    /// The display differs only after normalisation (whitespace/case
    /// folding); always a warning, never a hard failure.
    NormalisedMismatch { expected: String },
    Mismatch { expected: String },
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub valid: bool,
    pub matched_system: Option<String>,
    pub matched_display: Option<String>,
    pub display_verdict: Option<DisplayVerdict>,
    pub is_abstract: bool,
    pub inactive: bool,
    /// The `cause` code to echo on failure (`not-found`, `code-invalid`,
    /// `business-rule`, `not-supported`), `None` when `valid` is true.
    pub cause: Option<&'static str>,
}

pub struct Checker<'a> {
    ctx: &'a OperationContext,
    resolver: &'a dyn ResourceResolver,
}

impl<'a> Checker<'a> {
    pub fn new(ctx: &'a OperationContext, resolver: &'a dyn ResourceResolver) -> Self {
        Self { ctx, resolver }
    }

    pub fn check(&self, value_set: &ValueSet, request: &CheckRequest) -> Result<CheckResult> {
        if request.code.is_empty() {
            return Err(TxError::invalid("code must not be empty"));
        }

        self.ctx.dead_check("check:start")?;

        if let Some(expansion) = &value_set.expansion {
            if let Some(found) = self.check_in_expansion(expansion, request) {
                return Ok(self.finish(found, request));
            }
        }

        let _guard = self.ctx.enter_value_set(&value_set.resource.vurl())?;

        let inferred;
        let request = if request.system.is_none() && request.infer_system {
            match self.infer_system(value_set, request.code)? {
                Some(system) => {
                    inferred = system;
                    &CheckRequest {
                        system: Some(inferred.as_str()),
                        ..*request
                    }
                }
                None => {
                    return Ok(CheckResult {
                        valid: false,
                        matched_system: None,
                        matched_display: None,
                        display_verdict: None,
                        is_abstract: false,
                        inactive: false,
                        cause: Some("not-found"),
                    });
                }
            }
        } else {
            request
        };

        for exclude in &value_set.exclude {
            if self.concept_set_contains(exclude, request)? {
                return Ok(CheckResult {
                    valid: false,
                    matched_system: exclude.system.clone(),
                    matched_display: None,
                    display_verdict: None,
                    is_abstract: false,
                    inactive: false,
                    cause: Some("code-invalid"),
                });
            }
        }

        for include in &value_set.include {
            if let Some(matched) = self.concept_set_membership(include, request)? {
                return Ok(self.finish(matched, request));
            }
        }

        Ok(CheckResult {
            valid: false,
            matched_system: None,
            matched_display: None,
            display_verdict: None,
            is_abstract: false,
            inactive: false,
            cause: Some("code-invalid"),
        })
    }

    /// Spec §4.3 step 1: scan the compose's top-level includes and their
    /// code systems, adopting a system only when exactly one contains
    /// `code`. Ambiguous or absent matches fail inference outright.
    fn infer_system(&self, value_set: &ValueSet, code: &str) -> Result<Option<String>> {
        let mut candidates: Vec<String> = Vec::new();
        for include in &value_set.include {
            self.ctx.dead_check("check:infer-system")?;
            let Some(system) = &include.system else { continue };
            let Some(provider) = self.resolver.resolve_code_system(system, include.version.as_deref()) else {
                continue;
            };
            if provider.locate(code).is_some() && !candidates.iter().any(|c| c == system) {
                candidates.push(system.clone());
            }
        }
        Ok(if candidates.len() == 1 {
            Some(candidates.remove(0))
        } else {
            None
        })
    }

    fn finish(&self, found: MembershipMatch, request: &CheckRequest) -> CheckResult {
        if found.is_abstract && !request.allow_abstract {
            return CheckResult {
                valid: false,
                matched_system: Some(found.system),
                matched_display: found.display,
                display_verdict: None,
                is_abstract: true,
                inactive: found.inactive,
                cause: Some("business-rule"),
            };
        }
        let verdict = request.display.map(|d| {
            judge_display(d, found.display.as_deref().unwrap_or(&found.code), request)
        });
        CheckResult {
            valid: true,
            matched_system: Some(found.system),
            matched_display: found.display,
            display_verdict: verdict,
            is_abstract: found.is_abstract,
            inactive: found.inactive,
            cause: None,
        }
    }

    fn check_in_expansion(
        &self,
        expansion: &serde_json::Value,
        request: &CheckRequest,
    ) -> Option<MembershipMatch> {
        let contains = expansion.get("contains").and_then(|v| v.as_array())?;
        for entry in contains {
            let code = entry.get("code").and_then(|v| v.as_str())?;
            if code != request.code {
                continue;
            }
            let system = entry.get("system").and_then(|v| v.as_str()).map(String::from);
            if let Some(expected) = request.system {
                if system.as_deref() != Some(expected) {
                    continue;
                }
            }
            return Some(MembershipMatch {
                system: system.unwrap_or_default(),
                display: entry.get("display").and_then(|v| v.as_str()).map(String::from),
                is_abstract: entry.get("abstract").and_then(|v| v.as_bool()).unwrap_or(false),
                inactive: entry.get("inactive").and_then(|v| v.as_bool()).unwrap_or(false),
                code: code.to_string(),
            });
        }
        None
    }

    fn concept_set_contains(
        &self,
        set: &tx_core::ConceptSet,
        request: &CheckRequest,
    ) -> Result<bool> {
        Ok(self.concept_set_membership(set, request)?.is_some())
    }

    fn concept_set_membership(
        &self,
        set: &tx_core::ConceptSet,
        request: &CheckRequest,
    ) -> Result<Option<MembershipMatch>> {
        if let Some(expected) = request.system {
            if let Some(system) = &set.system {
                if system != expected {
                    return Ok(None);
                }
            }
        }

        if let Some(system) = &set.system {
            let provider = self
                .resolver
                .resolve_code_system(system, set.version.as_deref())
                .ok_or_else(|| TxError::not_found(format!("code system '{system}' not found")))?;

            if !set.concepts.is_empty() {
                if let Some(explicit) = set.concepts.iter().find(|c| c.code == request.code) {
                    let located = provider.locate(&request.code);
                    return Ok(Some(MembershipMatch {
                        system: system.clone(),
                        display: explicit
                            .display
                            .clone()
                            .or_else(|| located.as_ref().and_then(|c| provider.display(c, None))),
                        is_abstract: located.as_ref().map(|c| provider.is_abstract(c)).unwrap_or(false),
                        inactive: located.as_ref().map(|c| provider.is_inactive(c)).unwrap_or(false),
                        code: request.code.to_string(),
                    }));
                }
                return Ok(None);
            }

            if !set.filters.is_empty() {
                let filters: Vec<(String, String, String)> = set
                    .filters
                    .iter()
                    .map(|f| (f.property.clone(), f.op.clone(), f.value.clone()))
                    .collect();
                let matched = provider.execute_filters(&filters).map_err(TxError::from)?;
                if let Some(concept) = matched.into_iter().find(|c| c.code == request.code) {
                    return Ok(Some(MembershipMatch {
                        system: system.clone(),
                        display: provider.display(&concept, None),
                        is_abstract: provider.is_abstract(&concept),
                        inactive: provider.is_inactive(&concept),
                        code: concept.code,
                    }));
                }
                return Ok(None);
            }

            if let Some(concept) = provider.locate(&request.code) {
                return Ok(Some(MembershipMatch {
                    system: system.clone(),
                    display: provider.display(&concept, None),
                    is_abstract: provider.is_abstract(&concept),
                    inactive: provider.is_inactive(&concept),
                    code: concept.code,
                }));
            }
            return Ok(None);
        }

        for vs_url in &set.value_sets {
            let imported = self
                .resolver
                .resolve_value_set(vs_url, None)
                .ok_or_else(|| TxError::not_found(format!("value set '{vs_url}' not found")))?;
            let _guard = self.ctx.enter_value_set(&imported.resource.vurl())?;
            if let Some(found) = self.concept_set_membership_any(&imported, request)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    fn concept_set_membership_any(
        &self,
        value_set: &ValueSet,
        request: &CheckRequest,
    ) -> Result<Option<MembershipMatch>> {
        for include in &value_set.include {
            if let Some(found) = self.concept_set_membership(include, request)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

struct MembershipMatch {
    system: String,
    code: String,
    display: Option<String>,
    is_abstract: bool,
    inactive: bool,
}

fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn judge_display(supplied: &str, expected: &str, request: &CheckRequest) -> DisplayVerdict {
    let matches = match request.display_mode {
        DisplayMode::Exact => supplied == expected,
        DisplayMode::CaseInsensitive => supplied.eq_ignore_ascii_case(expected),
    };
    if matches {
        return DisplayVerdict::Matches;
    }
    if request.lenient_display_validation || normalise(supplied) == normalise(expected) {
        return DisplayVerdict::NormalisedMismatch {
            expected: expected.to_string(),
        };
    }
    DisplayVerdict::Mismatch {
        expected: expected.to_string(),
    }
}
