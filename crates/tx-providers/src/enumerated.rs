//! Enumerated providers: small, exhaustively-listed code systems where
//! every concept is known up front (spec §4.1, §8's currency/gender
//! fixtures).

use std::collections::HashMap;

use serde_json::json;
use tx_core::{ConceptProperty, Designation};

use crate::error::ProviderError;
use crate::provider::{Capability, CodeSystemProvider, ConceptContext, FilterDeclaration};

struct EnumeratedConcept {
    display: String,
    definition: Option<String>,
    inactive: bool,
    properties: Vec<ConceptProperty>,
}

/// A code system whose concepts are a fixed, in-memory list.
pub struct EnumeratedProvider {
    system_url: String,
    version: Option<String>,
    case_sensitive: bool,
    concepts: HashMap<String, EnumeratedConcept>,
    order: Vec<String>,
}

impl EnumeratedProvider {
    pub fn new(
        system_url: impl Into<String>,
        version: Option<String>,
        case_sensitive: bool,
        concepts: Vec<(&str, &str)>,
    ) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for (code, display) in concepts {
            order.push(code.to_string());
            map.insert(
                code.to_string(),
                EnumeratedConcept {
                    display: display.to_string(),
                    definition: None,
                    inactive: false,
                    properties: Vec::new(),
                },
            );
        }
        Self {
            system_url: system_url.into(),
            version,
            case_sensitive,
            concepts: map,
            order,
        }
    }

    /// Attaches provider-extended properties (spec §4.4) to an already
    /// registered concept. No-op if `code` isn't known.
    fn set_properties(&mut self, code: &str, properties: Vec<ConceptProperty>) {
        if let Some(concept) = self.concepts.get_mut(code) {
            concept.properties = properties;
        }
    }

    fn normalize(&self, code: &str) -> String {
        if self.case_sensitive {
            code.to_string()
        } else {
            code.to_uppercase()
        }
    }

    fn find_key(&self, code: &str) -> Option<String> {
        if self.concepts.contains_key(code) {
            return Some(code.to_string());
        }
        if !self.case_sensitive {
            let normalized = self.normalize(code);
            return self
                .order
                .iter()
                .find(|c| self.normalize(c) == normalized)
                .cloned();
        }
        None
    }

    /// ISO 4217 currency codes (spec §8 fixture), a representative subset
    /// of widely-traded currencies rather than the full exhaustive table.
    pub fn iso4217() -> Self {
        let mut provider = Self::new(
            "urn:iso:std:iso:4217",
            None,
            true,
            vec![
                ("USD", "United States dollar"),
                ("EUR", "Euro"),
                ("GBP", "Pound Sterling"),
                ("JPY", "Yen"),
                ("CHF", "Swiss Franc"),
                ("CAD", "Canadian Dollar"),
                ("AUD", "Australian Dollar"),
                ("CNY", "Yuan Renminbi"),
                ("INR", "Indian Rupee"),
                ("BRL", "Brazilian Real"),
                ("ZAR", "Rand"),
                ("SEK", "Swedish Krona"),
                ("NOK", "Norwegian Krone"),
                ("NZD", "New Zealand Dollar"),
                ("MXN", "Mexican Peso"),
                ("SGD", "Singapore Dollar"),
                ("HKD", "Hong Kong Dollar"),
                ("KRW", "Won"),
                ("RUB", "Russian Ruble"),
                ("TRY", "Turkish Lira"),
                ("CLP", "Chilean Peso"),
                ("BHD", "Bahraini Dinar"),
                ("KWD", "Kuwaiti Dinar"),
                ("JOD", "Jordanian Dinar"),
                ("XAU", "Gold"),
                ("XAG", "Silver"),
                ("XXX", "No currency"),
            ],
        );

        // `decimals`/`symbol` are provider-extended `$lookup` properties
        // (spec §4.4, scenario seed 2), not part of the core concept shape.
        // `decimals` doubles as a filterable property (spec §8's filter
        // validity invariant): -1 marks a system with no minor unit at all
        // (precious metals, `XXX`), distinct from 0 decimal places.
        let metadata: &[(&str, i64, &str)] = &[
            ("USD", 2, "$"),
            ("EUR", 2, "€"),
            ("GBP", 2, "£"),
            ("JPY", 0, "¥"),
            ("CHF", 2, "CHF"),
            ("CAD", 2, "$"),
            ("AUD", 2, "$"),
            ("CNY", 2, "¥"),
            ("INR", 2, "₹"),
            ("BRL", 2, "R$"),
            ("ZAR", 2, "R"),
            ("SEK", 2, "kr"),
            ("NOK", 2, "kr"),
            ("NZD", 2, "$"),
            ("MXN", 2, "$"),
            ("SGD", 2, "$"),
            ("HKD", 2, "$"),
            ("KRW", 0, "₩"),
            ("RUB", 2, "₽"),
            ("TRY", 2, "₺"),
            ("CLP", 0, "$"),
            ("BHD", 3, "BHD"),
            ("KWD", 3, "KWD"),
            ("JOD", 3, "JOD"),
            ("XAU", -1, "XAU"),
            ("XAG", -1, "XAG"),
            ("XXX", -1, ""),
        ];
        for (code, decimals, symbol) in metadata {
            provider.set_properties(
                code,
                vec![
                    ConceptProperty { code: "decimals".to_string(), value: json!(decimals) },
                    ConceptProperty { code: "symbol".to_string(), value: json!(symbol) },
                ],
            );
        }
        provider
    }

    /// `http://hl7.org/fhir/administrative-gender`.
    pub fn administrative_gender() -> Self {
        Self::new(
            "http://hl7.org/fhir/administrative-gender",
            None,
            true,
            vec![
                ("male", "Male"),
                ("female", "Female"),
                ("other", "Other"),
                ("unknown", "Unknown"),
            ],
        )
    }

    /// USPS two-letter state/territory abbreviations, a representative
    /// subset.
    pub fn us_states() -> Self {
        Self::new(
            "https://www.usps.com/",
            None,
            false,
            vec![
                ("CA", "California"),
                ("NY", "New York"),
                ("TX", "Texas"),
                ("FL", "Florida"),
                ("WA", "Washington"),
                ("MA", "Massachusetts"),
                ("IL", "Illinois"),
                ("PA", "Pennsylvania"),
                ("OH", "Ohio"),
                ("GA", "Georgia"),
                ("DC", "District of Columbia"),
            ],
        )
    }

    /// North American Numbering Plan area codes, a representative subset.
    pub fn area_codes() -> Self {
        Self::new(
            "http://example.org/fhir/CodeSystem/nanp-area-code",
            None,
            true,
            vec![
                ("212", "New York City, NY"),
                ("415", "San Francisco, CA"),
                ("312", "Chicago, IL"),
                ("617", "Boston, MA"),
                ("202", "Washington, DC"),
            ],
        )
    }
}

impl CodeSystemProvider for EnumeratedProvider {
    fn system_url(&self) -> &str {
        &self.system_url
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn capability(&self) -> Capability {
        Capability::Enumerated
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn locate(&self, code: &str) -> Option<ConceptContext> {
        self.find_key(code).map(ConceptContext::new)
    }

    fn display(&self, concept: &ConceptContext, _language: Option<&str>) -> Option<String> {
        self.concepts.get(&concept.code).map(|c| c.display.clone())
    }

    fn designations(&self, _concept: &ConceptContext) -> Vec<Designation> {
        Vec::new()
    }

    fn is_abstract(&self, _concept: &ConceptContext) -> bool {
        false
    }

    fn is_inactive(&self, concept: &ConceptContext) -> bool {
        self.concepts
            .get(&concept.code)
            .map(|c| c.inactive)
            .unwrap_or(false)
    }

    fn properties(&self, concept: &ConceptContext) -> Vec<ConceptProperty> {
        self.concepts
            .get(&concept.code)
            .map(|c| c.properties.clone())
            .unwrap_or_default()
    }

    fn all_concepts(&self) -> Option<Vec<ConceptContext>> {
        Some(self.order.iter().cloned().map(ConceptContext::new).collect())
    }

    fn filter_declarations(&self) -> Vec<FilterDeclaration> {
        vec![
            FilterDeclaration {
                property: "code".to_string(),
                ops: vec!["=".to_string(), "in".to_string()],
                documentation: None,
            },
            FilterDeclaration {
                property: "decimals".to_string(),
                ops: vec!["=".to_string()],
                documentation: None,
            },
        ]
    }

    fn filter(
        &self,
        property: &str,
        op: &str,
        value: &str,
    ) -> Result<Vec<ConceptContext>, ProviderError> {
        match (property, op) {
            ("code", "=") => Ok(self
                .find_key(value)
                .into_iter()
                .map(ConceptContext::new)
                .collect()),
            ("code", "in") => {
                let wanted: Vec<&str> = value.split(',').map(|s| s.trim()).collect();
                Ok(self
                    .order
                    .iter()
                    .filter(|c| wanted.contains(&c.as_str()))
                    .cloned()
                    .map(ConceptContext::new)
                    .collect())
            }
            ("decimals", "=") => {
                let wanted: i64 = value.trim().parse().map_err(|_| ProviderError::FilterNotSupported {
                    property: property.to_string(),
                    op: op.to_string(),
                })?;
                Ok(self
                    .order
                    .iter()
                    .filter(|code| {
                        self.concepts
                            .get(code.as_str())
                            .map(|c| {
                                c.properties
                                    .iter()
                                    .any(|p| p.code == "decimals" && p.value == wanted)
                            })
                            .unwrap_or(false)
                    })
                    .cloned()
                    .map(ConceptContext::new)
                    .collect())
            }
            _ => Err(ProviderError::FilterNotSupported {
                property: property.to_string(),
                op: op.to_string(),
            }),
        }
    }

    fn descends_from(&self, _concept: &ConceptContext, _ancestor_code: &str) -> bool {
        false
    }
}
