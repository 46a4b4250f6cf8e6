//! Reasoner output boundary
//!
//! Reasoner replies are untyped JSON. They are validated here and converted
//! into fixed shapes; anything that does not fit is rejected, never coerced.

use crate::error::ValidationError;
use crate::types::{Claim, Incident, PlanOutput};
use serde_json::Value;

impl PlanOutput {
    /// Validate a raw reasoner plan for `incident`
    ///
    /// Accepted shape:
    /// `{"proposed_action": str | [str], "rationale"?: str,
    ///   "key_claims": [str | {"text": str, "cited_authority"?: str}],
    ///   "confidence_initial": number in [0, 100]}`
    ///
    /// # Errors
    /// `ValidationError` naming the first field that does not fit.
    pub fn from_reasoner_value(incident: &Incident, value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::new("plan", "expected a JSON object"))?;

        let proposed_action = match obj.get("proposed_action") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Array(steps)) => {
                let mut parts = Vec::with_capacity(steps.len());
                for (idx, step) in steps.iter().enumerate() {
                    let text = step.as_str().ok_or_else(|| {
                        ValidationError::new(
                            format!("plan.proposed_action[{idx}]"),
                            "expected a string step",
                        )
                    })?;
                    if !text.trim().is_empty() {
                        parts.push(text.trim().to_string());
                    }
                }
                parts.join(" ; ")
            }
            Some(_) => {
                return Err(ValidationError::new(
                    "plan.proposed_action",
                    "expected a string or a list of strings",
                ))
            }
            None => return Err(ValidationError::new("plan.proposed_action", "missing")),
        };

        let rationale = match obj.get("rationale") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ValidationError::new("plan.rationale", "expected a string")),
        };

        let claims = match obj.get("key_claims") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| parse_claim(idx, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ValidationError::new("plan.key_claims", "expected a list")),
            None => return Err(ValidationError::new("plan.key_claims", "missing")),
        };

        let confidence_initial = obj
            .get("confidence_initial")
            .and_then(Value::as_f64)
            .ok_or_else(|| ValidationError::new("plan.confidence_initial", "expected a number"))?;

        PlanOutput::new(
            incident.id().clone(),
            proposed_action,
            rationale,
            claims,
            confidence_initial,
        )
    }
}

fn parse_claim(idx: usize, item: &Value) -> Result<Claim, ValidationError> {
    let field = || format!("plan.key_claims[{idx}]");
    match item {
        Value::String(text) => Ok(Claim::new(text.trim())),
        Value::Object(obj) => {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::new(field(), "missing claim text"))?;
            let cited_authority = match obj.get("cited_authority") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(Value::String(s)) => Some(s.trim().to_string()),
                Some(_) => {
                    return Err(ValidationError::new(
                        format!("{}.cited_authority", field()),
                        "expected a string",
                    ))
                }
            };
            Ok(Claim {
                text: text.trim().to_string(),
                cited_authority,
            })
        }
        _ => Err(ValidationError::new(field(), "expected a string or an object")),
    }
}

/// Extra evidence queries per claim, suggested by the reasoner
///
/// Hints only widen retrieval; they never count as evidence. The reasoner may
/// also restate the action it would take after seeing the claims challenged,
/// which is compared with the original plan for the audit trail only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationHints {
    claim_queries: Vec<Vec<String>>,
    position_after_stress: Option<String>,
}

impl VerificationHints {
    /// No hints
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate a raw reasoner reply for a plan with `claim_count` claims
    ///
    /// `null` or an object without `claim_queries` yields no queries.
    ///
    /// # Errors
    /// `ValidationError` if the shape is wrong or there are more query lists than claims.
    pub fn from_reasoner_value(value: &Value, claim_count: usize) -> Result<Self, ValidationError> {
        let obj = match value {
            Value::Null => return Ok(Self::empty()),
            Value::Object(obj) => obj,
            _ => return Err(ValidationError::new("hints", "expected a JSON object")),
        };

        let position_after_stress = match obj.get("position_after_stress") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
            Some(_) => {
                return Err(ValidationError::new(
                    "hints.position_after_stress",
                    "expected a string",
                ))
            }
        };

        let lists: &[Value] = match obj.get("claim_queries") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(lists)) => lists,
            Some(_) => return Err(ValidationError::new("hints.claim_queries", "expected a list")),
        };
        if lists.len() > claim_count {
            return Err(ValidationError::new(
                "hints.claim_queries",
                format!("{} query lists for {claim_count} claims", lists.len()),
            ));
        }

        let mut claim_queries = Vec::with_capacity(lists.len());
        for (idx, list) in lists.iter().enumerate() {
            let items = list.as_array().ok_or_else(|| {
                ValidationError::new(format!("hints.claim_queries[{idx}]"), "expected a list")
            })?;
            let mut queries = Vec::with_capacity(items.len());
            for item in items {
                let query = item.as_str().ok_or_else(|| {
                    ValidationError::new(
                        format!("hints.claim_queries[{idx}]"),
                        "expected string queries",
                    )
                })?;
                let query = query.trim();
                if !query.is_empty() {
                    queries.push(query.to_string());
                }
            }
            claim_queries.push(queries);
        }
        Ok(Self {
            claim_queries,
            position_after_stress,
        })
    }

    /// Action the reasoner would take after verification, if it restated one
    #[must_use]
    pub fn position_after_stress(&self) -> Option<&str> {
        self.position_after_stress.as_deref()
    }

    /// Queries for the claim at `claim_index`
    #[must_use]
    pub fn queries_for(&self, claim_index: usize) -> &[String] {
        self.claim_queries
            .get(claim_index)
            .map_or(&[], Vec::as_slice)
    }
}

/// Salvage the first JSON object from a model reply
///
/// Tolerates code fences and surrounding prose.
///
/// # Errors
/// `ValidationError` if no JSON object can be parsed.
pub fn extract_json_object(text: &str) -> Result<Value, ValidationError> {
    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = stream.next() {
            return Ok(value);
        }
    }
    Err(ValidationError::new("reply", "no JSON object found"))
}
