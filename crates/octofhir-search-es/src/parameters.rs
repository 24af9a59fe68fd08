//! Search parameter metadata: types, prefixes and compiled definitions.
//!
//! Definitions are produced by an external FHIRPath compiler and loaded as
//! JSON. Each definition carries one or more [`CompiledCondition`]s; a value
//! matches the parameter when it matches any of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIR SearchParameter type enumeration
/// See: https://hl7.org/fhir/R4/search.html#table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Composite,
    Quantity,
    Uri,
    Special,
}

impl SearchParameterType {
    /// Parse a search parameter type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "reference" => Some(Self::Reference),
            "composite" => Some(Self::Composite),
            "quantity" => Some(Self::Quantity),
            "uri" => Some(Self::Uri),
            "special" => Some(Self::Special),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Composite => "composite",
            Self::Quantity => "quantity",
            Self::Uri => "uri",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for SearchParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefixes for number/date/quantity search values
/// e.g., `ge2020-01-01`, `lt5.0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Sa, // starts after
    Eb, // ends before
    Ap, // approximately
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchPrefix::Eq => "eq",
            SearchPrefix::Ne => "ne",
            SearchPrefix::Gt => "gt",
            SearchPrefix::Lt => "lt",
            SearchPrefix::Ge => "ge",
            SearchPrefix::Le => "le",
            SearchPrefix::Sa => "sa",
            SearchPrefix::Eb => "eb",
            SearchPrefix::Ap => "ap",
        };
        f.write_str(s)
    }
}

impl SearchPrefix {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            "sa" => Some(Self::Sa),
            "eb" => Some(Self::Eb),
            "ap" => Some(Self::Ap),
            _ => None,
        }
    }

    /// Parse an optional regex capture, defaulting to `eq` when absent.
    pub(crate) fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }
}

/// Operator of an extra predicate attached to a compiled path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Some value at the field equals the operand
    Equals,
    /// Some reference at the field resolves to the operand resource type
    Resolve,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::Resolve => "resolve",
        }
    }
}

/// Predicate `(field, operator, value)` that must hold alongside a compiled path.
///
/// Serialized as a three element array, e.g. `["url", "=", "http://..."]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

impl TryFrom<Vec<String>> for Condition {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        let [field, operator, value]: [String; 3] = parts
            .try_into()
            .map_err(|p: Vec<String>| format!("condition must have 3 elements, got {}", p.len()))?;
        let operator = match operator.as_str() {
            "=" => ConditionOperator::Equals,
            "resolve" => ConditionOperator::Resolve,
            other => return Err(format!("unknown condition operator '{other}'")),
        };
        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

impl From<Condition> for Vec<String> {
    fn from(c: Condition) -> Self {
        vec![c.field, c.operator.as_str().to_string(), c.value]
    }
}

/// A resolved `(resourceType, path, condition?)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledCondition {
    pub resource_type: String,
    /// Dot path into the resource document
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl CompiledCondition {
    pub fn new(resource_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            path: path.into(),
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A compiled search parameter definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParamDefinition {
    /// The code used in search queries (e.g., "name", "identifier")
    pub name: String,
    /// The canonical URL of this search parameter
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type")]
    pub param_type: SearchParameterType,
    #[serde(default)]
    pub description: String,
    /// Resource type this parameter applies to ("Resource" for all types)
    pub base: String,
    /// Target resource types for reference parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<String>>,
    pub compiled: Vec<CompiledCondition>,
}

impl SearchParamDefinition {
    pub fn new(
        name: impl Into<String>,
        param_type: SearchParameterType,
        base: impl Into<String>,
        compiled: Vec<CompiledCondition>,
    ) -> Self {
        let name = name.into();
        let base = base.into();
        Self {
            url: format!("http://hl7.org/fhir/SearchParameter/{base}-{name}"),
            name,
            param_type,
            description: String::new(),
            base,
            target: None,
            compiled,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Declared target types, empty when none are declared.
    pub fn targets(&self) -> &[String] {
        self.target.as_deref().unwrap_or(&[])
    }

    pub fn has_target(&self, resource_type: &str) -> bool {
        self.targets().iter().any(|t| t == resource_type)
    }

    pub fn is_reference(&self) -> bool {
        self.param_type == SearchParameterType::Reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_parse_and_display() {
        for p in ["eq", "ne", "gt", "lt", "ge", "le", "sa", "eb", "ap"] {
            let prefix = SearchPrefix::parse(p).unwrap();
            assert_eq!(prefix.to_string(), p);
        }
        assert!(SearchPrefix::parse("xx").is_none());
        assert_eq!(SearchPrefix::parse_or_default(None), SearchPrefix::Eq);
    }

    #[test]
    fn test_definition_from_compiled_json() {
        let def: SearchParamDefinition = serde_json::from_value(json!({
            "name": "subject",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-subject",
            "type": "reference",
            "description": "The subject",
            "base": "Observation",
            "target": ["Patient", "Group"],
            "compiled": [
                { "resourceType": "Observation", "path": "subject", "condition": ["subject", "resolve", "Patient"] }
            ]
        }))
        .unwrap();

        assert_eq!(def.param_type, SearchParameterType::Reference);
        assert!(def.has_target("Group"));
        let condition = def.compiled[0].condition.as_ref().unwrap();
        assert_eq!(condition.operator, ConditionOperator::Resolve);
        assert_eq!(condition.value, "Patient");
    }

    #[test]
    fn test_condition_rejects_unknown_operator() {
        let res: Result<Condition, _> = serde_json::from_value(json!(["a", "!=", "b"]));
        assert!(res.is_err());
        let res: Result<Condition, _> = serde_json::from_value(json!(["a", "="]));
        assert!(res.is_err());
    }

    #[test]
    fn test_condition_round_trips_as_array() {
        let c = Condition::new("url", ConditionOperator::Equals, "http://x");
        assert_eq!(serde_json::to_value(&c).unwrap(), json!(["url", "=", "http://x"]));
    }
}
