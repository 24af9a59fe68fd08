//! In-memory evaluation of a [`ParsedQuery`] against one resource document.
//!
//! Mirrors the query builder: a resource matches when every parameter
//! matches; a parameter matches when some value matches some compiled path
//! whose condition holds; a value matches when some element found at that
//! path satisfies the type comparator.
//!
//! Used where a backend round-trip is not wanted, e.g. checking a freshly
//! written resource against subscription criteria.

mod numeric;
mod reference;
mod string;
mod token;

pub use numeric::{date_match, number_match, quantity_match};
pub use reference::reference_match;
pub use string::string_match;
pub use token::token_match;

use serde_json::Value;

use crate::parameters::{CompiledCondition, Condition, ConditionOperator, SearchParameterType};
use crate::path::values_at_path;
use crate::query::{ParsedQuery, ParsedQueryParam};
use crate::values::TypedValue;

/// `true` when `resource` satisfies every search parameter of `query`.
///
/// `base_url` is the FHIR service base, used to treat absolute references
/// to this server like relative ones.
pub fn matches(query: &ParsedQuery, resource: &Value, base_url: Option<&str>) -> bool {
    let resource_type = resource.get("resourceType").and_then(Value::as_str);
    if resource_type != Some(query.resource_type.as_str()) {
        return false;
    }
    query
        .search_params
        .iter()
        .all(|param| param_matches(param, resource, base_url))
}

fn param_matches(param: &ParsedQueryParam, resource: &Value, base_url: Option<&str>) -> bool {
    param.values.iter().any(|value| {
        param.definition.compiled.iter().any(|compiled| {
            condition_holds(compiled.condition.as_ref(), resource)
                && values_at_path(resource, &compiled.path)
                    .into_iter()
                    .any(|found| type_matches(param, compiled, value, found, base_url))
        })
    })
}

fn condition_holds(condition: Option<&Condition>, resource: &Value) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    let values = values_at_path(resource, &condition.field);
    match condition.operator {
        ConditionOperator::Equals => values
            .iter()
            .any(|v| v.as_str() == Some(condition.value.as_str())),
        ConditionOperator::Resolve => {
            let prefix = format!("{}/", condition.value);
            values.iter().any(|v| {
                v.get("type").and_then(Value::as_str) == Some(condition.value.as_str())
                    || v
                        .get("reference")
                        .and_then(Value::as_str)
                        .is_some_and(|r| r.starts_with(&prefix))
            })
        }
    }
}

fn type_matches(
    param: &ParsedQueryParam,
    compiled: &CompiledCondition,
    value: &TypedValue,
    found: &Value,
    base_url: Option<&str>,
) -> bool {
    match value {
        TypedValue::String(s) => match param.param_type() {
            SearchParameterType::String => {
                string_match(&compiled.path, s, found, param.modifier)
            }
            SearchParameterType::Uri => found.as_str() == Some(s.as_str()),
            // composite and special values are never matched in memory
            _ => false,
        },
        TypedValue::Number(n) => number_match(n, found),
        TypedValue::Date(d) => date_match(d, found),
        TypedValue::Quantity(q) => quantity_match(q, found),
        TypedValue::Token(t) => token_match(t, found),
        TypedValue::Reference(r) => {
            reference_match(r, found, param.definition.targets(), base_url)
        }
    }
}
