//! String parameters, also used for composite and special values.

use serde_json::{Value, json};

use super::{combine, multi_match};
use crate::path::string_sub_fields;
use crate::query::StringModifier;

fn escape_query_string(value: &str) -> String {
    value.replace('/', "\\/")
}

pub fn build_clause(path: &str, value: &str, modifier: Option<StringModifier>) -> Value {
    match modifier {
        Some(StringModifier::Contains) => contains_clause(path, value),
        None | Some(StringModifier::Exact) => {
            let suffix = if modifier.is_some() { ".keyword" } else { "" };
            multi_match(
                vec![format!("{path}{suffix}"), format!("{path}.*{suffix}")],
                &escape_query_string(value),
            )
        }
    }
}

/// Wildcard queries cannot target `name.*`, so HumanName and Address
/// sub-fields are listed explicitly.
fn contains_clause(path: &str, value: &str) -> Value {
    let pattern = format!("*{}*", value.to_lowercase());
    let queries = std::iter::once(path.to_string())
        .chain(string_sub_fields(path).iter().map(|f| format!("{path}.{f}")))
        .map(|field| json!({ "wildcard": { field: { "value": pattern } } }))
        .collect();
    combine(queries, "should")
}
