//! Token parameters.
//!
//! Tokens cover Coding, CodeableConcept, Identifier, ContactPoint and plain
//! code/boolean/string fields. The field type is not known when building the
//! query, so every applicable sub-field is matched; fields absent from a
//! document are ignored by `multi_match`.

use serde_json::{Value, json};

use super::{combine, keyword_suffix, multi_match};
use crate::values::TokenValue;

/// Fields mapped as `keyword` already, without a `.keyword` sub-field.
const FIELDS_WITHOUT_KEYWORD: [&str; 1] = ["id"];

pub fn build_clause(path: &str, value: &TokenValue, use_keyword_subfields: bool) -> Value {
    let use_keyword = use_keyword_subfields && !FIELDS_WITHOUT_KEYWORD.contains(&path);
    let suffix = keyword_suffix(use_keyword);
    let mut queries = Vec::new();

    if let Some(system) = &value.system {
        queries.push(multi_match(
            vec![
                format!("{path}.system{suffix}"),
                format!("{path}.coding.system{suffix}"),
            ],
            system,
        ));
    }

    if let Some(code) = &value.code {
        let mut fields = vec![
            format!("{path}.code{suffix}"),
            format!("{path}.coding.code{suffix}"),
            format!("{path}.value{suffix}"),
            format!("{path}{suffix}"),
        ];
        // booleans have no keyword sub-field
        if use_keyword {
            fields.push(path.to_string());
        }
        queries.push(multi_match(fields, code));
    }

    if value.explicit_no_system {
        queries.push(json!({
            "bool": {
                "must_not": { "exists": { "field": format!("{path}.system") } }
            }
        }));
    }

    combine(queries, "must")
}
