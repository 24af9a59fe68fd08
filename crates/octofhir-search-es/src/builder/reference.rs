//! Reference parameters.
//!
//! A reference value expands to every stored form it may take: relative
//! (`Patient/1`) and absolute on this server (`{base}/Patient/1`).

use serde_json::{Value, json};

use super::keyword_suffix;
use crate::values::ReferenceValue;

/// Stored `reference` strings equivalent to `value`.
pub fn reference_forms(value: &ReferenceValue, base_url: &str, targets: &[String]) -> Vec<String> {
    match value {
        ReferenceValue::IdOnly { id } => targets
            .iter()
            .flat_map(|t| [format!("{base_url}/{t}/{id}"), format!("{t}/{id}")])
            .collect(),
        ReferenceValue::Relative { resource_type, id } => vec![
            format!("{resource_type}/{id}"),
            format!("{base_url}/{resource_type}/{id}"),
        ],
        ReferenceValue::Url {
            base_url: value_base,
            resource_type,
            id,
        } => {
            let mut forms = Vec::with_capacity(2);
            if value_base == base_url {
                forms.push(format!("{resource_type}/{id}"));
            }
            forms.push(format!("{value_base}/{resource_type}/{id}"));
            forms
        }
        ReferenceValue::Unparseable { raw } => vec![raw.clone()],
    }
}

pub fn build_clause(
    path: &str,
    value: &ReferenceValue,
    base_url: &str,
    targets: &[String],
    use_keyword_subfields: bool,
) -> Value {
    let field = format!("{path}.reference{}", keyword_suffix(use_keyword_subfields));
    json!({ "terms": { field: reference_forms(value, base_url, targets) } })
}
