//! String comparison for in-memory matching.
//!
//! Unlike the Elasticsearch `contains` query, which lowercases the pattern,
//! substring matching here is case-sensitive.

use serde_json::Value;

use crate::path::{string_sub_fields, strings_at_path};
use crate::query::StringModifier;

/// Characters splitting a stored string into words for the default search.
const WORD_SEPARATORS: [char; 4] = [' ', '-', ',', '.'];

fn compare(stored: &str, search: &str, modifier: Option<StringModifier>) -> bool {
    match modifier {
        None => stored.split(WORD_SEPARATORS).any(|word| word == search),
        Some(StringModifier::Exact) => stored == search,
        Some(StringModifier::Contains) => stored.contains(search),
    }
}

/// Match a string search value against one value found at `path`.
///
/// Objects (HumanName, Address) are searched through their string sub-fields.
pub fn string_match(
    path: &str,
    search: &str,
    found: &Value,
    modifier: Option<StringModifier>,
) -> bool {
    match found {
        Value::String(stored) => compare(stored, search, modifier),
        Value::Object(_) => string_sub_fields(path).iter().any(|field| {
            strings_at_path(found, field).any(|stored| compare(stored, search, modifier))
        }),
        _ => false,
    }
}
