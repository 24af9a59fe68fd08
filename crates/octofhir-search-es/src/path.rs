//! Value extraction along dot paths of a resource document.

use serde_json::Value;

/// Collect every value found at `path` (e.g. `name.given`).
///
/// Each segment fans out over arrays, so `location.location` reaches every
/// `location` inside every element of the `location` array. Nulls and missing
/// fields are dropped.
pub fn values_at_path<'a>(resource: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut values = vec![resource];
    for segment in path.split('.') {
        values = values
            .into_iter()
            .filter_map(|v| v.get(segment))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            })
            .filter(|v| !v.is_null())
            .collect();
    }
    values
}

/// Sub-fields searched for the complex `name` and `address` paths.
///
/// String searches on these paths look inside the HumanName or Address
/// object instead of the object itself.
pub fn string_sub_fields(path: &str) -> &'static [&'static str] {
    match path {
        "name" => &["family", "given", "text", "prefix", "suffix"],
        "address" => &[
            "city",
            "country",
            "district",
            "line",
            "postalCode",
            "state",
            "text",
        ],
        _ => &[],
    }
}

/// Values at `path` read as strings; non-string values are skipped.
pub fn strings_at_path<'a>(resource: &'a Value, path: &str) -> impl Iterator<Item = &'a str> {
    values_at_path(resource, path).into_iter().filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_arrays() {
        let encounter = json!({
            "resourceType": "Encounter",
            "location": [
                {"location": {"reference": "Location/1"}},
                {"location": {"reference": "Location/2"}},
                {"status": "planned"}
            ]
        });
        let refs: Vec<&str> = strings_at_path(&encounter, "location.location.reference").collect();
        assert_eq!(refs, vec!["Location/1", "Location/2"]);
    }

    #[test]
    fn test_leaf_arrays_are_flattened() {
        let patient = json!({"name": [{"given": ["John", "Jacob"]}, {"given": ["Jingleheimer"]}]});
        let given: Vec<&str> = strings_at_path(&patient, "name.given").collect();
        assert_eq!(given, vec!["John", "Jacob", "Jingleheimer"]);
    }

    #[test]
    fn test_missing_and_null() {
        let doc = json!({"a": null, "b": {"c": 1}});
        assert!(values_at_path(&doc, "a").is_empty());
        assert!(values_at_path(&doc, "x.y").is_empty());
        assert_eq!(values_at_path(&doc, "b.c"), vec![&json!(1)]);
    }
}
