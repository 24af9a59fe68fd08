//! Reference comparison.

use serde_json::Value;

use crate::values::ReferenceValue;

/// Match against the `reference` string of a Reference element.
///
/// `targets` are the parameter's target types, tried for id-only values.
pub fn reference_match(
    value: &ReferenceValue,
    found: &Value,
    targets: &[String],
    base_url: Option<&str>,
) -> bool {
    let Some(reference) = found.get("reference").and_then(Value::as_str) else {
        return false;
    };
    let on_server = |resource_type: &str, id: &str| {
        base_url.is_some_and(|base| reference == format!("{base}/{resource_type}/{id}"))
            || reference == format!("{resource_type}/{id}")
    };

    match value {
        ReferenceValue::IdOnly { id } => targets.iter().any(|t| on_server(t, id)),
        ReferenceValue::Relative { resource_type, id } => on_server(resource_type, id),
        ReferenceValue::Url {
            base_url: value_base,
            resource_type,
            id,
        } => {
            reference == format!("{value_base}/{resource_type}/{id}")
                || (base_url == Some(value_base.as_str())
                    && reference == format!("{resource_type}/{id}"))
        }
        ReferenceValue::Unparseable { raw } => reference == raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: Option<&str> = Some("https://base.com");

    fn relative(resource_type: &str, id: &str) -> ReferenceValue {
        ReferenceValue::Relative {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    #[test]
    fn test_relative() {
        let value = relative("Patient", "1");
        assert!(reference_match(&value, &json!({"reference": "Patient/1"}), &[], None));
        assert!(reference_match(
            &value,
            &json!({"reference": "https://base.com/Patient/1"}),
            &[],
            BASE
        ));
        assert!(!reference_match(
            &value,
            &json!({"reference": "https://other.com/Patient/1"}),
            &[],
            BASE
        ));
        assert!(!reference_match(&value, &json!({"display": "Patient/1"}), &[], None));
    }

    #[test]
    fn test_id_only_uses_targets() {
        let value = ReferenceValue::IdOnly { id: "1".into() };
        let targets = vec!["Practitioner".to_string(), "Organization".to_string()];
        assert!(reference_match(&value, &json!({"reference": "Organization/1"}), &targets, None));
        assert!(!reference_match(&value, &json!({"reference": "Patient/1"}), &targets, None));
    }

    #[test]
    fn test_url() {
        let value = ReferenceValue::Url {
            base_url: "https://base.com".into(),
            resource_type: "Patient".into(),
            id: "1".into(),
        };
        assert!(reference_match(&value, &json!({"reference": "Patient/1"}), &[], BASE));
        assert!(!reference_match(&value, &json!({"reference": "Patient/1"}), &[], None));
        assert!(reference_match(
            &value,
            &json!({"reference": "https://base.com/Patient/1"}),
            &[],
            None
        ));
    }

    #[test]
    fn test_unparseable() {
        let value = ReferenceValue::Unparseable {
            raw: "urn:uuid:1".into(),
        };
        assert!(reference_match(&value, &json!({"reference": "urn:uuid:1"}), &[], None));
    }
}
