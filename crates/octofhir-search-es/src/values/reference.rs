//! Reference search values.
//!
//! Accepted forms:
//! - `Patient/123` (relative)
//! - `https://fhir.example.com/Patient/123` (absolute url)
//! - `123` (id only, requires the parameter to declare targets)
//! - anything else is kept verbatim and compared literally

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, SearchError};
use crate::parameters::SearchParamDefinition;

static ID_ONLY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("Invalid id regex"));

static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?<base>https?://[A-Za-z0-9\-\\.:%$_/]+)/)?(?<rt>[A-Z][a-zA-Z]+)/(?<id>[A-Za-z0-9\-.]{1,64})$",
    )
    .expect("Invalid reference regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceValue {
    IdOnly {
        id: String,
    },
    Relative {
        resource_type: String,
        id: String,
    },
    Url {
        base_url: String,
        resource_type: String,
        id: String,
    },
    Unparseable {
        raw: String,
    },
}

pub fn parse_reference_value(def: &SearchParamDefinition, param: &str) -> Result<ReferenceValue> {
    if let Some(caps) = REFERENCE_REGEX.captures(param) {
        let resource_type = caps["rt"].to_string();
        let id = caps["id"].to_string();
        return Ok(match caps.name("base") {
            Some(base) => ReferenceValue::Url {
                base_url: base.as_str().to_string(),
                resource_type,
                id,
            },
            None => ReferenceValue::Relative { resource_type, id },
        });
    }

    if ID_ONLY_REGEX.is_match(param) {
        if def.targets().is_empty() {
            tracing::error!(
                parameter = %def.name,
                "id only reference search failed: the search parameter has no targets, check the compiled implementation guide"
            );
            return Err(SearchError::invalid(format!(
                "ID only search for '{}' parameter is not supported, please specify the value with the format [resourceType]/[id] or as an absolute URL",
                def.name
            )));
        }
        return Ok(ReferenceValue::IdOnly {
            id: param.to_string(),
        });
    }

    Ok(ReferenceValue::Unparseable {
        raw: param.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{CompiledCondition, SearchParameterType};

    fn subject(targets: Option<&[&str]>) -> SearchParamDefinition {
        let def = SearchParamDefinition::new(
            "subject",
            SearchParameterType::Reference,
            "Observation",
            vec![CompiledCondition::new("Observation", "subject")],
        );
        match targets {
            Some(t) => def.with_targets(t.iter().copied()),
            None => def,
        }
    }

    #[test]
    fn test_relative_and_url() {
        let def = subject(Some(&["Patient"]));
        assert_eq!(
            parse_reference_value(&def, "Patient/abc-1").unwrap(),
            ReferenceValue::Relative {
                resource_type: "Patient".into(),
                id: "abc-1".into()
            }
        );
        assert_eq!(
            parse_reference_value(&def, "https://fhir.example.com/R4/Patient/abc").unwrap(),
            ReferenceValue::Url {
                base_url: "https://fhir.example.com/R4".into(),
                resource_type: "Patient".into(),
                id: "abc".into()
            }
        );
    }

    #[test]
    fn test_id_only_requires_targets() {
        assert_eq!(
            parse_reference_value(&subject(Some(&["Patient"])), "abc").unwrap(),
            ReferenceValue::IdOnly { id: "abc".into() }
        );

        let err = parse_reference_value(&subject(None), "abc").unwrap_err();
        assert!(err.to_string().starts_with("ID only search for 'subject'"));
        assert!(parse_reference_value(&subject(Some(&[])), "abc").is_err());
    }

    #[test]
    fn test_unparseable() {
        let def = subject(Some(&["Patient"]));
        assert_eq!(
            parse_reference_value(&def, "urn:uuid:1234").unwrap(),
            ReferenceValue::Unparseable {
                raw: "urn:uuid:1234".into()
            }
        );
        // lowercase resource type is not a reference
        assert!(matches!(
            parse_reference_value(&def, "patient/1").unwrap(),
            ReferenceValue::Unparseable { .. }
        ));
    }
}
