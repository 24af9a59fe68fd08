//! Token comparison: Coding, CodeableConcept, Identifier and plain codes.

use serde_json::Value;

use crate::values::TokenValue;

fn code_matches(candidate: &Value, code: &str) -> bool {
    match candidate {
        Value::Bool(b) => (code == "true" && *b) || (code == "false" && !*b),
        other => other.as_str() == Some(code),
    }
}

pub fn token_match(token: &TokenValue, found: &Value) -> bool {
    match found.get("coding") {
        Some(Value::Array(codings)) => return codings.iter().any(|c| token_match(token, c)),
        Some(coding @ Value::Object(_)) => return token_match(token, coding),
        _ => {}
    }

    let system = found.get("system");
    if token.explicit_no_system && system.is_some() {
        return false;
    }
    if let Some(expected) = &token.system
        && system.and_then(Value::as_str) != Some(expected.as_str())
    {
        return false;
    }
    if let Some(code) = &token.code {
        let candidates = [found.get("code"), found.get("value"), Some(found)];
        if !candidates
            .into_iter()
            .flatten()
            .any(|candidate| code_matches(candidate, code))
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::parse_token_value;
    use serde_json::json;

    fn token(s: &str) -> TokenValue {
        parse_token_value(s).unwrap()
    }

    #[test]
    fn test_codeable_concept() {
        let concept = json!({
            "coding": [
                {"system": "http://snomed.info/sct", "code": "123"},
                {"system": "http://loinc.org", "code": "1234-5"}
            ]
        });
        assert!(token_match(&token("http://loinc.org|1234-5"), &concept));
        assert!(token_match(&token("123"), &concept));
        assert!(!token_match(&token("http://loinc.org|123"), &concept));
        assert!(token_match(&token("http://loinc.org|"), &concept));
    }

    #[test]
    fn test_identifier_value() {
        let identifier = json!({"system": "http://acme.org/mrn", "value": "A-1"});
        assert!(token_match(&token("A-1"), &identifier));
        assert!(token_match(&token("http://acme.org/mrn|A-1"), &identifier));
        assert!(!token_match(&token("|A-1"), &identifier));
        assert!(token_match(&token("|A-1"), &json!({"value": "A-1"})));
    }

    #[test]
    fn test_plain_code_and_boolean() {
        assert!(token_match(&token("female"), &json!("female")));
        assert!(!token_match(&token("male"), &json!("female")));
        assert!(token_match(&token("true"), &json!(true)));
        assert!(token_match(&token("false"), &json!(false)));
        assert!(!token_match(&token("false"), &json!(true)));
        assert!(!token_match(&token("1"), &json!(1)));
    }

    #[test]
    fn test_system_required() {
        assert!(!token_match(&token("http://acme.org|female"), &json!("female")));
    }
}
