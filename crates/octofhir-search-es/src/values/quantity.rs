//! Quantity search values: `[prefix]number[|system|code]`.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, SearchError};
use crate::parameters::SearchPrefix;
use crate::range::NumberRange;
use crate::values::number::{FhirNumber, parse_number};

static QUANTITY_SEARCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<prefix>eq|ne|lt|gt|ge|le|sa|eb|ap)?(?<number>[0-9.+-eE]+)(?:\|(?<system>[^|\s]*)\|(?<code>[^|\s]*))?$",
    )
    .expect("Invalid quantity search regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityValue {
    pub prefix: SearchPrefix,
    pub number: f64,
    pub implicit_range: NumberRange,
    /// `None` when omitted or empty
    pub system: Option<String>,
    /// `None` when omitted or empty
    pub code: Option<String>,
}

pub fn parse_quantity_value(param: &str) -> Result<QuantityValue> {
    let caps = QUANTITY_SEARCH_REGEX.captures(param).ok_or_else(|| {
        SearchError::invalid(format!("Invalid quantity search parameter: {param}"))
    })?;
    let prefix = SearchPrefix::parse_or_default(caps.name("prefix").map(|m| m.as_str()));
    let FhirNumber {
        number,
        implicit_range,
    } = parse_number(&caps["number"])?;
    let non_empty = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(QuantityValue {
        prefix,
        number,
        implicit_range,
        system: non_empty("system"),
        code: non_empty("code"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_quantity() {
        let q = parse_quantity_value("5.4|http://unitsofmeasure.org|mg").unwrap();
        assert_eq!(q.prefix, SearchPrefix::Eq);
        assert!((q.number - 5.4).abs() < 1e-12);
        assert!((q.implicit_range.start - 5.35).abs() < 1e-9);
        assert!((q.implicit_range.end - 5.45).abs() < 1e-9);
        assert_eq!(q.system.as_deref(), Some("http://unitsofmeasure.org"));
        assert_eq!(q.code.as_deref(), Some("mg"));
    }

    #[test]
    fn test_partial_quantities() {
        let q = parse_quantity_value("5.4||mg").unwrap();
        assert!(q.system.is_none());
        assert_eq!(q.code.as_deref(), Some("mg"));

        let q = parse_quantity_value("le5.4").unwrap();
        assert_eq!(q.prefix, SearchPrefix::Le);
        assert!(q.system.is_none());
        assert!(q.code.is_none());

        let q = parse_quantity_value("5.40e-3|http://unitsofmeasure.org|g").unwrap();
        assert!((q.implicit_range.end - 0.005405).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_quantities() {
        for input in [
            "This is not a quantity at all",
            "badPrefix100",
            "100someSuffix",
            "100|a|b|c",
            "100xxx|system|code",
            "100e-2x|system|code",
        ] {
            assert!(parse_quantity_value(input).is_err(), "{input} should fail");
        }
    }
}
