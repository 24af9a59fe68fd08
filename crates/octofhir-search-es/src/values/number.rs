//! Number search values.
//!
//! FHIR treats every written digit as significant, trailing zeros included,
//! so `100` has three significant figures and matches `[99.5, 100.5]`.
//! See https://www.hl7.org/fhir/search.html#number

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, SearchError};
use crate::parameters::SearchPrefix;
use crate::range::NumberRange;

static NUMBER_SEARCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<prefix>eq|ne|lt|gt|ge|le|sa|eb|ap)?(?<number>[0-9.+-eE]+)$")
        .expect("Invalid number search regex")
});

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<sign>[+-])?(?<whole>[0-9]+)(\.(?<decimals>[0-9]+))?([eE](?<exp>[+-]?[0-9]+))?$")
        .expect("Invalid number regex")
});

/// A number together with its implicit precision range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FhirNumber {
    pub number: f64,
    pub implicit_range: NumberRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberValue {
    pub prefix: SearchPrefix,
    pub number: f64,
    pub implicit_range: NumberRange,
}

/// Parse a bare number (no prefix) and compute its implicit range.
pub fn parse_number(s: &str) -> Result<FhirNumber> {
    let invalid = || SearchError::invalid(format!("Invalid number in search parameter: {s}"));

    let caps = NUMBER_REGEX.captures(s).ok_or_else(invalid)?;
    let decimals = caps.name("decimals").map_or(0, |m| m.as_str().len()) as i32;

    let delta_exp = match caps.name("exp") {
        Some(exp) => {
            let exp: i32 = exp.as_str().parse().map_err(|_| invalid())?;
            exp - (decimals + 1)
        }
        None => -(decimals + 1),
    };

    let number: f64 = s.parse().map_err(|_| invalid())?;
    let delta = 5.0 * 10f64.powi(delta_exp);

    Ok(FhirNumber {
        number,
        implicit_range: NumberRange::new(number - delta, number + delta),
    })
}

/// Parse `[prefix]number`.
pub fn parse_number_value(param: &str) -> Result<NumberValue> {
    let caps = NUMBER_SEARCH_REGEX.captures(param).ok_or_else(|| {
        SearchError::invalid(format!("Invalid number search parameter: {param}"))
    })?;
    let prefix = SearchPrefix::parse_or_default(caps.name("prefix").map(|m| m.as_str()));
    let FhirNumber {
        number,
        implicit_range,
    } = parse_number(&caps["number"])?;

    Ok(NumberValue {
        prefix,
        number,
        implicit_range,
    })
}
