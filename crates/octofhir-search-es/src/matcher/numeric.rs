//! Number, quantity and date comparison, sharing the prefix rules of the
//! range queries.

use serde_json::Value;

use crate::range::{Range, apply_prefix_rules, compare_ranges, compare_value_to_range};
use crate::values::date::parse_resource_instant;
use crate::values::{DateValue, NumberValue, QuantityValue};

pub fn number_match(value: &NumberValue, found: &Value) -> bool {
    let Some(stored) = found.as_f64().filter(|_| found.is_number()) else {
        return false;
    };
    let search = apply_prefix_rules(value.prefix, value.number, value.implicit_range);
    compare_value_to_range(value.prefix, &search, &stored)
}

pub fn quantity_match(value: &QuantityValue, found: &Value) -> bool {
    let Some(stored) = found.get("value").and_then(Value::as_f64) else {
        return false;
    };
    let search = apply_prefix_rules(value.prefix, value.number, value.implicit_range);
    if !compare_value_to_range(value.prefix, &search, &stored) {
        return false;
    }

    let field = |name: &str| found.get(name).and_then(Value::as_str);
    match (&value.system, &value.code) {
        (None, None) => true,
        (Some(system), Some(code)) => {
            field("code") == Some(code.as_str()) && field("system") == Some(system.as_str())
        }
        (None, Some(code)) => {
            field("code") == Some(code.as_str()) || field("unit") == Some(code.as_str())
        }
        // a system is only accepted by the parser together with a code
        (Some(_), None) => true,
    }
}

/// Dates are stored either as a single instant string or as a Period.
pub fn date_match(value: &DateValue, found: &Value) -> bool {
    match found {
        Value::String(s) => parse_resource_instant(s)
            .is_some_and(|instant| compare_value_to_range(value.prefix, &value.range, &instant)),
        Value::Object(period) => {
            let bound = |name: &str| {
                period
                    .get(name)
                    .and_then(Value::as_str)
                    .and_then(parse_resource_instant)
            };
            match (bound("start"), bound("end")) {
                (Some(start), Some(end)) => {
                    compare_ranges(value.prefix, &value.range, &Range::new(start, end))
                }
                _ => false,
            }
        }
        _ => false,
    }
}
