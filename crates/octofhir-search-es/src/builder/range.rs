//! Range queries for number, date and quantity parameters.
//!
//! Rendered from the same [`ScalarRule`] / [`PeriodRule`] tables the matcher
//! evaluates.

use serde_json::{Value, json};
use time::OffsetDateTime;

use super::{combine, keyword_suffix, multi_match};
use crate::parameters::SearchPrefix;
use crate::range::{
    Bound, Comparison, ENDS_BEFORE, NumberRange, PeriodRule, Range, STARTS_AFTER, ScalarRule,
    apply_prefix_rules,
};
use crate::values::QuantityValue;
use crate::values::date::format_instant;

/// A range bound that can be written into a query.
pub trait RangeBound: Copy {
    fn to_json(&self) -> Value;
}

impl RangeBound for f64 {
    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl RangeBound for OffsetDateTime {
    fn to_json(&self) -> Value {
        Value::String(format_instant(self))
    }
}

fn range_query(field: &str, op: Comparison, bound: Value) -> Value {
    json!({ "range": { field: { op.key(): bound } } })
}

/// Scalar field (number, date, dateTime, instant) against the search range.
pub fn scalar_query<T: RangeBound>(rule: ScalarRule, search: &Range<T>, path: &str) -> Value {
    match rule {
        ScalarRule::Within => json!({
            "range": {
                path: {
                    "gte": search.start.to_json(),
                    "lte": search.end.to_json()
                }
            }
        }),
        ScalarRule::Outside => json!({
            "bool": {
                "should": [
                    range_query(path, Comparison::Gt, search.end.to_json()),
                    range_query(path, Comparison::Lt, search.start.to_json())
                ]
            }
        }),
        ScalarRule::Compare(op, bound) => range_query(path, op, bound.pick(search).to_json()),
    }
}

fn period_rule_query<T: RangeBound>(rule: PeriodRule, search: &Range<T>, path: &str) -> Value {
    let field = |bound: Bound| format!("{path}.{}", bound.field());
    match rule {
        PeriodRule::Contained => json!({
            "bool": {
                "must": [
                    range_query(&field(Bound::Start), Comparison::Gte, search.start.to_json()),
                    range_query(&field(Bound::End), Comparison::Lte, search.end.to_json())
                ]
            }
        }),
        PeriodRule::NotContained => json!({
            "bool": { "must_not": period_rule_query(PeriodRule::Contained, search, path) }
        }),
        PeriodRule::Compare {
            field: resource_field,
            op,
            bound,
        } => range_query(&field(resource_field), op, bound.pick(search).to_json()),
        PeriodRule::Overlaps => json!({
            "bool": {
                "must_not": [
                    period_rule_query(ENDS_BEFORE, search, path),
                    period_rule_query(STARTS_AFTER, search, path)
                ]
            }
        }),
    }
}

/// Period-shaped field against the search range.
///
/// Both sub-fields are required to exist so that negated clauses do not
/// match documents without a Period at `path`.
pub fn period_query<T: RangeBound>(prefix: SearchPrefix, search: &Range<T>, path: &str) -> Value {
    json!({
        "bool": {
            "must": [
                { "exists": { "field": format!("{path}.start") } },
                { "exists": { "field": format!("{path}.end") } },
                period_rule_query(PeriodRule::for_prefix(prefix), search, path)
            ]
        }
    })
}

pub fn number_clause(prefix: SearchPrefix, number: f64, implicit: NumberRange, path: &str) -> Value {
    let search = apply_prefix_rules(prefix, number, implicit);
    scalar_query(ScalarRule::for_prefix(prefix), &search, path)
}

/// Date values may be stored as a point in time or as a Period.
pub fn date_clause(prefix: SearchPrefix, search: &Range<OffsetDateTime>, path: &str) -> Value {
    json!({
        "bool": {
            "should": [
                scalar_query(ScalarRule::for_prefix(prefix), search, path),
                period_query(prefix, search, path)
            ]
        }
    })
}

pub fn quantity_clause(value: &QuantityValue, path: &str, use_keyword_subfields: bool) -> Value {
    let suffix = keyword_suffix(use_keyword_subfields);
    let mut queries = vec![number_clause(
        value.prefix,
        value.number,
        value.implicit_range,
        &format!("{path}.value"),
    )];

    match (&value.system, &value.code) {
        (Some(system), Some(code)) => {
            queries.push(multi_match(vec![format!("{path}.code{suffix}")], code));
            queries.push(multi_match(vec![format!("{path}.system{suffix}")], system));
        }
        // without a system the code may be either the coded unit or the human readable one
        (None, Some(code)) => {
            queries.push(multi_match(
                vec![format!("{path}.code{suffix}"), format!("{path}.unit{suffix}")],
                code,
            ));
        }
        _ => {}
    }
    combine(queries, "must")
}
