//! Prefix comparison algebra shared by the query builder and the matcher.
//!
//! Each of the nine FHIR prefixes maps to one [`ScalarRule`] (a point value
//! against a search range) and one [`PeriodRule`] (a resource interval
//! against a search range). The builder renders the rules as range queries,
//! the matcher evaluates them directly, so both sides read the same table.
//!
//! See https://www.hl7.org/fhir/search.html#prefix

use crate::parameters::SearchPrefix;

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub start: T,
    pub end: T,
}

impl<T> Range<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

pub type NumberRange = Range<f64>;

/// Which end of the search range a comparison uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

impl Bound {
    pub fn pick<T: Copy>(self, range: &Range<T>) -> T {
        match self {
            Bound::Start => range.start,
            Bound::End => range.end,
        }
    }

    /// Sub-field name of a Period-shaped value
    pub fn field(self) -> &'static str {
        match self {
            Bound::Start => "start",
            Bound::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// `value <op> bound`
    pub fn holds<T: PartialOrd>(self, value: &T, bound: &T) -> bool {
        match self {
            Comparison::Gt => value > bound,
            Comparison::Gte => value >= bound,
            Comparison::Lt => value < bound,
            Comparison::Lte => value <= bound,
        }
    }

    /// Key used in an Elasticsearch `range` query
    pub fn key(self) -> &'static str {
        match self {
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
        }
    }
}

/// Rule for comparing a single resource value with a search range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarRule {
    /// `start <= v <= end`
    Within,
    /// `v < start || v > end`
    Outside,
    /// `v <op> bound`
    Compare(Comparison, Bound),
}

impl ScalarRule {
    pub fn for_prefix(prefix: SearchPrefix) -> Self {
        match prefix {
            SearchPrefix::Eq | SearchPrefix::Ap => ScalarRule::Within,
            SearchPrefix::Ne => ScalarRule::Outside,
            SearchPrefix::Lt => ScalarRule::Compare(Comparison::Lt, Bound::End),
            SearchPrefix::Le => ScalarRule::Compare(Comparison::Lte, Bound::End),
            SearchPrefix::Gt => ScalarRule::Compare(Comparison::Gt, Bound::Start),
            SearchPrefix::Ge => ScalarRule::Compare(Comparison::Gte, Bound::Start),
            SearchPrefix::Sa => ScalarRule::Compare(Comparison::Gt, Bound::End),
            SearchPrefix::Eb => ScalarRule::Compare(Comparison::Lt, Bound::Start),
        }
    }

    pub fn evaluate<T: PartialOrd + Copy>(self, search: &Range<T>, value: &T) -> bool {
        match self {
            ScalarRule::Within => *value >= search.start && *value <= search.end,
            ScalarRule::Outside => *value < search.start || *value > search.end,
            ScalarRule::Compare(op, bound) => op.holds(value, &bound.pick(search)),
        }
    }
}

/// Rule for comparing a resource interval (e.g. a Period) with a search range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodRule {
    /// resource interval lies inside the search range
    Contained,
    /// negation of `Contained`
    NotContained,
    /// `resource.<field> <op> search.<bound>`
    Compare {
        field: Bound,
        op: Comparison,
        bound: Bound,
    },
    /// neither starts after nor ends before the search range
    Overlaps,
}

/// Resource starts after the search range ends.
pub const STARTS_AFTER: PeriodRule = PeriodRule::Compare {
    field: Bound::Start,
    op: Comparison::Gt,
    bound: Bound::End,
};

/// Resource ends before the search range starts.
pub const ENDS_BEFORE: PeriodRule = PeriodRule::Compare {
    field: Bound::End,
    op: Comparison::Lt,
    bound: Bound::Start,
};

impl PeriodRule {
    pub fn for_prefix(prefix: SearchPrefix) -> Self {
        match prefix {
            SearchPrefix::Eq => PeriodRule::Contained,
            SearchPrefix::Ne => PeriodRule::NotContained,
            SearchPrefix::Lt | SearchPrefix::Le => PeriodRule::Compare {
                field: Bound::Start,
                op: Comparison::Lte,
                bound: Bound::End,
            },
            SearchPrefix::Gt | SearchPrefix::Ge => PeriodRule::Compare {
                field: Bound::End,
                op: Comparison::Gte,
                bound: Bound::Start,
            },
            SearchPrefix::Sa => STARTS_AFTER,
            SearchPrefix::Eb => ENDS_BEFORE,
            SearchPrefix::Ap => PeriodRule::Overlaps,
        }
    }

    pub fn evaluate<T: PartialOrd + Copy>(self, search: &Range<T>, resource: &Range<T>) -> bool {
        match self {
            PeriodRule::Contained => resource.start >= search.start && resource.end <= search.end,
            PeriodRule::NotContained => {
                !PeriodRule::Contained.evaluate(search, resource)
            }
            PeriodRule::Compare { field, op, bound } => {
                op.holds(&field.pick(resource), &bound.pick(search))
            }
            PeriodRule::Overlaps => {
                !STARTS_AFTER.evaluate(search, resource) && !ENDS_BEFORE.evaluate(search, resource)
            }
        }
    }
}

/// `true` when `value` satisfies `prefix` against `search`.
pub fn compare_value_to_range<T: PartialOrd + Copy>(
    prefix: SearchPrefix,
    search: &Range<T>,
    value: &T,
) -> bool {
    ScalarRule::for_prefix(prefix).evaluate(search, value)
}

/// `true` when the `resource` interval satisfies `prefix` against `search`.
pub fn compare_ranges<T: PartialOrd + Copy>(
    prefix: SearchPrefix,
    search: &Range<T>,
    resource: &Range<T>,
) -> bool {
    PeriodRule::for_prefix(prefix).evaluate(search, resource)
}

/// Range used for numeric comparison.
///
/// With `eq` and `ne` the implicit precision range applies. Every other
/// prefix compares against the number itself, as if written with arbitrarily
/// high precision.
pub fn apply_prefix_rules(prefix: SearchPrefix, number: f64, implicit: NumberRange) -> NumberRange {
    match prefix {
        SearchPrefix::Eq | SearchPrefix::Ne => implicit,
        _ => Range::new(number, number),
    }
}
