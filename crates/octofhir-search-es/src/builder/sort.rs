//! `_sort` parameter.
//!
//! Only date parameters can be sorted on. Dates may be stored as Periods, so
//! each directive is followed by one on the Period bound matching the
//! direction: the most recent record is the one with the latest `end`.

use serde_json::{Value, json};

use crate::error::{Result, SearchError};
use crate::parameters::SearchParameterType;
use crate::registry::SearchParameterRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParameter {
    pub order: SortOrder,
    pub search_param: String,
}

/// Split `a,-b` into directives; a leading `-` means descending.
pub fn parse_sort_parameter(value: &str) -> Vec<SortParameter> {
    value
        .split(',')
        .map(|s| match s.strip_prefix('-') {
            Some(name) => SortParameter {
                order: SortOrder::Desc,
                search_param: name.to_string(),
            },
            None => SortParameter {
                order: SortOrder::Asc,
                search_param: s.to_string(),
            },
        })
        .collect()
}

fn sort_directive(field: &str, order: SortOrder) -> Value {
    // unmapped_type lets the query succeed before any document created the mapping
    json!({ field: { "order": order.as_str(), "unmapped_type": "long" } })
}

pub fn build_sort_clause(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    values: &[String],
) -> Result<Vec<Value>> {
    let value = match values {
        [] => return Ok(Vec::new()),
        [value] => value,
        _ => {
            return Err(SearchError::invalid(
                "_sort parameter cannot be used multiple times on a search query",
            ));
        }
    };

    let mut clause = Vec::new();
    for sort in parse_sort_parameter(value) {
        let def = registry
            .lookup(resource_type, &sort.search_param)
            .ok_or_else(|| {
                SearchError::invalid(format!(
                    "Unknown _sort parameter value: {}. Sort parameters values must use a valid Search Parameter",
                    sort.search_param
                ))
            })?;
        if def.param_type != SearchParameterType::Date {
            return Err(SearchError::invalid(format!(
                "Invalid _sort parameter: {}. Only date type parameters can currently be used for sorting",
                sort.search_param
            )));
        }
        for compiled in &def.compiled {
            let period_field = match sort.order {
                SortOrder::Desc => format!("{}.end", compiled.path),
                SortOrder::Asc => format!("{}.start", compiled.path),
            };
            clause.push(sort_directive(&compiled.path, sort.order));
            clause.push(sort_directive(&period_field, sort.order));
        }
    }
    Ok(clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tests::create_test_registry;
    use assert_json_diff::assert_json_eq;

    fn sort(values: &[&str]) -> Result<Vec<Value>> {
        let registry = create_test_registry();
        let values: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        build_sort_clause(&registry, "Patient", &values)
    }

    #[test]
    fn test_parse_sort_parameter() {
        assert_eq!(
            parse_sort_parameter("birthdate,-_lastUpdated"),
            vec![
                SortParameter {
                    order: SortOrder::Asc,
                    search_param: "birthdate".into()
                },
                SortParameter {
                    order: SortOrder::Desc,
                    search_param: "_lastUpdated".into()
                },
            ]
        );
    }

    #[test]
    fn test_desc_sort_uses_period_end() {
        assert_json_eq!(
            serde_json::Value::Array(sort(&["-birthdate"]).unwrap()),
            json!([
                {"birthDate": {"order": "desc", "unmapped_type": "long"}},
                {"birthDate.end": {"order": "desc", "unmapped_type": "long"}}
            ])
        );
        let asc = sort(&["birthdate"]).unwrap();
        assert_json_eq!(asc[1], json!({"birthDate.start": {"order": "asc", "unmapped_type": "long"}}));
    }

    #[test]
    fn test_sort_errors() {
        assert_eq!(
            sort(&["birthdate", "birthdate"]).unwrap_err().to_string(),
            "_sort parameter cannot be used multiple times on a search query"
        );
        assert_eq!(
            sort(&["unknown"]).unwrap_err().to_string(),
            "Unknown _sort parameter value: unknown. Sort parameters values must use a valid Search Parameter"
        );
        assert_eq!(
            sort(&["gender"]).unwrap_err().to_string(),
            "Invalid _sort parameter: gender. Only date type parameters can currently be used for sorting"
        );
        assert!(sort(&[]).unwrap().is_empty());
    }
}
