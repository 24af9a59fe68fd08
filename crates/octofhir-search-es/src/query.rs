//! Query parser: turns raw HTTP-style parameters into a [`ParsedQuery`].
//!
//! Parameters are routed into buckets before any type-specific parsing:
//! - chained (`subject.name=...`) are kept raw for the chain resolver
//! - `_include` / `_revinclude` (optionally `:iterate`) become [`InclusionParameter`]s
//! - `_format`, `_pretty`, `_summary`, `_elements` are logged and passed through
//! - `_sort`, `_count`, `_getpagesoffset` are passed through
//! - everything else is resolved against the registry and parsed per type
//!
//! Repeated parameters are ANDed (one [`ParsedQueryParam`] each), comma
//! separated values inside one occurrence are ORed.

use indexmap::IndexMap;
use regex::Regex;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use crate::builder::reject_modifier;
use crate::error::{Result, SearchError};
use crate::inclusion::{InclusionParameter, parse_inclusion_params};
use crate::parameters::{SearchParamDefinition, SearchParameterType};
use crate::registry::SearchParameterRegistry;
use crate::values::{TypedValue, or_values, parse_value};

/// Ordered multimap of raw query parameters.
pub type QueryParams = IndexMap<String, Vec<String>>;

pub const SORT_PARAMETER: &str = "_sort";
pub const COUNT_PARAMETER: &str = "_count";
pub const PAGES_OFFSET_PARAMETER: &str = "_getpagesoffset";

pub const ITERATIVE_INCLUSION_PARAMETERS: [&str; 2] = ["_include:iterate", "_revinclude:iterate"];
pub const INCLUSION_PARAMETERS: [&str; 4] = [
    "_include",
    "_revinclude",
    "_include:iterate",
    "_revinclude:iterate",
];
pub const UNSUPPORTED_GENERAL_PARAMETERS: [&str; 4] = ["_format", "_pretty", "_summary", "_elements"];


static CHAINED_PARAMETER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][.][A-Za-z]").expect("Invalid chained parameter regex"));

/// `_sort`, pagination, inclusion and unsupported general parameters.
pub fn is_non_searchable(name: &str) -> bool {
    matches!(name, SORT_PARAMETER | COUNT_PARAMETER | PAGES_OFFSET_PARAMETER)
        || INCLUSION_PARAMETERS.contains(&name)
        || UNSUPPORTED_GENERAL_PARAMETERS.contains(&name)
}

pub fn is_chained_parameter(name: &str) -> bool {
    CHAINED_PARAMETER_REGEX.is_match(name)
}

/// Split `name:modifier`. Anything after a second colon is ignored.
pub fn split_modifier(raw: &str) -> (&str, Option<&str>) {
    let mut parts = raw.split(':');
    let name = parts.next().unwrap_or_default();
    (name, parts.next())
}

/// Decode an `application/x-www-form-urlencoded` query string.
pub fn query_params_from_str(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// Modifiers accepted by string parameters. Other types take none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringModifier {
    Exact,
    Contains,
}

impl StringModifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
        }
    }
}

impl FromStr for StringModifier {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "contains" => Ok(Self::Contains),
            other => Err(SearchError::invalid(format!(
                "Unsupported string search modifier: {other}"
            ))),
        }
    }
}

/// One occurrence of a search parameter with its OR-combined values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQueryParam {
    pub name: String,
    pub modifier: Option<StringModifier>,
    pub definition: Arc<SearchParamDefinition>,
    pub values: Vec<TypedValue>,
}

impl ParsedQueryParam {
    pub fn param_type(&self) -> SearchParameterType {
        self.definition.param_type
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub resource_type: String,
    pub search_params: Vec<ParsedQueryParam>,
    pub chained_params: QueryParams,
    pub inclusion_params: Vec<InclusionParameter>,
    /// Pagination, sort and unsupported parameters, passed through untouched
    pub other_params: QueryParams,
}

impl ParsedQuery {
    /// `true` when the query carries anything beyond plain search parameters.
    pub fn has_uninterpreted_params(&self) -> bool {
        !self.chained_params.is_empty()
            || !self.inclusion_params.is_empty()
            || !self.other_params.is_empty()
    }
}

/// Parse the parameters of a search on `resource_type`.
pub fn parse_query(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    params: &QueryParams,
) -> Result<ParsedQuery> {
    let mut parsed = ParsedQuery {
        resource_type: resource_type.to_string(),
        ..Default::default()
    };
    let mut searchable = Vec::new();

    for (name, values) in params {
        if is_chained_parameter(name) {
            parsed.chained_params.insert(name.clone(), values.clone());
        } else if INCLUSION_PARAMETERS.contains(&name.as_str()) {
            parsed
                .inclusion_params
                .extend(parse_inclusion_params(registry, name, values)?);
        } else if UNSUPPORTED_GENERAL_PARAMETERS.contains(&name.as_str()) {
            tracing::info!(parameter = %name, "search parameter is not currently supported");
            parsed.other_params.insert(name.clone(), values.clone());
        } else if is_non_searchable(name) {
            parsed.other_params.insert(name.clone(), values.clone());
        } else {
            searchable.push((name, values));
        }
    }

    for (raw_name, values) in searchable {
        let (name, modifier) = split_modifier(raw_name);
        let definition = registry.lookup(resource_type, name).ok_or_else(|| {
            SearchError::invalid(format!(
                "Invalid search parameter '{name}' for resource type {resource_type}"
            ))
        })?;

        for raw in values {
            let param = parse_search_param(definition, raw, modifier)?;
            parsed.search_params.push(param);
        }
    }

    Ok(parsed)
}

fn parse_search_param(
    definition: &Arc<SearchParamDefinition>,
    raw: &str,
    modifier: Option<&str>,
) -> Result<ParsedQueryParam> {
    let modifier = parse_modifier(definition.param_type, modifier)?;
    let values = or_values(raw)
        .iter()
        .map(|v| parse_value(definition, v))
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedQueryParam {
        name: definition.name.clone(),
        modifier,
        definition: definition.clone(),
        values,
    })
}

/// Check `modifier` against the parameter type; only string-like parameters accept one.
fn parse_modifier(
    param_type: SearchParameterType,
    modifier: Option<&str>,
) -> Result<Option<StringModifier>> {
    let type_name = match param_type {
        SearchParameterType::String
        | SearchParameterType::Composite
        | SearchParameterType::Special => return modifier.map(str::parse).transpose(),
        SearchParameterType::Uri => "URI",
        SearchParameterType::Number => "number",
        SearchParameterType::Date => "date",
        SearchParameterType::Quantity => "quantity",
        SearchParameterType::Token => "token",
        SearchParameterType::Reference => "reference",
    };
    reject_modifier(type_name, modifier)?;
    Ok(None)
}

/// Parse criteria of the form `ResourceType?name=value&...`.
pub fn parse_query_string(registry: &SearchParameterRegistry, criteria: &str) -> Result<ParsedQuery> {
    let (resource_type, query) = criteria.split_once('?').unwrap_or((criteria, ""));
    parse_query(registry, resource_type, &query_params_from_str(query))
}
