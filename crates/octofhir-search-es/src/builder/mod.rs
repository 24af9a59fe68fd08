//! Compiles a [`ParsedQuery`] into an Elasticsearch query body.
//!
//! Every parameter becomes one clause of the top level `bool.must`. Inside a
//! parameter, every OR value is combined with every compiled path and the
//! resulting fragments go into a `bool.should`. Per-type fragments live in
//! the submodules.

pub mod range;
pub mod reference;
pub mod sort;
pub mod string;
pub mod token;

use serde_json::{Value, json};

use crate::error::{Result, SearchError};
use crate::parameters::{CompiledCondition, SearchParamDefinition, SearchParameterType};
use crate::query::{ParsedQuery, ParsedQueryParam, QueryParams, StringModifier, parse_query};
use crate::registry::SearchParameterRegistry;
use crate::values::TypedValue;

pub(crate) fn keyword_suffix(use_keyword_subfields: bool) -> &'static str {
    if use_keyword_subfields { ".keyword" } else { "" }
}

/// Reject any modifier for types that support none.
pub(crate) fn reject_modifier(type_name: &str, modifier: Option<&str>) -> Result<()> {
    match modifier {
        Some(m) => Err(SearchError::invalid(format!(
            "Unsupported {type_name} search modifier: {m}"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn multi_match(fields: Vec<String>, query: &str) -> Value {
    json!({
        "multi_match": {
            "fields": fields,
            "query": query,
            "lenient": true
        }
    })
}

/// Single query returned as-is, several combined under `bool.<occur>`.
pub(crate) fn combine(mut queries: Vec<Value>, occur: &str) -> Value {
    if queries.len() == 1 {
        return queries.remove(0);
    }
    json!({ "bool": { occur: queries } })
}

#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    registry: &'a SearchParameterRegistry,
    base_url: String,
    use_keyword_subfields: bool,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(registry: &'a SearchParameterRegistry, base_url: impl Into<String>) -> Self {
        Self {
            registry,
            base_url: base_url.into(),
            use_keyword_subfields: true,
        }
    }

    /// Append `.keyword` to exact-match fields (dynamic string mappings).
    #[must_use]
    pub fn with_keyword_subfields(mut self, enabled: bool) -> Self {
        self.use_keyword_subfields = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn registry(&self) -> &'a SearchParameterRegistry {
        self.registry
    }

    /// `bool { filter, must }` for the parsed search parameters.
    pub fn build(&self, parsed: &ParsedQuery, filters: &[Value]) -> Result<Value> {
        self.build_with_chained(parsed, filters, None)
    }

    /// Like [`build`](Self::build), adding the parameters produced by chain
    /// resolution as one more OR group.
    pub fn build_with_chained(
        &self,
        parsed: &ParsedQuery,
        filters: &[Value],
        chained: Option<&QueryParams>,
    ) -> Result<Value> {
        let mut must = parsed
            .search_params
            .iter()
            .map(|p| self.param_query(p))
            .collect::<Result<Vec<_>>>()?;

        if let Some(chained) = chained
            && !chained.is_empty()
        {
            let chained_query = parse_query(self.registry, &parsed.resource_type, chained)?;
            let should = chained_query
                .search_params
                .iter()
                .map(|p| self.param_query(p))
                .collect::<Result<Vec<_>>>()?;
            must.push(json!({ "bool": { "should": should } }));
        }

        Ok(json!({
            "bool": {
                "filter": filters,
                "must": must
            }
        }))
    }

    /// Query for one parameter occurrence: OR over values and compiled paths.
    pub fn param_query(&self, param: &ParsedQueryParam) -> Result<Value> {
        let modifier = param.modifier;
        let mut queries = Vec::with_capacity(param.values.len() * param.definition.compiled.len());
        for value in &param.values {
            for compiled in &param.definition.compiled {
                queries.push(self.type_query_with_condition(
                    &param.definition,
                    compiled,
                    value,
                    modifier,
                )?);
            }
        }
        Ok(combine(queries, "should"))
    }

    fn type_query_with_condition(
        &self,
        def: &SearchParamDefinition,
        compiled: &CompiledCondition,
        value: &TypedValue,
        modifier: Option<StringModifier>,
    ) -> Result<Value> {
        let query = self.type_query(def, compiled, value, modifier)?;
        // arrays of objects would need nested queries for a strict match; a
        // bool.must may also return documents where the parts match different elements
        Ok(match &compiled.condition {
            Some(condition) => json!({
                "bool": {
                    "must": [
                        query,
                        multi_match(
                            vec![condition.field.clone(), format!("{}.*", condition.field)],
                            &condition.value,
                        )
                    ]
                }
            }),
            None => query,
        })
    }

    fn type_query(
        &self,
        def: &SearchParamDefinition,
        compiled: &CompiledCondition,
        value: &TypedValue,
        modifier: Option<StringModifier>,
    ) -> Result<Value> {
        let path = compiled.path.as_str();
        let raw_modifier = modifier.map(StringModifier::as_str);
        match value {
            TypedValue::String(s) => match def.param_type {
                SearchParameterType::Uri => {
                    reject_modifier("URI", raw_modifier)?;
                    let suffix = keyword_suffix(self.use_keyword_subfields);
                    Ok(multi_match(vec![format!("{path}{suffix}")], s))
                }
                _ => Ok(string::build_clause(path, s, modifier)),
            },
            TypedValue::Number(n) => {
                reject_modifier("number", raw_modifier)?;
                Ok(range::number_clause(n.prefix, n.number, n.implicit_range, path))
            }
            TypedValue::Date(d) => {
                reject_modifier("date", raw_modifier)?;
                Ok(range::date_clause(d.prefix, &d.range, path))
            }
            TypedValue::Quantity(q) => {
                reject_modifier("quantity", raw_modifier)?;
                Ok(range::quantity_clause(q, path, self.use_keyword_subfields))
            }
            TypedValue::Token(t) => {
                reject_modifier("token", raw_modifier)?;
                Ok(token::build_clause(path, t, self.use_keyword_subfields))
            }
            TypedValue::Reference(r) => {
                reject_modifier("reference", raw_modifier)?;
                Ok(reference::build_clause(
                    path,
                    r,
                    &self.base_url,
                    def.targets(),
                    self.use_keyword_subfields,
                ))
            }
        }
    }

    /// Sort directives for a `_sort` parameter.
    pub fn sort_clause(&self, resource_type: &str, values: &[String]) -> Result<Vec<Value>> {
        sort::build_sort_clause(self.registry, resource_type, values)
    }
}
