//! Chained parameters such as `subject:Patient.name=Peter`.
//!
//! Planning walks the dotted name left to right and turns it into
//! [`ChainStep`]s, innermost first:
//!
//! `Patient?general-practitioner:PractitionerRole.organization.name=HL7`
//! becomes `[Organization name, PractitionerRole organization, Patient general-practitioner]`.
//!
//! Resolution then queries the backend once per inner step, feeding the ids
//! found by one step as reference values into the next. The outermost step
//! is not executed; it is returned as an ordinary reference parameter for
//! the main query.

use serde_json::{Value, json};

use crate::backend::{BackendQuery, SearchBackend};
use crate::builder::QueryBuilder;
use crate::error::{Result, SearchError};
use crate::parameters::{ConditionOperator, SearchParamDefinition};
use crate::query::{QueryParams, is_chained_parameter, is_non_searchable, parse_query, split_modifier};
use crate::registry::SearchParameterRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub resource_type: String,
    /// Parameter name; the innermost step keeps its modifier
    pub search_param: String,
}

impl ChainStep {
    fn new(resource_type: impl Into<String>, search_param: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            search_param: search_param.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainQuery {
    /// Innermost step first
    pub steps: Vec<ChainStep>,
    pub initial_value: Vec<String>,
}

/// The single resource type a reference parameter can resolve to.
///
/// A parameter with one declared target resolves to it. Otherwise every
/// compiled path must carry a `resolve` condition naming the same type, and
/// that type must be one of the declared targets.
pub fn unique_target(def: &SearchParamDefinition) -> Option<&str> {
    let targets = def.target.as_deref()?;
    if let [only] = targets {
        return Some(only.as_str());
    }

    let mut target: Option<&str> = None;
    for compiled in &def.compiled {
        let condition = compiled
            .condition
            .as_ref()
            .filter(|c| c.operator == ConditionOperator::Resolve)?;
        match target {
            None => target = Some(condition.value.as_str()),
            Some(t) if t != condition.value => return None,
            Some(_) => {}
        }
    }
    target.filter(|t| targets.iter().any(|d| d.as_str() == *t))
}

/// Plan every chained parameter of a request.
pub fn parse_chained_parameters(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    params: &QueryParams,
) -> Result<Vec<ChainQuery>> {
    params
        .iter()
        .filter(|(name, _)| !is_non_searchable(name) && is_chained_parameter(name))
        .map(|(name, values)| plan_chain(registry, resource_type, name, values))
        .collect()
}

fn plan_chain(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    name: &str,
    values: &[String],
) -> Result<ChainQuery> {
    let mut segments: Vec<&str> = name.split('.').collect();
    let last = segments.pop().unwrap_or_default();

    let mut steps = Vec::with_capacity(segments.len() + 1);
    let mut current = resource_type.to_string();
    for segment in segments {
        let (param_name, modifier) = split_modifier(segment);
        let def = registry.lookup(&current, param_name).ok_or_else(|| {
            SearchError::invalid(format!(
                "Invalid search parameter '{param_name}' for resource type {current}"
            ))
        })?;
        if !def.is_reference() {
            return Err(SearchError::invalid(format!(
                "Chained search parameter '{param_name}' for resource type {current} is not a reference."
            )));
        }

        let next = match modifier {
            Some(target) if def.has_target(target) => target.to_string(),
            Some(target) => {
                return Err(SearchError::invalid(format!(
                    "Chained search parameter '{param_name}' for resource type {current} does not point to resource type {target}."
                )));
            }
            None => unique_target(def).map(str::to_string).ok_or_else(|| {
                SearchError::invalid(format!(
                    "Chained search parameter '{param_name}' for resource type {current} points to multiple resource types, please specify."
                ))
            })?,
        };
        steps.push(ChainStep::new(&current, param_name));
        current = next;
    }
    steps.push(ChainStep::new(current, last));
    steps.reverse();

    Ok(ChainQuery {
        steps,
        initial_value: values.to_vec(),
    })
}

/// Executes planned chains against a backend.
pub struct ChainResolver<'a> {
    builder: &'a QueryBuilder<'a>,
    filters: &'a [Value],
    max_results: usize,
}

impl<'a> ChainResolver<'a> {
    pub fn new(builder: &'a QueryBuilder<'a>, filters: &'a [Value], max_results: usize) -> Self {
        Self {
            builder,
            filters,
            max_results,
        }
    }

    fn registry(&self) -> &SearchParameterRegistry {
        self.builder.registry()
    }

    /// Resolve every chain into plain reference parameters of the outer type.
    ///
    /// Returns `None` when no chain produced a match. A chain whose
    /// intermediate step matches nothing contributes nothing; a step matching
    /// more than `max_results` resources is an error.
    pub async fn resolve<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        chains: Vec<ChainQuery>,
    ) -> Result<Option<QueryParams>> {
        let mut combined = QueryParams::new();

        for chain in chains {
            let ChainQuery {
                mut steps,
                initial_value,
            } = chain;
            let Some(outer) = steps.pop() else {
                continue;
            };

            let mut step_value = Some(initial_value);
            for step in &steps {
                let Some(values) = step_value.take() else {
                    break;
                };
                step_value = self.execute_step(backend, step, values).await?;
            }

            match step_value {
                Some(values) => combined
                    .entry(outer.search_param)
                    .or_default()
                    .extend(values),
                None => tracing::debug!(
                    parameter = %outer.search_param,
                    "chained parameter matched nothing"
                ),
            }
        }

        Ok((!combined.is_empty()).then_some(combined))
    }

    /// Run one step; `None` when it matches nothing.
    async fn execute_step<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        step: &ChainStep,
        values: Vec<String>,
    ) -> Result<Option<Vec<String>>> {
        let mut params = QueryParams::new();
        params.insert(step.search_param.clone(), values);
        let parsed = parse_query(self.registry(), &step.resource_type, &params)?;
        let query = self.builder.build(&parsed, self.filters)?;

        let request = BackendQuery::new(
            &step.resource_type,
            self.max_results,
            json!({
                "query": query,
                "fields": ["id"],
                "_source": false
            }),
        )
        .with_total_hits();

        let result = backend.execute(request).await?;
        tracing::debug!(
            resource_type = %step.resource_type,
            parameter = %step.search_param,
            total = result.total,
            "chain step executed"
        );

        if result.total == 0 {
            return Ok(None);
        }
        if result.total > self.max_results as u64 {
            return Err(SearchError::invalid(format!(
                "Chained parameter {} result in more than {} {} resource. Please provide more precise queries.",
                step.search_param, self.max_results, step.resource_type
            )));
        }

        let references: Vec<String> = result
            .hits
            .iter()
            .filter_map(hit_id)
            .map(|id| format!("{}/{id}", step.resource_type))
            .collect();
        // one comma separated value so that the next step ORs the ids
        Ok(Some(vec![references.join(",")]))
    }
}

/// `id` of a hit, either on the document or as a projected field.
fn hit_id(hit: &Value) -> Option<&str> {
    hit.get("id")
        .and_then(Value::as_str)
        .or_else(|| hit.pointer("/fields/id/0").and_then(Value::as_str))
}
