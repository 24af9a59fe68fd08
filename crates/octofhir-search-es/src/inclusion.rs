//! `_include` and `_revinclude` handling.
//!
//! Parsing validates `Source:param[:Target]` values against the registry.
//! Resolution turns the parameters plus a page of matched resources into
//! backend queries:
//! - `_include` collects relative references found at the parameter path of
//!   the matched resources and fetches them by id
//! - `_revinclude` fetches resources of the source type whose reference
//!   field points to one of the matched resources
//!
//! `:iterate` variants repeat the process on the newly found resources.

use futures_util::future::try_join_all;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::backend::{BackendQuery, SearchBackend};
use crate::builder::keyword_suffix;
use crate::error::{Result, SearchError};
use crate::path::strings_at_path;
use crate::registry::SearchParameterRegistry;

static INCLUSION_PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<source>[A-Za-z]+):(?<param>[A-Za-z-]+)(?::(?<target>[A-Za-z]+))?$")
        .expect("Invalid inclusion parameter regex")
});

static RELATIVE_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+/[A-Za-z0-9-]+$").expect("Invalid relative url regex"));

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InclusionKind {
    Include,
    RevInclude,
}

impl InclusionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "_include",
            Self::RevInclude => "_revinclude",
        }
    }
}

/// A resolved `Source:param[:Target]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InclusionReference {
    pub source_resource: String,
    pub search_parameter: String,
    /// Path of the reference field inside source resources
    pub path: String,
    pub target_resource: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InclusionTarget {
    Wildcard,
    Reference(InclusionReference),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InclusionParameter {
    pub kind: InclusionKind,
    pub iterate: bool,
    pub target: InclusionTarget,
}

impl InclusionParameter {
    pub fn is_wildcard(&self) -> bool {
        matches!(self.target, InclusionTarget::Wildcard)
    }
}

/// Parse the values of one `_include`, `_revinclude` or `:iterate` parameter.
pub fn parse_inclusion_params(
    registry: &SearchParameterRegistry,
    parameter: &str,
    values: &[String],
) -> Result<Vec<InclusionParameter>> {
    let (kind_name, modifier) = parameter.split_once(':').unwrap_or((parameter, ""));
    let kind = if kind_name == InclusionKind::RevInclude.as_str() {
        InclusionKind::RevInclude
    } else {
        InclusionKind::Include
    };
    let iterate = modifier == "iterate";

    let unique: IndexSet<&String> = values.iter().collect();
    unique
        .into_iter()
        .map(|value| {
            let target = parse_inclusion_target(registry, value)?;
            Ok(InclusionParameter {
                kind,
                iterate,
                target,
            })
        })
        .collect()
}

fn parse_inclusion_target(registry: &SearchParameterRegistry, value: &str) -> Result<InclusionTarget> {
    if value == WILDCARD {
        return Ok(InclusionTarget::Wildcard);
    }
    let invalid = |detail: &str| {
        SearchError::invalid(format!("Invalid include/revinclude search parameter: {detail}"))
    };
    let caps = INCLUSION_PARAM_REGEX
        .captures(value)
        .ok_or_else(|| invalid(value))?;
    let source = &caps["source"];
    let param = &caps["param"];
    let target = caps.name("target").map(|m| m.as_str());

    let def = registry
        .lookup_reference(source, param, target)
        .map_err(|e| invalid(&e.to_string()))?;
    let path = def
        .compiled
        .first()
        .map(|c| c.path.clone())
        .ok_or_else(|| invalid(value))?;

    Ok(InclusionTarget::Reference(InclusionReference {
        source_resource: source.to_string(),
        search_parameter: param.to_string(),
        path,
        target_resource: target.map(str::to_string),
    }))
}

/// Shared inputs for building inclusion queries.
#[derive(Debug, Clone, Copy)]
pub struct InclusionContext<'a> {
    pub registry: &'a SearchParameterRegistry,
    /// Filters applied to every query, e.g. to hide deleted resources
    pub filters: &'a [Value],
    pub max_results: usize,
    pub use_keyword_subfields: bool,
    /// `None` allows every resource type
    pub allowed_resource_types: Option<&'a [String]>,
}

impl InclusionContext<'_> {
    fn is_allowed(&self, resource_type: &str) -> bool {
        self.allowed_resource_types.is_none_or(|allowed| {
            allowed
                .iter()
                .any(|a| a.eq_ignore_ascii_case(resource_type))
        })
    }

    /// Explicit parameters of `kind`, or the registry expansion when any of them is `*`.
    fn effective_references(
        &self,
        inclusions: &[InclusionParameter],
        kind: InclusionKind,
        iterate: bool,
        resources: &[Value],
    ) -> Vec<InclusionReference> {
        let selected: Vec<&InclusionParameter> = inclusions
            .iter()
            .filter(|p| p.kind == kind && p.iterate == iterate)
            .collect();

        if selected.iter().any(|p| p.is_wildcard()) {
            let resource_types: IndexSet<&str> = resources
                .iter()
                .filter_map(|r| r.get("resourceType").and_then(Value::as_str))
                .collect();
            return resource_types
                .into_iter()
                .flat_map(|rt| match kind {
                    InclusionKind::Include => self.registry.include_parameters(rt),
                    InclusionKind::RevInclude => self.registry.revinclude_parameters(rt),
                })
                .flat_map(|def| {
                    let path = def.compiled.first().map(|c| c.path.clone());
                    def.targets().iter().filter_map(move |target| {
                        Some(InclusionReference {
                            source_resource: def.base.clone(),
                            search_parameter: def.name.clone(),
                            path: path.clone()?,
                            target_resource: Some(target.clone()),
                        })
                    })
                })
                .collect();
        }

        selected
            .into_iter()
            .filter_map(|p| match &p.target {
                InclusionTarget::Reference(r) => Some(r.clone()),
                InclusionTarget::Wildcard => None,
            })
            .collect()
    }

    /// Queries fetching resources referenced by `resources`.
    pub fn build_include_queries(
        &self,
        inclusions: &[InclusionParameter],
        resources: &[Value],
        iterate: bool,
    ) -> Vec<BackendQuery> {
        let references = self.effective_references(inclusions, InclusionKind::Include, iterate, resources);

        let mut ids_by_type: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for include in &references {
            let found = resources
                .iter()
                .filter(|r| resource_type_of(r) == Some(include.source_resource.as_str()))
                .flat_map(|r| {
                    let path = format!("{}.reference", include.path);
                    strings_at_path(r, &path).map(str::to_string).collect::<Vec<_>>()
                })
                .filter(|reference| RELATIVE_URL_REGEX.is_match(reference));

            for reference in found {
                let Some((resource_type, id)) = reference.split_once('/') else {
                    continue;
                };
                if include
                    .target_resource
                    .as_deref()
                    .is_some_and(|t| t != resource_type)
                {
                    continue;
                }
                ids_by_type
                    .entry(resource_type.to_string())
                    .or_default()
                    .insert(id.to_string());
            }
        }

        ids_by_type
            .into_iter()
            .map(|(resource_type, ids)| {
                let ids: Vec<String> = ids.into_iter().collect();
                self.inclusion_query(resource_type, json!({"terms": {"id": ids}}))
            })
            .collect()
    }

    /// Queries fetching resources that reference `resources`.
    pub fn build_revinclude_queries(
        &self,
        inclusions: &[InclusionParameter],
        resources: &[Value],
        iterate: bool,
    ) -> Vec<BackendQuery> {
        let suffix = keyword_suffix(self.use_keyword_subfields);
        self.effective_references(inclusions, InclusionKind::RevInclude, iterate, resources)
            .into_iter()
            .filter_map(|revinclude| {
                let references: Vec<String> = resources
                    .iter()
                    .filter(|r| {
                        revinclude
                            .target_resource
                            .as_deref()
                            .is_none_or(|t| resource_type_of(r) == Some(t))
                    })
                    .filter_map(|r| {
                        let id = r.get("id").and_then(Value::as_str)?;
                        Some(format!("{}/{}", resource_type_of(r)?, id))
                    })
                    .collect();
                if references.is_empty() {
                    return None;
                }
                let field = format!("{}.reference{suffix}", revinclude.path);
                Some(self.inclusion_query(
                    revinclude.source_resource,
                    json!({"terms": {field: references}}),
                ))
            })
            .collect()
    }

    fn inclusion_query(&self, resource_type: String, terms: Value) -> BackendQuery {
        let mut filter = vec![terms];
        filter.extend(self.filters.iter().cloned());
        BackendQuery::new(
            resource_type,
            self.max_results,
            json!({"query": {"bool": {"filter": filter}}}),
        )
    }

    /// Include and revinclude queries for one round, restricted to allowed types.
    pub fn build_queries(
        &self,
        inclusions: &[InclusionParameter],
        resources: &[Value],
        iterate: bool,
    ) -> Vec<BackendQuery> {
        let mut queries = self.build_include_queries(inclusions, resources, iterate);
        queries.extend(self.build_revinclude_queries(inclusions, resources, iterate));
        queries.retain(|q| self.is_allowed(&q.resource_type));
        queries
    }

    /// Fetch the resources requested by the non-iterative inclusion parameters.
    pub async fn resolve<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        inclusions: &[InclusionParameter],
        resources: &[Value],
    ) -> Result<Vec<Value>> {
        execute_all(backend, self.build_queries(inclusions, resources, false)).await
    }

    /// Repeat `:iterate` inclusions on newly found resources.
    ///
    /// Stops after `max_depth` rounds or when a round finds nothing. A
    /// resource already present in `resources` or found earlier is never
    /// returned twice.
    pub async fn resolve_iterative<B: SearchBackend + ?Sized>(
        &self,
        backend: &B,
        inclusions: &[InclusionParameter],
        resources: &[Value],
        max_depth: usize,
    ) -> Result<Vec<Value>> {
        if !inclusions.iter().any(|p| p.iterate) {
            return Ok(Vec::new());
        }
        tracing::info!("iterative inclusion search starts");

        let mut in_result: HashSet<String> = resources.iter().filter_map(resource_key).collect();
        let mut resolved: HashSet<String> = HashSet::new();
        let mut found_total = Vec::new();
        let mut to_iterate = resources.to_vec();

        for iteration in 0..max_depth {
            let queries = self.build_queries(inclusions, &to_iterate, true);
            let found = execute_all(backend, queries).await?;
            resolved.extend(to_iterate.iter().filter_map(resource_key));

            if found.is_empty() {
                tracing::info!(iteration, "iteration found zero results, stopping");
                break;
            }
            tracing::info!(iteration, found = found.len(), "iterative inclusion round");

            for resource in &found {
                if let Some(key) = resource_key(resource)
                    && in_result.insert(key)
                {
                    found_total.push(resource.clone());
                }
            }

            if iteration + 1 == max_depth {
                tracing::info!(max_depth, "maximum iterative inclusion depth reached, stopping");
                break;
            }
            to_iterate = found
                .into_iter()
                .filter(|r| resource_key(r).is_some_and(|k| !resolved.contains(&k)))
                .collect();
        }
        Ok(found_total)
    }
}

fn resource_type_of(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

fn resource_key(resource: &Value) -> Option<String> {
    let id = resource.get("id").and_then(Value::as_str)?;
    Some(format!("{}/{}", resource_type_of(resource)?, id))
}

async fn execute_all<B: SearchBackend + ?Sized>(
    backend: &B,
    queries: Vec<BackendQuery>,
) -> Result<Vec<Value>> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }
    let responses = try_join_all(queries.into_iter().map(|q| backend.execute(q))).await?;
    Ok(responses.into_iter().flat_map(|r| r.hits).collect())
}
