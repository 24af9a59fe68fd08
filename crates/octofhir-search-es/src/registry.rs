//! Search parameter registry for lookup by resource type and name.
//!
//! The registry is built in two phases: base definitions for one FHIR version
//! are folded into a map keyed by `(base, name)`, then implementation guide
//! definitions are folded on top, overwriting same-keyed entries. After
//! construction it is immutable and can be shared freely behind an `Arc`.
//!
//! Parameters whose base is `Resource` apply to every resource type unless a
//! more specific parameter with the same name exists.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::parameters::{SearchParamDefinition, SearchParameterType};

/// Base type of parameters shared by all resource types.
pub const RESOURCE_BASE: &str = "Resource";

/// One `searchParam` entry of a CapabilityStatement resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchParamCapability {
    pub name: String,
    pub definition: String,
    #[serde(rename = "type")]
    pub param_type: SearchParameterType,
    pub documentation: String,
}

impl From<&SearchParamDefinition> for SearchParamCapability {
    fn from(def: &SearchParamDefinition) -> Self {
        Self {
            name: def.name.clone(),
            definition: def.url.clone(),
            param_type: def.param_type,
            documentation: def.description.clone(),
        }
    }
}

/// Search related CapabilityStatement fields for one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSearchCapabilities {
    pub search_param: Vec<SearchParamCapability>,
    pub search_include: Vec<String>,
    pub search_rev_include: Vec<String>,
}

/// Registry of compiled search parameters for one FHIR version.
#[derive(Debug, Default)]
pub struct SearchParameterRegistry {
    /// base resource type -> name -> definition
    by_resource: IndexMap<String, IndexMap<String, Arc<SearchParamDefinition>>>,
    /// reference parameters by their base
    include: HashMap<String, Vec<Arc<SearchParamDefinition>>>,
    /// reference parameters by each of their targets
    revinclude: HashMap<String, Vec<Arc<SearchParamDefinition>>>,
    capabilities: IndexMap<String, ResourceSearchCapabilities>,
}

impl SearchParameterRegistry {
    /// Build a registry from base definitions only.
    pub fn new(base: Vec<SearchParamDefinition>) -> Self {
        Self::from_definitions(base, Vec::new())
    }

    /// Build a registry from base definitions plus implementation guide overrides.
    ///
    /// Implementation guide definitions are applied after the base ones, so a
    /// guide parameter with the same `(base, name)` replaces the base one.
    pub fn from_definitions(
        base: Vec<SearchParamDefinition>,
        implementation_guides: Vec<SearchParamDefinition>,
    ) -> Self {
        let mut by_resource = Self::fold(IndexMap::new(), base, false);
        by_resource = Self::fold(by_resource, implementation_guides, true);

        let mut include: HashMap<String, Vec<Arc<SearchParamDefinition>>> = HashMap::new();
        let mut revinclude: HashMap<String, Vec<Arc<SearchParamDefinition>>> = HashMap::new();
        for def in by_resource.values().flat_map(IndexMap::values) {
            if !def.is_reference() {
                continue;
            }
            include.entry(def.base.clone()).or_default().push(def.clone());
            for target in def.targets() {
                revinclude.entry(target.clone()).or_default().push(def.clone());
            }
        }

        let mut registry = Self {
            by_resource,
            include,
            revinclude,
            capabilities: IndexMap::new(),
        };
        registry.capabilities = registry.compute_capabilities();

        tracing::debug!(
            resource_types = registry.by_resource.len(),
            parameters = registry.len(),
            "search parameter registry built"
        );
        registry
    }

    fn fold(
        mut map: IndexMap<String, IndexMap<String, Arc<SearchParamDefinition>>>,
        definitions: Vec<SearchParamDefinition>,
        is_override: bool,
    ) -> IndexMap<String, IndexMap<String, Arc<SearchParamDefinition>>> {
        for def in definitions {
            let by_name = map.entry(def.base.clone()).or_default();
            let previous = by_name.insert(def.name.clone(), Arc::new(def));
            if is_override && let Some(previous) = previous {
                tracing::debug!(
                    base = %previous.base,
                    name = %previous.name,
                    "implementation guide overrides search parameter"
                );
            }
        }
        map
    }

    fn compute_capabilities(&self) -> IndexMap<String, ResourceSearchCapabilities> {
        let common: Vec<&Arc<SearchParamDefinition>> = self
            .by_resource
            .get(RESOURCE_BASE)
            .map(|m| m.values().collect())
            .unwrap_or_default();

        let format_inclusion =
            |defs: Option<&Vec<Arc<SearchParamDefinition>>>| -> Vec<String> {
                std::iter::once("*".to_string())
                    .chain(
                        defs.into_iter()
                            .flatten()
                            .map(|d| format!("{}:{}", d.base, d.name)),
                    )
                    .collect()
            };

        self.by_resource
            .iter()
            .filter(|(resource_type, _)| resource_type.as_str() != RESOURCE_BASE)
            .map(|(resource_type, own)| {
                let mut search_param: Vec<SearchParamCapability> =
                    own.values().map(|d| d.as_ref().into()).collect();
                search_param.extend(
                    common
                        .iter()
                        .filter(|d| !own.contains_key(&d.name))
                        .map(|d| d.as_ref().into()),
                );
                let caps = ResourceSearchCapabilities {
                    search_param,
                    search_include: format_inclusion(self.include.get(resource_type)),
                    search_rev_include: format_inclusion(self.revinclude.get(resource_type)),
                };
                (resource_type.clone(), caps)
            })
            .collect()
    }

    /// Get a search parameter for a resource type, falling back to `Resource` level parameters.
    pub fn lookup(&self, resource_type: &str, name: &str) -> Option<&Arc<SearchParamDefinition>> {
        self.by_resource
            .get(resource_type)
            .and_then(|m| m.get(name))
            .or_else(|| self.by_resource.get(RESOURCE_BASE).and_then(|m| m.get(name)))
    }

    /// Get a reference search parameter, optionally checking that it may point to `target`.
    pub fn lookup_reference(
        &self,
        resource_type: &str,
        name: &str,
        target: Option<&str>,
    ) -> Result<&Arc<SearchParamDefinition>> {
        let def = self.lookup(resource_type, name).ok_or_else(|| {
            SearchError::invalid(format!(
                "Search parameter {name} does not exist in resource {resource_type}"
            ))
        })?;
        if !def.is_reference() {
            return Err(SearchError::invalid(format!(
                "Search parameter {name} is not of type reference in resource {resource_type}"
            )));
        }
        if let Some(target) = target
            && !def.has_target(target)
        {
            return Err(SearchError::invalid(format!(
                "Search parameter {name} in resource {resource_type} does not point to target resource type {target}"
            )));
        }
        Ok(def)
    }

    /// Reference parameters that can be used in `_include` for the given source type.
    pub fn include_parameters(&self, resource_type: &str) -> &[Arc<SearchParamDefinition>] {
        self.include.get(resource_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reference parameters that can be used in `_revinclude` for the given target type.
    pub fn revinclude_parameters(&self, resource_type: &str) -> &[Arc<SearchParamDefinition>] {
        self.revinclude
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Search related CapabilityStatement fields for every resource type.
    pub fn capabilities(&self) -> &IndexMap<String, ResourceSearchCapabilities> {
        &self.capabilities
    }

    /// Total number of registered parameters.
    pub fn len(&self) -> usize {
        self.by_resource.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub mod loader {
    use std::path::Path;

    use super::SearchParameterRegistry;
    use crate::config::RegistrySettings;
    use crate::error::{Result, SearchError};
    use crate::parameters::SearchParamDefinition;

    /// Parse a compiled search parameter file: a JSON array of definitions.
    pub fn parse_definitions(json: &str) -> Result<Vec<SearchParamDefinition>> {
        Ok(serde_json::from_str(json)?)
    }

    async fn read_definitions(path: &Path) -> Result<Vec<SearchParamDefinition>> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SearchError::config(format!(
                "failed to read search parameters from {}: {e}",
                path.display()
            ))
        })?;
        let definitions = parse_definitions(&content)?;
        tracing::info!(
            path = %path.display(),
            count = definitions.len(),
            "loaded compiled search parameters"
        );
        Ok(definitions)
    }

    /// Load the base definitions, then apply implementation guide definitions over them.
    pub async fn load_registry(settings: &RegistrySettings) -> Result<SearchParameterRegistry> {
        let base = match &settings.base_path {
            Some(path) => read_definitions(path).await?,
            None => {
                tracing::warn!("no compiled search parameters configured, registry is empty");
                Vec::new()
            }
        };
        let implementation_guides = match &settings.implementation_guides_path {
            Some(path) => read_definitions(path).await?,
            None => Vec::new(),
        };
        Ok(SearchParameterRegistry::from_definitions(
            base,
            implementation_guides,
        ))
    }
}
