//! Type-level search orchestration.
//!
//! [`SearchService::type_search`] drives a complete `GET [base]/[type]?...`
//! search: pagination checks, chain resolution, query building, sorting,
//! execution, paging links and `_include`/`_revinclude` resolution.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

use crate::backend::{BackendQuery, SearchBackend};
use crate::builder::QueryBuilder;
use crate::chain::{ChainResolver, parse_chained_parameters};
use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::inclusion::InclusionContext;
use crate::query::{
    COUNT_PARAMETER, PAGES_OFFSET_PARAMETER, QueryParams, SORT_PARAMETER, parse_query,
    parse_query_string,
};
use crate::registry::{ResourceSearchCapabilities, SearchParameterRegistry};

#[derive(Debug, Clone, Default)]
pub struct TypeSearchRequest {
    pub resource_type: String,
    pub query_params: QueryParams,
    /// Overrides the configured base URL for links and `fullUrl`s
    pub base_url: Option<String>,
    /// Extra backend filters, e.g. to hide deleted documents
    pub filters: Vec<Value>,
    /// Resource types the caller may read; `None` allows all
    pub allowed_resource_types: Option<Vec<String>>,
}

impl TypeSearchRequest {
    pub fn new(resource_type: impl Into<String>, query_params: QueryParams) -> Self {
        Self {
            resource_type: resource_type.into(),
            query_params,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Value>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn with_allowed_resource_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_resource_types = Some(types.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    Match,
    Include,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchEntryMeta {
    pub mode: SearchEntryMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    pub search: SearchEntryMeta,
    pub full_url: String,
    pub resource: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub number_of_results: u64,
    pub entries: Vec<SearchEntry>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_result_url: Option<String>,
}

/// Search over one backend with a fixed registry and settings.
pub struct SearchService<B: ?Sized> {
    registry: Arc<SearchParameterRegistry>,
    backend: Arc<B>,
    settings: SearchSettings,
}

impl<B: SearchBackend + ?Sized> SearchService<B> {
    pub fn new(
        registry: Arc<SearchParameterRegistry>,
        backend: Arc<B>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            registry,
            backend,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SearchParameterRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Search related CapabilityStatement fields for every resource type.
    pub fn capabilities(&self) -> &IndexMap<String, ResourceSearchCapabilities> {
        self.registry.capabilities()
    }

    pub async fn type_search(&self, request: &TypeSearchRequest) -> Result<SearchResult> {
        let result = self.run_type_search(request).await;
        match &result {
            Err(e) if e.is_client_error() => {
                tracing::debug!(resource_type = %request.resource_type, error = %e, "invalid search");
            }
            Err(e) => {
                tracing::error!(resource_type = %request.resource_type, error = %e, "search failed");
            }
            Ok(_) => {}
        }
        result
    }

    async fn run_type_search(&self, request: &TypeSearchRequest) -> Result<SearchResult> {
        let limits = &self.settings.limits;
        let resource_type = request.resource_type.as_str();
        let params = &request.query_params;
        let base_url = request
            .base_url
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .unwrap_or_else(|| self.settings.base_url());

        let from = pagination_value(params, PAGES_OFFSET_PARAMETER)?.unwrap_or(0);
        let size = pagination_value(params, COUNT_PARAMETER)?.unwrap_or(limits.default_count);
        let Some(to) = from
            .checked_add(size)
            .filter(|to| *to <= limits.max_window_size)
        else {
            tracing::info!(
                from,
                size,
                max = limits.max_window_size,
                "search request is out of bound"
            );
            return Err(SearchError::invalid(format!(
                "Search parameters: {PAGES_OFFSET_PARAMETER} and {COUNT_PARAMETER} are accessing items outside the max range ({}). Please narrow your search to access the remaining items",
                limits.max_window_size
            )));
        };

        let builder = QueryBuilder::new(&self.registry, base_url)
            .with_keyword_subfields(self.settings.use_keyword_subfields);

        let chains = parse_chained_parameters(&self.registry, resource_type, params)?;
        let chained = if chains.is_empty() {
            None
        } else {
            let resolver =
                ChainResolver::new(&builder, &request.filters, limits.max_chained_params_result);
            match resolver.resolve(self.backend.as_ref(), chains).await? {
                Some(chained) => Some(chained),
                None => return Ok(SearchResult::default()),
            }
        };

        let parsed = parse_query(&self.registry, resource_type, params)?;
        let query = builder.build_with_chained(&parsed, &request.filters, chained.as_ref())?;

        let mut body = json!({ "query": query });
        if let Some(sort) = params.get(SORT_PARAMETER) {
            body["sort"] = Value::Array(builder.sort_clause(resource_type, sort)?);
        }

        let response = self
            .backend
            .execute(
                BackendQuery::new(resource_type, size, body)
                    .with_from(from)
                    .with_total_hits(),
            )
            .await?;

        let mut result = SearchResult {
            number_of_results: response.total,
            entries: to_entries(response.hits, base_url, SearchEntryMode::Match),
            ..Default::default()
        };
        if from != 0 {
            result.previous_result_url = Some(page_url(
                base_url,
                resource_type,
                params,
                from.saturating_sub(size),
                size,
            )?);
        }
        if (to as u64) < response.total {
            result.next_result_url = Some(page_url(base_url, resource_type, params, to, size)?);
        }

        if !parsed.inclusion_params.is_empty() {
            let context = InclusionContext {
                registry: &self.registry,
                filters: &request.filters,
                max_results: limits.max_inclusion_param_results,
                use_keyword_subfields: self.settings.use_keyword_subfields,
                allowed_resource_types: request.allowed_resource_types.as_deref(),
            };
            let matched: Vec<Value> = result.entries.iter().map(|e| e.resource.clone()).collect();
            let included = context
                .resolve(self.backend.as_ref(), &parsed.inclusion_params, &matched)
                .await?;

            let mut resolved = matched;
            resolved.extend(included.iter().cloned());
            let iterated = context
                .resolve_iterative(
                    self.backend.as_ref(),
                    &parsed.inclusion_params,
                    &resolved,
                    limits.max_include_iterative_depth,
                )
                .await?;

            result
                .entries
                .extend(to_entries(included, base_url, SearchEntryMode::Include));
            result
                .entries
                .extend(to_entries(iterated, base_url, SearchEntryMode::Include));
        }

        Ok(result)
    }

    /// Reject subscription criteria that cannot be evaluated in memory.
    pub fn validate_subscription_criteria(&self, criteria: &str) -> Result<()> {
        let parsed = parse_query_string(&self.registry, criteria)?;
        if parsed.has_uninterpreted_params() {
            return Err(SearchError::invalid(
                "Search string used for field criteria contains unsupported parameter, please remove: _revinclude, _include, _sort, _count and chained parameters",
            ));
        }
        Ok(())
    }
}

fn pagination_value(params: &QueryParams, name: &str) -> Result<Option<usize>> {
    let Some(raw) = params.get(name).and_then(|values| values.first()) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| SearchError::invalid(format!("Invalid {name} parameter: {raw}")))
}

fn to_entries(hits: Vec<Value>, base_url: &str, mode: SearchEntryMode) -> Vec<SearchEntry> {
    hits.into_iter()
        .map(|resource| {
            let resource_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let id = resource.get("id").and_then(Value::as_str).unwrap_or_default();
            SearchEntry {
                search: SearchEntryMeta { mode },
                full_url: format!("{base_url}/{resource_type}/{id}"),
                resource,
            }
        })
        .collect()
}

/// Link to another page of the same search.
fn page_url(
    base_url: &str,
    resource_type: &str,
    params: &QueryParams,
    from: usize,
    size: usize,
) -> Result<String> {
    let mut url = Url::parse(&format!("{base_url}/{resource_type}"))
        .map_err(|e| SearchError::config(format!("invalid base URL {base_url}: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, values) in params {
            if name == PAGES_OFFSET_PARAMETER || name == COUNT_PARAMETER {
                continue;
            }
            for value in values {
                pairs.append_pair(name, value);
            }
        }
        pairs.append_pair(PAGES_OFFSET_PARAMETER, &from.to_string());
        pairs.append_pair(COUNT_PARAMETER, &size.to_string());
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SearchHits;
    use crate::backend::tests::{MockBackend, hits};
    use crate::query::tests::create_test_registry;

    fn service(backend: MockBackend) -> (SearchService<MockBackend>, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let settings = SearchSettings {
            base_url: "https://fhir.acme.org".into(),
            ..Default::default()
        };
        (
            SearchService::new(Arc::new(create_test_registry()), backend.clone(), settings),
            backend,
        )
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        let mut params = QueryParams::new();
        for (k, v) in pairs {
            params.entry(k.to_string()).or_default().push(v.to_string());
        }
        params
    }

    fn patient(id: &str) -> Value {
        json!({"resourceType": "Patient", "id": id})
    }

    #[tokio::test]
    async fn test_window_limit() {
        let (service, backend) = service(MockBackend::default());
        let request = TypeSearchRequest::new(
            "Patient",
            params(&[("_getpagesoffset", "9990"), ("_count", "20")]),
        );
        let err = service.type_search(&request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Search parameters: _getpagesoffset and _count are accessing items outside the max range (10000). Please narrow your search to access the remaining items"
        );
        assert!(backend.recorded().is_empty());

        let request = TypeSearchRequest::new("Patient", params(&[("_count", "ten")]));
        assert!(service.type_search(&request).await.unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_window_limit_with_overflowing_offset() {
        let (service, backend) = service(MockBackend::default());
        let request = TypeSearchRequest::new(
            "Patient",
            params(&[("_getpagesoffset", "18446744073709551615"), ("_count", "20")]),
        );
        let err = service.type_search(&request).await.unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("outside the max range (10000)"));
        assert!(backend.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_paging_links_and_entries() {
        let (service, backend) = service(MockBackend::with_responses(vec![SearchHits {
            total: 25,
            hits: vec![patient("11"), patient("12")],
        }]));
        let request = TypeSearchRequest::new(
            "Patient",
            params(&[("gender", "female"), ("_getpagesoffset", "10"), ("_count", "10")]),
        );
        let result = service.type_search(&request).await.unwrap();

        assert_eq!(result.number_of_results, 25);
        assert_eq!(result.entries[0].full_url, "https://fhir.acme.org/Patient/11");
        assert_eq!(result.entries[0].search.mode, SearchEntryMode::Match);
        assert_eq!(
            result.previous_result_url.as_deref(),
            Some("https://fhir.acme.org/Patient?gender=female&_getpagesoffset=0&_count=10")
        );
        assert_eq!(
            result.next_result_url.as_deref(),
            Some("https://fhir.acme.org/Patient?gender=female&_getpagesoffset=20&_count=10")
        );

        let sent = &backend.recorded()[0];
        assert_eq!((sent.from, sent.size), (10, 10));
        assert!(sent.track_total_hits);
        assert!(sent.body.get("sort").is_none());
    }

    #[tokio::test]
    async fn test_last_page_has_no_next_link() {
        let (service, _) = service(MockBackend::with_responses(vec![hits(vec![patient("1")])]));
        let result = service
            .type_search(&TypeSearchRequest::new("Patient", QueryParams::new()))
            .await
            .unwrap();
        assert!(result.previous_result_url.is_none());
        assert!(result.next_result_url.is_none());
    }

    #[tokio::test]
    async fn test_sort_is_attached() {
        let (service, backend) = service(MockBackend::default());
        service
            .type_search(&TypeSearchRequest::new("Patient", params(&[("_sort", "-birthdate")])))
            .await
            .unwrap();
        let sent = &backend.recorded()[0];
        assert_eq!(sent.body["sort"][1]["birthDate.end"]["order"], "desc");
    }

    #[tokio::test]
    async fn test_chain_without_match_short_circuits() {
        let (service, backend) = service(MockBackend::default());
        let request = TypeSearchRequest::new("Patient", params(&[("organization.name", "HL7")]));
        let result = service.type_search(&request).await.unwrap();
        assert_eq!(result, SearchResult::default());
        // only the chain step ran
        assert_eq!(backend.recorded().len(), 1);
        assert_eq!(backend.recorded()[0].resource_type, "Organization");
    }

    #[tokio::test]
    async fn test_includes_are_appended() {
        let mut patient = patient("1");
        patient["managingOrganization"] = json!({"reference": "Organization/o1"});
        let (service, backend) = service(MockBackend::with_responses(vec![
            hits(vec![patient]),
            hits(vec![json!({"resourceType": "Organization", "id": "o1"})]),
        ]));
        let request =
            TypeSearchRequest::new("Patient", params(&[("_include", "Patient:organization")]))
                .with_base_url("https://tenant.acme.org/");
        let result = service.type_search(&request).await.unwrap();

        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[1].search.mode, SearchEntryMode::Include);
        assert_eq!(result.entries[1].full_url, "https://tenant.acme.org/Organization/o1");
        assert_eq!(backend.recorded()[1].resource_type, "Organization");
    }

    #[tokio::test]
    async fn test_disallowed_inclusions_are_skipped() {
        let mut patient = patient("1");
        patient["managingOrganization"] = json!({"reference": "Organization/o1"});
        let (service, backend) = service(MockBackend::with_responses(vec![hits(vec![patient])]));
        let request =
            TypeSearchRequest::new("Patient", params(&[("_include", "Patient:organization")]))
                .with_allowed_resource_types(["Patient"]);
        let result = service.type_search(&request).await.unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(backend.recorded().len(), 1);
    }

    #[test]
    fn test_validate_subscription_criteria() {
        let (service, _) = service(MockBackend::default());
        assert!(service.validate_subscription_criteria("Patient?gender=female").is_ok());
        for criteria in [
            "Patient?_include=Patient:organization",
            "Patient?organization.name=HL7",
            "Patient?_count=10",
        ] {
            assert_eq!(
                service.validate_subscription_criteria(criteria).unwrap_err().to_string(),
                "Search string used for field criteria contains unsupported parameter, please remove: _revinclude, _include, _sort, _count and chained parameters"
            );
        }
        assert!(service.validate_subscription_criteria("Patient?unknown=1").is_err());
        assert_eq!(
            service
                .validate_subscription_criteria("Patient?gender:text=male")
                .unwrap_err()
                .to_string(),
            "Unsupported token search modifier: text"
        );
    }

    #[test]
    fn test_capabilities_from_registry() {
        let (service, _) = service(MockBackend::default());
        assert!(service.capabilities().contains_key("Patient"));
    }
}
