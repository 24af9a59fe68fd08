//! FHIR search on an Elasticsearch-style index.
//!
//! Parses FHIR search parameters against a registry of compiled search
//! parameter definitions, compiles them into an Elasticsearch query body and
//! evaluates them in memory against single resources.

pub mod backend;
pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod inclusion;
pub mod matcher;
pub mod observability;
pub mod parameters;
pub mod path;
pub mod query;
pub mod range;
pub mod refresh_cache;
pub mod registry;
pub mod search;
pub mod subscription;
pub mod values;

pub use backend::{BackendQuery, SearchBackend, SearchHits};
pub use builder::QueryBuilder;
pub use chain::{ChainQuery, ChainResolver, ChainStep, parse_chained_parameters};
pub use config::SearchSettings;
pub use error::{Result, SearchError};
pub use inclusion::{InclusionContext, InclusionKind, InclusionParameter, InclusionTarget};
pub use matcher::matches;
pub use parameters::{
    CompiledCondition, Condition, ConditionOperator, SearchParamDefinition, SearchParameterType,
    SearchPrefix,
};
pub use query::{
    ParsedQuery, ParsedQueryParam, QueryParams, StringModifier, parse_query, parse_query_string,
};
pub use refresh_cache::AsyncRefreshCache;
pub use registry::SearchParameterRegistry;
pub use search::{SearchResult, SearchService, TypeSearchRequest};
pub use subscription::{StreamSubscriptionMatcher, Subscription, SubscriptionNotification};
pub use values::TypedValue;
