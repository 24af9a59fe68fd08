use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use octofhir_search_es::registry::loader::parse_definitions;
use octofhir_search_es::{
    BackendQuery, QueryBuilder, QueryParams, SearchBackend, SearchHits, SearchParameterRegistry,
    SearchService, SearchSettings, StringModifier, TypeSearchRequest, matches, parse_query, parse_query_string,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const BASE_URL: &str = "https://fhir.acme.org";

fn registry() -> SearchParameterRegistry {
    let definitions =
        parse_definitions(include_str!("fixtures/compiled-search-parameters.json")).unwrap();
    SearchParameterRegistry::new(definitions)
}

fn params(pairs: &[(&str, &str)]) -> QueryParams {
    let mut params = QueryParams::new();
    for (k, v) in pairs {
        params.entry(k.to_string()).or_default().push(v.to_string());
    }
    params
}

#[test]
fn parse_build_and_match_patient() {
    let registry = registry();
    let parsed = parse_query(
        &registry,
        "Patient",
        &params(&[("name:exact", "John"), ("birthdate", "1999-09-09")]),
    )
    .unwrap();
    assert_eq!(parsed.search_params.len(), 2);
    assert_eq!(parsed.search_params[0].modifier, Some(StringModifier::Exact));

    let john = json!({
        "resourceType": "Patient",
        "name": [{"given": "John"}],
        "birthDate": "1999-09-09"
    });
    assert!(matches(&parsed, &john, Some(BASE_URL)));

    let mut born_later = john.clone();
    born_later["birthDate"] = json!("2000-01-01");
    assert!(!matches(&parsed, &born_later, Some(BASE_URL)));

    let query = QueryBuilder::new(&registry, BASE_URL)
        .build(&parsed, &[])
        .unwrap();
    assert_json_eq!(query["bool"]["filter"], json!([]));
    assert_json_eq!(
        query["bool"]["must"][0],
        json!({"multi_match": {
            "fields": ["name.keyword", "name.*.keyword"],
            "query": "John",
            "lenient": true
        }})
    );
    assert_json_eq!(
        query["bool"]["must"][1]["bool"]["should"][0],
        json!({"range": {"birthDate": {
            "gte": "1999-09-09T00:00:00.000Z",
            "lte": "1999-09-09T23:59:59.999Z"
        }}})
    );
}

#[test]
fn observation_criteria_against_documents() {
    let registry = registry();
    let parsed = parse_query_string(
        &registry,
        "Observation?code=http://loinc.org|1234-5&value-quantity=gt5||mg&patient=Patient/p1",
    )
    .unwrap();

    let observation = json!({
        "resourceType": "Observation",
        "code": {"coding": [{"system": "http://loinc.org", "code": "1234-5"}]},
        "valueQuantity": {"value": 7.5, "unit": "mg"},
        "subject": {"reference": "Patient/p1"}
    });
    assert!(matches(&parsed, &observation, Some(BASE_URL)));

    let mut low = observation.clone();
    low["valueQuantity"]["value"] = json!(4);
    assert!(!matches(&parsed, &low, Some(BASE_URL)));

    // `patient` only applies when the subject resolves to a Patient
    let mut group = observation.clone();
    group["subject"] = json!({"reference": "Group/p1"});
    assert!(!matches(&parsed, &group, Some(BASE_URL)));
}

#[test]
fn absolute_references_on_this_server() {
    let registry = registry();
    let parsed = parse_query_string(&registry, "Observation?subject=Patient/p1").unwrap();
    let observation = json!({
        "resourceType": "Observation",
        "subject": {"reference": "https://fhir.acme.org/Patient/p1"}
    });
    assert!(matches(&parsed, &observation, Some(BASE_URL)));
    assert!(!matches(&parsed, &observation, Some("https://other.org")));
    assert!(!matches(&parsed, &observation, None));
}

#[test]
fn period_dates_match_by_overlap() {
    let registry = registry();
    let observation = json!({
        "resourceType": "Observation",
        "effectivePeriod": {"start": "2020-01-01T10:00:00Z", "end": "2020-01-01T12:00:00Z"}
    });
    let contained = parse_query_string(&registry, "Observation?date=2020-01-01").unwrap();
    assert!(matches(&contained, &observation, None));
    let later = parse_query_string(&registry, "Observation?date=gt2020-01-02").unwrap();
    assert!(!matches(&later, &observation, None));
}

#[test]
fn invalid_parameters_are_client_errors() {
    let registry = registry();
    for criteria in [
        "Patient?unknown=1",
        "Patient?birthdate=1999-13-01",
        "Patient?name:text=John",
        "Patient?gender=a|b|c",
        "Patient?_include=Patient:gender",
    ] {
        let err = parse_query_string(&registry, criteria).unwrap_err();
        assert!(err.is_client_error(), "{criteria}: {err}");
    }
}

/// Answers requests per resource type and records them.
#[derive(Default)]
struct IndexBackend {
    documents: Vec<Value>,
    requests: Mutex<Vec<BackendQuery>>,
}

#[async_trait]
impl SearchBackend for IndexBackend {
    async fn execute(&self, query: BackendQuery) -> octofhir_search_es::Result<SearchHits> {
        let hits: Vec<Value> = self
            .documents
            .iter()
            .filter(|d| d["resourceType"] == query.resource_type.as_str())
            .cloned()
            .collect();
        self.requests.lock().unwrap().push(query);
        Ok(SearchHits {
            total: hits.len() as u64,
            hits,
        })
    }
}

#[tokio::test]
async fn chained_search_resolves_intermediate_ids() {
    let backend = Arc::new(IndexBackend {
        documents: vec![
            json!({"resourceType": "Organization", "id": "o1", "name": "HL7"}),
            json!({"resourceType": "PractitionerRole", "id": "r1",
                   "organization": {"reference": "Organization/o1"}}),
            json!({"resourceType": "Patient", "id": "p1",
                   "generalPractitioner": [{"reference": "PractitionerRole/r1"}]}),
        ],
        ..Default::default()
    });
    let settings = SearchSettings {
        base_url: BASE_URL.into(),
        ..Default::default()
    };
    let service = SearchService::new(Arc::new(registry()), backend.clone(), settings);

    let request = TypeSearchRequest::new(
        "Patient",
        params(&[("general-practitioner:PractitionerRole.organization.name", "HL7")]),
    );
    let result = service.type_search(&request).await.unwrap();
    assert_eq!(result.number_of_results, 1);
    assert_eq!(result.entries[0].full_url, "https://fhir.acme.org/Patient/p1");

    let requests = backend.requests.lock().unwrap();
    let types: Vec<_> = requests.iter().map(|r| r.resource_type.as_str()).collect();
    assert_eq!(types, vec!["Organization", "PractitionerRole", "Patient"]);
    assert_eq!(requests[0].body["_source"], false);
    assert_json_eq!(
        requests[2].body["query"]["bool"]["must"][0],
        json!({"bool": {"should": [{"terms": {
            "generalPractitioner.reference.keyword": [
                "PractitionerRole/r1",
                "https://fhir.acme.org/PractitionerRole/r1"
            ]
        }}]}})
    );
}

#[tokio::test]
async fn revinclude_returns_referencing_resources() {
    let backend = Arc::new(IndexBackend {
        documents: vec![
            json!({"resourceType": "Patient", "id": "p1"}),
            json!({"resourceType": "Observation", "id": "obs1",
                   "subject": {"reference": "Patient/p1"}}),
        ],
        ..Default::default()
    });
    let service = SearchService::new(Arc::new(registry()), backend.clone(), SearchSettings::default());

    let request = TypeSearchRequest::new("Patient", params(&[("_revinclude", "Observation:patient")]));
    let result = service.type_search(&request).await.unwrap();
    let modes: Vec<_> = result
        .entries
        .iter()
        .map(|e| serde_json::to_value(&e.search).unwrap()["mode"].clone())
        .collect();
    assert_eq!(modes, vec![json!("match"), json!("include")]);

    let requests = backend.requests.lock().unwrap();
    assert_json_eq!(
        requests[1].body["query"]["bool"]["filter"][0],
        json!({"terms": {"subject.reference.keyword": ["Patient/p1"]}})
    );
}
