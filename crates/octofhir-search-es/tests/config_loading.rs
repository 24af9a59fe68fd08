use octofhir_search_es::SearchSettings;
use octofhir_search_es::config::loader::load_settings;
use octofhir_search_es::registry::loader::load_registry;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// One test touches the process environment, so file and env layering are
// checked sequentially here.
#[test]
fn file_then_environment_overrides() {
    let file = write_config(
        r#"
        base_url = "https://fhir.acme.org"
        use_keyword_subfields = false

        [limits]
        max_chained_params_result = 50

        [logging]
        level = "debug"
        "#,
    );
    let path = file.path().to_str().unwrap();

    let settings = load_settings(Some(path)).unwrap();
    assert_eq!(settings.base_url, "https://fhir.acme.org");
    assert!(!settings.use_keyword_subfields);
    assert_eq!(settings.limits.max_chained_params_result, 50);
    assert_eq!(settings.limits.max_window_size, 10_000);
    assert_eq!(settings.logging.level, "debug");

    unsafe { std::env::set_var("OCTOFHIR_SEARCH__LIMITS__MAX_WINDOW_SIZE", "5000") };
    let overridden = load_settings(Some(path));
    unsafe { std::env::remove_var("OCTOFHIR_SEARCH__LIMITS__MAX_WINDOW_SIZE") };
    assert_eq!(overridden.unwrap().limits.max_window_size, 5000);
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let settings = load_settings(path.to_str()).unwrap();
    assert_eq!(settings.limits.default_count, SearchSettings::default().limits.default_count);
}

#[test]
fn invalid_settings_are_rejected() {
    let file = write_config("fhir_version = \"1.0.2\"\n");
    let err = load_settings(file.path().to_str()).unwrap_err();
    assert!(err.contains("fhir_version"), "{err}");
}

#[tokio::test]
async fn registry_from_configured_files() {
    let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/compiled-search-parameters.json");
    let file = write_config(&format!("[registry]\nbase_path = \"{fixture}\"\n"));

    let settings = load_settings(file.path().to_str()).unwrap();
    let registry = load_registry(&settings.registry).await.unwrap();
    assert!(registry.lookup("Patient", "birthdate").is_some());
    assert!(registry.lookup("Observation", "_lastUpdated").is_some());
    assert_eq!(
        registry.capabilities()["Patient"].search_include,
        vec!["*", "Patient:general-practitioner", "Patient:organization"]
    );
}
