//! `OpenAPI` document loading.
//!
//! Documents are kept as raw `serde_json::Value`s: the resolver walks JSON pointers and must
//! see non-standard markers (e.g. `format: binary` on an array schema) that a typed model drops.

use crate::config::{ApiServerConfig, HashPolicy};
use crate::error::{OpenApiOpsError, Result};
use openapiv3::OpenAPI;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

pub(crate) fn is_http_location(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Load, hash-check, parse and structurally validate the document named by `config.spec`.
///
/// # Errors
///
/// Returns an error if the document cannot be fetched/read, fails the hash check under
/// [`HashPolicy::Fail`], cannot be parsed, or lacks the required top-level fields.
pub async fn load_document(client: &Client, config: &ApiServerConfig) -> Result<Value> {
    let location = &config.spec;
    let content = if is_http_location(location) {
        tracing::info!("Fetching OpenAPI spec from {location}");
        let url = Url::parse(location).map_err(|e| {
            OpenApiOpsError::OpenApi(format!("Invalid OpenAPI spec URL '{location}': {e}"))
        })?;
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| OpenApiOpsError::SpecFetch {
                url: location.clone(),
                message: crate::invoker::sanitize_reqwest_error(&e),
            })?;
        if !resp.status().is_success() {
            return Err(OpenApiOpsError::SpecFetch {
                url: location.clone(),
                message: format!("server returned {}", resp.status()),
            });
        }
        resp.text().await.map_err(|e| OpenApiOpsError::SpecFetch {
            url: location.clone(),
            message: crate::invoker::sanitize_reqwest_error(&e),
        })?
    } else {
        tracing::info!("Loading OpenAPI spec from {location}");
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| OpenApiOpsError::SpecReadFile {
                path: location.clone(),
                source: e,
            })?
    };

    verify_hash(config, &content)?;
    parse_document(location, &content)
}

fn verify_hash(config: &ApiServerConfig, content: &str) -> Result<()> {
    let Some(expected_hash) = &config.spec_hash else {
        return Ok(());
    };
    let actual_hash = format!("sha256:{}", hex::encode(Sha256::digest(content)));
    if actual_hash == *expected_hash {
        return Ok(());
    }
    match config.spec_hash_policy {
        HashPolicy::Fail => Err(OpenApiOpsError::OpenApi(format!(
            "Spec hash mismatch. Expected: {expected_hash}, Got: {actual_hash}",
        ))),
        HashPolicy::Warn => {
            tracing::warn!(
                "Spec hash mismatch for '{}'. Expected: {}, Got: {}",
                config.spec,
                expected_hash,
                actual_hash
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

/// Parse document text (YAML or JSON) and check the required top-level fields.
///
/// # Errors
///
/// Returns an error if the text does not parse or lacks `openapi`/`paths`.
pub fn parse_document(location: &str, content: &str) -> Result<Value> {
    // JSON is a valid subset of YAML, so serde_yaml alone is enough.
    let document: Value =
        serde_yaml::from_str(content).map_err(|e| OpenApiOpsError::SpecParse {
            location: location.to_string(),
            source: e,
        })?;
    validate_document(location, &document)?;
    Ok(document)
}

/// Structural validation of the fields the catalog relies on.
///
/// # Errors
///
/// Returns an error if `openapi` is not a string or `paths` is not an object.
pub fn validate_document(location: &str, document: &Value) -> Result<()> {
    if !document.get("openapi").is_some_and(Value::is_string) {
        return Err(OpenApiOpsError::OpenApi(format!(
            "Document '{location}' is missing the 'openapi' version field"
        )));
    }
    if !document.get("paths").is_some_and(Value::is_object) {
        return Err(OpenApiOpsError::OpenApi(format!(
            "Document '{location}' is missing the 'paths' object"
        )));
    }

    // The engine works on the raw value; the typed model is only a conformance check.
    if let Err(e) = serde_json::from_value::<OpenAPI>(document.clone()) {
        tracing::warn!(
            "OpenAPI document '{}' does not fully conform to the 3.0 model: {}",
            location,
            e
        );
    }
    Ok(())
}

/// The `info.title` of a document, if present.
#[must_use]
pub fn document_title(document: &Value) -> Option<String> {
    document
        .pointer("/info/title")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// The first declared server URL with its `{variable}` placeholders set to their defaults.
#[must_use]
pub fn first_server_url(document: &Value) -> Option<String> {
    let server = document.get("servers")?.as_array()?.first()?;
    let mut url = server.get("url")?.as_str()?.to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }
    Some(url)
}

/// Pick the base URL: explicit config wins over the document's first server.
///
/// Relative server URLs are resolved against the spec URL when the spec was fetched over HTTP.
///
/// # Errors
///
/// Returns [`OpenApiOpsError::NoBaseUrl`] when neither source is available, or an `OpenApi`
/// error for an unusable relative server URL.
pub fn resolve_base_url(config: &ApiServerConfig, document: &Value) -> Result<String> {
    let base_url = config
        .base_url
        .clone()
        .or_else(|| first_server_url(document))
        .ok_or(OpenApiOpsError::NoBaseUrl)?;

    if is_http_location(&base_url) {
        return Ok(base_url);
    }

    if is_http_location(&config.spec) {
        let mut spec_url = Url::parse(&config.spec).map_err(|e| {
            OpenApiOpsError::OpenApi(format!("Invalid OpenAPI spec URL '{}': {e}", config.spec))
        })?;
        spec_url.set_fragment(None);
        let resolved = spec_url.join(&base_url).map_err(|e| {
            OpenApiOpsError::OpenApi(format!(
                "Invalid baseUrl '{base_url}': {e} (set baseUrl explicitly)",
            ))
        })?;
        return Ok(resolved.to_string());
    }

    Err(OpenApiOpsError::OpenApi(format!(
        "Invalid baseUrl '{base_url}': must be an absolute http(s) URL (set baseUrl explicitly)",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
openapi: "3.0.0"
info:
  title: Minimal
  version: "1"
paths: {}
"#;

    #[test]
    fn parse_document_accepts_yaml_and_json() {
        let doc = parse_document("inline", MINIMAL).expect("yaml parses");
        assert_eq!(document_title(&doc).as_deref(), Some("Minimal"));

        let json_doc = r#"{"openapi":"3.0.3","info":{"title":"J","version":"1"},"paths":{}}"#;
        let doc = parse_document("inline", json_doc).expect("json parses");
        assert_eq!(document_title(&doc).as_deref(), Some("J"));
    }

    #[test]
    fn parse_document_requires_paths() {
        let err = parse_document("inline", "openapi: '3.0.0'\ninfo: {title: t, version: '1'}\n")
            .unwrap_err();
        assert!(err.to_string().contains("'paths'"));
    }

    #[test]
    fn first_server_url_substitutes_variable_defaults() {
        let doc = json!({
            "servers": [{
                "url": "https://{region}.api.example.com/v1",
                "variables": {"region": {"default": "eu"}}
            }]
        });
        assert_eq!(
            first_server_url(&doc).as_deref(),
            Some("https://eu.api.example.com/v1")
        );
    }

    #[test]
    fn resolve_base_url_prefers_explicit_config() {
        let doc = json!({"servers": [{"url": "https://from-doc.example.com"}]});
        let cfg = ApiServerConfig::new("inline").with_base_url("https://explicit.example.com");
        assert_eq!(
            resolve_base_url(&cfg, &doc).unwrap(),
            "https://explicit.example.com"
        );

        let cfg = ApiServerConfig::new("inline");
        assert_eq!(
            resolve_base_url(&cfg, &doc).unwrap(),
            "https://from-doc.example.com"
        );
    }

    #[test]
    fn resolve_base_url_fails_without_any_source() {
        let cfg = ApiServerConfig::new("inline");
        let err = resolve_base_url(&cfg, &json!({"paths": {}})).unwrap_err();
        assert!(matches!(err, OpenApiOpsError::NoBaseUrl));
    }

    #[test]
    fn resolve_base_url_relative_to_spec_url() {
        let cfg = ApiServerConfig::new("https://petstore3.swagger.io/api/v3/openapi.json");
        let doc = json!({"servers": [{"url": "/api/v3"}]});
        assert_eq!(
            resolve_base_url(&cfg, &doc).unwrap(),
            "https://petstore3.swagger.io/api/v3"
        );

        let cfg = ApiServerConfig::new("./local.yaml");
        assert!(resolve_base_url(&cfg, &doc).is_err());
    }

    #[tokio::test]
    async fn load_document_enforces_hash_policy() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("spec.yaml");
        std::fs::write(&path, MINIMAL).expect("write spec");

        let mut cfg = ApiServerConfig::new(path.display().to_string());
        cfg.spec_hash = Some("sha256:deadbeef".to_string());
        cfg.spec_hash_policy = HashPolicy::Fail;

        let client = Client::new();
        let err = load_document(&client, &cfg).await.unwrap_err();
        assert!(err.to_string().contains("Spec hash mismatch"));

        cfg.spec_hash = Some(format!(
            "sha256:{}",
            hex::encode(Sha256::digest(MINIMAL.as_bytes()))
        ));
        let doc = load_document(&client, &cfg).await.expect("hash matches");
        assert_eq!(document_title(&doc).as_deref(), Some("Minimal"));
    }
}
