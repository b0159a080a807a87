//! Operation invocation.
//!
//! Turns an operation identifier plus a loosely-typed argument object into one HTTP exchange:
//! parameters are coerced and routed by location, the request body is serialized for the
//! negotiated content type, and the response is normalized into an [`InvocationResult`].

use crate::catalog::{
    OperationCatalog, OperationContract, OperationParameter, ParamLocation, RequestBodyContract,
    media_essence,
};
use crate::coerce::{Coercion, coerce_value, value_to_string};
use crate::config::ApiServerConfig;
use crate::error::{OpenApiOpsError, Result};
use crate::multipart::build_form;
use crate::tools::BODY_ARGUMENT;
use base64::Engine as _;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

/// Normalized outcome of a successful (2xx/3xx) exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status: u16,
    pub status_text: String,
    /// Lower-cased header names; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub data: Value,
    pub url: String,
    pub method: String,
}

struct RequestParts {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

/// Executes catalog operations against one base URL.
///
/// Holds only read-only state; concurrent calls share the client's connection pool.
#[derive(Debug, Clone)]
pub struct OperationInvoker {
    catalog: Arc<OperationCatalog>,
    client: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl OperationInvoker {
    /// Create an invoker with a client configured from `config` (timeout, default headers).
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiOpsError::Config`] if the client cannot be built or a configured
    /// header is not a valid HTTP header.
    pub fn new(
        catalog: Arc<OperationCatalog>,
        base_url: impl Into<String>,
        config: &ApiServerConfig,
    ) -> Result<Self> {
        Self::with_client(catalog, http_client(config)?, base_url, &config.headers)
    }

    /// Create an invoker around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiOpsError::Config`] if a header is not a valid HTTP header.
    pub fn with_client(
        catalog: Arc<OperationCatalog>,
        client: Client,
        base_url: impl Into<String>,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                OpenApiOpsError::Config(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                OpenApiOpsError::Config(format!("invalid value for header '{name}': {e}"))
            })?;
            default_headers.insert(header_name, header_value);
        }

        Ok(Self {
            catalog,
            client,
            base_url: base_url.into(),
            default_headers,
        })
    }

    #[must_use]
    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invoke one operation and normalize the response.
    ///
    /// # Errors
    ///
    /// Fails with [`OpenApiOpsError::OperationNotFound`],
    /// [`OpenApiOpsError::MissingRequiredParameters`],
    /// [`OpenApiOpsError::InvalidParameterType`], a file error from multipart assembly, or
    /// [`OpenApiOpsError::RequestFailed`] for non-2xx/3xx responses and transport failures.
    pub async fn invoke(&self, operation_id: &str, args: &Value) -> Result<InvocationResult> {
        let request = self.build_request(operation_id, args).await?;
        let method = request.method().to_string();
        let url = request.url().clone();

        tracing::debug!(
            operation_id,
            method = %method,
            url = %redact_url(&url),
            "invoking operation"
        );

        let response = self.client.execute(request).await.map_err(|e| {
            tracing::warn!(
                operation_id,
                "request could not be completed: {}",
                sanitize_reqwest_error(&e)
            );
            OpenApiOpsError::RequestFailed {
                method: method.clone(),
                url: redact_url(&url),
                status: None,
                status_text: None,
                body: None,
                message: sanitize_reqwest_error(&e),
            }
        })?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let headers = collect_headers(response.headers());
        let content_type = headers.get("content-type").cloned();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiOpsError::RequestFailed {
                method: method.clone(),
                url: redact_url(&url),
                status: Some(status.as_u16()),
                status_text: Some(status_text.clone()),
                body: None,
                message: format!("failed to read response body: {}", sanitize_reqwest_error(&e)),
            })?;
        let data = decode_body(&bytes, content_type.as_deref());

        tracing::debug!(operation_id, status = status.as_u16(), "operation completed");

        if status.is_success() || status.is_redirection() {
            return Ok(InvocationResult {
                status: status.as_u16(),
                status_text,
                headers,
                data,
                url: url.to_string(),
                method,
            });
        }

        let message = format!(
            "API returned {} {status_text}: {}",
            status.as_u16(),
            render_body(&data)
        );
        Err(OpenApiOpsError::RequestFailed {
            method,
            url: redact_url(&url),
            status: Some(status.as_u16()),
            status_text: Some(status_text),
            body: Some(data),
            message,
        })
    }

    /// Build the outgoing request for an operation without sending it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::invoke`], minus the exchange itself.
    pub async fn build_request(&self, operation_id: &str, args: &Value) -> Result<Request> {
        let contract =
            self.catalog
                .lookup(operation_id)
                .ok_or_else(|| OpenApiOpsError::OperationNotFound {
                    operation_id: operation_id.to_string(),
                })?;

        let empty = Map::new();
        let args = args.as_object().unwrap_or(&empty);

        let parts = collect_parameters(contract, args)?;
        let url = build_url(&self.base_url, &parts.path, &parts.query)?;

        let mut headers = self.default_headers.clone();
        let mut explicit_content_type: Option<String> = None;
        for (name, value) in &parts.headers {
            let invalid = |expected: &str| OpenApiOpsError::InvalidParameterType {
                operation_id: contract.operation_id.clone(),
                name: name.clone(),
                location: ParamLocation::Header.to_string(),
                expected: expected.to_string(),
                value: value.clone(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid("a valid HTTP header name"))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| invalid("a valid HTTP header value"))?;
            if header_name == CONTENT_TYPE {
                explicit_content_type = Some(value.clone());
            }
            headers.insert(header_name, header_value);
        }

        let mut builder = self.client.request(contract.method.clone(), url);

        match (&contract.request_body, args.get(BODY_ARGUMENT)) {
            (Some(body_contract), Some(body)) if !body.is_null() => {
                let content_type = explicit_content_type
                    .unwrap_or_else(|| body_contract.content_type.clone());
                builder = self
                    .apply_body(
                        builder,
                        contract,
                        body_contract,
                        body,
                        &content_type,
                        &mut headers,
                    )
                    .await?;
            }
            _ => builder = builder.headers(headers),
        }

        builder.build().map_err(|e| {
            OpenApiOpsError::OpenApi(format!(
                "failed to build request: {}",
                sanitize_reqwest_error(&e)
            ))
        })
    }

    async fn apply_body(
        &self,
        builder: reqwest::RequestBuilder,
        contract: &OperationContract,
        body_contract: &RequestBodyContract,
        body: &Value,
        content_type: &str,
        headers: &mut HeaderMap,
    ) -> Result<reqwest::RequestBuilder> {
        let essence = media_essence(content_type);

        if essence == "multipart/form-data" {
            // The form supplies its own Content-Type with the boundary.
            headers.remove(CONTENT_TYPE);
            let fields = match parse_if_json_text(body) {
                Value::Object(fields) => fields,
                other => {
                    return Err(OpenApiOpsError::InvalidParameterType {
                        operation_id: contract.operation_id.clone(),
                        name: BODY_ARGUMENT.to_string(),
                        location: BODY_ARGUMENT.to_string(),
                        expected: "an object of form fields".to_string(),
                        value: other.to_string(),
                    });
                }
            };
            let form = build_form(&fields, &body_contract.schema).await?;
            return Ok(builder.headers(std::mem::take(headers)).multipart(form));
        }

        let payload: Vec<u8> = if essence == "application/json" || essence.ends_with("+json") {
            serde_json::to_vec(&parse_if_json_text(body))?
        } else if essence == "application/x-www-form-urlencoded" {
            match body {
                Value::Object(fields) => {
                    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                    for (key, value) in fields {
                        if !value.is_null() {
                            serializer.append_pair(key, &value_to_string(value));
                        }
                    }
                    serializer.finish().into_bytes()
                }
                other => value_to_string(other).into_bytes(),
            }
        } else {
            value_to_string(body).into_bytes()
        };

        let header_value = HeaderValue::from_str(content_type).map_err(|e| {
            OpenApiOpsError::OpenApi(format!("invalid content type '{content_type}': {e}"))
        })?;
        headers.insert(CONTENT_TYPE, header_value);

        Ok(builder.headers(std::mem::take(headers)).body(payload))
    }
}

/// A client honoring the configured per-request timeout.
pub(crate) fn http_client(config: &ApiServerConfig) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| OpenApiOpsError::Config(format!("failed to build HTTP client: {e}")))
}

/// Coerce and route every declared parameter.
///
/// All missing required parameters are reported together before any coercion failure.
fn collect_parameters(
    contract: &OperationContract,
    args: &Map<String, Value>,
) -> Result<RequestParts> {
    let mut missing: Vec<String> = Vec::new();
    let mut outcomes: Vec<(&OperationParameter, &Value, Coercion)> = Vec::new();

    for param in &contract.parameters {
        match args.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    missing.push(format!("{} ({})", param.name, param.location));
                }
            }
            Some(raw) => outcomes.push((param, raw, coerce_value(&param.schema, raw))),
        }
    }

    if !missing.is_empty() {
        return Err(OpenApiOpsError::MissingRequiredParameters {
            operation_id: contract.operation_id.clone(),
            missing,
        });
    }

    let mut parts = RequestParts {
        path: contract.path.clone(),
        query: Vec::new(),
        headers: Vec::new(),
    };

    for (param, raw, outcome) in outcomes {
        let value = match outcome {
            Coercion::Coerced(value) => value,
            Coercion::Invalid { expected } => {
                return Err(OpenApiOpsError::InvalidParameterType {
                    operation_id: contract.operation_id.clone(),
                    name: param.name.clone(),
                    location: param.location.to_string(),
                    expected: expected.to_string(),
                    value: raw.to_string(),
                });
            }
        };

        match param.location {
            ParamLocation::Path => {
                let encoded = encode_component(&joined_string(&value));
                parts.path = parts.path.replace(&format!("{{{}}}", param.name), &encoded);
            }
            ParamLocation::Query => match value {
                Value::Array(items) => parts.query.extend(
                    items
                        .iter()
                        .map(|item| (param.name.clone(), value_to_string(item))),
                ),
                other => parts.query.push((param.name.clone(), value_to_string(&other))),
            },
            ParamLocation::Header => {
                parts.headers.push((param.name.clone(), joined_string(&value)));
            }
        }
    }

    if !parts.path.starts_with('/') {
        parts.path = format!("/{}", parts.path);
    }

    Ok(parts)
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw)
        .map_err(|e| OpenApiOpsError::OpenApi(format!("Invalid request URL '{raw}': {e}")))?;

    if !query.is_empty() {
        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&encoded));
    }

    Ok(url)
}

/// Arrays become comma-joined (simple style); everything else uses [`value_to_string`].
fn joined_string(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
        other => value_to_string(other),
    }
}

fn parse_if_json_text(body: &Value) -> Value {
    match body {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| body.clone()),
        other => other.clone(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

/// JSON when the body parses as JSON, else UTF-8 text, else a base64 envelope.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        Err(_) => json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
    }
}

fn render_body(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Drop credentials, query and fragment so logged URLs cannot leak secrets.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
