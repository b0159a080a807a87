//! Operation catalog.
//!
//! Walks every path/method of a document and builds one [`OperationContract`] per operation.
//! Contracts are created once per load and are read-only afterwards.

use crate::reference::ref_of;
use crate::schema::{ResolvedSchema, SchemaResolver};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Methods in the order they are emitted for each path.
const METHOD_ORDER: [&str; 7] = ["get", "post", "put", "patch", "delete", "options", "head"];

/// Request body media types in modeling priority; anything else sorts after, lexically.
const CONTENT_TYPE_PRIORITY: [&str; 6] = [
    "application/json",
    "application/xml",
    "text/xml",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

/// Parameter location. Cookie parameters are not supported and never reach a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl ParamLocation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        }
    }

    fn parse(location: &str) -> Option<Self> {
        match location {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            _ => None,
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: ResolvedSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyContract {
    pub required: bool,
    /// The primary content type; only its schema is modeled.
    pub content_type: String,
    /// Every declared content type, in priority order (primary first).
    pub content_types: Vec<String>,
    pub schema: ResolvedSchema,
}

/// The fully-resolved description of one API operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContract {
    pub operation_id: String,
    pub method: Method,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Declared 2xx response codes, in document order.
    pub success_codes: Vec<String>,
    pub parameters: Vec<OperationParameter>,
    pub request_body: Option<RequestBodyContract>,
}

#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<OperationContract>,
    index: HashMap<String, usize>,
}

impl OperationCatalog {
    /// Build contracts for every operation of a document.
    ///
    /// Paths are visited in document order and methods in a fixed order, so repeated loads of
    /// the same document produce the same list and identifiers.
    #[must_use]
    pub fn build(document: &Value) -> Self {
        let mut resolver = SchemaResolver::new(document);
        let mut catalog = Self::default();
        let mut origins: HashMap<String, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();

        let Some(paths) = document.get("paths").and_then(Value::as_object) else {
            return catalog;
        };
        let explicit = explicit_operation_ids(&mut resolver, paths);

        for (path, path_item) in paths {
            let Some(path_item) = resolver.references().follow(path_item) else {
                tracing::warn!("Skipping path '{path}': unresolvable path item reference");
                continue;
            };

            for method in METHOD_ORDER {
                let Some(operation) = path_item.get(method).filter(|op| op.is_object()) else {
                    continue;
                };

                let declared = operation.get("operationId").and_then(Value::as_str);
                let base_id =
                    declared.map_or_else(|| synthesize_operation_id(method, path), str::to_string);
                let origin = format!("{} {}", method.to_uppercase(), path);
                let operation_id = reserve_unique_operation_id(
                    &mut taken,
                    &explicit,
                    &base_id,
                    declared.is_some(),
                );
                if operation_id != base_id {
                    tracing::warn!(
                        "Operation id '{}' of {} collides with {}; registered as '{}'",
                        base_id,
                        origin,
                        origins
                            .get(&base_id)
                            .map_or("an explicit operationId", String::as_str),
                        operation_id
                    );
                }
                origins.insert(operation_id.clone(), origin);

                let contract = build_contract(
                    &mut resolver,
                    operation_id,
                    method,
                    path,
                    path_item,
                    operation,
                );
                catalog.push(contract);
            }
        }

        tracing::info!("Built {} operation contracts", catalog.operations.len());
        catalog
    }

    fn push(&mut self, contract: OperationContract) {
        self.index
            .insert(contract.operation_id.clone(), self.operations.len());
        self.operations.push(contract);
    }

    #[must_use]
    pub fn lookup(&self, operation_id: &str) -> Option<&OperationContract> {
        self.index
            .get(operation_id)
            .and_then(|i| self.operations.get(*i))
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationContract] {
        &self.operations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn build_contract<'a>(
    resolver: &mut SchemaResolver<'a>,
    operation_id: String,
    method: &str,
    path: &str,
    path_item: &'a Value,
    operation: &'a Value,
) -> OperationContract {
    let parameters = merge_parameters(
        resolver,
        path_item.get("parameters"),
        operation.get("parameters"),
    )
    .into_iter()
    .filter_map(|raw| extract_parameter(resolver, raw))
    .collect();

    let request_body = operation
        .get("requestBody")
        .and_then(|body| resolver.references().follow(body))
        .and_then(|body| extract_request_body(resolver, body));

    let success_codes = operation
        .get("responses")
        .and_then(Value::as_object)
        .map(|responses| {
            responses
                .keys()
                .filter(|code| code.starts_with('2'))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    OperationContract {
        operation_id,
        method: resolve_http_method(method),
        path: path.to_string(),
        summary: text_field(operation, "summary"),
        description: text_field(operation, "description"),
        tags: operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        success_codes,
        parameters,
        request_body,
    }
}

/// Path-level parameters followed by operation-level ones; an operation-level parameter with
/// the same name and location takes the path-level one's place.
fn merge_parameters<'a>(
    resolver: &mut SchemaResolver<'a>,
    path_params: Option<&'a Value>,
    operation_params: Option<&'a Value>,
) -> Vec<&'a Value> {
    let mut merged: Vec<&'a Value> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for list in [path_params, operation_params].into_iter().flatten() {
        let Some(list) = list.as_array() else {
            continue;
        };
        for raw in list {
            let Some(param) = resolver.references().follow(raw) else {
                tracing::warn!(
                    "Skipping unresolvable parameter reference '{}'",
                    ref_of(raw).unwrap_or_default()
                );
                continue;
            };
            let key = (
                text_field(param, "name").unwrap_or_default(),
                text_field(param, "in").unwrap_or_default(),
            );
            if let Some(i) = index.get(&key).copied() {
                merged[i] = param;
            } else {
                index.insert(key, merged.len());
                merged.push(param);
            }
        }
    }

    merged
}

fn extract_parameter<'a>(
    resolver: &mut SchemaResolver<'a>,
    param: &'a Value,
) -> Option<OperationParameter> {
    let name = text_field(param, "name")?;
    let raw_location = text_field(param, "in").unwrap_or_default();
    let Some(location) = ParamLocation::parse(&raw_location) else {
        if raw_location == "cookie" {
            tracing::debug!(
                "Dropping cookie parameter '{name}' (cookie parameters are not supported)"
            );
        } else {
            tracing::warn!("Dropping parameter '{name}' with unknown location '{raw_location}'");
        }
        return None;
    };

    let mut schema = match param.get("schema") {
        Some(schema) => resolver.resolve(schema),
        None => ResolvedSchema::of_type("string"),
    };
    if schema.description.is_none() {
        schema.description = text_field(param, "description");
    }

    let required = location == ParamLocation::Path
        || param.get("required").and_then(Value::as_bool).unwrap_or(false);

    Some(OperationParameter {
        name,
        location,
        required,
        schema,
    })
}

fn extract_request_body<'a>(
    resolver: &mut SchemaResolver<'a>,
    body: &'a Value,
) -> Option<RequestBodyContract> {
    let content = body.get("content").and_then(Value::as_object)?;
    let content_types = sort_content_types(content.keys().map(String::as_str));
    let content_type = content_types.first()?.clone();

    let mut schema = match content.get(&content_type).and_then(|media| media.get("schema")) {
        Some(schema) => resolver.resolve(schema),
        None => ResolvedSchema::of_type("string"),
    };
    if schema.description.is_none() {
        schema.description = text_field(body, "description");
    }

    Some(RequestBodyContract {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        content_type,
        content_types,
        schema,
    })
}

/// Rank of a media type in [`CONTENT_TYPE_PRIORITY`] (parameters and case ignored).
#[must_use]
pub fn content_type_rank(content_type: &str) -> usize {
    let essence = media_essence(content_type);
    CONTENT_TYPE_PRIORITY
        .iter()
        .position(|known| *known == essence)
        .unwrap_or(CONTENT_TYPE_PRIORITY.len())
}

/// Sort media types by priority, then lexically.
#[must_use]
pub fn sort_content_types<'s>(types: impl Iterator<Item = &'s str>) -> Vec<String> {
    let mut sorted: Vec<String> = types.map(str::to_string).collect();
    sorted.sort_by(|a, b| {
        content_type_rank(a)
            .cmp(&content_type_rank(b))
            .then_with(|| a.cmp(b))
    });
    sorted
}

/// The lower-cased `type/subtype` of a media type string.
#[must_use]
pub fn media_essence(content_type: &str) -> String {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
    }
}

/// `<method>_<path>` with every non-alphanumeric path character replaced by `_`.
#[must_use]
pub fn synthesize_operation_id(method: &str, path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", method.to_lowercase(), sanitized)
}

/// Every `operationId` declared in the document, in any path item.
fn explicit_operation_ids<'a>(
    resolver: &mut SchemaResolver<'a>,
    paths: &'a Map<String, Value>,
) -> HashSet<String> {
    let mut ids = HashSet::new();
    for path_item in paths.values() {
        let Some(path_item) = resolver.references().follow(path_item) else {
            continue;
        };
        for method in METHOD_ORDER {
            if let Some(id) = path_item
                .get(method)
                .and_then(|op| op.get("operationId"))
                .and_then(Value::as_str)
            {
                ids.insert(id.to_string());
            }
        }
    }
    ids
}

/// Claim `base`, or the first free `base_<n>` (n >= 2).
///
/// Declared ids are reserved up front: a synthesized id or a suffix never takes a name that
/// some operation declares, so only repeated declarations get renamed.
fn reserve_unique_operation_id(
    taken: &mut HashSet<String>,
    explicit: &HashSet<String>,
    base: &str,
    declared: bool,
) -> String {
    if (declared || !explicit.contains(base)) && taken.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if !explicit.contains(&candidate) && taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn resolve_http_method(method: &str) -> Method {
    match method {
        "get" => Method::GET,
        "post" => Method::POST,
        "put" => Method::PUT,
        "patch" => Method::PATCH,
        "delete" => Method::DELETE,
        "options" => Method::OPTIONS,
        "head" => Method::HEAD,
        // METHOD_ORDER is exhaustive.
        _ => Method::GET,
    }
}

fn text_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(str::to_string)
}
