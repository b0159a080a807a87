//! Schema resolution.
//!
//! Turns raw `OpenAPI` schema nodes into self-contained [`ResolvedSchema`] values: every `$ref`
//! is replaced by its target's resolved form, composition branches are resolved, enums are
//! described for humans, and binary fields are rewritten into file-path inputs.
//!
//! Resolution never fails. Unresolvable and cyclic references become permissive
//! `{type: object, additionalProperties: true}` placeholders so one bad schema cannot block the
//! rest of a document.

use crate::reference::{ReferenceResolver, ref_of};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A schema with all references replaced by their resolved targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, ResolvedSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ResolvedSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<ResolvedSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<ResolvedSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<ResolvedSchema>>,
    /// Set on properties that take file paths at call time instead of literal content.
    #[serde(skip)]
    pub file_upload: Option<FileUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<ResolvedSchema>),
}

/// Shape of a file-upload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileUpload {
    /// One file path.
    Single,
    /// An array of file paths.
    Multiple,
}

impl ResolvedSchema {
    /// A bare schema of the given type.
    #[must_use]
    pub fn of_type(schema_type: &str) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            ..Self::default()
        }
    }

    /// The permissive object schema used when a reference cannot be followed.
    #[must_use]
    pub fn placeholder(description: String) -> Self {
        Self {
            schema_type: "object".to_string(),
            description: Some(description),
            additional_properties: Some(AdditionalProperties::Allowed(true)),
            ..Self::default()
        }
    }

    /// Whether this (resolved) schema describes a file-upload field.
    ///
    /// Honors the explicit marker as well as the raw `binary` format markers, so it works on
    /// both transformed and untransformed schemas.
    #[must_use]
    pub fn file_upload_kind(&self) -> Option<FileUpload> {
        if self.file_upload.is_some() {
            return self.file_upload;
        }
        let is_binary = |f: &Option<String>| f.as_deref() == Some("binary");
        if self.schema_type == "array" {
            let items_binary = self.items.as_ref().is_some_and(|i| is_binary(&i.format));
            if is_binary(&self.format) || items_binary {
                return Some(FileUpload::Multiple);
            }
            return None;
        }
        is_binary(&self.format).then_some(FileUpload::Single)
    }

    /// Convert to a JSON Schema value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// File-upload classification of a raw schema node (references already followed).
#[must_use]
pub fn detect_file_upload<'a>(
    refs: &mut ReferenceResolver<'a>,
    node: &'a Value,
) -> Option<FileUpload> {
    let is_binary = |n: &Value| n.get("format").and_then(Value::as_str) == Some("binary");
    if is_binary(node) && !is_array(node) {
        return Some(FileUpload::Single);
    }
    if is_array(node) {
        if is_binary(node) {
            return Some(FileUpload::Multiple);
        }
        if let Some(items) = node.get("items")
            && let Some(items) = refs.follow(items)
            && is_binary(items)
        {
            return Some(FileUpload::Multiple);
        }
    }
    None
}

fn is_array(node: &Value) -> bool {
    match node.get("type") {
        Some(Value::String(t)) => t == "array",
        Some(Value::Array(types)) => types.iter().any(|t| t == "array"),
        _ => false,
    }
}

/// Replace a file field's schema with a file-path input of the same shape.
#[must_use]
pub fn file_path_schema(kind: FileUpload, original_description: Option<&str>) -> ResolvedSchema {
    let with_suffix = |lead: &str| match original_description {
        Some(desc) if !desc.trim().is_empty() => format!("{lead} {desc}"),
        _ => lead.to_string(),
    };
    match kind {
        FileUpload::Single => ResolvedSchema {
            schema_type: "string".to_string(),
            description: Some(with_suffix("Absolute file path to upload.")),
            file_upload: Some(FileUpload::Single),
            ..ResolvedSchema::default()
        },
        FileUpload::Multiple => ResolvedSchema {
            schema_type: "array".to_string(),
            description: Some(with_suffix("Array of absolute file paths to upload.")),
            items: Some(Box::new(ResolvedSchema {
                schema_type: "string".to_string(),
                description: Some("Absolute file path to upload.".to_string()),
                ..ResolvedSchema::default()
            })),
            file_upload: Some(FileUpload::Multiple),
            ..ResolvedSchema::default()
        },
    }
}

/// Resolves schema nodes of one document.
///
/// Holds the document's [`ReferenceResolver`] session; every [`SchemaResolver::resolve`] call
/// starts with an empty in-flight reference set.
#[derive(Debug)]
pub struct SchemaResolver<'a> {
    refs: ReferenceResolver<'a>,
}

impl<'a> SchemaResolver<'a> {
    #[must_use]
    pub fn new(document: &'a Value) -> Self {
        Self {
            refs: ReferenceResolver::new(document),
        }
    }

    pub fn references(&mut self) -> &mut ReferenceResolver<'a> {
        &mut self.refs
    }

    /// Resolve one schema node into a self-contained description.
    pub fn resolve(&mut self, node: &'a Value) -> ResolvedSchema {
        let mut in_flight: HashSet<String> = HashSet::new();
        self.resolve_node(node, &mut in_flight)
    }

    fn resolve_node(&mut self, node: &'a Value, in_flight: &mut HashSet<String>) -> ResolvedSchema {
        if let Some(reference) = ref_of(node) {
            return self.resolve_reference(reference, in_flight);
        }
        let Some(obj) = node.as_object() else {
            // `true`/`{}`-like schemas accept anything; treat them as free-form strings.
            return ResolvedSchema::of_type("string");
        };

        let (declared_type, type_nullable) = declared_type(obj);
        let mut schema = ResolvedSchema {
            schema_type: declared_type.clone().unwrap_or_else(|| {
                if obj.contains_key("properties") {
                    "object".to_string()
                } else {
                    "string".to_string()
                }
            }),
            description: str_field(obj, "description"),
            format: str_field(obj, "format"),
            example: obj.get("example").cloned(),
            default: obj.get("default").cloned(),
            nullable: obj
                .get("nullable")
                .and_then(Value::as_bool)
                .or(type_nullable.then_some(true)),
            minimum: obj.get("minimum").cloned(),
            maximum: obj.get("maximum").cloned(),
            min_length: obj.get("minLength").and_then(Value::as_u64),
            max_length: obj.get("maxLength").and_then(Value::as_u64),
            pattern: str_field(obj, "pattern"),
            ..ResolvedSchema::default()
        };

        if let Some(values) = obj.get("enum").and_then(Value::as_array) {
            schema.enumeration = Some(values.clone());
            let rendered: Vec<String> = values
                .iter()
                .map(|v| format!("\"{}\"", value_label(v)))
                .collect();
            append_description(
                &mut schema.description,
                &format!("Allowed values: {}", rendered.join(", ")),
            );
        }

        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            let mut resolved = IndexMap::new();
            for (name, prop) in props {
                resolved.insert(name.clone(), self.resolve_property(prop, in_flight));
            }
            schema.properties = Some(resolved);
        }

        match obj.get("additionalProperties") {
            Some(Value::Bool(b)) => {
                schema.additional_properties = Some(AdditionalProperties::Allowed(*b));
            }
            Some(extra @ Value::Object(_)) => {
                schema.additional_properties = Some(AdditionalProperties::Schema(Box::new(
                    self.resolve_node(extra, in_flight),
                )));
            }
            _ => {}
        }

        if schema.schema_type == "array"
            && let Some(items) = obj.get("items")
        {
            schema.items = Some(Box::new(self.resolve_node(items, in_flight)));
        }

        if let Some(required) = obj.get("required").and_then(Value::as_array) {
            schema.required = Some(
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            );
        }

        for (key, phrase) in [
            ("oneOf", "one of"),
            ("anyOf", "any of"),
            ("allOf", "all of"),
        ] {
            let Some(branches) = obj.get(key).and_then(Value::as_array) else {
                continue;
            };
            let resolved: Vec<ResolvedSchema> = branches
                .iter()
                .map(|b| self.resolve_node(b, in_flight))
                .collect();
            match key {
                "oneOf" => schema.one_of = Some(resolved),
                "anyOf" => schema.any_of = Some(resolved),
                _ => schema.all_of = Some(resolved),
            }
            append_description(
                &mut schema.description,
                &format!("Schema supports {phrase} the following options"),
            );
            if declared_type.is_none() {
                schema.schema_type = "object".to_string();
            }
        }

        schema
    }

    fn resolve_reference(
        &mut self,
        reference: &str,
        in_flight: &mut HashSet<String>,
    ) -> ResolvedSchema {
        if in_flight.contains(reference) {
            tracing::debug!("Circular $ref '{reference}' replaced by a placeholder");
            return ResolvedSchema::placeholder(format!(
                "Circular reference to {reference} (recursive structure, any object accepted)"
            ));
        }
        let Some(target) = self.refs.lookup(reference) else {
            tracing::warn!("Unresolved $ref '{reference}' replaced by a placeholder");
            return ResolvedSchema::placeholder(format!(
                "Unresolved reference: {reference} (any object accepted)"
            ));
        };

        in_flight.insert(reference.to_string());
        let resolved = self.resolve_node(target, in_flight);
        in_flight.remove(reference);
        resolved
    }

    fn resolve_property(
        &mut self,
        prop: &'a Value,
        in_flight: &mut HashSet<String>,
    ) -> ResolvedSchema {
        let target = self.refs.follow(prop);
        let kind = target.and_then(|t| detect_file_upload(&mut self.refs, t));
        match kind {
            Some(kind) => {
                let description = target
                    .and_then(|t| t.get("description"))
                    .and_then(Value::as_str)
                    .or_else(|| prop.get("description").and_then(Value::as_str));
                file_path_schema(kind, description)
            }
            None => self.resolve_node(prop, in_flight),
        }
    }
}

/// The declared `type`, and whether a 3.1-style type list included `"null"`.
fn declared_type(obj: &Map<String, Value>) -> (Option<String>, bool) {
    match obj.get("type") {
        Some(Value::String(t)) => (Some(t.clone()), false),
        Some(Value::Array(types)) => {
            let nullable = types.iter().any(|t| t == "null");
            let first = types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(str::to_string);
            (first, nullable)
        }
        _ => (None, false),
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn append_description(description: &mut Option<String>, clause: &str) {
    *description = Some(match description.take() {
        Some(existing) if !existing.trim().is_empty() => format!("{existing} {clause}"),
        _ => clause.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_in(doc: &Value, pointer: &str) -> ResolvedSchema {
        let node = doc.pointer(pointer).expect("pointer exists");
        SchemaResolver::new(doc).resolve(node)
    }

    #[test]
    fn direct_self_reference_terminates_with_placeholder() {
        let doc = json!({
            "components": {"schemas": {
                "TreeNode": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "string"},
                        "children": {
                            "type": "array",
                            "items": {"$ref": "#/components/schemas/TreeNode"}
                        }
                    }
                }
            }},
            "root": {"$ref": "#/components/schemas/TreeNode"}
        });

        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.schema_type, "object");
        let children = &schema.properties.as_ref().expect("properties")["children"];
        let item = children.items.as_ref().expect("items");
        assert_eq!(item.schema_type, "object");
        assert_eq!(
            item.additional_properties,
            Some(AdditionalProperties::Allowed(true))
        );
        assert!(
            item.description
                .as_deref()
                .is_some_and(|d| d.contains("Circular reference"))
        );
    }

    #[test]
    fn indirect_cycle_terminates() {
        let doc = json!({
            "components": {"schemas": {
                "A": {"type": "object", "properties": {"b": {"$ref": "#/components/schemas/B"}}},
                "B": {"type": "object", "properties": {"a": {"$ref": "#/components/schemas/A"}}}
            }},
            "root": {"$ref": "#/components/schemas/A"}
        });

        let schema = resolve_in(&doc, "/root");
        let b = &schema.properties.as_ref().expect("A props")["b"];
        let a_again = &b.properties.as_ref().expect("B props")["a"];
        assert_eq!(
            a_again.additional_properties,
            Some(AdditionalProperties::Allowed(true))
        );
    }

    #[test]
    fn sibling_references_to_same_schema_are_not_cycles() {
        let doc = json!({
            "components": {"schemas": {
                "Address": {"type": "object", "properties": {"city": {"type": "string"}}}
            }},
            "root": {
                "type": "object",
                "properties": {
                    "home": {"$ref": "#/components/schemas/Address"},
                    "work": {"$ref": "#/components/schemas/Address"}
                }
            }
        });

        let schema = resolve_in(&doc, "/root");
        let props = schema.properties.expect("properties");
        for key in ["home", "work"] {
            assert!(props[key].properties.as_ref().is_some_and(|p| p.contains_key("city")));
        }
    }

    #[test]
    fn unresolvable_reference_becomes_placeholder() {
        let doc = json!({"root": {"$ref": "#/components/schemas/Missing"}});
        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.schema_type, "object");
        assert_eq!(
            schema.additional_properties,
            Some(AdditionalProperties::Allowed(true))
        );
        assert!(
            schema
                .description
                .as_deref()
                .is_some_and(|d| d.contains("#/components/schemas/Missing"))
        );
    }

    #[test]
    fn type_defaults_follow_properties() {
        let doc = json!({
            "withProps": {"properties": {"x": {"type": "integer"}}},
            "bare": {"description": "anything"}
        });
        assert_eq!(resolve_in(&doc, "/withProps").schema_type, "object");
        assert_eq!(resolve_in(&doc, "/bare").schema_type, "string");
    }

    #[test]
    fn enum_values_are_described() {
        let doc = json!({"root": {
            "type": "string",
            "description": "Pet status.",
            "enum": ["available", "sold"]
        }});
        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.enumeration, Some(vec![json!("available"), json!("sold")]));
        assert_eq!(
            schema.description.as_deref(),
            Some("Pet status. Allowed values: \"available\", \"sold\"")
        );
    }

    #[test]
    fn one_of_without_type_resolves_to_object() {
        let doc = json!({
            "components": {"schemas": {
                "SchemaA": {"type": "object", "properties": {"a": {"type": "string"}}},
                "SchemaB": {"type": "object", "properties": {"b": {"type": "integer"}}}
            }},
            "root": {"oneOf": [
                {"$ref": "#/components/schemas/SchemaA"},
                {"$ref": "#/components/schemas/SchemaB"}
            ]}
        });

        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.schema_type, "object");
        let branches = schema.one_of.as_ref().expect("oneOf");
        assert_eq!(branches.len(), 2);
        assert!(branches[1].properties.as_ref().is_some_and(|p| p.contains_key("b")));
        assert!(schema.description.as_deref().is_some_and(|d| d.contains("one of")));
    }

    #[test]
    fn explicit_type_survives_composition() {
        let doc = json!({"root": {
            "type": "string",
            "anyOf": [{"format": "date"}, {"format": "date-time"}]
        }});
        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.schema_type, "string");
        assert_eq!(schema.any_of.as_ref().map(Vec::len), Some(2));
        assert!(schema.description.as_deref().is_some_and(|d| d.contains("any of")));
    }

    #[test]
    fn constraints_and_additional_properties_are_kept() {
        let doc = json!({"root": {
            "type": "object",
            "nullable": true,
            "properties": {
                "age": {
                    "type": "integer", "minimum": 0, "maximum": 150,
                    "example": 4, "default": 1
                },
                "code": {"type": "string", "minLength": 2, "maxLength": 3, "pattern": "^[A-Z]+$"}
            },
            "required": ["age"],
            "additionalProperties": {"type": "string"}
        }});

        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.nullable, Some(true));
        assert_eq!(schema.required, Some(vec!["age".to_string()]));
        let props = schema.properties.as_ref().expect("props");
        assert_eq!(props["age"].minimum, Some(json!(0)));
        assert_eq!(props["age"].maximum, Some(json!(150)));
        assert_eq!(props["age"].default, Some(json!(1)));
        assert_eq!(props["code"].min_length, Some(2));
        assert_eq!(props["code"].pattern.as_deref(), Some("^[A-Z]+$"));
        assert_eq!(
            schema.additional_properties,
            Some(AdditionalProperties::Schema(Box::new(ResolvedSchema::of_type(
                "string"
            ))))
        );
    }

    #[test]
    fn binary_properties_become_file_paths() {
        let doc = json!({
            "components": {"schemas": {
                "Blob": {"type": "string", "format": "binary", "description": "The image."}
            }},
            "root": {
                "type": "object",
                "properties": {
                    "file": {"type": "string", "format": "binary", "description": "Avatar."},
                    "byRef": {"$ref": "#/components/schemas/Blob"},
                    "many": {"type": "array", "items": {"type": "string", "format": "binary"}},
                    "manyLegacy": {"type": "array", "format": "binary"},
                    "name": {"type": "string"}
                }
            }
        });

        let schema = resolve_in(&doc, "/root");
        let props = schema.properties.as_ref().expect("props");

        let file = &props["file"];
        assert_eq!(file.schema_type, "string");
        assert_eq!(file.format, None);
        assert_eq!(file.file_upload, Some(FileUpload::Single));
        let desc = file.description.as_deref().unwrap_or_default();
        assert!(desc.contains("file path"));
        assert!(desc.ends_with("Avatar."));

        let by_ref = &props["byRef"];
        assert_eq!(by_ref.file_upload_kind(), Some(FileUpload::Single));
        assert!(by_ref.description.as_deref().is_some_and(|d| d.ends_with("The image.")));

        for key in ["many", "manyLegacy"] {
            let many = &props[key];
            assert_eq!(many.schema_type, "array");
            assert_eq!(many.items.as_ref().map(|i| i.schema_type.as_str()), Some("string"));
            assert!(many.description.as_deref().is_some_and(|d| d.contains("file paths")));
            assert_eq!(many.file_upload_kind(), Some(FileUpload::Multiple));
        }

        let name = &props["name"];
        assert_eq!(name, &ResolvedSchema::of_type("string"));
        assert_eq!(name.file_upload_kind(), None);
    }

    #[test]
    fn file_marker_is_not_serialized() {
        let schema = file_path_schema(FileUpload::Single, None);
        let json = schema.to_json();
        assert_eq!(json["type"], "string");
        assert!(json.get("fileUpload").is_none());
    }

    #[test]
    fn openapi_31_type_lists_set_nullable() {
        let doc = json!({"root": {"type": ["integer", "null"]}});
        let schema = resolve_in(&doc, "/root");
        assert_eq!(schema.schema_type, "integer");
        assert_eq!(schema.nullable, Some(true));
    }

    #[test]
    fn properties_keep_document_order() {
        let doc = json!({"root": {
            "type": "object",
            "properties": {
                "zeta": {"type": "string"},
                "alpha": {"type": "integer"},
                "mid": {"type": "boolean"}
            }
        }});

        let schema = resolve_in(&doc, "/root");
        let keys: Vec<&str> = schema
            .properties
            .as_ref()
            .expect("properties")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);

        let json = schema.to_json();
        let emitted: Vec<&str> = json["properties"]
            .as_object()
            .expect("properties object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(emitted, ["zeta", "alpha", "mid"]);
    }
}
