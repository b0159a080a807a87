//! `multipart/form-data` assembly.
//!
//! File fields carry local file paths; each file is attached as a streamed part so large files
//! are never buffered in memory before the request is sent.

use crate::coerce::value_to_string;
use crate::error::{OpenApiOpsError, Result};
use crate::schema::ResolvedSchema;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use std::path::Path;
use tokio_util::io::ReaderStream;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Build a multipart form from a body object, using `schema` to find the file fields.
///
/// # Errors
///
/// Returns [`OpenApiOpsError::FileNotFound`], [`OpenApiOpsError::NotAFile`] or
/// [`OpenApiOpsError::InvalidFilePathType`] for unusable file arguments.
pub async fn build_form(fields: &Map<String, Value>, schema: &ResolvedSchema) -> Result<Form> {
    let mut form = Form::new();

    for (field, value) in fields {
        let kind = schema
            .properties
            .as_ref()
            .and_then(|props| props.get(field))
            .and_then(ResolvedSchema::file_upload_kind);

        form = match (kind, value) {
            (Some(_), Value::String(path)) => {
                form.part(field.clone(), file_part(field, path).await?)
            }
            (Some(_), Value::Array(entries)) => {
                // Reject bad element types before touching the filesystem.
                let mut paths: Vec<&str> = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Value::String(path) = entry else {
                        return Err(OpenApiOpsError::InvalidFilePathType {
                            field: field.clone(),
                            found: json_kind(entry).to_string(),
                        });
                    };
                    paths.push(path);
                }
                let mut form = form;
                for path in paths {
                    form = form.part(field.clone(), file_part(field, path).await?);
                }
                form
            }
            (Some(_), other) => {
                return Err(OpenApiOpsError::InvalidFilePathType {
                    field: field.clone(),
                    found: json_kind(other).to_string(),
                });
            }
            (None, Value::Null) => form,
            (None, Value::Object(_)) => form.text(field.clone(), value.to_string()),
            (None, other) => form.text(field.clone(), value_to_string(other)),
        };
    }

    Ok(form)
}

async fn file_part(field: &str, path: &str) -> Result<Part> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OpenApiOpsError::FileNotFound {
                field: field.to_string(),
                path: path.to_string(),
            });
        }
        Err(e) => return Err(OpenApiOpsError::Io(e)),
    };
    if !metadata.is_file() {
        return Err(OpenApiOpsError::NotAFile {
            field: field.to_string(),
            path: path.to_string(),
        });
    }

    let file = tokio::fs::File::open(path).await?;
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string());
    let mime_type = mime_for_path(path);

    tracing::debug!(field, path, mime_type, "attaching file part");
    Part::stream_with_length(body, metadata.len())
        .file_name(file_name)
        .mime_str(mime_type)
        .map_err(|e| OpenApiOpsError::Config(format!("invalid MIME type '{mime_type}': {e}")))
}

/// MIME type for a file, from its extension.
#[must_use]
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => FALLBACK_MIME,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
