//! HTTP semantics helpers.
//!
//! Generates MCP `ToolAnnotations` for operation tools based on RFC 9110-style method
//! semantics.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Generate MCP tool annotations based on HTTP method semantics.
///
/// `openWorldHint` is always `true`: every operation talks to an external service.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = if method == Method::GET
        || method == Method::HEAD
        || method == Method::OPTIONS
    {
        (Some(true), Some(false), Some(true))
    } else if method == Method::POST {
        (Some(false), Some(false), Some(false))
    } else if method == Method::PUT || method == Method::DELETE {
        (Some(false), Some(true), Some(true))
    } else if method == Method::PATCH {
        // PATCH may or may not be idempotent; do not guess.
        (Some(false), Some(true), None)
    } else {
        (None, None, None)
    };

    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::annotations_for_method;
    use reqwest::Method;

    #[test]
    fn head_and_options_are_read_only_like_get() {
        for m in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let a = annotations_for_method(&m);
            assert_eq!(a.read_only_hint, Some(true));
            assert_eq!(a.idempotent_hint, Some(true));
            assert_eq!(a.open_world_hint, Some(true));
        }
    }

    #[test]
    fn delete_is_destructive_and_idempotent() {
        let a = annotations_for_method(&Method::DELETE);
        assert_eq!(a.read_only_hint, Some(false));
        assert_eq!(a.destructive_hint, Some(true));
        assert_eq!(a.idempotent_hint, Some(true));
    }

    #[test]
    fn patch_leaves_idempotence_unknown() {
        let a = annotations_for_method(&Method::PATCH);
        assert_eq!(a.destructive_hint, Some(true));
        assert_eq!(a.idempotent_hint, None);
    }
}
