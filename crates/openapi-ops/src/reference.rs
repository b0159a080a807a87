//! Intra-document `$ref` lookup.
//!
//! Only local JSON pointers (`#/...`) are supported. External file or URL references resolve
//! to `None` and are reported once as a warning; callers degrade to placeholder schemas.
//!
//! A [`ReferenceResolver`] is a resolution session: it is created per document load and
//! memoizes pointer lookups for that document only.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Maximum number of `$ref` hops followed by [`ReferenceResolver::follow`].
const MAX_REF_HOPS: usize = 32;

#[derive(Debug)]
pub struct ReferenceResolver<'a> {
    document: &'a Value,
    cache: HashMap<String, Option<&'a Value>>,
}

impl<'a> ReferenceResolver<'a> {
    #[must_use]
    pub fn new(document: &'a Value) -> Self {
        Self {
            document,
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &'a Value {
        self.document
    }

    /// Look up the node a reference string points to.
    ///
    /// Returns the same node for repeated lookups of the same reference.
    pub fn lookup(&mut self, reference: &str) -> Option<&'a Value> {
        if let Some(hit) = self.cache.get(reference) {
            return *hit;
        }
        let found = self.lookup_uncached(reference);
        self.cache.insert(reference.to_string(), found);
        found
    }

    fn lookup_uncached(&self, reference: &str) -> Option<&'a Value> {
        let Some(fragment) = reference.strip_prefix('#') else {
            tracing::warn!("External $ref '{reference}' is not supported");
            return None;
        };
        if fragment.is_empty() {
            return Some(self.document);
        }
        if !fragment.starts_with('/') {
            tracing::warn!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}"
            );
            return None;
        }

        let mut node = self.document;
        for raw in fragment[1..].split('/') {
            let segment = decode_segment(raw);
            node = match node {
                Value::Object(map) => map.get(&segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Follow a chain of `$ref`s until a non-reference node is reached.
    ///
    /// Returns `None` for a dangling or cyclic chain.
    pub fn follow(&mut self, node: &'a Value) -> Option<&'a Value> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cur = node;
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = ref_of(cur) else {
                return Some(cur);
            };
            if !seen.insert(reference) {
                return None;
            }
            cur = self.lookup(reference)?;
        }
        None
    }
}

/// The `$ref` string of a node, if it is a reference object.
#[must_use]
pub fn ref_of(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}

/// Decode one JSON pointer segment: `~1` → `/`, `~0` → `~`, plus URI percent-escapes.
fn decode_segment(raw: &str) -> String {
    let unescaped = raw.replace("~1", "/").replace("~0", "~");
    if !unescaped.contains('%') {
        return unescaped;
    }
    let bytes = unescaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(b) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(b);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or(unescaped)
}
