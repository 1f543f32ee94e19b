//! Attribute projection (RFC 7644 §3.4.2.5 / §3.9).
//!
//! Builds an inclusion or exclusion view of a resource from the `attributes`
//! / `excludedAttributes` query lists. Projection yields a generic attribute
//! map — a strict subset of the resource's fields — so callers serialize the
//! projected form, not the original concrete type.

use serde_json::{Map, Value};

use crate::path;

/// Attributes every projection retains.
const CORE_ATTRS: [&str; 3] = ["id", "schemas", "meta"];

/// Project a resource through the requested inclusion or exclusion lists.
/// With neither list, the resource is returned unchanged. The two lists are
/// mutually exclusive at the protocol boundary; when both arrive anyway,
/// inclusion wins.
pub fn project_resource(resource: &Value, attributes: &[String], excluded: &[String]) -> Value {
    let obj = match resource.as_object() {
        Some(o) => o,
        None => return resource.clone(),
    };

    if !attributes.is_empty() {
        let parsed = parse_attr_names(attributes);
        let paths: Vec<&[String]> = parsed.iter().map(Vec::as_slice).collect();
        let mut out = Map::new();
        for (key, value) in obj {
            let key_lower = key.to_lowercase();
            if CORE_ATTRS.contains(&key_lower.as_str()) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let matching: Vec<&[String]> =
                paths.iter().filter(|p| p[0] == key_lower).copied().collect();
            if matching.is_empty() {
                continue;
            }
            if matching.iter().any(|p| p.len() == 1) {
                out.insert(key.clone(), value.clone());
            } else {
                let rests: Vec<&[String]> = matching.iter().map(|p| &p[1..]).collect();
                out.insert(key.clone(), include_sub(value, &rests));
            }
        }
        return Value::Object(out);
    }

    if !excluded.is_empty() {
        let parsed = parse_attr_names(excluded);
        let paths: Vec<&[String]> = parsed.iter().map(Vec::as_slice).collect();
        let mut out = Map::new();
        for (key, value) in obj {
            let key_lower = key.to_lowercase();
            let matching: Vec<&[String]> =
                paths.iter().filter(|p| p[0] == key_lower).copied().collect();
            if !CORE_ATTRS.contains(&key_lower.as_str())
                && matching.iter().any(|p| p.len() == 1)
            {
                continue;
            }
            if matching.iter().any(|p| p.len() > 1) {
                let rests: Vec<&[String]> = matching
                    .iter()
                    .filter(|p| p.len() > 1)
                    .map(|p| &p[1..])
                    .collect();
                out.insert(key.clone(), exclude_sub(value, &rests));
            } else {
                out.insert(key.clone(), value.clone());
            }
        }
        return Value::Object(out);
    }

    resource.clone()
}

/// Requested names become lowercase segment chains; a leading schema URN is
/// one segment. Unparseable names are ignored.
fn parse_attr_names(names: &[String]) -> Vec<Vec<String>> {
    names
        .iter()
        .filter_map(|name| {
            let parsed = path::parse_path(name).ok()?;
            let mut segments = Vec::new();
            if let Some(urn) = parsed.schema_urn {
                segments.push(urn.to_lowercase());
            }
            segments.extend(parsed.segments.into_iter().map(|s| s.name.to_lowercase()));
            Some(segments)
        })
        .collect()
}

/// Keep only the requested sub-paths; array elements are projected
/// individually.
fn include_sub(value: &Value, paths: &[&[String]]) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = Map::new();
            for (key, v) in obj {
                let key_lower = key.to_lowercase();
                let matching: Vec<&[String]> =
                    paths.iter().filter(|p| p[0] == key_lower).copied().collect();
                if matching.is_empty() {
                    continue;
                }
                if matching.iter().any(|p| p.len() == 1) {
                    out.insert(key.clone(), v.clone());
                } else {
                    let rests: Vec<&[String]> = matching.iter().map(|p| &p[1..]).collect();
                    out.insert(key.clone(), include_sub(v, &rests));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(|e| include_sub(e, paths)).collect())
        }
        other => other.clone(),
    }
}

/// Strip the named sub-paths, keeping everything else; recurses through
/// objects and each element of arrays.
fn exclude_sub(value: &Value, paths: &[&[String]]) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = Map::new();
            for (key, v) in obj {
                let key_lower = key.to_lowercase();
                let matching: Vec<&[String]> =
                    paths.iter().filter(|p| p[0] == key_lower).copied().collect();
                if matching.iter().any(|p| p.len() == 1) {
                    continue;
                }
                if matching.is_empty() {
                    out.insert(key.clone(), v.clone());
                } else {
                    let rests: Vec<&[String]> = matching.iter().map(|p| &p[1..]).collect();
                    out.insert(key.clone(), exclude_sub(v, &rests));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(|e| exclude_sub(e, paths)).collect())
        }
        other => other.clone(),
    }
}
