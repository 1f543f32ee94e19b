//! Attribute path parsing and resolution (RFC 7644 §3.5.2, §3.10).
//!
//! Paths navigate the generic attribute-map form of a resource: bare names
//! match case-insensitively, dotted chains descend into nested objects, and a
//! bracketed form (`emails[type eq "work"].value`) selects the first element
//! of a multi-valued attribute matching the embedded filter. A leading schema
//! URN (`urn:...:enterprise:2.0:User:employeeNumber`) addresses an extension
//! container.

use serde_json::Value;

use crate::error::{ScimError, ScimResult};
use crate::filter::{matches_filter, parse_filter, FilterExpr};

/// A parsed attribute path: an optional extension-schema URN followed by one
/// or more segments.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrPath {
    pub schema_urn: Option<String>,
    pub segments: Vec<PathSegment>,
}

/// One path segment: an attribute name plus an optional filter predicate
/// selecting one element of a multi-valued attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: String,
    pub predicate: Option<FilterExpr>,
}

impl AttrPath {
    /// A single-segment path with no predicate.
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            schema_urn: None,
            segments: vec![PathSegment {
                name: name.into(),
                predicate: None,
            }],
        }
    }
}

/// Parse an attribute path, including the `<schema-urn>:<attr-path>` form.
pub fn parse_path(input: &str) -> ScimResult<AttrPath> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ScimError::invalid_path("empty attribute path"));
    }

    let (schema_urn, rest) = split_urn(input);
    if rest.is_empty() {
        return Err(ScimError::invalid_path("schema URN without attribute"));
    }

    Ok(AttrPath {
        schema_urn,
        segments: parse_segments(rest)?,
    })
}

/// Split a leading schema URN off an attribute path. URNs contain colons and
/// attribute names do not, so the attribute part starts after the last colon
/// before any bracket filter.
fn split_urn(input: &str) -> (Option<String>, &str) {
    if input.len() < 4 || !input[..4].eq_ignore_ascii_case("urn:") {
        return (None, input);
    }
    let scan_end = input.find('[').unwrap_or(input.len());
    match input[..scan_end].rfind(':') {
        Some(pos) => (Some(input[..pos].to_string()), &input[pos + 1..]),
        None => (None, input),
    }
}

fn parse_segments(input: &str) -> ScimResult<Vec<PathSegment>> {
    let chars: Vec<char> = input.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;

    loop {
        let start = i;
        while i < chars.len() && is_name_char(chars[i]) {
            i += 1;
        }
        if i == start {
            return Err(ScimError::invalid_path(format!(
                "expected attribute name in path: {input}"
            )));
        }
        let name: String = chars[start..i].iter().collect();

        let mut predicate = None;
        if i < chars.len() && chars[i] == '[' {
            let close = find_bracket_close(&chars, i).ok_or_else(|| {
                ScimError::invalid_path(format!("unclosed filter bracket in path: {input}"))
            })?;
            let inner: String = chars[i + 1..close].iter().collect();
            let expr = parse_filter(&inner)?
                .ok_or_else(|| ScimError::invalid_path("empty filter in path"))?;
            predicate = Some(expr);
            i = close + 1;
        }

        segments.push(PathSegment { name, predicate });

        if i >= chars.len() {
            break;
        }
        if chars[i] == '.' {
            i += 1;
        } else {
            return Err(ScimError::invalid_path(format!(
                "unexpected character '{}' in path: {input}",
                chars[i]
            )));
        }
    }

    Ok(segments)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

/// Index of the `]` closing the bracket at `open`, skipping quoted strings.
fn find_bracket_close(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if c == '\\' {
                i += 1;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Resolve a path against a resource snapshot. Absence is `None`, never an
/// error — callers decide what missing means.
pub fn resolve<'a>(resource: &'a Value, path: &AttrPath) -> Option<&'a Value> {
    let mut current = resource;
    if let Some(urn) = &path.schema_urn {
        current = get_attr(current, urn)?;
    }
    for segment in &path.segments {
        current = get_attr(current, &segment.name)?;
        if let Some(predicate) = &segment.predicate {
            let elements = current.as_array()?;
            current = elements.iter().find(|e| matches_filter(e, predicate))?;
        }
    }
    Some(current)
}

/// Case-insensitive attribute lookup on an object value.
pub fn get_attr<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let obj = value.as_object()?;
    if let Some(v) = obj.get(name) {
        return Some(v);
    }
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Like [`get_attr`] but returns the map's actual key spelling.
pub(crate) fn find_key(obj: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    if obj.contains_key(name) {
        return Some(name.to_string());
    }
    obj.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_simple_path() {
        let path = parse_path("userName").unwrap();
        assert_eq!(path.schema_urn, None);
        assert_eq!(path.segments.len(), 1);
        assert_eq!(path.segments[0].name, "userName");
        assert!(path.segments[0].predicate.is_none());
    }

    #[test]
    fn parse_nested_path() {
        let path = parse_path("name.givenName").unwrap();
        let names: Vec<_> = path.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["name", "givenName"]);
    }

    #[test]
    fn parse_filtered_path() {
        let path = parse_path(r#"emails[type eq "work"].value"#).unwrap();
        assert_eq!(path.segments.len(), 2);
        assert_eq!(path.segments[0].name, "emails");
        assert!(path.segments[0].predicate.is_some());
        assert_eq!(path.segments[1].name, "value");
    }

    #[test]
    fn parse_urn_prefixed_path() {
        let path = parse_path(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.displayName",
        )
        .unwrap();
        assert_eq!(
            path.schema_urn.as_deref(),
            Some("urn:ietf:params:scim:schemas:extension:enterprise:2.0:User"),
        );
        let names: Vec<_> = path.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["manager", "displayName"]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_path("").is_err());
        assert!(parse_path("emails[type eq \"work\"").is_err());
        assert!(parse_path("emails[].value").is_err());
        assert!(parse_path("a..b").is_err());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let user = json!({"userName": "john"});
        let path = parse_path("USERNAME").unwrap();
        assert_eq!(resolve(&user, &path), Some(&json!("john")));
    }

    #[test]
    fn resolve_nested() {
        let user = json!({"name": {"givenName": "John"}});
        let path = parse_path("name.givenname").unwrap();
        assert_eq!(resolve(&user, &path), Some(&json!("John")));
    }

    #[test]
    fn resolve_filtered_first_match() {
        let user = json!({"emails": [
            {"type": "home", "value": "h@x.com"},
            {"type": "work", "value": "w1@x.com"},
            {"type": "work", "value": "w2@x.com"}
        ]});
        let path = parse_path(r#"emails[type eq "work"].value"#).unwrap();
        assert_eq!(resolve(&user, &path), Some(&json!("w1@x.com")));
    }

    #[test]
    fn resolve_absent_is_none() {
        let user = json!({"userName": "john"});
        assert_eq!(resolve(&user, &parse_path("phone").unwrap()), None);
        let path = parse_path(r#"emails[type eq "fax"].value"#).unwrap();
        assert_eq!(resolve(&user, &path), None);
    }

    #[test]
    fn resolve_extension_container() {
        let user = json!({
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User": {
                "employeeNumber": "701984"
            }
        });
        let path = parse_path(
            "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber",
        )
        .unwrap();
        assert_eq!(resolve(&user, &path), Some(&json!("701984")));
    }
}
