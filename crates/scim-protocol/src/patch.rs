//! SCIM Patch operations (RFC 7644 §3.5.2).
//!
//! Operations in one request apply in order against one mutable snapshot;
//! the first failure aborts the request, and the caller must discard the
//! snapshot instead of persisting a partial apply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ScimError, ScimErrorKind, ScimResult};
use crate::filter::{matches_filter, CompareOp, FilterExpr};
use crate::path::{self, AttrPath, PathSegment};
use crate::types::SCHEMA_PATCH_OP;

/// SCIM Patch request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self {
            schemas: vec![SCHEMA_PATCH_OP.to_string()],
            operations,
        }
    }

    /// Deserialize a request body. An unknown operation verb is
    /// `invalidValue`; any other structural problem is `invalidSyntax`.
    pub fn from_value(value: Value) -> ScimResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("unknown variant") {
                ScimError::invalid_value(msg)
            } else {
                ScimError::with_detail(ScimErrorKind::InvalidSyntax, msg)
            }
        })
    }
}

/// A single SCIM patch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Patch operation verbs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    #[serde(alias = "Add", alias = "ADD")]
    Add,
    #[serde(alias = "Remove", alias = "REMOVE")]
    Remove,
    #[serde(alias = "Replace", alias = "REPLACE")]
    Replace,
}

/// Attributes the engine refuses to patch.
const IMMUTABLE_ATTRS: [&str; 2] = ["id", "meta"];

enum SetMode {
    Add,
    Replace,
}

/// Apply every operation of a patch request, in order, against one snapshot.
pub fn apply_patch_request(resource: &mut Value, request: &PatchRequest) -> ScimResult<()> {
    for operation in &request.operations {
        apply_patch(resource, operation)?;
    }
    Ok(())
}

/// Apply a single patch operation.
pub fn apply_patch(resource: &mut Value, operation: &PatchOperation) -> ScimResult<()> {
    match operation.op {
        PatchOp::Add => apply_add(resource, operation),
        PatchOp::Remove => apply_remove(resource, operation),
        PatchOp::Replace => apply_replace(resource, operation),
    }
}

fn apply_add(resource: &mut Value, operation: &PatchOperation) -> ScimResult<()> {
    let value = operation
        .value
        .as_ref()
        .ok_or_else(|| ScimError::invalid_value("add operation requires a value"))?;

    match operation.path.as_deref().map(str::trim) {
        None | Some("") => merge_root(resource, value),
        Some(path_str) => {
            let attr_path = path::parse_path(path_str)?;
            check_mutability(&attr_path)?;
            let container = container_for_write(resource, &attr_path)?;
            set_path(container, &attr_path.segments, value, SetMode::Add)
        }
    }
}

fn apply_replace(resource: &mut Value, operation: &PatchOperation) -> ScimResult<()> {
    let value = operation
        .value
        .as_ref()
        .ok_or_else(|| ScimError::invalid_value("replace operation requires a value"))?;

    match operation.path.as_deref().map(str::trim) {
        None | Some("") => merge_root(resource, value),
        Some(path_str) => {
            let attr_path = path::parse_path(path_str)?;
            check_mutability(&attr_path)?;
            let container = container_for_write(resource, &attr_path)?;
            set_path(container, &attr_path.segments, value, SetMode::Replace)
        }
    }
}

fn apply_remove(resource: &mut Value, operation: &PatchOperation) -> ScimResult<()> {
    let path_str = operation
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ScimError::no_target("remove operation requires a path"))?;

    let attr_path = path::parse_path(path_str)?;
    check_mutability(&attr_path)?;

    // Removal is idempotent: anything absent along the way is a no-op.
    let container = match &attr_path.schema_urn {
        None => resource,
        Some(urn) => {
            let obj = resource
                .as_object_mut()
                .ok_or_else(not_an_attribute_map)?;
            match path::find_key(obj, urn).and_then(|key| obj.get_mut(&key)) {
                Some(container) => container,
                None => return Ok(()),
            }
        }
    };
    remove_path(container, &attr_path.segments);
    Ok(())
}

fn not_an_attribute_map() -> ScimError {
    ScimError::with_detail(ScimErrorKind::InvalidSyntax, "resource is not an attribute map")
}

fn check_mutability(path: &AttrPath) -> ScimResult<()> {
    if path.schema_urn.is_some() {
        return Ok(());
    }
    if let Some(first) = path.segments.first() {
        if IMMUTABLE_ATTRS.iter().any(|a| first.name.eq_ignore_ascii_case(a)) {
            return Err(ScimError::mutability(format!(
                "attribute '{}' is immutable",
                first.name
            )));
        }
    }
    Ok(())
}

/// Empty-path add/replace: merge the value's fields into the resource root,
/// overwriting by name. `id` is immutable; `meta` and `schemas` are
/// server-managed and skipped.
fn merge_root(resource: &mut Value, value: &Value) -> ScimResult<()> {
    let incoming = value.as_object().ok_or_else(|| {
        ScimError::invalid_value("patch value for the resource root must be an object")
    })?;
    let obj = resource.as_object_mut().ok_or_else(not_an_attribute_map)?;

    for (name, v) in incoming {
        if name.eq_ignore_ascii_case("id") {
            return Err(ScimError::mutability("attribute 'id' is immutable"));
        }
        if name.eq_ignore_ascii_case("meta") || name.eq_ignore_ascii_case("schemas") {
            continue;
        }
        let key = path::find_key(obj, name).unwrap_or_else(|| name.clone());
        obj.insert(key, v.clone());
    }
    Ok(())
}

/// Container for a write: the resource itself, or the extension-schema side
/// container named by the path's URN, created lazily on first write.
fn container_for_write<'a>(resource: &'a mut Value, path: &AttrPath) -> ScimResult<&'a mut Value> {
    match &path.schema_urn {
        None => Ok(resource),
        Some(urn) => {
            let obj = resource.as_object_mut().ok_or_else(not_an_attribute_map)?;
            let key = path::find_key(obj, urn).unwrap_or_else(|| urn.clone());
            Ok(obj.entry(key).or_insert_with(|| Value::Object(Map::new())))
        }
    }
}

fn set_path(
    current: &mut Value,
    segments: &[PathSegment],
    value: &Value,
    mode: SetMode,
) -> ScimResult<()> {
    let (segment, rest) = segments
        .split_first()
        .ok_or_else(|| ScimError::invalid_path("empty attribute path"))?;
    let obj = current
        .as_object_mut()
        .ok_or_else(|| ScimError::invalid_path("cannot navigate into a non-object value"))?;

    match &segment.predicate {
        None if rest.is_empty() => {
            let key = path::find_key(obj, &segment.name).unwrap_or_else(|| segment.name.clone());
            match mode {
                // Add to a multi-valued attribute appends one or many.
                SetMode::Add if matches!(obj.get(&key), Some(Value::Array(_))) => {
                    if let Some(existing) = obj.get_mut(&key).and_then(Value::as_array_mut) {
                        match value {
                            Value::Array(items) => existing.extend(items.iter().cloned()),
                            single => existing.push(single.clone()),
                        }
                    }
                }
                _ => {
                    obj.insert(key, value.clone());
                }
            }
            Ok(())
        }
        None => {
            let key = path::find_key(obj, &segment.name).ok_or_else(|| {
                ScimError::no_target(format!(
                    "intermediate attribute '{}' does not exist",
                    segment.name
                ))
            })?;
            let child = obj.get_mut(&key).ok_or_else(|| {
                ScimError::no_target(format!("attribute '{}' does not exist", segment.name))
            })?;
            set_path(child, rest, value, mode)
        }
        Some(predicate) if rest.is_empty() => {
            let key = path::find_key(obj, &segment.name).ok_or_else(|| {
                ScimError::no_target(format!("attribute '{}' does not exist", segment.name))
            })?;
            let arr = obj.get_mut(&key).and_then(Value::as_array_mut).ok_or_else(|| {
                ScimError::invalid_path(format!("'{}' is not multi-valued", segment.name))
            })?;
            let index = arr
                .iter()
                .position(|e| matches_filter(e, predicate))
                .ok_or_else(|| {
                    ScimError::no_target(format!(
                        "no element of '{}' matches the path filter",
                        segment.name
                    ))
                })?;
            let element = &mut arr[index];
            match mode {
                SetMode::Add => merge_element(element, value),
                SetMode::Replace => *element = value.clone(),
            }
            Ok(())
        }
        Some(predicate) => {
            // Target is a filtered sub-attribute of a multi-valued attribute:
            // when no element matches, create one seeded with the filter's
            // equality fields so "ensure typed item X has value Y" patches
            // are idempotent against empty collections.
            let key = path::find_key(obj, &segment.name).unwrap_or_else(|| segment.name.clone());
            let slot = obj.entry(key).or_insert_with(|| Value::Array(Vec::new()));
            let arr = slot.as_array_mut().ok_or_else(|| {
                ScimError::invalid_path(format!("'{}' is not multi-valued", segment.name))
            })?;
            let index = match arr.iter().position(|e| matches_filter(e, predicate)) {
                Some(i) => i,
                None => {
                    arr.push(Value::Object(seed_from_predicate(predicate)));
                    arr.len() - 1
                }
            };
            set_path(&mut arr[index], rest, value, mode)
        }
    }
}

fn merge_element(element: &mut Value, value: &Value) {
    match (element.as_object_mut(), value.as_object()) {
        (Some(elem), Some(patch)) => {
            for (name, v) in patch {
                let key = path::find_key(elem, name).unwrap_or_else(|| name.clone());
                elem.insert(key, v.clone());
            }
        }
        _ => *element = value.clone(),
    }
}

/// Fields a freshly created array element needs to satisfy its path filter:
/// the single-attribute `eq` comparisons, gathered across `and` groups.
fn seed_from_predicate(predicate: &FilterExpr) -> Map<String, Value> {
    let mut seed = Map::new();
    collect_eq_fields(predicate, &mut seed);
    seed
}

fn collect_eq_fields(expr: &FilterExpr, out: &mut Map<String, Value>) {
    match expr {
        FilterExpr::Compare {
            path,
            op: CompareOp::Eq,
            value,
        } => {
            if path.schema_urn.is_none()
                && path.segments.len() == 1
                && path.segments[0].predicate.is_none()
            {
                out.insert(path.segments[0].name.clone(), value.clone());
            }
        }
        FilterExpr::And(left, right) => {
            collect_eq_fields(left, out);
            collect_eq_fields(right, out);
        }
        FilterExpr::Group(inner) => collect_eq_fields(inner, out),
        _ => {}
    }
}

fn remove_path(current: &mut Value, segments: &[PathSegment]) {
    let (segment, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => return,
    };
    let obj = match current.as_object_mut() {
        Some(o) => o,
        None => return,
    };
    let key = match path::find_key(obj, &segment.name) {
        Some(k) => k,
        None => return,
    };

    match &segment.predicate {
        None if rest.is_empty() => {
            obj.remove(&key);
        }
        None => {
            if let Some(child) = obj.get_mut(&key) {
                remove_path(child, rest);
            }
        }
        Some(predicate) => {
            let arr = match obj.get_mut(&key).and_then(Value::as_array_mut) {
                Some(a) => a,
                None => return,
            };
            if rest.is_empty() {
                // Remove every matching element.
                arr.retain(|e| !matches_filter(e, predicate));
            } else {
                for element in arr.iter_mut() {
                    if matches_filter(element, predicate) {
                        remove_path(element, rest);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(verb: PatchOp, path: Option<&str>, value: Option<Value>) -> PatchOperation {
        PatchOperation {
            op: verb,
            path: path.map(String::from),
            value,
        }
    }

    #[test]
    fn add_without_path_merges_root() {
        let mut user = json!({"userName": "john"});
        apply_patch(
            &mut user,
            &op(PatchOp::Add, None, Some(json!({"displayName": "John Doe"}))),
        )
        .unwrap();
        assert_eq!(user["displayName"], "John Doe");
        assert_eq!(user["userName"], "john");
    }

    #[test]
    fn root_merge_skips_meta_and_rejects_id() {
        let mut user = json!({"id": "1", "meta": {"resourceType": "User"}});
        apply_patch(
            &mut user,
            &op(PatchOp::Add, None, Some(json!({"meta": {"resourceType": "X"}}))),
        )
        .unwrap();
        assert_eq!(user["meta"]["resourceType"], "User");

        let err = apply_patch(&mut user, &op(PatchOp::Add, None, Some(json!({"id": "2"}))))
            .unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::Mutability);
    }

    #[test]
    fn add_with_nested_path() {
        let mut user = json!({"name": {"givenName": "John"}});
        apply_patch(
            &mut user,
            &op(PatchOp::Add, Some("name.familyName"), Some(json!("Doe"))),
        )
        .unwrap();
        assert_eq!(user["name"]["familyName"], "Doe");
    }

    #[test]
    fn add_appends_to_multivalued() {
        let mut user = json!({"emails": [{"type": "work", "value": "w@x.com"}]});
        apply_patch(
            &mut user,
            &op(
                PatchOp::Add,
                Some("emails"),
                Some(json!({"type": "home", "value": "h@x.com"})),
            ),
        )
        .unwrap();
        assert_eq!(user["emails"].as_array().unwrap().len(), 2);

        apply_patch(
            &mut user,
            &op(
                PatchOp::Add,
                Some("emails"),
                Some(json!([{"type": "other", "value": "o@x.com"}, {"value": "p@x.com"}])),
            ),
        )
        .unwrap();
        assert_eq!(user["emails"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn replace_filtered_sub_attribute() {
        let mut user = json!({"emails": [
            {"type": "work", "value": "old@x.com"},
            {"type": "home", "value": "h@x.com"}
        ]});
        apply_patch(
            &mut user,
            &op(
                PatchOp::Replace,
                Some(r#"emails[type eq "work"].value"#),
                Some(json!("new@x.com")),
            ),
        )
        .unwrap();
        assert_eq!(user["emails"][0]["value"], "new@x.com");
        assert_eq!(user["emails"][1]["value"], "h@x.com");
    }

    #[test]
    fn replace_filtered_sub_attribute_creates_seeded_element() {
        // No work email: the patch must create one satisfying the filter.
        let mut user = json!({"userName": "john"});
        apply_patch(
            &mut user,
            &op(
                PatchOp::Replace,
                Some(r#"emails[type eq "work"].value"#),
                Some(json!("new@x.com")),
            ),
        )
        .unwrap();
        assert_eq!(
            user["emails"],
            json!([{"type": "work", "value": "new@x.com"}])
        );
    }

    #[test]
    fn replace_terminal_filtered_element_without_match_is_no_target() {
        let mut user = json!({"emails": [{"type": "home", "value": "h@x.com"}]});
        let err = apply_patch(
            &mut user,
            &op(
                PatchOp::Replace,
                Some(r#"emails[type eq "work"]"#),
                Some(json!({"type": "work", "value": "w@x.com"})),
            ),
        )
        .unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::NoTarget);
    }

    #[test]
    fn remove_filtered_elements() {
        let mut user = json!({"emails": [
            {"type": "work", "value": "a@x.com"},
            {"type": "home", "value": "b@x.com"},
            {"type": "work", "value": "c@x.com"}
        ]});
        apply_patch(
            &mut user,
            &op(PatchOp::Remove, Some(r#"emails[type eq "work"]"#), None),
        )
        .unwrap();
        assert_eq!(user["emails"], json!([{"type": "home", "value": "b@x.com"}]));
    }

    #[test]
    fn remove_absent_is_silent_noop() {
        let mut user = json!({"userName": "john"});
        let before = user.clone();
        apply_patch(
            &mut user,
            &op(PatchOp::Remove, Some(r#"emails[type eq "fax"]"#), None),
        )
        .unwrap();
        assert_eq!(user, before);
        apply_patch(&mut user, &op(PatchOp::Remove, Some("title"), None)).unwrap();
        assert_eq!(user, before);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut once = json!({"title": "boss", "userName": "john"});
        let remove = op(PatchOp::Remove, Some("title"), None);
        apply_patch(&mut once, &remove).unwrap();
        let mut twice = once.clone();
        apply_patch(&mut twice, &remove).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn remove_without_path_is_no_target() {
        let mut user = json!({"userName": "john"});
        let err = apply_patch(&mut user, &op(PatchOp::Remove, None, None)).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::NoTarget);
    }

    #[test]
    fn missing_intermediate_is_no_target() {
        let mut user = json!({"userName": "john"});
        let err = apply_patch(
            &mut user,
            &op(PatchOp::Add, Some("name.familyName"), Some(json!("Doe"))),
        )
        .unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::NoTarget);
    }

    #[test]
    fn write_to_immutable_attribute_is_mutability_error() {
        let mut user = json!({"id": "1", "meta": {"version": "W/\"a\""}});
        for operation in [
            op(PatchOp::Replace, Some("id"), Some(json!("2"))),
            op(PatchOp::Add, Some("meta.version"), Some(json!("W/\"b\""))),
            op(PatchOp::Remove, Some("id"), None),
        ] {
            let err = apply_patch(&mut user, &operation).unwrap_err();
            assert_eq!(err.kind, ScimErrorKind::Mutability);
        }
    }

    #[test]
    fn extension_container_created_lazily() {
        let urn = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";
        let mut user = json!({"userName": "john"});
        apply_patch(
            &mut user,
            &op(
                PatchOp::Add,
                Some(&format!("{urn}:employeeNumber")),
                Some(json!("701984")),
            ),
        )
        .unwrap();
        assert_eq!(user[urn]["employeeNumber"], "701984");

        // Remove against a missing container is a no-op.
        let mut other = json!({"userName": "jane"});
        apply_patch(
            &mut other,
            &op(PatchOp::Remove, Some(&format!("{urn}:employeeNumber")), None),
        )
        .unwrap();
        assert_eq!(other, json!({"userName": "jane"}));
    }

    #[test]
    fn request_applies_in_order_and_aborts_on_failure() {
        let mut user = json!({"userName": "john"});
        let request = PatchRequest::new(vec![
            op(PatchOp::Add, Some("displayName"), Some(json!("John"))),
            op(PatchOp::Replace, Some("id"), Some(json!("2"))),
        ]);
        let err = apply_patch_request(&mut user, &request).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::Mutability);
        // First op did apply; the caller discards the snapshot on error.
        assert_eq!(user["displayName"], "John");
    }

    #[test]
    fn unknown_verb_is_invalid_value() {
        let body = json!({
            "schemas": [SCHEMA_PATCH_OP],
            "Operations": [{"op": "merge", "path": "userName", "value": "x"}]
        });
        let err = PatchRequest::from_value(body).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::InvalidValue);
    }

    #[test]
    fn case_insensitive_target_names() {
        let mut user = json!({"displayName": "Old"});
        apply_patch(
            &mut user,
            &op(PatchOp::Replace, Some("displayname"), Some(json!("New"))),
        )
        .unwrap();
        assert_eq!(user["displayName"], "New");
        assert!(user.get("displayname").is_none());
    }
}
