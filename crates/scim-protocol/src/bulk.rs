//! SCIM bulk operations (RFC 7644 §3.7).
//!
//! A batch may reference resources created by earlier operations through the
//! sentinel string `bulkId:<id>` anywhere in a payload. Before anything
//! executes, the batch is validated: duplicate bulkIds and circular
//! references reject the whole batch. Execution is strictly sequential in
//! submission order; after each success the assigned id replaces the
//! sentinel in later payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ScimEngineOptions;
use crate::error::{ScimError, ScimErrorKind, ScimErrorResponse, ScimResult};
use crate::types::{SCHEMA_BULK_REQUEST, SCHEMA_BULK_RESPONSE};

/// The literal substitution-token prefix.
pub const BULK_ID_PREFIX: &str = "bulkId:";

/// HTTP method of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BulkMethod {
    Post,
    Put,
    Patch,
    Delete,
}

/// SCIM bulk request body (RFC 7644 §3.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "failOnErrors", skip_serializing_if = "Option::is_none")]
    pub fail_on_errors: Option<usize>,
    #[serde(rename = "Operations")]
    pub operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn new(operations: Vec<BulkOperation>) -> Self {
        Self {
            schemas: vec![SCHEMA_BULK_REQUEST.to_string()],
            fail_on_errors: None,
            operations,
        }
    }
}

/// One operation of a bulk batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub method: BulkMethod,
    #[serde(rename = "bulkId", skip_serializing_if = "Option::is_none")]
    pub bulk_id: Option<String>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// SCIM bulk response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<BulkResponseOperation>,
}

/// Per-operation result in a bulk response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponseOperation {
    pub method: BulkMethod,
    #[serde(rename = "bulkId", skip_serializing_if = "Option::is_none")]
    pub bulk_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// What the caller's executor reports back for one successful operation.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub status: u16,
    pub location: Option<String>,
    /// Persisted id assigned to the operation's resource; substituted into
    /// later operations' pending `bulkId:<id>` references.
    pub resource_id: Option<String>,
    pub response: Option<Value>,
}

/// Pre-execution batch validation: size cap, duplicate bulkIds, and circular
/// bulkId references. Any failure here rejects the whole batch.
pub fn validate_batch(request: &BulkRequest, options: &ScimEngineOptions) -> ScimResult<()> {
    if request.operations.len() > options.bulk_max_operations {
        return Err(ScimError::with_detail(
            ScimErrorKind::TooMany,
            format!(
                "batch of {} operations exceeds the limit of {}",
                request.operations.len(),
                options.bulk_max_operations
            ),
        ));
    }
    let index = bulk_id_index(request)?;
    detect_cycles(request, &index)
}

fn bulk_id_index(request: &BulkRequest) -> ScimResult<HashMap<String, usize>> {
    let mut index = HashMap::new();
    for (i, operation) in request.operations.iter().enumerate() {
        if let Some(id) = &operation.bulk_id {
            if index.insert(id.clone(), i).is_some() {
                return Err(ScimError::invalid_value(format!("duplicate bulkId: {id}")));
            }
        }
    }
    Ok(index)
}

/// Collect `bulkId:<id>` sentinels at any depth of a payload.
fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(id) = s.strip_prefix(BULK_ID_PREFIX) {
                out.push(id.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Value::Object(obj) => {
            for v in obj.values() {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color DFS over the in-batch reference graph. References to ids not
/// defined in the batch are left for execution time; they cannot close a
/// cycle.
fn detect_cycles(request: &BulkRequest, index: &HashMap<String, usize>) -> ScimResult<()> {
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    for (id, &i) in index {
        let mut refs = Vec::new();
        if let Some(data) = &request.operations[i].data {
            collect_refs(data, &mut refs);
        }
        refs.retain(|r| index.contains_key(r));
        graph.insert(id.clone(), refs);
    }

    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut trail: Vec<String> = Vec::new();
    // Batch order keeps cycle discovery deterministic.
    for operation in &request.operations {
        if let Some(id) = &operation.bulk_id {
            if colors.get(id).copied().unwrap_or(Color::White) == Color::White {
                visit(id, &graph, &mut colors, &mut trail)?;
            }
        }
    }
    Ok(())
}

fn visit(
    id: &str,
    graph: &HashMap<String, Vec<String>>,
    colors: &mut HashMap<String, Color>,
    trail: &mut Vec<String>,
) -> ScimResult<()> {
    colors.insert(id.to_string(), Color::Gray);
    trail.push(id.to_string());
    if let Some(deps) = graph.get(id) {
        for dep in deps {
            match colors.get(dep.as_str()).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    // Back-edge: the cycle is the trail from the revisited
                    // node, in discovery order.
                    let start = trail.iter().position(|t| t == dep).unwrap_or(0);
                    let cycle = trail[start..].join(" -> ");
                    return Err(ScimError::invalid_value(format!(
                        "circular bulkId reference: {cycle} -> {dep}"
                    )));
                }
                Color::White => visit(dep, graph, colors, trail)?,
                Color::Black => {}
            }
        }
    }
    trail.pop();
    colors.insert(id.to_string(), Color::Black);
    Ok(())
}

/// Validate a batch and run it sequentially in submission order. The caller
/// supplies the executor that performs one operation against its store.
///
/// Per-operation failures are reported in the response and do not abort
/// siblings unless the fail-fast threshold triggers, in which case the
/// remaining operations are skipped and partial results returned.
pub fn execute_batch<F>(
    request: &BulkRequest,
    options: &ScimEngineOptions,
    mut execute: F,
) -> ScimResult<BulkResponse>
where
    F: FnMut(&BulkOperation) -> ScimResult<BulkOutcome>,
{
    validate_batch(request, options)?;

    let fail_limit = request.fail_on_errors.or(options.default_fail_on_errors);
    let mut operations = request.operations.clone();
    let mut results = Vec::with_capacity(operations.len());
    let mut failures = 0usize;

    for i in 0..operations.len() {
        let method = operations[i].method;
        let bulk_id = operations[i].bulk_id.clone();

        match execute(&operations[i]) {
            Ok(outcome) => {
                if let (Some(id), Some(resource_id)) = (&bulk_id, &outcome.resource_id) {
                    let sentinel = format!("{BULK_ID_PREFIX}{id}");
                    for later in operations[i + 1..].iter_mut() {
                        if let Some(data) = later.data.as_mut() {
                            substitute_refs(data, &sentinel, resource_id);
                        }
                    }
                }
                results.push(BulkResponseOperation {
                    method,
                    bulk_id,
                    status: outcome.status.to_string(),
                    location: outcome.location,
                    response: outcome.response,
                });
            }
            Err(err) => {
                failures += 1;
                results.push(BulkResponseOperation {
                    method,
                    bulk_id,
                    status: err.kind.status().to_string(),
                    location: None,
                    response: serde_json::to_value(ScimErrorResponse::from(&err)).ok(),
                });
                if fail_limit.is_some_and(|limit| failures >= limit) {
                    break;
                }
            }
        }
    }

    Ok(BulkResponse {
        schemas: vec![SCHEMA_BULK_RESPONSE.to_string()],
        operations: results,
    })
}

/// Rewrite pending sentinels to the resolved id. Only whole-string matches
/// count: the token is exactly `bulkId:<id>`.
fn substitute_refs(value: &mut Value, sentinel: &str, resolved: &str) {
    match value {
        Value::String(s) => {
            if s == sentinel {
                *s = resolved.to_string();
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_refs(item, sentinel, resolved);
            }
        }
        Value::Object(obj) => {
            for v in obj.values_mut() {
                substitute_refs(v, sentinel, resolved);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(bulk_id: &str, data: Value) -> BulkOperation {
        BulkOperation {
            method: BulkMethod::Post,
            bulk_id: Some(bulk_id.to_string()),
            path: "/Users".to_string(),
            data: Some(data),
            version: None,
        }
    }

    #[test]
    fn duplicate_bulk_id_rejects_batch() {
        let request = BulkRequest::new(vec![
            post("qux", json!({"userName": "a"})),
            post("qux", json!({"userName": "b"})),
        ]);
        let err = validate_batch(&request, &ScimEngineOptions::default()).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::InvalidValue);
        assert!(err.detail.contains("duplicate bulkId"));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let request = BulkRequest::new(vec![post(
            "a",
            json!({"manager": {"value": "bulkId:a"}}),
        )]);
        let err = validate_batch(&request, &ScimEngineOptions::default()).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::InvalidValue);
        assert!(err.detail.contains("circular bulkId reference"));
    }

    #[test]
    fn two_cycle_rejects_batch_before_execution() {
        let request = BulkRequest::new(vec![
            post("a", json!({"manager": {"value": "bulkId:b"}})),
            post("b", json!({"manager": {"value": "bulkId:a"}})),
        ]);
        let mut executed = 0;
        let err = execute_batch(&request, &ScimEngineOptions::default(), |_| {
            executed += 1;
            Ok(BulkOutcome::default())
        })
        .unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::InvalidValue);
        assert_eq!(executed, 0);
    }

    #[test]
    fn long_indirect_cycle_is_caught() {
        let request = BulkRequest::new(vec![
            post("a", json!({"next": "bulkId:b"})),
            post("b", json!({"next": "bulkId:c"})),
            post("c", json!({"next": "bulkId:d"})),
            post("d", json!({"next": "bulkId:a"})),
        ]);
        let err = validate_batch(&request, &ScimEngineOptions::default()).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::InvalidValue);
    }

    #[test]
    fn refs_are_found_at_any_depth() {
        let request = BulkRequest::new(vec![
            post("a", json!({"nested": {"list": [{"deep": "bulkId:b"}]}})),
            post("b", json!({"flat": "bulkId:a"})),
        ]);
        assert!(validate_batch(&request, &ScimEngineOptions::default()).is_err());
    }

    #[test]
    fn acyclic_chain_passes_validation() {
        let request = BulkRequest::new(vec![
            post("a", json!({"userName": "root"})),
            post("b", json!({"manager": {"value": "bulkId:a"}})),
            post("c", json!({"manager": {"value": "bulkId:b"}})),
        ]);
        assert!(validate_batch(&request, &ScimEngineOptions::default()).is_ok());
    }

    #[test]
    fn out_of_batch_reference_is_not_a_planning_error() {
        let request = BulkRequest::new(vec![post(
            "a",
            json!({"manager": {"value": "bulkId:someone-else"}}),
        )]);
        assert!(validate_batch(&request, &ScimEngineOptions::default()).is_ok());
    }

    #[test]
    fn oversized_batch_is_too_many() {
        let options = ScimEngineOptions {
            bulk_max_operations: 1,
            ..Default::default()
        };
        let request = BulkRequest::new(vec![
            post("a", json!({})),
            post("b", json!({})),
        ]);
        let err = validate_batch(&request, &options).unwrap_err();
        assert_eq!(err.kind, ScimErrorKind::TooMany);
    }

    #[test]
    fn execution_substitutes_assigned_ids() {
        let request = BulkRequest::new(vec![
            post("a", json!({"userName": "root"})),
            post("b", json!({"manager": {"value": "bulkId:a"}})),
        ]);
        let mut seen = Vec::new();
        let response = execute_batch(&request, &ScimEngineOptions::default(), |op| {
            seen.push(op.data.clone());
            Ok(BulkOutcome {
                status: 201,
                resource_id: Some(format!("id-{}", op.bulk_id.clone().unwrap_or_default())),
                ..Default::default()
            })
        })
        .unwrap();
        assert_eq!(response.operations.len(), 2);
        assert_eq!(response.operations[0].status, "201");
        // The second operation executed with the first one's assigned id.
        assert_eq!(seen[1], Some(json!({"manager": {"value": "id-a"}})));
    }

    #[test]
    fn per_operation_failures_do_not_abort_siblings() {
        let request = BulkRequest::new(vec![
            post("a", json!({})),
            post("b", json!({})),
            post("c", json!({})),
        ]);
        let response = execute_batch(&request, &ScimEngineOptions::default(), |op| {
            if op.bulk_id.as_deref() == Some("b") {
                Err(ScimError::invalid_value("bad payload"))
            } else {
                Ok(BulkOutcome { status: 201, ..Default::default() })
            }
        })
        .unwrap();
        let statuses: Vec<_> = response.operations.iter().map(|o| o.status.as_str()).collect();
        assert_eq!(statuses, vec!["201", "400", "201"]);
        assert!(response.operations[1].response.is_some());
    }

    #[test]
    fn fail_on_errors_halts_with_partial_results() {
        let mut request = BulkRequest::new(vec![
            post("a", json!({})),
            post("b", json!({})),
            post("c", json!({})),
        ]);
        request.fail_on_errors = Some(1);
        let response = execute_batch(&request, &ScimEngineOptions::default(), |_| {
            Err(ScimError::invalid_value("always fails"))
        })
        .unwrap();
        assert_eq!(response.operations.len(), 1);
    }

    #[test]
    fn response_carries_bulk_response_urn() {
        let request = BulkRequest::new(vec![]);
        let response = execute_batch(&request, &ScimEngineOptions::default(), |_| {
            Ok(BulkOutcome::default())
        })
        .unwrap();
        assert_eq!(response.schemas, vec![SCHEMA_BULK_RESPONSE.to_string()]);
    }
}
