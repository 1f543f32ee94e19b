//! The composed list-query pipeline (RFC 7644 §3.4.2):
//! filter → total → sort → paginate → project.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ScimEngineOptions;
use crate::error::ScimResult;
use crate::sort::SortOrder;
use crate::types::ListResponse;
use crate::{filter, projection, sort};

/// List-query parameters as the gateway marshals them. `attributes` and
/// `excludedAttributes` are mutually exclusive; enforcing that is the
/// boundary's job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    #[serde(
        default,
        rename = "excludedAttributes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub excluded_attributes: Vec<String>,
    #[serde(default, rename = "startIndex", skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, rename = "sortBy", skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, rename = "sortOrder")]
    pub sort_order: SortOrder,
}

/// Run a list query over a snapshot of all candidate resources.
///
/// `totalResults` counts the post-filter, pre-page set; projection applies
/// only to the returned page.
pub fn process_list_query(
    all: Vec<Value>,
    params: &QueryParams,
    options: &ScimEngineOptions,
) -> ScimResult<ListResponse<Value>> {
    let mut resources = all;

    if let Some(filter_str) = &params.filter {
        if let Some(expr) = filter::parse_filter(filter_str)? {
            resources.retain(|r| filter::matches_filter(r, &expr));
        }
    }
    let total = resources.len();

    if let Some(sort_by) = &params.sort_by {
        sort::sort_resources(&mut resources, sort_by, params.sort_order);
    }

    let count = params
        .count
        .unwrap_or(options.max_results)
        .min(options.max_results);
    let page = sort::paginate(resources, params.start_index.unwrap_or(1), count);

    let projected = page
        .resources
        .iter()
        .map(|r| projection::project_resource(r, &params.attributes, &params.excluded_attributes))
        .collect();

    Ok(ListResponse::new(
        projected,
        total,
        page.start_index,
        page.items_per_page,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Vec<Value> {
        vec![
            json!({"id": "1", "userName": "alice", "active": true}),
            json!({"id": "2", "userName": "bob", "active": false}),
            json!({"id": "3", "userName": "carol", "active": true}),
        ]
    }

    #[test]
    fn defaults_return_everything() {
        let resp =
            process_list_query(users(), &QueryParams::default(), &ScimEngineOptions::default())
                .unwrap();
        assert_eq!(resp.total_results, 3);
        assert_eq!(resp.items_per_page, 3);
        assert_eq!(resp.start_index, 1);
    }

    #[test]
    fn total_is_post_filter_pre_page() {
        let params = QueryParams {
            filter: Some("active eq true".to_string()),
            count: Some(1),
            ..Default::default()
        };
        let resp = process_list_query(users(), &params, &ScimEngineOptions::default()).unwrap();
        assert_eq!(resp.total_results, 2);
        assert_eq!(resp.items_per_page, 1);
    }

    #[test]
    fn bad_filter_aborts_the_query() {
        let params = QueryParams {
            filter: Some("userName zz \"x\"".to_string()),
            ..Default::default()
        };
        assert!(process_list_query(users(), &params, &ScimEngineOptions::default()).is_err());
    }

    #[test]
    fn count_is_capped_by_max_results() {
        let options = ScimEngineOptions {
            max_results: 2,
            ..Default::default()
        };
        let params = QueryParams {
            count: Some(100),
            ..Default::default()
        };
        let resp = process_list_query(users(), &params, &options).unwrap();
        assert_eq!(resp.items_per_page, 2);
        assert_eq!(resp.total_results, 3);
    }

    #[test]
    fn projection_applies_to_page_only() {
        let params = QueryParams {
            attributes: vec!["userName".to_string()],
            sort_by: Some("userName".to_string()),
            sort_order: SortOrder::Descending,
            count: Some(1),
            ..Default::default()
        };
        let resp = process_list_query(users(), &params, &ScimEngineOptions::default()).unwrap();
        assert_eq!(resp.resources.len(), 1);
        let first = resp.resources[0].as_object().unwrap();
        assert_eq!(first.get("userName"), Some(&json!("carol")));
        assert!(first.contains_key("id"));
        assert!(!first.contains_key("active"));
    }
}
