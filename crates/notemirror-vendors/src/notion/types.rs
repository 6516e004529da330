//! Notion API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Page property map, keyed by property name.
pub type Properties = Map<String, Value>;

/// A database page. Properties are kept as raw JSON; [`super::properties`]
/// knows how to read the ones notes use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub properties: Properties,
}

/// One page of `databases/{id}/query` results.
#[derive(Debug, Clone, Deserialize)]
pub struct PageList {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryDatabaseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub struct DatabaseParent<'a> {
    pub database_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreatePageRequest<'a> {
    pub parent: DatabaseParent<'a>,
    pub properties: &'a Properties,
}

#[derive(Debug, Default, Serialize)]
pub struct UpdatePageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<&'a Properties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
