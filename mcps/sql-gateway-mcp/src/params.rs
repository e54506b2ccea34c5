//! Parameter types for SQL gateway tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::builder::TableQuery;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteQueryParams {
    #[schemars(description = "SQL to run. Only SELECT statements are accepted.")]
    pub query: String,

    #[schemars(description = "Timeout in seconds (optional, clamped to server max)")]
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryTableParams {
    #[schemars(description = "Table to read, optionally schema-qualified (e.g. 'public.orders')")]
    pub table: String,

    #[schemars(description = "Comma-separated columns to return (optional, defaults to all)")]
    #[serde(default)]
    pub columns: Option<String>,

    #[schemars(description = "WHERE clause body without the keyword, e.g. 'total > 100'")]
    #[serde(default)]
    pub filter: Option<String>,

    #[schemars(description = "Maximum number of rows to return (positive integer)")]
    #[serde(default)]
    pub limit: Option<i64>,

    #[schemars(description = "Timeout in seconds (optional, clamped to server max)")]
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl From<&QueryTableParams> for TableQuery {
    fn from(params: &QueryTableParams) -> Self {
        TableQuery {
            table: params.table.clone(),
            columns: params.columns.clone(),
            filter: params.filter.clone(),
            limit: params.limit,
        }
    }
}
