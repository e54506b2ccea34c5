//! Tool handlers
//!
//! Each handler runs one gateway operation and renders the outcome as a
//! `CallToolResult`. Errors keep their kind in the MCP error `data` so clients
//! can branch on it without parsing messages.

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;
use serde_json::json;

use crate::builder::TableQuery;
use crate::gateway::Gateway;
use crate::params::*;
use crate::types::{GatewayError, QueryOutput};

// ============================================================================
// Helper Functions
// ============================================================================

/// Pretty-printed JSON tool result
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

pub fn gateway_error_to_mcp(err: GatewayError) -> McpError {
    let mut data = json!({ "kind": err.kind().as_str() });
    if let GatewayError::Policy(rejection) = &err {
        data["rule"] = json!(rejection.rule());
    }

    match &err {
        GatewayError::Policy(_) | GatewayError::Build(_) => {
            McpError::invalid_params(err.to_string(), Some(data))
        }
        GatewayError::Connection { .. } | GatewayError::Execution(_) => {
            McpError::internal_error(err.to_string(), Some(data))
        }
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn execute_query(
    gateway: &Gateway,
    params: ExecuteQueryParams,
) -> Result<CallToolResult, McpError> {
    let rows = gateway
        .execute_query(&params.query, params.timeout_secs)
        .await
        .map_err(gateway_error_to_mcp)?;

    json_success(&QueryOutput::from(rows))
}

pub async fn query_table(
    gateway: &Gateway,
    params: QueryTableParams,
) -> Result<CallToolResult, McpError> {
    let request = TableQuery::from(&params);
    let rows = gateway
        .query_table(&request, params.timeout_secs)
        .await
        .map_err(gateway_error_to_mcp)?;

    json_success(&QueryOutput::from(rows))
}

pub async fn list_tables(gateway: &Gateway) -> Result<CallToolResult, McpError> {
    let tables = gateway.list_tables().await.map_err(gateway_error_to_mcp)?;
    json_success(&tables)
}

pub async fn list_views(gateway: &Gateway) -> Result<CallToolResult, McpError> {
    let views = gateway.list_views().await.map_err(gateway_error_to_mcp)?;
    json_success(&views)
}
