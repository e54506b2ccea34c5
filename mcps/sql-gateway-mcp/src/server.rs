//! MCP Server implementation for the read-only SQL gateway
//!
//! Defines the tool surface. Handler implementations are in the handlers module.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;

use crate::adapter::PgConnector;
use crate::config::{ConfigError, GatewayConfig};
use crate::gateway::Gateway;
use crate::handlers;
use crate::params::*;
use crate::registry::{DispatchError, DispatchResult, InProcessServer};

const INSTRUCTIONS: &str = "Read-only SQL gateway. Only SELECT statements reach the database; \
     anything else is rejected before a connection is opened. \
     Use execute_query for raw SELECT text, query_table for table/columns/filter/limit \
     requests, list_tables and list_views to discover what can be queried.";

/// The SQL Gateway MCP Server
#[derive(Clone)]
pub struct SqlGatewayMcpServer {
    gateway: Gateway,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl SqlGatewayMcpServer {
    /// Create a server over an existing gateway
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    /// Validate `config` and connect the gateway to PostgreSQL
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let descriptor = config.validate()?;
        let connector = Arc::new(PgConnector::new(&descriptor));
        Ok(Self::new(Gateway::new(connector, config.limits.clone())))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[tool(
        description = "Execute a read-only SQL query. Only SELECT statements are allowed; \
                       returns rows as JSON objects keyed by column name."
    )]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::execute_query(&self.gateway, params).await
    }

    #[tool(
        description = "Query a table by name with optional columns, filter (WHERE body) and row limit."
    )]
    async fn query_table(
        &self,
        Parameters(params): Parameters<QueryTableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::query_table(&self.gateway, params).await
    }

    #[tool(description = "List user tables with their schema, name and type.")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        handlers::list_tables(&self.gateway).await
    }

    #[tool(description = "List user views with their schema, name and definition.")]
    async fn list_views(&self) -> Result<CallToolResult, McpError> {
        handlers::list_views(&self.gateway).await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for SqlGatewayMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// In-process Dispatch
// ============================================================================

#[async_trait]
impl InProcessServer for SqlGatewayMcpServer {
    fn server_name(&self) -> &str {
        "sql-gateway"
    }

    fn server_description(&self) -> Option<&str> {
        Some(INSTRUCTIONS)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> DispatchResult<CallToolResult> {
        match name {
            "execute_query" => {
                let params: ExecuteQueryParams = serde_json::from_value(params)?;
                self.execute_query(Parameters(params)).await.map_err(Into::into)
            }

            "query_table" => {
                let params: QueryTableParams = serde_json::from_value(params)?;
                self.query_table(Parameters(params)).await.map_err(Into::into)
            }

            "list_tables" => self.list_tables().await.map_err(Into::into),

            "list_views" => self.list_views().await.map_err(Into::into),

            _ => Err(DispatchError::ToolNotFound(name.to_string())),
        }
    }
}
