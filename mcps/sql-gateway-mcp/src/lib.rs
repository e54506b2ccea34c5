//! SQL Gateway MCP Library
//!
//! Read-only query gateway over a PostgreSQL database. Caller SQL is checked
//! by a keyword classifier before any connection is opened; structured table
//! queries are rendered to SQL and checked the same way.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use sql_gateway_mcp::{GatewayConfig, SqlGatewayMcpServer};
//!
//! let config = GatewayConfig::load(None)?;
//! let server = SqlGatewayMcpServer::from_config(&config)?;
//! // Serve via stdio, or call tools in-process through `InProcessServer`
//! ```

pub mod adapter;
pub mod builder;
pub mod classifier;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod params;
pub mod probe;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod types;

// Re-export main server type
pub use server::SqlGatewayMcpServer;

pub use builder::TableQuery;
pub use classifier::{classify, Rejection, Verdict};
pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use registry::InProcessServer;
pub use types::{ErrorKind, GatewayError, ResultRecord, ResultSet, TableInfo, ViewInfo};

// Re-export parameter types for direct API usage
pub use params::*;
