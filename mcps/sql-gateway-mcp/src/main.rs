//! SQL Gateway MCP - read-only SQL queries over MCP
//!
//! Serves the gateway over stdio. `--check` probes the configured database and
//! exits instead of serving.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};

use sql_gateway_mcp::adapter::PgConnector;
use sql_gateway_mcp::probe::{probe, spawn_startup_check};
use sql_gateway_mcp::{telemetry, Gateway, GatewayConfig, SqlGatewayMcpServer};

#[derive(Parser, Debug)]
#[command(name = "sql-gateway-mcp", version, about = "Read-only SQL gateway MCP server")]
struct Cli {
    /// Config file (defaults to $SQL_GATEWAY_CONFIG_PATH or ~/.binks/sql-gateway.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Check connectivity to the configured database and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing("sql_gateway_mcp")?;

    let config = GatewayConfig::load(cli.config.as_deref())?;
    let descriptor = config.validate()?;
    let connector = Arc::new(PgConnector::new(&descriptor));
    let deadline = config.limits.deadline(None);

    if cli.check {
        let report = probe(&descriptor, &*connector, deadline).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_ok() {
            anyhow::bail!("connectivity check failed for {}", report.target);
        }
        return Ok(());
    }

    tracing::info!("Starting sql_gateway_mcp MCP Server");

    // Advisory only; errors are reported per tool call
    spawn_startup_check(descriptor, connector.clone(), deadline);

    let server = SqlGatewayMcpServer::new(Gateway::new(connector, config.limits.clone()));
    let service = server.serve(stdio()).await?;

    tracing::info!("Server running, waiting for requests...");

    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
