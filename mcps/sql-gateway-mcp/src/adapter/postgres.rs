//! PostgreSQL connector backed by a single `sqlx` connection

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection as _, Either, Row, TypeInfo};

use super::{Connection, Connector, RawRows};
use crate::config::ConnectionDescriptor;
use crate::types::{GatewayError, GatewayResult};

const APPLICATION_NAME: &str = "sql-gateway-mcp";

/// SQLSTATE for a statement cancelled by `statement_timeout`
const QUERY_CANCELED: &str = "57014";

/// Opens one `PgConnection` per request
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    descriptor: ConnectionDescriptor,
}

impl PgConnector {
    pub fn new(descriptor: &ConnectionDescriptor) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .database(&descriptor.database)
            .username(&descriptor.username)
            .ssl_mode(descriptor.ssl_mode)
            .application_name(APPLICATION_NAME);

        if let Some(password) = &descriptor.password {
            options = options.password(password);
        }
        if descriptor.read_only_session {
            options = options.options([("default_transaction_read_only", "on")]);
        }
        if !descriptor.options.is_empty() {
            options = options.options(descriptor.options.iter());
        }

        Self {
            options,
            descriptor: descriptor.clone(),
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> GatewayResult<Box<dyn Connection>> {
        let timeout = self.descriptor.connect_timeout;
        let conn = tokio::time::timeout(timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                GatewayError::connection(format!(
                    "connection to {} timed out after {:?}",
                    self.target(),
                    timeout
                ))
            })?
            .map_err(|e| map_connection_error(e, &self.descriptor))?;

        tracing::debug!(target_db = %self.target(), "Opened connection");
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }

    fn target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.descriptor.host, self.descriptor.port, self.descriptor.database
        )
    }
}

/// A connection that is `None` once released
struct PgSession {
    conn: Option<PgConnection>,
}

#[async_trait]
impl Connection for PgSession {
    async fn fetch(&mut self, sql: &str, timeout: Duration) -> GatewayResult<RawRows> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| GatewayError::Execution("connection already closed".to_string()))?;

        // The server cancels the statement itself once the deadline passes
        let set_timeout = statement_timeout_sql(timeout);
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&set_timeout))
            .await
            .map_err(|e| GatewayError::Execution(format_query_error(e)))?;

        // Simple-query protocol so multi-statement text runs as sent. Only the
        // first result set is kept, but the stream is drained to completion.
        let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
        let mut raw = RawRows::default();
        let mut first_set_done = false;

        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| query_error(e, timeout))?
        {
            match item {
                Either::Left(_) => first_set_done = true,
                Either::Right(row) if !first_set_done => {
                    if raw.columns.is_empty() {
                        raw.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    raw.rows.push(convert_row(&row));
                }
                Either::Right(_) => {}
            }
        }

        Ok(raw)
    }

    async fn close(&mut self) -> GatewayResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| GatewayError::connection_with_source("failed to close connection", e)),
            None => Ok(()),
        }
    }
}

/// `SET statement_timeout` for `timeout`, never below 1ms since 0 disables it
fn statement_timeout_sql(timeout: Duration) -> String {
    let millis = timeout.as_millis().clamp(1, i32::MAX as u128);
    format!("SET statement_timeout = {}", millis)
}

fn query_error(error: sqlx::Error, timeout: Duration) -> GatewayError {
    let cancelled = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == QUERY_CANCELED);

    if cancelled {
        GatewayError::Execution(format!("query timed out after {:?}", timeout))
    } else {
        GatewayError::Execution(format_query_error(error))
    }
}

/// Converts a row into JSON values, column by column
fn convert_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decode by declared type, falling back to the server's text rendering
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let typed = match type_name.to_uppercase().as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map(|v| v.map(Value::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|v| v.map(Value::from)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| v.map(Value::from)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map(Value::from)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.and_then(|f| serde_json::Number::from_f64(f as f64)).map(Value::Number)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.and_then(serde_json::Number::from_f64).map(Value::Number)),
        "JSON" | "JSONB" => row
            .try_get_unchecked::<Option<String>, _>(index)
            .map(|v| v.and_then(|text| serde_json::from_str(&text).ok())),
        _ => Ok(None),
    };

    match typed {
        Ok(Some(value)) => value,
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Maps sqlx connection errors to actionable messages, keeping the cause
fn map_connection_error(error: sqlx::Error, descriptor: &ConnectionDescriptor) -> GatewayError {
    let host = &descriptor.host;
    let port = descriptor.port;
    let error_str = error.to_string().to_lowercase();

    let message = if error_str.contains("connection refused")
        || error_str.contains("could not connect")
        || error_str.contains("failed to lookup address")
    {
        format!("cannot connect to {host}:{port}; check that the server is running")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        format!(
            "authentication failed for user '{}'; check the credentials",
            descriptor.username
        )
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        format!("database '{}' does not exist", descriptor.database)
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        "TLS negotiation failed; check ssl_mode".to_string()
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        format!("connection to {host}:{port} timed out")
    } else {
        error.to_string()
    };

    GatewayError::connection_with_source(message, error)
}

/// Formats a driver error with the server's detail and hint, when present
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
