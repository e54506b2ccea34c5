//! Gateway operations
//!
//! Composes the classifier, the builder and the execution adapter into the four
//! operations the transport exposes.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{self, Connector};
use crate::builder::TableQuery;
use crate::classifier::{self, Verdict};
use crate::config::LimitsConfig;
use crate::types::{GatewayError, GatewayResult, ResultRecord, ResultSet, TableInfo, ViewInfo};

pub const LIST_TABLES_SQL: &str = "\
SELECT table_schema AS \"schema\", table_name AS \"name\", table_type AS \"type\" \
FROM information_schema.tables \
WHERE table_type = 'BASE TABLE' \
AND table_schema NOT IN ('pg_catalog', 'information_schema') \
AND table_schema NOT LIKE 'pg\\_toast%' \
ORDER BY table_schema, table_name";

pub const LIST_VIEWS_SQL: &str = "\
SELECT table_schema AS \"schema\", table_name AS \"name\", view_definition AS \"definition\" \
FROM information_schema.views \
WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
ORDER BY table_schema, table_name";

/// Stateless front door over one database
#[derive(Clone)]
pub struct Gateway {
    connector: Arc<dyn Connector>,
    limits: LimitsConfig,
}

impl Gateway {
    pub fn new(connector: Arc<dyn Connector>, limits: LimitsConfig) -> Self {
        Self { connector, limits }
    }

    pub fn target(&self) -> String {
        self.connector.target()
    }

    /// Classify caller SQL and run it when allowed
    pub async fn execute_query(
        &self,
        query: &str,
        timeout_secs: Option<u64>,
    ) -> GatewayResult<ResultSet> {
        if let Verdict::Rejected(rejection) = classifier::classify(query) {
            tracing::warn!(rule = rejection.rule(), "Rejected query: {}", rejection);
            return Err(GatewayError::Policy(rejection));
        }

        tracing::debug!(query = %query, "Executing query");
        self.run(query, timeout_secs).await
    }

    /// Render a structured request, then treat it as caller SQL
    pub async fn query_table(
        &self,
        request: &TableQuery,
        timeout_secs: Option<u64>,
    ) -> GatewayResult<ResultSet> {
        let sql = request.build()?;
        self.execute_query(&sql, timeout_secs).await
    }

    /// Base tables outside the system schemas
    pub async fn list_tables(&self) -> GatewayResult<Vec<TableInfo>> {
        let rows = self.run(LIST_TABLES_SQL, None).await?;
        rows.into_iter().map(decode_record).collect()
    }

    /// Views outside the system schemas, with their definitions
    pub async fn list_views(&self) -> GatewayResult<Vec<ViewInfo>> {
        let rows = self.run(LIST_VIEWS_SQL, None).await?;
        rows.into_iter().map(decode_record).collect()
    }

    async fn run(&self, sql: &str, timeout_secs: Option<u64>) -> GatewayResult<ResultSet> {
        let deadline: Duration = self.limits.deadline(timeout_secs);
        adapter::execute(self.connector.as_ref(), sql, deadline).await
    }
}

fn decode_record<T: serde::de::DeserializeOwned>(record: ResultRecord) -> GatewayResult<T> {
    serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| GatewayError::Execution(format!("unexpected catalog row: {}", e)))
}
