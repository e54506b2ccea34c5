//! Execution adapter - one connection per request
//!
//! [`execute`] opens a connection through a [`Connector`], runs a statement
//! that has already been validated, turns the first result set into
//! [`ResultRecord`]s and closes the connection on every path. Nothing is
//! retried and no partial result is ever returned.

mod postgres;

pub use postgres::PgConnector;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::types::{GatewayError, GatewayResult, ResultRecord, ResultSet};

/// Upper bound on the goodbye handshake when releasing a connection
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows of one result set as delivered by the driver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRows {
    /// Column names from the result metadata, in column order
    pub columns: Vec<String>,
    /// One entry per row, values in column order
    pub rows: Vec<Vec<Value>>,
}

/// Opens database connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh connection; failures map to [`GatewayError::Connection`]
    async fn connect(&self) -> GatewayResult<Box<dyn Connection>>;

    /// Human-readable target (host:port/database) for logs and errors
    fn target(&self) -> String;
}

/// A live connection owned by exactly one request
#[async_trait]
pub trait Connection: Send {
    /// Run `sql` and return its first result set
    ///
    /// `timeout` is what is left of the request deadline. Implementations
    /// must make the server abandon the statement once it passes, not just
    /// stop waiting for it.
    async fn fetch(&mut self, sql: &str, timeout: Duration) -> GatewayResult<RawRows>;

    /// Release the connection. Called exactly once per connection.
    async fn close(&mut self) -> GatewayResult<()>;
}

/// Run `sql` on a fresh connection within `deadline`
pub async fn execute(
    connector: &dyn Connector,
    sql: &str,
    deadline: Duration,
) -> GatewayResult<ResultSet> {
    let started = Instant::now();

    let mut conn = match timeout(deadline, connector.connect()).await {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(GatewayError::connection(format!(
                "connecting to {} timed out after {:?}",
                connector.target(),
                deadline
            )))
        }
    };

    let remaining = deadline.saturating_sub(started.elapsed());
    let outcome = match timeout(remaining, conn.fetch(sql, remaining)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(GatewayError::Execution(format!(
            "query timed out after {:?}",
            deadline
        ))),
    };

    release(conn.as_mut()).await;

    let raw = outcome?;
    tracing::debug!(
        rows = raw.rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Query completed"
    );
    Ok(materialize(raw))
}

async fn release(conn: &mut dyn Connection) {
    match timeout(CLOSE_TIMEOUT, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to close connection cleanly: {}", e),
        Err(_) => tracing::warn!("Closing connection timed out, dropping it"),
    }
}

/// Pair every row with the column names, which are resolved once
pub fn materialize(raw: RawRows) -> ResultSet {
    let names = unique_column_names(&raw.columns);

    raw.rows
        .into_iter()
        .map(|values| names.iter().cloned().zip(values).collect::<ResultRecord>())
        .collect()
}

/// Rename repeated column names so no value is lost
///
/// The first occurrence keeps its name; later ones become `name_2`, `name_3`
/// and so on, skipping any candidate that is already taken.
pub fn unique_column_names(columns: &[String]) -> Vec<String> {
    let taken: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(columns.len());
    let mut generated: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(columns.len());

    for column in columns {
        if seen.insert(column.as_str()) {
            names.push(column.clone());
            continue;
        }

        let mut suffix = 2;
        let renamed = loop {
            let candidate = format!("{}_{}", column, suffix);
            if !taken.contains(candidate.as_str()) && !generated.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        generated.insert(renamed.clone());
        names.push(renamed);
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        closes: AtomicUsize,
        timeouts: Mutex<Vec<Duration>>,
    }

    enum Script {
        Rows(RawRows),
        Fail(&'static str),
        Hang,
        Refuse,
    }

    struct ScriptedConnector {
        script: Arc<Script>,
        counters: Arc<Counters>,
    }

    struct ScriptedConnection {
        script: Arc<Script>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> GatewayResult<Box<dyn Connection>> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if matches!(*self.script, Script::Refuse) {
                return Err(GatewayError::connection("refused"));
            }
            Ok(Box::new(ScriptedConnection {
                script: self.script.clone(),
                counters: self.counters.clone(),
            }))
        }

        fn target(&self) -> String {
            "scripted:0/test".to_string()
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn fetch(&mut self, _sql: &str, timeout: Duration) -> GatewayResult<RawRows> {
            self.counters.timeouts.lock().unwrap().push(timeout);
            match &*self.script {
                Script::Rows(rows) => Ok(rows.clone()),
                Script::Fail(msg) => Err(GatewayError::Execution(msg.to_string())),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("deadline should fire first")
                }
                Script::Refuse => unreachable!("never connected"),
            }
        }

        async fn close(&mut self) -> GatewayResult<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn connector(script: Script) -> (ScriptedConnector, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            ScriptedConnector {
                script: Arc::new(script),
                counters: counters.clone(),
            },
            counters,
        )
    }

    #[tokio::test]
    async fn test_success_closes_once() {
        let (conn, counters) = connector(Script::Rows(RawRows {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
        }));

        let rows = execute(&conn, "SELECT id, name FROM t", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[1]["name"], json!("b"));
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["id", "name"]);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_still_closes() {
        let (conn, counters) = connector(Script::Fail("relation \"nope\" does not exist"));

        let err = execute(&conn, "SELECT * FROM nope", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Execution(ref m) if m.contains("nope")));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_has_nothing_to_close() {
        let (conn, counters) = connector(Script::Refuse);

        let err = execute(&conn, "SELECT 1", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Connection { .. }));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_aborts_and_closes() {
        let (conn, counters) = connector(Script::Hang);

        let err = execute(&conn, "SELECT pg_sleep(3600)", Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Execution(ref m) if m.contains("timed out")));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_receives_remaining_deadline() {
        let (conn, counters) = connector(Script::Rows(RawRows::default()));

        execute(&conn, "SELECT 1", Duration::from_secs(2)).await.unwrap();

        let timeouts = counters.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts.len(), 1);
        assert!(timeouts[0] <= Duration::from_secs(2));
        assert!(timeouts[0] > Duration::from_secs(1));
    }

    #[test]
    fn test_empty_result_set() {
        let rows = materialize(RawRows {
            columns: vec!["id".into()],
            rows: vec![],
        });
        assert!(rows.is_empty());
    }

    #[test]
    fn test_duplicate_columns_are_disambiguated() {
        let columns: Vec<String> = ["id", "id", "name", "id", "id_2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            unique_column_names(&columns),
            ["id", "id_3", "name", "id_4", "id_2"]
        );

        let rows = materialize(RawRows {
            columns: vec!["v".into(), "v".into()],
            rows: vec![vec![json!(1), json!(2)]],
        });
        assert_eq!(rows[0]["v"], json!(1));
        assert_eq!(rows[0]["v_2"], json!(2));
    }
}
