//! Connectivity probe
//!
//! Two steps: a bare TCP connect to the server port, then a trivial query
//! through the normal adapter path. Used by `--check` and, in the background,
//! at startup.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::adapter::{self, Connector};
use crate::config::ConnectionDescriptor;

pub const PROBE_SQL: &str = "SELECT version() AS version, current_database() AS database";

const TCP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub target: String,
    pub tcp_reachable: bool,
    pub server_version: Option<String>,
    pub database: Option<String>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn is_ok(&self) -> bool {
        self.tcp_reachable && self.error.is_none()
    }
}

/// Probe `descriptor`'s server, then query it through `connector`
pub async fn probe(
    descriptor: &ConnectionDescriptor,
    connector: &dyn Connector,
    deadline: Duration,
) -> ProbeReport {
    let mut report = ProbeReport {
        target: connector.target(),
        ..Default::default()
    };

    let addr = (descriptor.host.as_str(), descriptor.port);
    match tokio::time::timeout(TCP_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => report.tcp_reachable = true,
        Ok(Err(e)) => {
            report.error = Some(format!("TCP connect failed: {}", e));
            return report;
        }
        Err(_) => {
            report.error = Some(format!("TCP connect timed out after {:?}", TCP_TIMEOUT));
            return report;
        }
    }

    match adapter::execute(connector, PROBE_SQL, deadline).await {
        Ok(rows) => {
            let first = rows.into_iter().next().unwrap_or_default();
            let text = |key: &str| first.get(key).and_then(|v| v.as_str()).map(str::to_string);
            report.server_version = text("version");
            report.database = text("database");
        }
        Err(e) => report.error = Some(e.to_string()),
    }

    report
}

/// Run [`probe`] on a background task and log the outcome
///
/// Returns immediately so a slow or hung database never delays serving.
pub fn spawn_startup_check(
    descriptor: ConnectionDescriptor,
    connector: Arc<dyn Connector>,
    deadline: Duration,
) -> JoinHandle<ProbeReport> {
    tokio::spawn(async move {
        let report = probe(&descriptor, &*connector, deadline).await;
        match &report.error {
            None => tracing::info!(
                version = report.server_version.as_deref().unwrap_or("unknown"),
                "Database {} reachable",
                report.target
            ),
            Some(e) => tracing::warn!("Database check failed for {}: {}", report.target, e),
        }
        report
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Connection, RawRows};
    use crate::types::{GatewayError, GatewayResult};
    use async_trait::async_trait;
    use sqlx::postgres::PgSslMode;
    use std::collections::BTreeMap;

    struct VersionConnector {
        fail: bool,
    }

    struct VersionConnection;

    #[async_trait]
    impl Connector for VersionConnector {
        async fn connect(&self) -> GatewayResult<Box<dyn Connection>> {
            if self.fail {
                return Err(GatewayError::connection("password authentication failed"));
            }
            Ok(Box::new(VersionConnection))
        }

        fn target(&self) -> String {
            "local".to_string()
        }
    }

    #[async_trait]
    impl Connection for VersionConnection {
        async fn fetch(&mut self, sql: &str, _timeout: Duration) -> GatewayResult<RawRows> {
            assert_eq!(sql, PROBE_SQL);
            Ok(RawRows {
                columns: vec!["version".into(), "database".into()],
                rows: vec![vec!["PostgreSQL 16.2".into(), "analytics".into()]],
            })
        }

        async fn close(&mut self) -> GatewayResult<()> {
            Ok(())
        }
    }

    fn descriptor(port: u16) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: "127.0.0.1".into(),
            port,
            database: "analytics".into(),
            username: "reader".into(),
            password: None,
            ssl_mode: PgSslMode::Disable,
            options: BTreeMap::new(),
            read_only_session: true,
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_probe_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let report = probe(
            &descriptor(port),
            &VersionConnector { fail: false },
            Duration::from_secs(5),
        )
        .await;

        assert!(report.is_ok(), "{:?}", report);
        assert_eq!(report.server_version.as_deref(), Some("PostgreSQL 16.2"));
        assert_eq!(report.database.as_deref(), Some("analytics"));
    }

    #[tokio::test]
    async fn test_probe_reports_query_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let report = probe(
            &descriptor(port),
            &VersionConnector { fail: true },
            Duration::from_secs(5),
        )
        .await;

        assert!(report.tcp_reachable);
        assert!(!report.is_ok());
        assert!(report.error.unwrap().contains("authentication"));
    }

    #[tokio::test]
    async fn test_startup_check_runs_in_background() {
        struct StalledConnector;

        #[async_trait]
        impl Connector for StalledConnector {
            async fn connect(&self) -> GatewayResult<Box<dyn Connection>> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::connection("unreachable"))
            }

            fn target(&self) -> String {
                "stalled".to_string()
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let started = std::time::Instant::now();
        let handle = spawn_startup_check(
            descriptor(port),
            Arc::new(StalledConnector),
            Duration::from_secs(3600),
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_startup_check_reports_outcome() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let report = spawn_startup_check(
            descriptor(port),
            Arc::new(VersionConnector { fail: false }),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(report.is_ok(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_probe_unreachable_port() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let report = probe(
            &descriptor(port),
            &VersionConnector { fail: false },
            Duration::from_secs(5),
        )
        .await;

        assert!(!report.tcp_reachable);
        assert!(report.error.is_some());
    }
}
