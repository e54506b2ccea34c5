//! Query builder for structured table queries
//!
//! Renders a [`TableQuery`] into a single SELECT statement. The output is NOT
//! trusted: table, column and filter text come from the caller verbatim, so the
//! rendered SQL must still pass through the classifier before it runs.

use crate::types::{GatewayError, GatewayResult};

/// Ordering that satisfies the `OFFSET ... FETCH` grammar without sorting
const NO_OP_ORDER: &str = "(SELECT NULL)";

/// A table query expressed as discrete fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableQuery {
    pub table: String,
    /// Comma-separated column list; `None` or blank selects every column
    pub columns: Option<String>,
    /// Body of the WHERE clause, without the keyword
    pub filter: Option<String>,
    /// Maximum rows to return; must be positive when present
    pub limit: Option<i64>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the statement text
    pub fn build(&self) -> GatewayResult<String> {
        let table = self.table.trim();
        if table.is_empty() {
            return Err(GatewayError::Build("table name is required".to_string()));
        }

        let columns = self
            .columns
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("*");

        let mut sql = format!("SELECT {} FROM {}", columns, table);

        if let Some(filter) = self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }

        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(GatewayError::Build(format!(
                    "limit must be a positive integer, got {}",
                    limit
                )));
            }
            sql.push_str(&format!(
                " ORDER BY {} OFFSET 0 ROWS FETCH NEXT {} ROWS ONLY",
                NO_OP_ORDER, limit
            ));
        }

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, Rejection, Verdict};

    #[test]
    fn test_full_query_renders_and_classifies() {
        let sql = TableQuery::new("orders")
            .columns("id,total")
            .filter("total > 100")
            .limit(10)
            .build()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT id,total FROM orders WHERE total > 100 \
             ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert!(classify(&sql).is_allowed());
    }

    #[test]
    fn test_defaults_to_all_columns() {
        assert_eq!(TableQuery::new("orders").build().unwrap(), "SELECT * FROM orders");
        assert_eq!(
            TableQuery::new("orders").columns("  ").build().unwrap(),
            "SELECT * FROM orders"
        );
    }

    #[test]
    fn test_blank_filter_is_ignored() {
        let sql = TableQuery::new("t").filter(" ").build().unwrap();
        assert_eq!(sql, "SELECT * FROM t");
    }

    #[test]
    fn test_empty_table_is_build_error() {
        let err = TableQuery::new("  ").build().unwrap_err();
        assert!(matches!(err, GatewayError::Build(_)));
    }

    #[test]
    fn test_non_positive_limit_is_build_error() {
        for limit in [0, -5] {
            let err = TableQuery::new("t").limit(limit).build().unwrap_err();
            assert!(matches!(err, GatewayError::Build(_)), "limit {limit}");
        }
    }

    #[test]
    fn test_smuggled_statement_is_caught_downstream() {
        let sql = TableQuery::new("t; DROP TABLE t").build().unwrap();
        assert_eq!(
            classify(&sql),
            Verdict::Rejected(Rejection::ForbiddenKeyword("DROP".into()))
        );

        let sql = TableQuery::new("t").filter("1=1; SHOW ALL").build().unwrap();
        assert_eq!(classify(&sql), Verdict::Rejected(Rejection::TrailingStatement));
    }
}
