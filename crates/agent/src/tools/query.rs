use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use holdwise_core::ports::{RowStore, TableSchema};
use holdwise_core::sql::SqlValidator;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{object_schema, Tool, ToolArtifact, ToolContext, ToolDescriptor, ToolOutput};
use crate::prompts::compact_schema;

pub const NAME: &str = "query_database";

#[derive(Debug, Deserialize)]
struct QueryArguments {
    sql_query: String,
    #[serde(default)]
    explanation: Option<String>,
}

/// Validates model-authored SQL and runs the sanitized statement read-only.
pub struct QueryDatabaseTool {
    store: Arc<dyn RowStore>,
    validator: SqlValidator,
    max_rows: u32,
    statement_timeout: Duration,
    schema: String,
}

impl QueryDatabaseTool {
    pub fn new(
        store: Arc<dyn RowStore>,
        validator: SqlValidator,
        max_rows: u32,
        statement_timeout: Duration,
        tables: &[TableSchema],
    ) -> Self {
        let schema = compact_schema(tables, &validator);
        Self { store, validator, max_rows, statement_timeout, schema }
    }

    fn failure(error: String, started: Instant) -> ToolOutput {
        ToolOutput::failure(
            error,
            json!({ "data": [], "row_count": 0, "execution_time_ms": elapsed_ms(started) }),
        )
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        let allowed: Vec<&str> = self.validator.allowed_tables().collect();
        ToolDescriptor {
            name: NAME,
            description: format!(
                "Execute a read-only SQL query on the Form 13F database.\n\n{schema}\n\
                 Allowed tables: {tables}.\n\
                 Guidelines:\n\
                 - Use only a single SELECT statement\n\
                 - Join tables to get related data (e.g., filings + holdings + issuers)\n\
                 - Always include a LIMIT clause (max {max} rows)\n\
                 - Use ISO dates (YYYY-MM-DD)\n\
                 - CIKs are 10 digits with leading zeros, CUSIPs are 9 characters\n\
                 - Values are in USD (not thousands)",
                schema = self.schema,
                tables = allowed.join(", "),
                max = self.max_rows,
            ),
            parameters: object_schema(
                json!({
                    "sql_query": {
                        "type": "string",
                        "description": "A single SQLite SELECT statement"
                    },
                    "explanation": {
                        "type": "string",
                        "description": "Brief explanation of what this query retrieves"
                    }
                }),
                &["sql_query"],
            ),
        }
    }

    async fn execute(&self, context: &ToolContext<'_>, arguments: Value) -> ToolOutput {
        let started = Instant::now();

        let arguments: QueryArguments = match serde_json::from_value(arguments) {
            Ok(arguments) => arguments,
            Err(error) => {
                return Self::failure(format!("SQL Validation Error: invalid arguments: {error}"), started)
            }
        };

        let query = match self.validator.validate(&arguments.sql_query, self.max_rows) {
            Ok(query) => query,
            Err(error) => {
                info!(
                    event_name = "tool.sql.rejected",
                    correlation_id = %context.correlation_id,
                    reason = %error,
                    "sql rejected by safety validator"
                );
                return Self::failure(format!("SQL Validation Error: {error}"), started);
            }
        };

        let sql = query.as_str().to_string();
        match self.store.fetch(&query, self.max_rows as usize, self.statement_timeout).await {
            Ok(rows) => {
                let execution_time_ms = elapsed_ms(started);
                info!(
                    event_name = "tool.sql.executed",
                    correlation_id = %context.correlation_id,
                    row_count = rows.len(),
                    execution_time_ms,
                    "sql executed"
                );

                let mut payload = json!({
                    "success": true,
                    "data": rows,
                    "row_count": rows.len(),
                    "execution_time_ms": execution_time_ms,
                    "sql_executed": sql,
                });
                if let Some(explanation) = arguments.explanation {
                    payload["explanation"] = Value::String(explanation);
                }

                ToolOutput::success(payload).with_artifact(ToolArtifact::Query { sql, rows: Some(rows) })
            }
            Err(error) => {
                warn!(
                    event_name = "tool.sql.failed",
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "sanitized sql failed at the store"
                );
                Self::failure(format!("Execution Error: {error}"), started)
                    .with_artifact(ToolArtifact::Query { sql, rows: None })
            }
        }
    }
}
