//! Read-only SQL query tool
//!
//! Built fresh for every invocation with a lazy pool, so construction does
//! no I/O and connection state never outlives the request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row};
use tracing::debug;

use super::Tool;
use crate::config::DatabaseSettings;

const MAX_ROWS: usize = 50;

/// Ephemeral tool running SELECT queries against the operational database
pub struct SqlQueryTool {
    pool: MySqlPool,
}

#[derive(Debug, Deserialize)]
struct SqlArgs {
    query: String,
}

impl SqlQueryTool {
    /// Create the tool with a lazy pool; no connection is made until a query runs
    pub fn connect_lazy(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_lazy(&settings.url())?;
        Ok(Self { pool })
    }

    async fn run_query(&self, query: &str) -> anyhow::Result<String> {
        let statement = query.trim();
        if !statement.to_lowercase().starts_with("select") {
            anyhow::bail!("only SELECT statements are allowed");
        }

        debug!(query = statement, "Executing SQL query");
        let rows = sqlx::query(statement).fetch_all(&self.pool).await?;
        let total = rows.len();

        let rendered: Vec<Value> = rows
            .iter()
            .take(MAX_ROWS)
            .map(row_to_json)
            .collect();

        let mut output = serde_json::to_string_pretty(&rendered)?;
        if total > MAX_ROWS {
            output.push_str(&format!("\n({} of {} rows shown)", MAX_ROWS, total));
        }
        Ok(output)
    }
}

/// Render a row as JSON, decoding each column through a small type ladder
fn row_to_json(row: &MySqlRow) -> Value {
    let mut object = Map::new();
    for column in row.columns() {
        object.insert(column.name().to_string(), decode_cell(row, column.ordinal()));
    }
    Value::Object(object)
}

fn decode_cell(row: &MySqlRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return value
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(Value::String).unwrap_or(Value::Null);
    }
    Value::Null
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &str {
        "sql_query"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL SELECT query against the marketplace database. \
         Use for listings, orders and customer records."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SELECT statement to execute"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> anyhow::Result<String> {
        let args: SqlArgs = serde_json::from_value(args)?;
        self.run_query(&args.query).await
    }
}
