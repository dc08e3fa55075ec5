//! Snowflake connection over the SQL REST API
//!
//! Statements are submitted to `POST /api/v2/statements`. Each request runs
//! in its own session, so `TEMPORARY` tables do not outlive the statement
//! that created them and `USE ...` only validates the object; the selected
//! warehouse is remembered here and sent with every request instead.
//!
//! Token acquisition (OAuth or key-pair JWT) happens outside this crate; the
//! connection is handed a ready bearer token through `#token`.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{Connection, DatabaseConfig, DatabaseError, DatabaseResult, QueryResult};

/// Statement endpoint path
const STATEMENTS_PATH: &str = "/api/v2/statements";

/// Poll interval while a statement is still running
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Token type header value for OAuth tokens
const TOKEN_TYPE_OAUTH: &str = "OAUTH";

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<String>,
    parameters: StatementParameters,
}

#[derive(Debug, Serialize)]
struct StatementParameters {
    #[serde(rename = "QUERY_TAG", skip_serializing_if = "Option::is_none")]
    query_tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

/// Connection executing statements through the Snowflake SQL API
pub struct SnowflakeConnection {
    client: reqwest::Client,
    base_url: String,
    token: String,
    config: DatabaseConfig,
    warehouse: RefCell<Option<String>>,
}

impl SnowflakeConnection {
    /// Create a connection for `config`
    ///
    /// # Arguments
    ///
    /// * `config` - Validated connection parameters; `token` must be set
    ///
    /// # Returns
    ///
    /// A connection, or `ConfigError` when no bearer token is configured
    pub fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        let token = config.token.clone().ok_or_else(|| {
            DatabaseError::ConfigError(
                "the SQL API connection needs an access token in \"#token\"".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("db-writer-snowflake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        let base_url = if config.port == 443 {
            format!("https://{}", config.host)
        } else {
            format!("https://{}:{}", config.host, config.port)
        };

        Ok(Self {
            client,
            base_url,
            token,
            warehouse: RefCell::new(config.warehouse.clone()),
            config,
        })
    }

    fn query_tag(&self) -> Option<String> {
        self.config
            .run_id
            .as_ref()
            .map(|run_id| serde_json::json!({ "runId": run_id }).to_string())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", TOKEN_TYPE_OAUTH)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn read_response(response: reqwest::Response) -> DatabaseResult<(u16, StatementResponse)> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("reading response: {}", e)))?;
        parse_response(status, body)
    }

    async fn submit(&self, sql: &str) -> DatabaseResult<StatementResponse> {
        let request = StatementRequest {
            statement: sql,
            database: &self.config.database,
            schema: &self.config.schema,
            warehouse: self.warehouse.borrow().clone(),
            parameters: StatementParameters {
                query_tag: self.query_tag(),
            },
        };

        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);
        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let (mut status, mut body) = Self::read_response(response).await?;

        // 202: still running, poll the statement handle
        while status == 202 {
            let handle = body.statement_handle.clone().ok_or_else(|| {
                DatabaseError::SerializationError("running statement without a handle".to_string())
            })?;
            tokio::time::sleep(POLL_INTERVAL).await;
            let response = self
                .authorized(self.client.get(format!("{}/{}", url, handle)))
                .send()
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
            (status, body) = Self::read_response(response).await?;
        }

        Ok(body)
    }

    async fn fetch_partition(&self, handle: &str, partition: usize) -> DatabaseResult<Vec<Vec<Value>>> {
        let url = format!(
            "{}{}/{}?partition={}",
            self.base_url, STATEMENTS_PATH, handle, partition
        );
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        let (_, body) = Self::read_response(response).await?;
        Ok(body.data)
    }
}

/// Classify a SQL API response by status
///
/// A success must carry a JSON body; error bodies fall back to their raw text.
fn parse_response(
    status: reqwest::StatusCode,
    body: String,
) -> DatabaseResult<(u16, StatementResponse)> {
    if status.is_success() {
        let parsed: StatementResponse = serde_json::from_str(&body).map_err(|e| {
            DatabaseError::SerializationError(format!(
                "invalid response body (status {}): {}",
                status, e
            ))
        })?;
        return Ok((status.as_u16(), parsed));
    }

    let message = serde_json::from_str::<StatementResponse>(&body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or(body);
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(DatabaseError::ConnectionFailed(message));
    }
    Err(DatabaseError::QueryFailed(message))
}

/// Turn positional SQL API rows into objects keyed by column name
fn rows_to_objects(columns: &[String], data: Vec<Vec<Value>>) -> Vec<Value> {
    data.into_iter()
        .map(|row| {
            let object: Map<String, Value> = columns.iter().cloned().zip(row).collect();
            Value::Object(object)
        })
        .collect()
}

#[async_trait(?Send)]
impl Connection for SnowflakeConnection {
    async fn execute(&self, sql: &str) -> DatabaseResult<()> {
        self.submit(sql).await.map(|_| ())
    }

    async fn fetch_all(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = Instant::now();
        let mut response = self.submit(sql).await?;

        let meta = response.result_set_meta_data.take().unwrap_or_default();
        let columns: Vec<String> = meta.row_type.into_iter().map(|c| c.name).collect();
        let mut data = std::mem::take(&mut response.data);

        if meta.partition_info.len() > 1
            && let Some(handle) = &response.statement_handle
        {
            for partition in 1..meta.partition_info.len() {
                data.extend(self.fetch_partition(handle, partition).await?);
            }
        }

        let rows = rows_to_objects(&columns, data);
        let execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(rows = rows.len(), execution_time_ms, "Fetched result set");

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    fn supports_temporary_tables(&self) -> bool {
        false
    }

    fn use_warehouse(&self, warehouse: &str) {
        *self.warehouse.borrow_mut() = Some(warehouse.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(token: Option<&str>) -> DatabaseConfig {
        let mut value = json!({
            "host": "acme.snowflakecomputing.com",
            "database": "ANALYTICS",
            "schema": "PUBLIC",
            "user": "loader",
            "#password": "secret",
            "runId": "123.456",
        });
        if let Some(token) = token {
            value["#token"] = json!(token);
        }
        DatabaseConfig::from_raw(&value).unwrap()
    }

    #[test]
    fn test_requires_token() {
        assert!(matches!(
            SnowflakeConnection::new(config(None)),
            Err(DatabaseError::ConfigError(_))
        ));
    }

    #[test]
    fn test_query_tag_and_session_semantics() {
        let connection = SnowflakeConnection::new(config(Some("tok"))).unwrap();
        assert_eq!(connection.query_tag().as_deref(), Some(r#"{"runId":"123.456"}"#));
        assert!(!connection.supports_temporary_tables());
        assert_eq!(connection.base_url, "https://acme.snowflakecomputing.com");

        connection.use_warehouse("LOADING");
        assert_eq!(connection.warehouse.borrow().as_deref(), Some("LOADING"));
    }

    #[test]
    fn test_rows_to_objects() {
        let columns = vec!["name".to_string(), "primary key".to_string()];
        let rows = rows_to_objects(
            &columns,
            vec![vec![json!("id"), json!("Y")], vec![json!("name"), Value::Null]],
        );
        assert_eq!(rows[0], json!({"name": "id", "primary key": "Y"}));
        assert_eq!(rows[1], json!({"name": "name", "primary key": null}));
    }

    #[test]
    fn test_response_parsing() {
        let response: StatementResponse = serde_json::from_value(json!({
            "statementHandle": "01a",
            "resultSetMetaData": {
                "numRows": 1,
                "rowType": [{"name": "CURRENT_USER", "type": "text"}],
                "partitionInfo": [{"rowCount": 1}]
            },
            "data": [["LOADER"]]
        }))
        .unwrap();

        let meta = response.result_set_meta_data.unwrap();
        assert_eq!(meta.row_type[0].name, "CURRENT_USER");
        assert_eq!(response.data, vec![vec![json!("LOADER")]]);
    }

    #[test]
    fn test_success_with_unreadable_body() {
        let err = parse_response(reqwest::StatusCode::OK, "<html>proxy</html>".to_string())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::SerializationError(_)));
    }

    #[test]
    fn test_error_status_classification() {
        let err = parse_response(
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            json!({"message": "SQL compilation error"}).to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::QueryFailed(ref m) if m == "SQL compilation error"));

        let err = parse_response(reqwest::StatusCode::UNAUTHORIZED, "denied".to_string())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionFailed(ref m) if m == "denied"));
    }

    #[test]
    fn test_running_statement_status() {
        let (status, body) = parse_response(
            reqwest::StatusCode::ACCEPTED,
            json!({"statementHandle": "01a", "message": "Asynchronous execution in progress."})
                .to_string(),
        )
        .unwrap();
        assert_eq!(status, 202);
        assert_eq!(body.statement_handle.as_deref(), Some("01a"));
    }
}
