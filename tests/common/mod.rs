//! Shared test doubles for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use db_writer_snowflake::database::{
    Connection, DatabaseConfig, DatabaseError, DatabaseResult, QueryResult,
};
use db_writer_snowflake::writer::storage::{ObjectStore, StorageError};
use serde_json::{Value, json};

/// In-memory connection recording every statement
///
/// Queries are answered from scripted responses matched by substring:
/// one-shot responses first, in the order they were added, then persistent
/// ones. Unmatched queries return no rows.
#[derive(Default)]
pub struct MockConnection {
    statements: RefCell<Vec<String>>,
    once: RefCell<Vec<(String, QueryResult)>>,
    always: RefCell<Vec<(String, QueryResult)>>,
    failures: RefCell<Vec<(String, String)>>,
    session_less: bool,
    warehouse: RefCell<Option<String>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave like a transport without sessions
    pub fn session_less() -> Self {
        Self {
            session_less: true,
            ..Self::default()
        }
    }

    /// Answer every query containing `pattern` with `rows`
    pub fn respond(&self, pattern: &str, rows: Vec<Value>) {
        self.always
            .borrow_mut()
            .push((pattern.to_string(), result(rows)));
    }

    /// Answer the next query containing `pattern` with `rows`
    pub fn respond_once(&self, pattern: &str, rows: Vec<Value>) {
        self.once
            .borrow_mut()
            .push((pattern.to_string(), result(rows)));
    }

    /// Fail every statement containing `pattern`
    pub fn fail_on(&self, pattern: &str, message: &str) {
        self.failures
            .borrow_mut()
            .push((pattern.to_string(), message.to_string()));
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    /// Statements containing `pattern`
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.statements
            .borrow()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .cloned()
            .collect()
    }

    /// Index of the first statement containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.statements
            .borrow()
            .iter()
            .position(|sql| sql.contains(pattern))
    }

    pub fn warehouse(&self) -> Option<String> {
        self.warehouse.borrow().clone()
    }

    fn record(&self, sql: &str) -> DatabaseResult<()> {
        self.statements.borrow_mut().push(sql.to_string());
        match self
            .failures
            .borrow()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            Some((_, message)) => Err(DatabaseError::QueryFailed(message.clone())),
            None => Ok(()),
        }
    }
}

fn result(rows: Vec<Value>) -> QueryResult {
    let columns = rows
        .first()
        .and_then(Value::as_object)
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    QueryResult::new(columns, rows)
}

#[async_trait(?Send)]
impl Connection for MockConnection {
    async fn execute(&self, sql: &str) -> DatabaseResult<()> {
        self.record(sql)
    }

    async fn fetch_all(&self, sql: &str) -> DatabaseResult<QueryResult> {
        self.record(sql)?;

        let mut once = self.once.borrow_mut();
        if let Some(index) = once
            .iter()
            .position(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Ok(once.remove(index).1);
        }

        Ok(self
            .always
            .borrow()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(QueryResult::empty))
    }

    fn supports_temporary_tables(&self) -> bool {
        !self.session_less
    }

    fn use_warehouse(&self, warehouse: &str) {
        *self.warehouse.borrow_mut() = Some(warehouse.to_string());
    }
}

/// Object store serving blobs from memory
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, container: &str, key: &str, content: impl Into<Vec<u8>>) -> Self {
        self.objects
            .insert((container.to_string(), key.to_string()), content.into());
        self
    }
}

#[async_trait(?Send)]
impl ObjectStore for MemoryStore {
    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{} does not exist", container, key)))
    }
}

pub fn db_config() -> DatabaseConfig {
    DatabaseConfig::from_raw(&json!({
        "host": "acme.snowflakecomputing.com",
        "database": "ANALYTICS",
        "schema": "PUBLIC",
        "user": "loader",
        "#password": "secret",
        "warehouse": "LOADING",
        "runId": "123.456"
    }))
    .unwrap()
}

/// `DESCRIBE TABLE` row
pub fn describe_row(name: &str, primary_key: bool) -> Value {
    json!({
        "name": name,
        "type": "NUMBER(38,0)",
        "null?": "N",
        "primary key": if primary_key { "Y" } else { "N" },
        "unique key": "N"
    })
}

/// `SHOW COLUMNS` row with the JSON `data_type` Snowflake reports
pub fn show_column_row(name: &str, data_type: &str) -> Value {
    json!({
        "column_name": name,
        "data_type": data_type
    })
}

/// Non-sliced S3 manifest
pub fn s3_manifest(key: &str) -> Value {
    s3_manifest_sliced(key, false)
}

pub fn s3_manifest_sliced(key: &str, is_sliced: bool) -> Value {
    json!({
        "s3": {
            "isSliced": is_sliced,
            "region": "us-east-1",
            "bucket": "exports",
            "key": key,
            "credentials": {
                "access_key_id": "AKIA123",
                "secret_access_key": "secret",
                "session_token": "token"
            }
        }
    })
}

/// Manifest of parts listing `count` files under `prefix`
pub fn sliced_entries(prefix: &str, count: usize) -> Vec<u8> {
    let entries: Vec<Value> = (0..count)
        .map(|i| json!({ "url": format!("{}{:04}_part_00", prefix, i) }))
        .collect();
    serde_json::to_vec(&json!({ "entries": entries })).unwrap()
}

/// Write `<dir>/<file>.manifest`
pub fn write_manifest(dir: &Path, file: &str, manifest: &Value) {
    let path = dir.join(format!("{}.manifest", file));
    std::fs::write(path, serde_json::to_string(manifest).unwrap()).unwrap();
}
