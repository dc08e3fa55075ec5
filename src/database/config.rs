//! Database connection parameters
//!
//! Parsed from the `parameters.db` node of the component configuration and
//! overridden from the environment where the platform injects values.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ConfigError;

/// Default Snowflake port
pub const DEFAULT_PORT: u16 = 443;

/// Environment variable carrying the platform run id
pub const ENV_RUN_ID: &str = "KBC_RUNID";

/// Raw `parameters.db` node as found in `config.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDatabaseConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, rename = "#password")]
    pub password: Option<String>,
    #[serde(default, rename = "#keyPair")]
    pub key_pair: Option<String>,
    #[serde(default, rename = "#token")]
    pub token: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default, rename = "runId")]
    pub run_id: Option<String>,
}

/// Accept the port as a number or a numeric string (the UI stores strings)
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid port: {}", n))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid port: {}",
            other
        ))),
    }
}

/// Validated connection parameters
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub schema: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing)]
    pub key_pair: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub warehouse: Option<String>,
    pub run_id: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "****");
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &mask(&self.password))
            .field("key_pair", &mask(&self.key_pair))
            .field("token", &mask(&self.token))
            .field("warehouse", &self.warehouse)
            .field("run_id", &self.run_id)
            .finish()
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField(format!("db.{}", field))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl DatabaseConfig {
    /// Build a validated config from a raw JSON `db` node
    pub fn from_raw(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawDatabaseConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(format!("db: {}", e)))?;
        Self::from_raw_config(raw)
    }

    /// Validate an already deserialized `db` node
    pub fn from_raw_config(raw: RawDatabaseConfig) -> Result<Self, ConfigError> {
        let config = Self {
            host: required(raw.host, "host")?,
            port: raw.port.unwrap_or(DEFAULT_PORT),
            database: required(raw.database, "database")?,
            schema: required(raw.schema, "schema")?,
            user: required(raw.user, "user")?,
            password: non_empty(raw.password),
            key_pair: non_empty(raw.key_pair),
            token: non_empty(raw.token),
            warehouse: non_empty(raw.warehouse),
            run_id: non_empty(raw.run_id),
        };

        if config.password.is_none() && config.key_pair.is_none() && config.token.is_none() {
            return Err(ConfigError::MissingField(
                "db.#password, db.#keyPair or db.#token".to_string(),
            ));
        }

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if self.run_id.is_none()
            && let Ok(run_id) = std::env::var(ENV_RUN_ID)
            && !run_id.is_empty()
        {
            self.run_id = Some(run_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> serde_json::Value {
        json!({
            "host": "acme.snowflakecomputing.com",
            "port": "443",
            "database": "ANALYTICS",
            "schema": "PUBLIC",
            "user": "loader",
            "#password": "secret",
            "warehouse": "LOADING",
        })
    }

    #[test]
    fn test_from_raw() {
        let config = DatabaseConfig::from_raw(&raw()).unwrap();
        assert_eq!(config.host, "acme.snowflakecomputing.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.schema, "PUBLIC");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.warehouse.as_deref(), Some("LOADING"));
        assert!(config.run_id.is_none());
    }

    #[test]
    fn test_port_as_number_and_default() {
        let mut value = raw();
        value["port"] = json!(8443);
        assert_eq!(DatabaseConfig::from_raw(&value).unwrap().port, 8443);

        value.as_object_mut().unwrap().remove("port");
        assert_eq!(DatabaseConfig::from_raw(&value).unwrap().port, DEFAULT_PORT);

        value["port"] = json!("not-a-port");
        assert!(DatabaseConfig::from_raw(&value).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = raw();
        value["schema"] = json!("");
        let err = DatabaseConfig::from_raw(&value).unwrap_err();
        assert!(err.to_string().contains("db.schema"));
    }

    #[test]
    fn test_credentials_required() {
        let mut value = raw();
        value.as_object_mut().unwrap().remove("#password");
        assert!(DatabaseConfig::from_raw(&value).is_err());

        value["#token"] = json!("oauth-token");
        assert!(DatabaseConfig::from_raw(&value).is_ok());
    }

    #[test]
    fn test_empty_warehouse_is_unset() {
        let mut value = raw();
        value["warehouse"] = json!("");
        let config = DatabaseConfig::from_raw(&value).unwrap();
        assert!(config.warehouse.is_none());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let config = DatabaseConfig::from_raw(&raw()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
    }
}
