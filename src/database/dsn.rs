//! ODBC connection strings
//!
//! The Snowflake ODBC driver splits the connection string on `;`, so values
//! containing it must be wrapped in braces, with closing braces doubled.

use super::config::DatabaseConfig;

/// ODBC driver name registered by the Snowflake installer
pub const DRIVER: &str = "SnowflakeDSIIDriver";

/// Application id reported to Snowflake
pub const APPLICATION: &str = "Keboola_Connection";

/// Login timeout in seconds
pub const LOGIN_TIMEOUT: u32 = 30;

/// Escape a password for an ODBC connection string
///
/// ```rust
/// use db_writer_snowflake::database::dsn::escape_password;
///
/// assert_eq!(escape_password("plain"), "plain");
/// assert_eq!(escape_password("ab;c}d"), "{ab;c}}d}");
/// ```
pub fn escape_password(password: &str) -> String {
    if password.contains(';') {
        format!("{{{}}}", password.replace('}', "}}"))
    } else {
        password.to_string()
    }
}

/// Build the ODBC connection string for password authentication
///
/// Key-pair and OAuth logins are handled by the driver configuration, so
/// `Pwd` is only added when a password is set.
pub fn build_dsn(config: &DatabaseConfig) -> String {
    let mut parts = vec![
        format!("Driver={}", DRIVER),
        format!("Server={}", config.host),
        format!("Port={}", config.port),
        format!("Uid={}", config.user),
    ];

    if let Some(password) = &config.password {
        parts.push(format!("Pwd={}", escape_password(password)));
    }

    parts.push(format!("Database={}", config.database));
    parts.push(format!("Schema={}", config.schema));
    if let Some(warehouse) = &config.warehouse {
        parts.push(format!("Warehouse={}", warehouse));
    }

    parts.push("CLIENT_SESSION_KEEP_ALIVE=TRUE".to_string());
    parts.push(format!("application={}", APPLICATION));
    parts.push(format!("LoginTimeout={}", LOGIN_TIMEOUT));

    parts.join(";")
}
