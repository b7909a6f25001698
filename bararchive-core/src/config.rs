//! Database connection parameters and the file loader behind them.
//!
//! The file is a flat key-value mapping with the required keys
//! `host`, `port`, `dbname`, `user`, `password`. JSON is the historical
//! format (`db_config.json`); a `.toml` extension switches to TOML.
//! Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keys that must be present in every connection config file.
pub const REQUIRED_KEYS: [&str; 5] = ["dbname", "host", "password", "port", "user"];

/// Errors raised while loading connection parameters.
///
/// All of these are fatal: nothing touches the database until the config
/// has loaded cleanly.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("database configuration file not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("the config file is missing required keys: {}", missing.join(", "))]
    Invalid { missing: Vec<String> },
}

/// Everything needed to open one PostgreSQL connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Port as written in the file: `5432` or `"5432"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortField {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct RawParams {
    host: String,
    port: PortField,
    dbname: String,
    user: String,
    password: String,
}

/// Load connection parameters from a JSON or TOML file.
pub fn load_connection_params(path: &Path) -> Result<ConnectionParams, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let parsed = if is_toml {
        ConnectionParams::from_toml(&content)
    } else {
        ConnectionParams::from_json(&content)
    };

    parsed.map_err(|e| match e {
        ConfigError::Malformed { reason, .. } => ConfigError::Malformed {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

impl ConnectionParams {
    /// Parse parameters from a JSON object.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let map: Map<String, Value> =
            serde_json::from_str(content).map_err(|e| malformed(format!("parse JSON: {e}")))?;
        Self::from_map(map)
    }

    /// Parse parameters from a TOML table.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| malformed(format!("parse TOML: {e}")))?;
        match serde_json::to_value(table) {
            Ok(Value::Object(map)) => Self::from_map(map),
            Ok(_) => Err(malformed("top level is not a table".into())),
            Err(e) => Err(malformed(format!("convert TOML: {e}"))),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, ConfigError> {
        // A key explicitly set to null counts as missing.
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| map.get(**key).is_none_or(Value::is_null))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Invalid { missing });
        }

        let raw: RawParams = serde_json::from_value(Value::Object(map))
            .map_err(|e| malformed(format!("field types: {e}")))?;

        let port = match raw.port {
            PortField::Number(n) => u16::try_from(n).ok(),
            PortField::Text(s) => s.trim().parse::<u16>().ok(),
        }
        .ok_or_else(|| malformed("port is not a valid TCP port".into()))?;

        Ok(Self {
            host: raw.host,
            port,
            dbname: raw.dbname,
            user: raw.user,
            password: raw.password,
        })
    }
}

fn malformed(reason: String) -> ConfigError {
    ConfigError::Malformed {
        path: PathBuf::new(),
        reason,
    }
}
