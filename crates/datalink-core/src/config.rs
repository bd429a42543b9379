use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Reserved `additional_params` key naming the MongoDB collection a query runs against
pub const COLLECTION_PARAM: &str = "collection";

/// Store families the ingestion and query layers dispatch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFamily {
    Relational,
    Document,
}

/// Supported store type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Postgresql,
    Mysql,
    Sqlite,
    Oracle,
    Sqlserver,
    Mongodb,
}

impl StoreType {
    pub const ALL: [StoreType; 6] = [
        StoreType::Postgresql,
        StoreType::Mysql,
        StoreType::Sqlite,
        StoreType::Oracle,
        StoreType::Sqlserver,
        StoreType::Mongodb,
    ];

    /// Get the string identifier for this store type
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Postgresql => "postgresql",
            StoreType::Mysql => "mysql",
            StoreType::Sqlite => "sqlite",
            StoreType::Oracle => "oracle",
            StoreType::Sqlserver => "sqlserver",
            StoreType::Mongodb => "mongodb",
        }
    }

    pub fn family(&self) -> StoreFamily {
        match self {
            StoreType::Mongodb => StoreFamily::Document,
            _ => StoreFamily::Relational,
        }
    }

    /// Default TCP port, `None` for file-backed stores
    pub fn default_port(&self) -> Option<u16> {
        match self {
            StoreType::Postgresql => Some(5432),
            StoreType::Mysql => Some(3306),
            StoreType::Sqlite => None,
            StoreType::Oracle => Some(1521),
            StoreType::Sqlserver => Some(1433),
            StoreType::Mongodb => Some(27017),
        }
    }
}

impl FromStr for StoreType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(StoreType::Postgresql),
            "mysql" => Ok(StoreType::Mysql),
            "sqlite" => Ok(StoreType::Sqlite),
            "oracle" => Ok(StoreType::Oracle),
            "sqlserver" | "mssql" => Ok(StoreType::Sqlserver),
            "mongodb" | "mongo" => Ok(StoreType::Mongodb),
            _ => Err(DataError::invalid_configuration(format!(
                "Unknown store type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to reach one data store.
///
/// The password is never serialized and `Debug` masks it. Use [`ConnectionConfig::redacted_url`]
/// for anything that ends up in a log line.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub store_type: StoreType,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub additional_params: BTreeMap<String, serde_json::Value>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("store_type", &self.store_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("additional_params", &self.additional_params)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(store_type: StoreType, database: impl Into<String>) -> Self {
        Self {
            store_type,
            host: default_host(),
            port: None,
            database: database.into(),
            username: None,
            password: None,
            additional_params: BTreeMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.additional_params.insert(key.into(), value.into());
        self
    }

    /// Port, falling back to the store default
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.store_type.default_port())
    }

    /// Collection name for document-store queries
    pub fn collection(&self) -> Option<&str> {
        self.additional_params
            .get(COLLECTION_PARAM)
            .and_then(|v| v.as_str())
    }

    /// Driver connection URL including credentials. Never log this.
    pub fn connection_url(&self) -> String {
        self.build_url(self.password.as_deref().map(|p| urlencoding::encode(p).into_owned()))
    }

    /// Connection URL with the password masked
    pub fn redacted_url(&self) -> String {
        self.build_url(self.password.as_ref().map(|_| "***".to_string()))
    }

    /// Normalized connection identity used for pool reuse and cache keys.
    ///
    /// The password is replaced by its sha256 digest, so a rotated secret still yields a new
    /// identity while the plaintext never leaves the config.
    pub fn identity(&self) -> String {
        self.build_url(self.password.as_deref().map(|p| {
            let digest = Sha256::digest(p.as_bytes());
            format!("sha256-{}", hex::encode(digest))
        }))
    }

    fn build_url(&self, password: Option<String>) -> String {
        let scheme = match self.store_type {
            StoreType::Sqlite if self.database == ":memory:" => {
                return "sqlite::memory:".to_string()
            }
            StoreType::Sqlite => return format!("sqlite://{}?mode=rwc", self.database),
            StoreType::Postgresql => "postgres",
            StoreType::Mysql => "mysql",
            StoreType::Oracle => "oracle",
            StoreType::Sqlserver => "mssql",
            StoreType::Mongodb => "mongodb",
        };

        let auth = match (&self.username, password) {
            (Some(user), Some(pass)) => format!("{}:{}@", urlencoding::encode(user), pass),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            _ => String::new(),
        };

        let host = match self.effective_port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };

        let database = if self.database.is_empty() && self.store_type == StoreType::Mongodb {
            "admin"
        } else {
            self.database.as_str()
        };

        let mut url = format!("{}://{}{}/{}", scheme, auth, host, database);

        // the collection selects a query target, not a connection option
        let params: Vec<String> = self
            .additional_params
            .iter()
            .filter(|(key, _)| key.as_str() != COLLECTION_PARAM)
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&value)
                )
            })
            .collect();
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        url
    }
}

/// Connection description safe to persist: identical to [`ConnectionConfig`] minus the password
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedactedConnectionConfig {
    pub store_type: StoreType,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: Option<String>,
    pub has_password: bool,
    pub additional_params: BTreeMap<String, serde_json::Value>,
}

impl From<&ConnectionConfig> for RedactedConnectionConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            store_type: config.store_type,
            host: config.host.clone(),
            port: config.effective_port(),
            database: config.database.clone(),
            username: config.username.clone(),
            has_password: config.password.is_some(),
            additional_params: config.additional_params.clone(),
        }
    }
}

impl RedactedConnectionConfig {
    /// Rebuild a usable config by supplying the secret again
    pub fn with_password(&self, password: Option<String>) -> ConnectionConfig {
        ConnectionConfig {
            store_type: self.store_type,
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password,
            additional_params: self.additional_params.clone(),
        }
    }
}
