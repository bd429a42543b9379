use datalink_core::{ConnectionConfig, RedactedConnectionConfig};
use std::fmt;

/// Which side of an ingestion a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Source,
    Target,
}

/// Supplies the secrets a plan deliberately does not carry
pub trait CredentialProvider: Send + Sync {
    fn password_for(&self, role: ConnectionRole, config: &RedactedConnectionConfig)
        -> Option<String>;

    /// Rebuild a usable configuration for `role`
    fn resolve(&self, role: ConnectionRole, config: &RedactedConnectionConfig) -> ConnectionConfig {
        config.with_password(self.password_for(role, config))
    }
}

/// Fixed passwords for the source and target
#[derive(Clone, Default)]
pub struct StaticCredentials {
    source: Option<String>,
    target: Option<String>,
}

impl StaticCredentials {
    pub fn new(source: Option<String>, target: Option<String>) -> Self {
        Self { source, target }
    }

    /// Keep the passwords of the configurations a plan was created from
    pub fn from_configs(source: &ConnectionConfig, target: &ConnectionConfig) -> Self {
        Self::new(source.password.clone(), target.password.clone())
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("source", &self.source.as_ref().map(|_| "***"))
            .field("target", &self.target.as_ref().map(|_| "***"))
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn password_for(
        &self,
        role: ConnectionRole,
        config: &RedactedConnectionConfig,
    ) -> Option<String> {
        if !config.has_password {
            return None;
        }
        match role {
            ConnectionRole::Source => self.source.clone(),
            ConnectionRole::Target => self.target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalink_core::StoreType;

    #[test]
    fn test_resolves_per_role() {
        let source = ConnectionConfig::new(StoreType::Postgresql, "app").with_password("s3cret");
        let target = ConnectionConfig::new(StoreType::Mysql, "warehouse").with_password("t4rget");
        let credentials = StaticCredentials::from_configs(&source, &target);

        let resolved = credentials.resolve(ConnectionRole::Source, &RedactedConnectionConfig::from(&source));
        assert_eq!(resolved.password.as_deref(), Some("s3cret"));
        assert_eq!(resolved.store_type, StoreType::Postgresql);

        let resolved = credentials.resolve(ConnectionRole::Target, &RedactedConnectionConfig::from(&target));
        assert_eq!(resolved.password.as_deref(), Some("t4rget"));
        assert!(!format!("{:?}", credentials).contains("s3cret"));
    }

    #[test]
    fn test_passwordless_configs_stay_passwordless() {
        let credentials = StaticCredentials::new(Some("unused".into()), None);
        let config = ConnectionConfig::new(StoreType::Sqlite, "/tmp/a.db");
        let resolved = credentials.resolve(ConnectionRole::Source, &RedactedConnectionConfig::from(&config));
        assert!(resolved.password.is_none());
    }
}
