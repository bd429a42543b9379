use crate::error::Result;
use redis::aio::ConnectionManager;
use tracing::debug;

/// Key prefix shared by every datalink entry
pub const DEFAULT_NAMESPACE: &str = "datalink";

/// Open a reconnecting connection to `redis_url`
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let manager = client.get_connection_manager().await?;
    debug!("Redis connection manager ready");
    Ok(manager)
}

/// Build `{namespace}:{kind}:{key}`
pub(crate) fn namespaced_key(namespace: &str, kind: &str, key: &str) -> String {
    format!("{}:{}:{}", namespace, kind, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(
            namespaced_key("datalink", "cache", "abc123"),
            "datalink:cache:abc123"
        );
    }
}
