use async_trait::async_trait;
use std::collections::HashMap;

/// Maps a logical service name to a network authority (`host:port`).
///
/// `resolve` is total: it returns `None` only when the name is unknown to
/// both the backend and the fallback configuration. Implementations must
/// never block indefinitely and must never propagate backend failures to
/// the caller; degradation is handled internally and logged.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Returns the current authority for `service`, if one is known.
    async fn resolve(&self, service: &str) -> Option<String>;
}

/// A fixed name-to-authority map, used when discovery is disabled.
pub struct StaticResolver {
    addresses: HashMap<String, String>,
}

impl StaticResolver {
    /// Creates a resolver over the given map.
    pub fn new(addresses: HashMap<String, String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl ServiceResolver for StaticResolver {
    async fn resolve(&self, service: &str) -> Option<String> {
        self.addresses.get(service).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_configured_address() {
        let mut map = HashMap::new();
        map.insert("student-profiler".to_string(), "127.0.0.1:8001".to_string());
        let resolver = StaticResolver::new(map);

        assert_eq!(
            resolver.resolve("student-profiler").await.as_deref(),
            Some("127.0.0.1:8001")
        );
        assert_eq!(resolver.resolve("unknown-service").await, None);
    }
}
