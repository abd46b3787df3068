use crate::resolver::ServiceResolver;
use async_trait::async_trait;
use edupath_core::{EdupathError, EdupathResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the HTTP registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the discovery backend, e.g. `http://registry:8500`.
    pub base_url: String,
    /// Bound on every lookup and registration call.
    pub timeout: Duration,
}

impl RegistryConfig {
    /// Config with the default 2-second lookup timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// One registered instance as reported by the discovery backend.
///
/// Field names follow the Consul health API (`GET /v1/health/service/:name`),
/// which nests the service record under `Service`.
#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Service")]
    service: ServiceRecord,
}

#[derive(Debug, Deserialize)]
struct ServiceRecord {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
}

#[derive(Debug, Serialize)]
struct Registration<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
}

/// Resolves service names against a discovery backend, falling back to a
/// static per-service address when the backend is unreachable, times out,
/// or reports no passing instance.
///
/// Lookups are stateless: nothing is cached between calls, so the view is
/// never staler than one lookup. When several instances are registered the
/// first returned is used; instance selection is left to the backend and no
/// load balancing is attempted here.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    fallbacks: HashMap<String, String>,
}

impl RegistryClient {
    /// Creates a client for the given backend and fallback addresses.
    pub fn new(config: RegistryConfig, fallbacks: HashMap<String, String>) -> EdupathResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EdupathError::Discovery(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url,
            fallbacks,
        })
    }

    /// Advertises the gateway itself to the discovery backend.
    ///
    /// Registration failure is logged and swallowed: a gateway that cannot
    /// register can still serve traffic from fallback configuration.
    pub async fn register_self(&self, name: &str, address: &str, port: u16) {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        let body = Registration {
            name,
            address,
            port,
        };
        match self.client.put(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(service = name, "Registered with discovery backend");
            }
            Ok(resp) => {
                warn!(service = name, status = %resp.status(), "Registry rejected registration");
            }
            Err(e) => {
                warn!(service = name, error = %e, "Could not register with discovery backend");
            }
        }
    }

    async fn lookup(&self, service: &str) -> EdupathResult<Option<String>> {
        let url = format!("{}/v1/health/service/{}?passing=true", self.base_url, service);
        let entries: Vec<HealthEntry> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EdupathError::Discovery(e.to_string()))?
            .error_for_status()
            .map_err(|e| EdupathError::Discovery(e.to_string()))?
            .json()
            .await
            .map_err(|e| EdupathError::Discovery(e.to_string()))?;

        Ok(entries
            .first()
            .map(|e| format!("{}:{}", e.service.address, e.service.port)))
    }
}

#[async_trait]
impl ServiceResolver for RegistryClient {
    async fn resolve(&self, service: &str) -> Option<String> {
        match self.lookup(service).await {
            Ok(Some(address)) => {
                debug!(service, %address, "Resolved via discovery backend");
                Some(address)
            }
            Ok(None) => {
                warn!(service, "No instance registered, using fallback address");
                self.fallbacks.get(service).cloned()
            }
            Err(e) => {
                warn!(service, error = %e, "Discovery lookup failed, using fallback address");
                self.fallbacks.get(service).cloned()
            }
        }
    }
}
