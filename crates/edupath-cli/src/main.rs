use clap::{Parser, Subcommand};
use edupath_auth::TokenService;
use edupath_discovery::{RegistryClient, RegistryConfig, ServiceResolver, StaticResolver};
use edupath_gateway::{
    AppState, AuthConfig, BridgeConfig, EventBridge, GatewayServer, ProxyClient, RouteRule,
    RouteTable, SessionManager,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edupath", about = "EduPath API gateway")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "edupath.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the active route table and exit
    Routes,
}

#[derive(Deserialize)]
struct EdupathConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    auth: AuthSection,
    #[serde(default)]
    queue: QueueSection,
    #[serde(default)]
    discovery: DiscoverySection,
    #[serde(default)]
    proxy: ProxySection,
    #[serde(default)]
    routes: Vec<RouteSection>,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Address advertised to the discovery backend. Defaults to `host`,
    /// which is only routable when `host` is not a wildcard bind.
    #[serde(default)]
    advertise_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            advertise_host: None,
        }
    }
}

fn advertised_host(server: &ServerConfig) -> &str {
    server.advertise_host.as_deref().unwrap_or(&server.host)
}

#[derive(Deserialize)]
struct AuthSection {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_secret")]
    secret: String,
    #[serde(default = "default_ttl_hours")]
    token_ttl_hours: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            enabled: true,
            secret: default_secret(),
            token_ttl_hours: default_ttl_hours(),
        }
    }
}

#[derive(Deserialize)]
struct QueueSection {
    #[serde(default = "default_queue_url")]
    url: String,
    #[serde(default = "default_stream")]
    stream: String,
    #[serde(default = "default_subject")]
    subject: String,
    #[serde(default = "default_consumer")]
    consumer: String,
    #[serde(default = "default_backoff_secs")]
    reconnect_backoff_secs: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            stream: default_stream(),
            subject: default_subject(),
            consumer: default_consumer(),
            reconnect_backoff_secs: default_backoff_secs(),
        }
    }
}

#[derive(Deserialize)]
struct DiscoverySection {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_registry_url")]
    url: String,
    #[serde(default = "default_lookup_timeout_ms")]
    lookup_timeout_ms: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_registry_url(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct ProxySection {
    #[serde(default = "default_proxy_timeout_secs")]
    timeout_secs: u64,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
struct RouteSection {
    prefix: String,
    service: String,
    /// Static address used when discovery is disabled or yields nothing.
    fallback: String,
    #[serde(default = "default_true")]
    strip_prefix: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_true() -> bool {
    true
}
fn default_secret() -> String {
    "supersecretkey".to_string()
}
fn default_ttl_hours() -> i64 {
    24
}
fn default_queue_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}
fn default_stream() -> String {
    "EDUPATH_EVENTS".to_string()
}
fn default_subject() -> String {
    "edupath.events".to_string()
}
fn default_consumer() -> String {
    "edupath-gateway".to_string()
}
fn default_backoff_secs() -> u64 {
    5
}
fn default_registry_url() -> String {
    "http://127.0.0.1:8500".to_string()
}
fn default_lookup_timeout_ms() -> u64 {
    2000
}
fn default_proxy_timeout_secs() -> u64 {
    10
}

/// Environment overrides for deployment-sensitive values.
fn apply_env_overrides(config: &mut EdupathConfig) {
    if let Ok(port) = std::env::var("EDUPATH_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "Ignoring unparseable EDUPATH_PORT"),
        }
    }
    if let Ok(secret) = std::env::var("EDUPATH_JWT_SECRET") {
        config.auth.secret = secret;
    }
    if let Ok(url) = std::env::var("EDUPATH_QUEUE_URL") {
        config.queue.url = url;
    }
    if let Ok(url) = std::env::var("EDUPATH_REGISTRY_URL") {
        config.discovery.url = url;
        config.discovery.enabled = true;
    }
    if std::env::var("EDUPATH_AUTH_DISABLED").is_ok_and(|v| v == "1" || v == "true") {
        config.auth.enabled = false;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let mut config: EdupathConfig = toml::from_str(&config_str)?;
    apply_env_overrides(&mut config);

    match cli.command {
        Commands::Routes => {
            for route in &config.routes {
                println!(
                    "{} -> {} (fallback {}, strip_prefix {})",
                    route.prefix, route.service, route.fallback, route.strip_prefix
                );
            }
            Ok(())
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            serve(config, port).await
        }
    }
}

async fn serve(config: EdupathConfig, port: u16) -> anyhow::Result<()> {
    if config.routes.is_empty() {
        warn!("No routes configured; only /login, /health and /ws will respond");
    }

    let fallbacks: HashMap<String, String> = config
        .routes
        .iter()
        .map(|r| (r.service.clone(), r.fallback.clone()))
        .collect();

    let resolver: Arc<dyn ServiceResolver> = if config.discovery.enabled {
        let registry = RegistryClient::new(
            RegistryConfig {
                base_url: config.discovery.url.clone(),
                timeout: Duration::from_millis(config.discovery.lookup_timeout_ms),
            },
            fallbacks,
        )?;
        let advertise = advertised_host(&config.server);
        if advertise == "0.0.0.0" {
            warn!(
                "Advertising the wildcard bind address to the registry; \
                 set server.advertise_host to a routable address"
            );
        }
        registry
            .register_self("edupath-gateway", advertise, port)
            .await;
        info!(registry = %config.discovery.url, "Dynamic service discovery enabled");
        Arc::new(registry)
    } else {
        info!("Service discovery disabled, using static route fallbacks");
        Arc::new(StaticResolver::new(fallbacks))
    };

    let rules: Vec<RouteRule> = config
        .routes
        .iter()
        .map(|r| RouteRule {
            prefix: r.prefix.clone(),
            service: r.service.clone(),
            strip_prefix: r.strip_prefix,
        })
        .collect();

    let sessions = SessionManager::new();
    let tokens = Arc::new(TokenService::new(
        &config.auth.secret,
        config.auth.token_ttl_hours,
    ));
    let auth = AuthConfig::new(config.auth.enabled);
    if !config.auth.enabled {
        warn!("Bearer auth is DISABLED; do not run this configuration in production");
    }

    let bridge = EventBridge::new(
        BridgeConfig {
            url: config.queue.url.clone(),
            stream: config.queue.stream.clone(),
            subject: config.queue.subject.clone(),
            consumer: config.queue.consumer.clone(),
            reconnect_backoff: Duration::from_secs(config.queue.reconnect_backoff_secs),
        },
        sessions.clone(),
    );
    tokio::spawn(bridge.run());

    let state = Arc::new(AppState {
        sessions,
        routes: RouteTable::new(rules),
        resolver,
        proxy: ProxyClient::new(Duration::from_secs(config.proxy.timeout_secs))
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        tokens,
        auth,
    });
    let app = GatewayServer::build(state);

    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("EduPath gateway listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
