//! EduPath API gateway: authentication, reverse proxying to discovered
//! backends, and realtime fan-out of queue-delivered domain events.

mod bridge;
mod connection;
mod middleware;
mod proxy;
mod routes;
mod server;

pub use bridge::{BridgeConfig, EventBridge};
pub use connection::{Session, SessionManager};
pub use middleware::AuthConfig;
pub use proxy::ProxyClient;
pub use routes::{RouteRule, RouteTable};
pub use server::{AppState, GatewayServer};
