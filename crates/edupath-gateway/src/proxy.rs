use axum::body::Body;
use axum::http::{Request, Response};
use edupath_core::{EdupathError, EdupathResult};
use std::time::Duration;

/// Headers that are connection-scoped and must not be relayed either way.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Forwards an inbound request to a resolved upstream and relays the
/// response back.
///
/// One attempt per request, no retries; a failed upstream call surfaces as
/// [`EdupathError::Upstream`] naming the service. The error detail never
/// contains the upstream address. The response body is streamed, so a client
/// that disconnects mid-transfer simply stops the relay.
pub struct ProxyClient {
    client: reqwest::Client,
}

impl ProxyClient {
    /// Creates a proxy client with the given per-call timeout.
    pub fn new(timeout: Duration) -> EdupathResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| EdupathError::Http(format!("failed to build proxy client: {e}")))?;
        Ok(Self { client })
    }

    /// Sends `request` to `http://{authority}{path}`, preserving method,
    /// query string, body, and all non-hop-by-hop headers.
    pub async fn forward(
        &self,
        authority: &str,
        service: &str,
        path: &str,
        request: Request<Body>,
    ) -> EdupathResult<Response<Body>> {
        let target = match request.uri().query() {
            Some(query) => format!("http://{authority}{path}?{query}"),
            None => format!("http://{authority}{path}"),
        };

        let method = request.method().clone();
        let headers = request.headers().clone();
        let body_bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| EdupathError::Http(format!("failed to read request body: {e}")))?;

        let mut outbound = self.client.request(method, &target);
        for (key, value) in headers.iter() {
            let name = key.as_str();
            if name == "host" || HOP_BY_HOP.contains(&name) {
                continue;
            }
            outbound = outbound.header(key, value);
        }
        if !body_bytes.is_empty() {
            outbound = outbound.body(body_bytes);
        }

        let upstream = outbound.send().await.map_err(|e| {
            // without_url keeps the internal address out of caller-visible text
            let detail = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.without_url().to_string()
            };
            EdupathError::Upstream {
                service: service.to_string(),
                detail,
            }
        })?;

        let mut builder = Response::builder().status(upstream.status());
        for (key, value) in upstream.headers().iter() {
            if HOP_BY_HOP.contains(&key.as_str()) {
                continue;
            }
            builder = builder.header(key, value);
        }

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| EdupathError::Http(format!("failed to build response: {e}")))
    }
}
