/// One proxy rule: requests whose path starts with `prefix` are forwarded to
/// the service named `service`, with the prefix stripped unless
/// `strip_prefix` is false.
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Inbound path prefix, e.g. `/api/profiler`.
    pub prefix: String,
    /// Logical name of the target service.
    pub service: String,
    /// Whether the matched prefix is removed before forwarding.
    pub strip_prefix: bool,
}

/// The ordered set of proxy rules, loaded once at startup and immutable
/// thereafter.
///
/// Rules are checked in declared order and the first match wins, so more
/// specific prefixes must be declared before more general ones
/// (`/api/profiler/reports` before `/api/profiler`). Prefixes match on
/// segment boundaries: `/api/profiler` matches `/api/profiler/summary` but
/// not `/api/profilers`.
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Builds a table preserving the declared rule order.
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// The rules in match order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Finds the first rule matching `path`, returning it together with the
    /// rewritten path to forward upstream.
    pub fn match_path(&self, path: &str) -> Option<(&RouteRule, String)> {
        for rule in &self.rules {
            if let Some(rest) = path.strip_prefix(&rule.prefix) {
                if !rest.is_empty() && !rest.starts_with('/') {
                    continue;
                }
                let rewritten = if !rule.strip_prefix {
                    path.to_string()
                } else if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                };
                return Some((rule, rewritten));
            }
        }
        None
    }
}
