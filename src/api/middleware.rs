//! Security Middleware for the Campus Market API
//!
//! Provides:
//! - Bearer session authentication
//! - Admin key checks
//! - Rate limiting per IP
//! - Request size limits
//! - Security headers
//! - Request logging with sanitization

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{MarketError, MarketResult};
use crate::market::{AccountRole, Principal, SessionStore};
use crate::security::constant_time_eq;

/// Security configuration for middleware
#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    /// Key expected in `x-admin-key`; admin routes are closed when empty
    pub admin_api_key: String,
    /// Rate limit: requests per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Enable request logging
    pub log_requests: bool,
    /// Sanitize sensitive data in logs
    pub sanitize_logs: bool,
    /// Paths that don't require a bearer token
    pub public_paths: Vec<String>,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only safe behind a reverse proxy that overwrites those headers.
    pub trust_forwarded_for: bool,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            admin_api_key: String::new(),
            rate_limit_per_minute: 120,
            max_request_size: 64 * 1024, // 64KB
            log_requests: true,
            sanitize_logs: true,
            public_paths: vec![
                "/api/sellers/".to_string(), // registration and public trust reports
                "/api/buyers/register".to_string(),
                "/api/auth/login".to_string(),
                "/api/admin/".to_string(), // guarded by the admin key instead
            ],
            trust_forwarded_for: false,
        }
    }
}

/// Rate limiter state - tracks requests per IP
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of IP -> (request count, window start)
    requests: DashMap<String, (u32, Instant)>,
    /// Requests allowed per window
    limit: u32,
    /// Window duration
    window: Duration,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests: DashMap::new(),
            limit: requests_per_minute,
            window: Duration::from_secs(60),
        }
    }

    /// Check if request is allowed and update counter
    /// Returns (allowed, remaining, reset_after_secs)
    pub fn check_request(&self, ip: &str) -> (bool, u32, u64) {
        let now = Instant::now();

        let mut entry = self.requests.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset window if expired
        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        let remaining = self.limit.saturating_sub(*count);
        let reset_after = self
            .window
            .checked_sub(now.duration_since(*window_start))
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if *count >= self.limit {
            return (false, 0, reset_after);
        }

        *count += 1;
        (true, remaining.saturating_sub(1), reset_after)
    }

    /// Clean up old entries (call periodically)
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.requests
            .retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }
}

/// Shared state for security middleware
#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionStore>,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig, sessions: Arc<SessionStore>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        Self {
            config,
            rate_limiter,
            sessions,
        }
    }
}

/// Extract client IP from request
///
/// Forwarding headers are client-controlled unless a proxy rewrites them, so
/// they are read only when `trust_forwarded_for` is set.
fn get_client_ip(
    headers: &HeaderMap,
    addr: Option<&SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        // Take the first IP (original client)
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    // Fall back to socket address
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn connect_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Sanitize value for logging (mask sensitive data)
pub fn sanitize_for_log(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check if path is public (doesn't require auth)
fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|p| path.starts_with(p))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Bearer session middleware
///
/// A valid token attaches its [`Principal`] to the request. Protected paths
/// reject requests without one; public paths accept them but still pick up
/// the principal when a token is sent.
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    let path = request.uri().path().to_string();
    let public = is_public_path(&path, &state.config.public_paths);

    match bearer_token(&headers) {
        Some(token) => match state.sessions.resolve(token) {
            Some(principal) => {
                debug!(
                    role = principal.role.as_str(),
                    account_id = %principal.account_id,
                    "Session authenticated for path: {}",
                    path
                );
                request.extensions_mut().insert(principal);
            }
            None if public => {}
            None => {
                warn!("Invalid or expired session token for path: {}", path);
                return Err(MarketError::Unauthorized);
            }
        },
        None if public => {}
        None => {
            warn!("Missing bearer token for path: {}", path);
            return Err(MarketError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

/// Admin key middleware, applied to the admin routes only
pub async fn admin_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    let expected = &state.config.admin_api_key;
    if expected.is_empty() {
        warn!("Admin request rejected: no admin key configured");
        return Err(MarketError::Forbidden(
            "Admin access is not configured".to_string(),
        ));
    }

    let supplied = headers.get("x-admin-key").map(|v| v.as_bytes());
    match supplied {
        Some(key) if constant_time_eq(key, expected.as_bytes()) => Ok(next.run(request).await),
        Some(_) => {
            warn!("Invalid admin key for path: {}", request.uri().path());
            Err(MarketError::Unauthorized)
        }
        None => Err(MarketError::Unauthorized),
    }
}

/// Authenticated caller, as attached by [`auth_middleware`]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(MarketError::Unauthorized)
    }
}

/// Reject callers of the wrong account type
pub fn require_role(principal: &Principal, role: AccountRole) -> MarketResult<()> {
    if principal.role == role {
        Ok(())
    } else {
        Err(MarketError::Forbidden(format!(
            "This action is only available to {} accounts",
            role.as_str()
        )))
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let client_ip = get_client_ip(
        &headers,
        connect_addr(&request).as_ref(),
        state.config.trust_forwarded_for,
    );
    let (allowed, remaining, reset_after) = state.rate_limiter.check_request(&client_ip);

    if !allowed {
        warn!(
            "Rate limit exceeded for IP: {} on path: {}",
            sanitize_for_log(&client_ip),
            request.uri().path()
        );

        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        let headers = response.headers_mut();
        headers.insert(
            "X-RateLimit-Limit",
            HeaderValue::from(state.config.rate_limit_per_minute),
        );
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));
        headers.insert("Retry-After", HeaderValue::from(reset_after));

        return Err(response);
    }

    let mut response = next.run(request).await;

    // Add rate limit headers to response
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from(state.config.rate_limit_per_minute),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));

    Ok(response)
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // Prevent clickjacking
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    // Prevent MIME type sniffing
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );

    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    // Responses carry account data
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );

    headers.remove("Server");

    response
}

/// Request logging middleware with sanitization
pub async fn logging_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = get_client_ip(
        &headers,
        connect_addr(&request).as_ref(),
        state.config.trust_forwarded_for,
    );

    // Sanitize IP if needed
    let log_ip = if state.config.sanitize_logs {
        sanitize_for_log(&client_ip)
    } else {
        client_ip
    };

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Request completed"
        );
    }

    response
}

/// Request body size validation middleware
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Check Content-Length header if present
    if let Some(length) = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > state.config.max_request_size {
            warn!(
                "Request body too large: {} bytes (max: {})",
                length, state.config.max_request_size
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(3);

        // First 3 requests should be allowed
        assert!(limiter.check_request("127.0.0.1").0);
        assert!(limiter.check_request("127.0.0.1").0);
        assert!(limiter.check_request("127.0.0.1").0);

        // 4th request should be denied
        let (allowed, remaining, _) = limiter.check_request("127.0.0.1");
        assert!(!allowed);
        assert_eq!(remaining, 0);

        // Different IP should still be allowed
        assert!(limiter.check_request("192.168.1.1").0);
    }

    #[test]
    fn test_sanitize_for_log() {
        assert_eq!(sanitize_for_log("short"), "*****");
        assert_eq!(sanitize_for_log("abcdefghij"), "abcd...ghij");
        let result = sanitize_for_log("192.168.1.100");
        assert!(result.starts_with("192."));
        assert!(result.ends_with(".100"));
    }

    #[test]
    fn test_is_public_path() {
        let public = SecurityMiddlewareConfig::default().public_paths;

        assert!(is_public_path("/api/sellers/register", &public));
        assert!(is_public_path("/api/auth/login", &public));
        assert!(!is_public_path("/api/verify/phone", &public));
        assert!(!is_public_path("/api/orders/create", &public));
    }

    #[test]
    fn test_client_ip_ignores_forwarding_headers_by_default() {
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("5.6.7.8"));

        assert_eq!(get_client_ip(&headers, Some(&peer), false), "10.0.0.7");
        assert_eq!(get_client_ip(&headers, Some(&peer), true), "1.2.3.4");

        headers.remove("x-forwarded-for");
        assert_eq!(get_client_ip(&headers, Some(&peer), true), "5.6.7.8");
        assert_eq!(get_client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[tokio::test]
    async fn test_spoofed_forwarding_header_does_not_reset_rate_limit() {
        use axum::{Router, body::Body, routing::get};
        use tower::ServiceExt;

        let config = SecurityMiddlewareConfig {
            rate_limit_per_minute: 2,
            ..Default::default()
        };
        let state = SecurityState::new(
            config,
            Arc::new(SessionStore::new(chrono::Duration::hours(1))),
        );
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(
                state,
                rate_limit_middleware,
            ));

        let mut statuses = Vec::new();
        for spoofed in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
            let request = axum::http::Request::builder()
                .uri("/ping")
                .header("x-forwarded-for", spoofed)
                .body(Body::empty())
                .unwrap();
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }
        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }

    #[tokio::test]
    async fn test_admin_key_comparison() {
        use axum::{Router, body::Body, routing::get};
        use tower::ServiceExt;

        let config = SecurityMiddlewareConfig {
            admin_api_key: "admin-key-0001".to_string(),
            ..Default::default()
        };
        let state = SecurityState::new(
            config,
            Arc::new(SessionStore::new(chrono::Duration::hours(1))),
        );
        let app = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state, admin_middleware));

        let mut statuses = Vec::new();
        for key in ["admin-key-0001", "admin-key-0002", "admin-key-000", ""] {
            let request = axum::http::Request::builder()
                .uri("/admin")
                .header("x-admin-key", key)
                .body(Body::empty())
                .unwrap();
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }
        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::UNAUTHORIZED,
                StatusCode::UNAUTHORIZED,
                StatusCode::UNAUTHORIZED
            ]
        );
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_require_role() {
        let principal = Principal {
            role: AccountRole::Buyer,
            account_id: uuid::Uuid::new_v4(),
        };
        assert!(require_role(&principal, AccountRole::Buyer).is_ok());
        assert!(matches!(
            require_role(&principal, AccountRole::Seller),
            Err(MarketError::Forbidden(_))
        ));
    }
}
