use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::purchase::PurchaseLimits;
use crate::security::FraudThresholds;

/// Configuration for the campus market service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Verification code configuration
    pub verification: VerificationConfig,
    /// SMS and email relays
    pub gateways: GatewayConfig,
    /// Daily purchase caps per buyer level
    pub purchase: PurchaseLimits,
    /// Fraud heuristic thresholds
    pub fraud: FraudThresholds,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Rate limit per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Key expected in `x-admin-key` for admin routes; admin routes are closed when empty
    pub admin_api_key: String,
    /// Bearer session lifetime in hours
    pub session_ttl_hours: i64,
    /// Rate limit by `X-Forwarded-For` instead of the peer address (reverse proxy only)
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Minutes a code stays valid
    pub code_ttl_minutes: i64,
    /// The wrong submission with this number burns the code
    pub max_attempts: u32,
    /// Seconds before a new code may be sent on the same channel
    pub resend_cooldown_secs: i64,
    /// Email domains that count as student addresses (suffix match)
    pub campus_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// SMS relay URL, codes are only logged when unset
    pub sms_webhook_url: Option<String>,
    /// Email relay URL, codes are only logged when unset
    pub email_webhook_url: Option<String>,
    /// Bearer key sent to both relays
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Reject relay URLs that are not HTTPS
    pub require_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter: a level (error, warn, info, debug) or `tracing` directives
    pub level: String,
    /// Enable log sanitization to prevent sensitive data exposure
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory store)
    pub postgres_enabled: bool,
    pub max_connections: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_minutes: 10,
            max_attempts: 5,
            resend_cooldown_secs: 60,
            campus_domains: vec![".edu".to_string()],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/campus_market".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            security: SecurityConfig {
                rate_limit_per_minute: 120,
                max_request_size: 64 * 1024, // 64KB
                admin_api_key: String::new(), // Must be set via environment
                session_ttl_hours: 24,
                trust_proxy: false,
            },
            verification: VerificationConfig::default(),
            gateways: GatewayConfig {
                sms_webhook_url: None,
                email_webhook_url: None,
                api_key: None,
                timeout_secs: 10,
                require_https: true,
            },
            purchase: PurchaseLimits::default(),
            fraud: FraudThresholds::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false, // Disabled by default for security
            },
        }
    }
}

fn parse_var<T>(var: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(value) => {
            let parsed = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} value", name))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

impl MarketConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from `MARKET_*` variables supplied by `var` and validate it
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Some(host) = var("MARKET_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_var(&var, "MARKET_PORT")? {
            config.server.port = port;
        }

        // Security configuration
        if let Some(rate_limit) = parse_var(&var, "MARKET_RATE_LIMIT_PER_MINUTE")? {
            config.security.rate_limit_per_minute = rate_limit;
        }
        if let Some(size) = parse_var(&var, "MARKET_MAX_REQUEST_SIZE")? {
            config.security.max_request_size = size;
        }
        if let Some(hours) = parse_var(&var, "MARKET_SESSION_TTL_HOURS")? {
            config.security.session_ttl_hours = hours;
        }
        match var("MARKET_ADMIN_API_KEY") {
            Some(key) => config.security.admin_api_key = key,
            None => warn!("MARKET_ADMIN_API_KEY not set, admin routes are disabled"),
        }
        if let Some(trust_proxy) = parse_var(&var, "MARKET_TRUST_PROXY")? {
            config.security.trust_proxy = trust_proxy;
        }

        // Verification configuration
        if let Some(minutes) = parse_var(&var, "MARKET_CODE_TTL_MINUTES")? {
            config.verification.code_ttl_minutes = minutes;
        }
        if let Some(attempts) = parse_var(&var, "MARKET_CODE_MAX_ATTEMPTS")? {
            config.verification.max_attempts = attempts;
        }
        if let Some(secs) = parse_var(&var, "MARKET_CODE_RESEND_COOLDOWN_SECS")? {
            config.verification.resend_cooldown_secs = secs;
        }
        if let Some(domains) = var("MARKET_CAMPUS_DOMAINS") {
            config.verification.campus_domains = domains
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
        }

        // Gateway configuration
        if let Some(url) = var("MARKET_SMS_WEBHOOK_URL") {
            config.gateways.sms_webhook_url = Some(url);
        }
        if let Some(url) = var("MARKET_EMAIL_WEBHOOK_URL") {
            config.gateways.email_webhook_url = Some(url);
        }
        if let Some(key) = var("MARKET_GATEWAY_API_KEY") {
            config.gateways.api_key = Some(key);
        }
        if let Some(secs) = parse_var(&var, "MARKET_GATEWAY_TIMEOUT_SECS")? {
            config.gateways.timeout_secs = secs;
        }
        if let Some(require_https) = parse_var(&var, "MARKET_GATEWAY_REQUIRE_HTTPS")? {
            config.gateways.require_https = require_https;
        }

        // Purchase caps
        if let Some(cap) = parse_var(&var, "MARKET_PURCHASE_CAP_BASIC")? {
            config.purchase.basic = cap;
        }
        if let Some(cap) = parse_var(&var, "MARKET_PURCHASE_CAP_VERIFIED")? {
            config.purchase.verified = cap;
        }
        if let Some(cap) = parse_var::<f64>(&var, "MARKET_PURCHASE_CAP_TRUSTED")? {
            // Zero or negative means unlimited
            config.purchase.trusted = if cap > 0.0 { Some(cap) } else { None };
        }

        // Fraud thresholds
        if let Some(ratio) = parse_var(&var, "MARKET_FRAUD_PRICE_LOW_RATIO")? {
            config.fraud.price_low_ratio = ratio;
        }
        if let Some(ratio) = parse_var(&var, "MARKET_FRAUD_PRICE_HIGH_RATIO")? {
            config.fraud.price_high_ratio = ratio;
        }
        if let Some(share) = parse_var(&var, "MARKET_FRAUD_MAX_OUTLIER_SHARE")? {
            config.fraud.max_outlier_share = share;
        }
        if let Some(max) = parse_var(&var, "MARKET_FRAUD_MAX_CANCELLATIONS")? {
            config.fraud.max_cancellations = max;
        }
        if let Some(days) = parse_var(&var, "MARKET_FRAUD_CANCELLATION_WINDOW_DAYS")? {
            config.fraud.cancellation_window_days = days;
        }

        // Database configuration
        if let Some(url) = var("MARKET_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        if let Some(enabled) = parse_var(&var, "MARKET_POSTGRES_ENABLED")? {
            config.database.postgres_enabled = enabled;
        }
        if let Some(max) = parse_var(&var, "MARKET_POSTGRES_MAX_CONNECTIONS")? {
            config.database.max_connections = max;
        }

        // Logging configuration
        if let Some(log_level) = var("MARKET_LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Some(sanitize_logs) = parse_var(&var, "MARKET_SANITIZE_LOGS")? {
            config.logging.sanitize_logs = sanitize_logs;
        }
        if let Some(log_requests) = parse_var(&var, "MARKET_LOG_REQUESTS")? {
            config.logging.log_requests = log_requests;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err(anyhow::anyhow!("Rate limit must be non-zero"));
        }

        if self.security.session_ttl_hours <= 0 {
            return Err(anyhow::anyhow!("Session TTL must be positive"));
        }

        if !self.security.admin_api_key.is_empty() && self.security.admin_api_key.len() < 16 {
            return Err(anyhow::anyhow!(
                "Admin API key is too short (minimum 16 characters)"
            ));
        }

        if self.verification.code_ttl_minutes <= 0 {
            return Err(anyhow::anyhow!("Code TTL must be positive"));
        }

        if self.verification.max_attempts == 0 {
            return Err(anyhow::anyhow!("Code attempt limit must be non-zero"));
        }

        if self.verification.resend_cooldown_secs < 0 {
            return Err(anyhow::anyhow!("Resend cooldown cannot be negative"));
        }

        if self.gateways.require_https {
            for (name, url) in [
                ("SMS", &self.gateways.sms_webhook_url),
                ("email", &self.gateways.email_webhook_url),
            ] {
                if let Some(url) = url {
                    if !url.starts_with("https://") {
                        return Err(anyhow::anyhow!(
                            "HTTPS is required but {} gateway URL is not HTTPS: {}",
                            name,
                            url
                        ));
                    }
                }
            }
        }

        let caps = [
            self.purchase.basic,
            self.purchase.verified,
            self.purchase.trusted.unwrap_or(f64::INFINITY),
        ];
        if caps.iter().any(|cap| cap.is_nan() || *cap < 0.0) {
            return Err(anyhow::anyhow!("Purchase caps cannot be negative"));
        }
        if caps.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(anyhow::anyhow!(
                "Purchase caps must not decrease with buyer level"
            ));
        }

        let fraud = &self.fraud;
        if !(fraud.price_low_ratio.is_finite() && fraud.price_low_ratio >= 0.0)
            || !fraud.price_high_ratio.is_finite()
            || fraud.price_low_ratio >= fraud.price_high_ratio
        {
            return Err(anyhow::anyhow!("Fraud price ratios must satisfy 0 <= low < high"));
        }
        if !(fraud.max_outlier_share > 0.0 && fraud.max_outlier_share <= 1.0) {
            return Err(anyhow::anyhow!("Fraud outlier share must be in (0, 1]"));
        }
        if fraud.cancellation_window_days <= 0 {
            return Err(anyhow::anyhow!("Fraud cancellation window must be positive"));
        }

        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!("PostgreSQL URL cannot be empty"));
        }

        Ok(())
    }

    /// Configuration summary with secrets masked
    pub fn sanitized_summary(&self) -> String {
        format!(
            "{}:{} rate_limit={}/min admin_key={} postgres={} sms={} email={}",
            self.server.host,
            self.server.port,
            self.security.rate_limit_per_minute,
            if self.security.admin_api_key.is_empty() {
                "none".to_string()
            } else {
                sanitize_for_logging(&format!("key:{}", self.security.admin_api_key))
            },
            if self.database.postgres_enabled {
                sanitize_for_logging(&format!("password:{}", self.database.postgres_url))
            } else {
                "disabled".to_string()
            },
            self.gateways.sms_webhook_url.as_deref().unwrap_or("log"),
            self.gateways.email_webhook_url.as_deref().unwrap_or("log"),
        )
    }
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    // Common patterns for sensitive data
    let sensitive_patterns = [
        "auth",
        "key",
        "token",
        "password",
        "secret",
        "credential",
        "api_key",
        "apikey",
        "code",
    ];

    let data_lower = data.to_lowercase();
    if !sensitive_patterns.iter().any(|p| data_lower.contains(p)) {
        return data.to_string();
    }

    let chars: Vec<char> = data.chars().collect();
    // For very long strings, show more context but mask the middle
    let keep = if chars.len() > 20 { 6 } else { 2 };
    let head: String = chars.iter().take(keep.min(chars.len())).collect();
    let tail: String = chars[chars.len().saturating_sub(keep)..].iter().collect();
    format!("{}***{}", head, tail)
}
