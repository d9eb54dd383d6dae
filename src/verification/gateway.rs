//! Outbound delivery of verification codes
//!
//! SMS and email providers are external. `WebhookSender` posts a JSON
//! message to a relay URL; `LogSender` only records the delivery in the log
//! and is used when no relay is configured.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::sanitize_for_logging;

#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Deliver `message` to `destination` (phone number or email address)
    async fn send(&self, destination: &str, message: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Logs deliveries without sending anything
pub struct LogSender {
    channel: &'static str,
}

impl LogSender {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl CodeSender for LogSender {
    async fn send(&self, destination: &str, _message: &str) -> Result<()> {
        info!(
            channel = self.channel,
            destination = %mask_destination(destination),
            "Verification message queued (no gateway configured)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    to: &'a str,
    message: &'a str,
}

/// Posts messages to an SMS or email relay
pub struct WebhookSender {
    client: Client,
    url: String,
    channel: &'static str,
    api_key: Option<String>,
}

impl WebhookSender {
    pub fn new(
        url: &str,
        channel: &'static str,
        api_key: Option<String>,
        timeout_secs: u64,
        require_https: bool,
    ) -> Result<Self> {
        if require_https && !url.starts_with("https://") {
            return Err(anyhow!(
                "HTTPS is required but {} gateway URL is not HTTPS: {}",
                channel,
                url
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("CampusMarket/1.0 (Verification Gateway)")
            .https_only(require_https)
            .build()
            .context("Failed to create gateway HTTP client")?;

        info!(channel, "Webhook gateway configured");

        Ok(Self {
            client,
            url: url.to_string(),
            channel,
            api_key,
        })
    }
}

#[async_trait]
impl CodeSender for WebhookSender {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let mut request = self.client.post(&self.url).json(&WebhookPayload {
            channel: self.channel,
            to: destination,
            message,
        });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {} gateway", self.channel))?;

        response
            .error_for_status()
            .with_context(|| format!("{} gateway rejected the message", self.channel))?;

        debug!(
            channel = self.channel,
            destination = %mask_destination(destination),
            "Verification message delivered"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Mask a phone number or email address for logs
pub fn mask_destination(destination: &str) -> String {
    if let Some((local, domain)) = destination.split_once('@') {
        let first: String = local.chars().take(1).collect();
        return format!("{}***@{}", first, domain);
    }

    let digits: Vec<char> = destination.chars().collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), tail)
}

/// Build the message body for a code
pub fn code_message(code: &str, ttl_minutes: i64) -> String {
    format!(
        "Your Campus Market verification code is {}. It expires in {} minutes.",
        code, ttl_minutes
    )
}

/// Log a gateway secret without exposing it
pub fn describe_gateway_key(key: &Option<String>) -> String {
    key.as_deref()
        .map(|k| sanitize_for_logging(&format!("api_key:{}", k)))
        .unwrap_or_else(|| "none".to_string())
}
