use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use campus_market::{
    AccountService, AuditLogger, CodeSender, DatabasePool, FraudDetector, ListingService,
    LogSender, MarketApiState, MarketStore, MemoryStore, ReputationManager,
    SecurityMiddlewareConfig, SecurityState, SessionStore, VerificationManager, WebhookSender,
    config::{GatewayConfig, MarketConfig},
    create_app,
    verification::gateway::describe_gateway_key,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all settings
    let config = MarketConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the MARKET_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;

    info!("Starting Campus Market trust service");
    info!("Configuration: {}", config.sanitized_summary());

    // Storage
    let store: Arc<dyn MarketStore> = if config.database.postgres_enabled {
        let pool = DatabasePool::new(
            &config.database.postgres_url,
            config.database.max_connections,
        )
        .await?;
        pool.init_schema().await?;
        info!("Using PostgreSQL store");
        Arc::new(pool)
    } else {
        warn!("PostgreSQL disabled, records are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Trust layer
    let audit = Arc::new(AuditLogger::new());
    let sessions = Arc::new(SessionStore::new(chrono::Duration::hours(
        config.security.session_ttl_hours,
    )));
    let reputation = Arc::new(ReputationManager::new(store.clone(), audit.clone()));
    let fraud = Arc::new(FraudDetector::new(config.fraud.clone(), audit.clone()));

    let (sms, email) = create_gateways(&config.gateways)?;
    if config.logging.sanitize_logs {
        info!(
            "Gateway credentials: {}",
            describe_gateway_key(&config.gateways.api_key)
        );
    }

    let verification = Arc::new(VerificationManager::new(
        &config.verification,
        sms,
        email,
        store.clone(),
        reputation.clone(),
        audit.clone(),
    ));
    let accounts = Arc::new(AccountService::new(
        store.clone(),
        sessions.clone(),
        audit.clone(),
    ));
    let listings = Arc::new(ListingService::new(
        store.clone(),
        reputation.clone(),
        fraud.clone(),
        config.purchase.clone(),
        audit.clone(),
    ));

    info!(
        "Verification: code TTL {}m, {} attempts, {}s resend cooldown, campus domains {:?}",
        config.verification.code_ttl_minutes,
        config.verification.max_attempts,
        config.verification.resend_cooldown_secs,
        config.verification.campus_domains
    );

    // Security middleware
    let security_config = SecurityMiddlewareConfig {
        admin_api_key: config.security.admin_api_key.clone(),
        rate_limit_per_minute: config.security.rate_limit_per_minute,
        max_request_size: config.security.max_request_size,
        log_requests: config.logging.log_requests,
        sanitize_logs: config.logging.sanitize_logs,
        trust_forwarded_for: config.security.trust_proxy,
        ..Default::default()
    };
    let security_state = SecurityState::new(security_config, sessions.clone());

    spawn_cleanup(
        sessions.clone(),
        verification.clone(),
        security_state.clone(),
    );

    let app = create_app(
        MarketApiState {
            store,
            accounts,
            verification,
            reputation,
            listings,
            fraud,
            audit,
        },
        security_state,
    );

    // Start the server on configured host/port
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Campus Market listening on {}", bind_addr);
    info!(
        "Security middleware: Rate limit={}/min, Max body={}KB",
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize logging; `RUST_LOG` overrides the configured filter
fn init_secure_logging(config: &MarketConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .with_context(|| format!("Invalid log filter: {}", config.logging.level))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    } else {
        warn!("Log sanitization disabled - client addresses will be logged in full");
    }

    Ok(())
}

/// SMS and email senders: webhook relays when configured, log-only otherwise
fn create_gateways(config: &GatewayConfig) -> Result<(Arc<dyn CodeSender>, Arc<dyn CodeSender>)> {
    let build = |url: &Option<String>, channel: &'static str| -> Result<Arc<dyn CodeSender>> {
        match url {
            Some(url) => Ok(Arc::new(WebhookSender::new(
                url,
                channel,
                config.api_key.clone(),
                config.timeout_secs,
                config.require_https,
            )?)),
            None => {
                warn!(channel, "No gateway configured, codes will only be logged");
                Ok(Arc::new(LogSender::new(channel)))
            }
        }
    };

    Ok((
        build(&config.sms_webhook_url, "sms")?,
        build(&config.email_webhook_url, "email")?,
    ))
}

/// Periodically drop expired sessions, codes and rate limit windows
fn spawn_cleanup(
    sessions: Arc<SessionStore>,
    verification: Arc<VerificationManager>,
    security: SecurityState,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let expired_sessions = sessions.cleanup();
            let expired_codes = verification.cleanup(chrono::Utc::now());
            security.rate_limiter.cleanup();
            if expired_sessions + expired_codes > 0 {
                tracing::debug!(expired_sessions, expired_codes, "Expired entries removed");
            }
        }
    });
}
