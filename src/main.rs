use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use onboarding_portal::config::PortalConfig;
use onboarding_portal::notify::{Notifier, SmtpNotifier};
use onboarding_portal::onboarding::{OnboardingEngine, RandomCodes, RouteState, onboarding_routes};
use onboarding_portal::storage::{HttpObjectStorage, ObjectStorage};
use onboarding_portal::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage. Fails only if
    // another provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PortalConfig::from_env().context("Failed to load configuration")?;

    eprintln!("📋 Onboarding Portal v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.server.bind_addr());
    eprintln!("   Bucket: {} ({})", config.storage.bucket, config.storage.region);
    eprintln!("   SMTP: {}:{}", config.mail.smtp_host, config.mail.smtp_port);
    eprintln!(
        "   Passcodes: {} attempts, valid {}s",
        config.workflow.max_attempts,
        config.workflow.passcode_ttl.as_secs()
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.database_path))
            .await
            .with_context(|| format!("Failed to open database at {}", config.database_path))?,
    );
    eprintln!("   Database: {}", config.database_path);

    // ── Outbound clients ─────────────────────────────────────────────────
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(HttpObjectStorage::new(&config.storage).context("Invalid storage settings")?);
    let notifier: Arc<dyn Notifier> =
        Arc::new(SmtpNotifier::new(&config.mail).context("Invalid mail settings")?);

    // ── Workflow ─────────────────────────────────────────────────────────
    let engine = Arc::new(OnboardingEngine::new(
        Arc::clone(&db),
        storage,
        notifier,
        Arc::new(RandomCodes),
        config.workflow.clone(),
    ));

    if config.admin_token.is_none() {
        tracing::warn!("PORTAL_ADMIN_TOKEN not set, admin routes are unauthenticated");
    }

    let app = onboarding_routes(RouteState {
        engine,
        db,
        admin_token: config.admin_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr()))?;
    tracing::info!(addr = %config.server.bind_addr(), "Onboarding portal started");
    axum::serve(listener, app).await?;

    Ok(())
}
