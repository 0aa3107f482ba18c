use std::sync::Arc;

use gumshoe::auth::{Argon2Signer, HmacSigner, SignatureAuthenticator, SignatureScheme};
use gumshoe::catalog::{CatalogClient, CatalogClientConfig, HttpCatalogApi};
use gumshoe::clock::{Clock, SystemClock};
use gumshoe::config::{AppConfig, SignatureSchemeKind};
use gumshoe::database::{
    self,
    repositories::{SqlxBlacklistRepository, SqlxSubscriptionRepository},
};
use gumshoe::logging;
use gumshoe::notification::pipeline::PipelineServices;
use gumshoe::notification::{MailTemplates, NotificationPipeline, SmtpMailer};
use gumshoe::scheduler::DailyScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let log_guard = logging::init_logging(&config.log_dir)?;

    let shutdown = CancellationToken::new();
    log_guard.start_retention_cleanup(shutdown.clone());

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let subscriptions = Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
    let blacklist = Arc::new(SqlxBlacklistRepository::new(pool.clone()));

    let catalog_api = HttpCatalogApi::new(&config.catalog.base_url, config.catalog.timeout)?;
    let catalog = Arc::new(CatalogClient::new(
        Arc::new(catalog_api),
        CatalogClientConfig::new(&config.catalog.api_key, &config.catalog.pin),
        clock.clone(),
    ));

    let scheme: Arc<dyn SignatureScheme> = match config.auth.scheme {
        SignatureSchemeKind::Hmac => Arc::new(HmacSigner::new(&config.auth.secret_key)?),
        SignatureSchemeKind::Argon2 => Arc::new(Argon2Signer::new(&config.auth.secret_key)?),
    };
    let authenticator = Arc::new(
        SignatureAuthenticator::new(scheme, blacklist.clone(), clock.clone())
            .with_token_ttl(chrono::Duration::seconds(config.auth.token_ttl_secs)),
    );

    let services = PipelineServices {
        subscriptions,
        blacklist,
        catalog,
        authenticator,
        mailer: Arc::new(SmtpMailer::new(&config.smtp)?),
        templates: Arc::new(MailTemplates::new(&config.auth.api_url)?),
        clock: clock.clone(),
    };
    let pipeline = Arc::new(NotificationPipeline::new(services, config.pipeline));

    let scheduler = DailyScheduler::new(&config.notify_cron, pipeline, clock, shutdown.clone())?;

    info!(
        database = %config.database_url,
        schedule = %config.notify_cron,
        signature_scheme = ?config.auth.scheme,
        "gumshoe initialized successfully"
    );

    let scheduler_task = tokio::spawn(scheduler.run());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
    shutdown.cancel();

    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    pool.close().await;

    info!("gumshoe stopped");
    Ok(())
}
