//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use kindred_common::{Clock, FixedWindowRateLimiter, SystemClock};
use kindred_core::{
    ConnectionManager, ConnectionRepository, ProcessedEventLedger, ProviderRegistry,
    SyncOrchestrator, TaskStore, TokenLifecycleManager, WatchChannelManager, WebhookGatekeeper,
};
use kindred_domain::{Config, KindredError, Result};
use kindred_infra::scheduling::WatchRenewer;
use kindred_infra::{
    DbManager, GoogleCalendarProvider, GoogleOAuthClient, GoogleOAuthSettings, HttpClient,
    SqliteConnectionRepository, SqliteProcessedEventLedger, SqliteTaskStore,
    WatchRenewalScheduler, WatchRenewalSchedulerConfig,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::identity::{GatewayHeaderResolver, IdentityResolver};

/// Readiness probe behind `GET /health`.
pub trait HealthCheck: Send + Sync {
    fn check(&self) -> Result<()>;
}

impl HealthCheck for DbManager {
    fn check(&self) -> Result<()> {
        self.health_check()
    }
}

/// Ports the calendar services are wired against.
pub struct CalendarPorts {
    pub providers: Arc<ProviderRegistry>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub tasks: Arc<dyn TaskStore>,
    pub ledger: Arc<dyn ProcessedEventLedger>,
    pub clock: Arc<dyn Clock>,
}

/// The calendar services, wired once and shared by every request.
pub struct CalendarServices {
    pub connections: Arc<ConnectionManager>,
    pub sync: Arc<SyncOrchestrator>,
    pub watches: Arc<WatchChannelManager>,
    pub webhooks: Arc<WebhookGatekeeper>,
}

impl CalendarServices {
    pub fn wire(
        ports: CalendarPorts,
        limiter: Arc<FixedWindowRateLimiter>,
        webhook_base_url: &str,
    ) -> Self {
        let CalendarPorts { providers, connections, tasks, ledger, clock } = ports;

        let tokens = Arc::new(TokenLifecycleManager::new(
            providers.clone(),
            connections.clone(),
            clock.clone(),
        ));
        let watches = Arc::new(WatchChannelManager::new(
            providers.clone(),
            connections.clone(),
            tokens.clone(),
            clock.clone(),
            webhook_base_url,
        ));
        let manager = Arc::new(ConnectionManager::new(
            providers.clone(),
            connections.clone(),
            tasks.clone(),
            ledger.clone(),
            tokens.clone(),
            watches.clone(),
            clock.clone(),
        ));
        let sync = Arc::new(SyncOrchestrator::new(
            providers,
            connections.clone(),
            tasks,
            ledger,
            tokens,
            clock.clone(),
        ));
        let webhooks = Arc::new(WebhookGatekeeper::new(connections, sync.clone(), limiter, clock));

        Self { connections: manager, sync, watches, webhooks }
    }
}

#[derive(Default)]
struct Background {
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    renewal: Mutex<Option<WatchRenewalScheduler>>,
}

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub connections: Arc<ConnectionManager>,
    pub sync: Arc<SyncOrchestrator>,
    pub webhooks: Arc<WebhookGatekeeper>,
    pub identity: Arc<dyn IdentityResolver>,
    pub health: Arc<dyn HealthCheck>,
    pub clock: Arc<dyn Clock>,
    /// Deep-link prefix the OAuth callback page redirects to.
    pub app_redirect: String,
    background: Background,
}

impl AppContext {
    /// Context without background tasks, for callers that wire their own ports.
    pub fn from_services(
        services: CalendarServices,
        identity: Arc<dyn IdentityResolver>,
        health: Arc<dyn HealthCheck>,
        clock: Arc<dyn Clock>,
        app_redirect: impl Into<String>,
    ) -> Self {
        Self {
            connections: services.connections,
            sync: services.sync,
            webhooks: services.webhooks,
            identity,
            health,
            clock,
            app_redirect: app_redirect.into(),
            background: Background::default(),
        }
    }

    /// Open the database, wire the Google adapter and start the background
    /// tasks (rate limiter sweep, watch renewal).
    pub async fn new_with_config(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::new(
            &config.database.path,
            config.database.pool_size,
            config.database.encryption_key.as_deref(),
        )?);
        db.run_migrations()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = HttpClient::new()?;
        let oauth = GoogleOAuthClient::new(
            GoogleOAuthSettings::from_config(&config.google),
            http.clone(),
            clock.clone(),
        )?;
        let providers = Arc::new(
            ProviderRegistry::new().with_provider(Arc::new(GoogleCalendarProvider::new(oauth, http))),
        );

        let limiter = Arc::new(
            FixedWindowRateLimiter::new(
                config.webhook.max_requests,
                Duration::from_secs(config.webhook.window_seconds),
            )
            .map_err(|err| KindredError::Config(format!("invalid webhook rate limit: {err}")))?,
        );

        let services = CalendarServices::wire(
            CalendarPorts {
                providers,
                connections: Arc::new(SqliteConnectionRepository::new(db.clone())),
                tasks: Arc::new(SqliteTaskStore::new(db.clone())),
                ledger: Arc::new(SqliteProcessedEventLedger::new(db.clone())),
                clock: clock.clone(),
            },
            limiter.clone(),
            &config.google.webhook_base_url,
        );
        let watches = services.watches.clone();

        let ctx = Self::from_services(
            services,
            Arc::new(GatewayHeaderResolver),
            db,
            clock,
            config.server.app_redirect.clone(),
        );

        let sweeper = limiter.spawn_sweeper(
            Duration::from_secs(config.webhook.sweep_interval_seconds),
            ctx.background.shutdown.child_token(),
        );
        *ctx.background.sweeper.lock().await = Some(sweeper);

        if config.renewal.enabled {
            let renewer: Arc<dyn WatchRenewer> = watches;
            let mut scheduler = WatchRenewalScheduler::new(
                WatchRenewalSchedulerConfig::from(&config.renewal),
                renewer,
            );
            scheduler.start().await?;
            *ctx.background.renewal.lock().await = Some(scheduler);
        } else {
            info!("watch channel renewal disabled");
        }

        info!("application context ready");
        Ok(ctx)
    }

    /// Stop background tasks. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown called on AppContext");
        self.background.shutdown.cancel();

        if let Some(mut scheduler) = self.background.renewal.lock().await.take() {
            scheduler.stop().await?;
        }

        if let Some(sweeper) = self.background.sweeper.lock().await.take() {
            if let Err(err) = sweeper.await {
                warn!(error = %err, "rate limiter sweeper ended abnormally");
            }
        }
        Ok(())
    }
}
