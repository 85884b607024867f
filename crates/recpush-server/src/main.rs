mod adapters;
mod api;
mod middleware;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use recpush_clients::{KnowledgeBaseClient, LlmClient, PushClient, RetryPolicy};
use recpush_core::AppConfig;
use recpush_pipeline::{
    Collaborators, PipelineCoordinator, PipelineSettings, ProfileInference, Scheduler,
    SchedulerSettings,
};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use crate::{
    adapters::{PgActivity, PgHotTopics, PgProfiles, PgRecommendations},
    api::{build_app, AppState},
    middleware::AuthState,
};

#[derive(Debug, Parser)]
#[command(name = "recpush-server")]
#[command(about = "Personalised recommendation push service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP API (default).
    Serve,
    /// Run the full workflow once, print the report and exit.
    RunOnce,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Arc::new(recpush_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = recpush_db::PoolConfig::from_app_config(&config);
    let pool = recpush_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = recpush_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations complete");

    let stores = Stores::new(&pool);
    let coordinator = build_coordinator(&config, &stores)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::RunOnce => {
            let report = coordinator.run_full_workflow().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve => serve(&config, pool, coordinator, stores).await?,
    }
    Ok(())
}

struct Stores {
    activity: Arc<PgActivity>,
    profiles: Arc<PgProfiles>,
    recommendations: Arc<PgRecommendations>,
    hot_topics: Arc<PgHotTopics>,
}

impl Stores {
    fn new(pool: &PgPool) -> Self {
        Self {
            activity: Arc::new(PgActivity::new(pool.clone())),
            profiles: Arc::new(PgProfiles::new(pool.clone())),
            recommendations: Arc::new(PgRecommendations::new(pool.clone())),
            hot_topics: Arc::new(PgHotTopics::new(pool.clone())),
        }
    }
}

fn build_coordinator(config: &AppConfig, stores: &Stores) -> anyhow::Result<PipelineCoordinator> {
    let retry = RetryPolicy::new(config.client_max_retries, config.client_retry_backoff_ms);

    let inference: Option<Arc<dyn ProfileInference>> =
        match LlmClient::from_config(&config.llm, retry)? {
            Some(client) => Some(Arc::new(client)),
            None => {
                tracing::warn!("RECPUSH_LLM_API_KEY not set; profiles use the keyword heuristic only");
                None
            }
        };

    let deps = Collaborators {
        activity: stores.activity.clone(),
        inference,
        profiles: stores.profiles.clone(),
        knowledge: Arc::new(KnowledgeBaseClient::new(&config.rag, retry)?),
        recommendations: stores.recommendations.clone(),
        pusher: Arc::new(PushClient::new(&config.push)?),
        broadcast: stores.hot_topics.clone(),
    };
    Ok(PipelineCoordinator::new(
        deps,
        PipelineSettings::from_config(config),
    ))
}

async fn serve(
    config: &AppConfig,
    pool: PgPool,
    coordinator: PipelineCoordinator,
    stores: Stores,
) -> anyhow::Result<()> {
    let scheduler = Scheduler::start(
        SchedulerSettings::from_config(&config.schedule),
        Arc::new(coordinator.clone()),
    );

    let auth = AuthState::from_keys(
        &config.api_keys,
        matches!(config.env, recpush_core::Environment::Development),
    )?;
    let state = AppState {
        pool,
        coordinator,
        scheduler: Arc::clone(scheduler.scheduler()),
        profiles: stores.profiles,
        recommendations: stores.recommendations,
    };
    let app = build_app(state, auth);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
