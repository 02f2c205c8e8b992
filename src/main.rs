use origem_lab_api::assistant_proxy::AssistantProxy;
use origem_lab_api::config::Config;
use origem_lab_api::db::Database;
use origem_lab_api::db_storage::{EditalRepository, PgScoreStore, ScoreStore};
use origem_lab_api::gemini_client::{GeminiClient, TextGenerator};
use origem_lab_api::handlers::{api_routes, app_router_with, AppState};
use origem_lab_api::score_resolver::ScoreResolver;
use origem_lab_api::scoring::{RetryPolicy, ScoreComputeService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection (optional; score endpoints answer 500 without it).
/// - Gemini client, score compute service and resolver.
/// - n8n assistant proxy (optional).
/// - HTTP routes and middleware (CORS, body limit, rate limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "origem_lab_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Score store: absent or unreachable database leaves the score endpoints unavailable
    let pg_store = match config.database_url.as_deref() {
        Some(url) => match Database::new(url).await {
            Ok(db) => {
                tracing::info!("Database connection pool established");
                if config.run_migrations {
                    db.run_migrations().await?;
                }
                Some(Arc::new(PgScoreStore::new(db.pool.clone())))
            }
            Err(e) => {
                tracing::error!("Failed to connect to database: {}", e);
                None
            }
        },
        None => None,
    };
    let scores: Option<Arc<dyn ScoreStore>> = pg_store
        .clone()
        .map(|store| store as Arc<dyn ScoreStore>);
    let editais: Option<Arc<dyn EditalRepository>> =
        pg_store.map(|store| store as Arc<dyn EditalRepository>);

    // Generation provider
    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::from_config(&config)?);
    tracing::info!("✓ Gemini client initialized: {}", config.gemini_model);

    let compute = ScoreComputeService::new(generator, RetryPolicy::from_config(&config));
    let resolver = ScoreResolver::new(
        scores,
        editais,
        compute,
        Duration::from_secs(config.score_cache_ttl_secs),
    );
    tracing::info!(
        "Score resolver initialized (local cache TTL {}s)",
        config.score_cache_ttl_secs
    );

    let assistant = AssistantProxy::from_config(&config)?;
    if assistant.is_some() {
        tracing::info!("✓ n8n assistant proxy initialized");
    }

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        resolver,
        assistant,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Health check bypasses rate limiting
    let app = app_router_with(
        app_state,
        api_routes().layer(GovernorLayer {
            config: governor_conf,
        }),
    );

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
