use anyhow::Result;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use study_quiz::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    database::Database,
    llm_providers::LLMProviderFactory,
    llm_service::{GenerationSettings, LLMService},
    logging::init_tracing,
    quiz_service::QuizService,
};

// Import logging macros
use study_quiz::log_system_event;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging before anything else so configuration events are recorded
    let _guard = init_tracing(&LoggingConfig::from_env()?)?;

    let config = Config::from_env()?;
    config.validate()?;

    info!("Starting study quiz server...");

    // Initialize database
    let db = Database::new(&config.database.url).await?;
    let quiz_service = QuizService::new(db);

    // One provider client for the life of the process
    let provider = LLMProviderFactory::create_provider(&config.llm)?;
    let llm_service = LLMService::new(
        Arc::new(provider),
        GenerationSettings::from_config(&config.llm, &config.generation),
    );
    log_system_event!(
        startup,
        component = "llm_service",
        format!(
            "provider={} model={} fallback={:?}",
            llm_service.provider_name(),
            llm_service.model_name(),
            llm_service.fallback_policy()
        )
    );

    let state = AppState {
        quiz_service,
        llm_service,
        max_questions: config.generation.max_questions,
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
