//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        extractive_qa::HuggingFaceQaAdapter, generation_llm::OpenAiGenerationAdapter,
        store::MemoryStore, store::PgStore,
    },
    config::Config,
    error::ApiError,
    web::{
        chat_handler, create_chapter_handler, create_course_handler, delete_chapter_handler,
        delete_course_handler, delete_resource_handler, generate_artifact_handler,
        list_courses_handler, list_generations_handler, rest::ApiDoc, state::AppState,
        upload_resource_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use studyforge_core::inflight::InFlightRegistry;
use studyforge_core::ports::{BlobStore, CourseStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;
use axum::http::{Method, HeaderValue, header::{AUTHORIZATION, CONTENT_TYPE, ACCEPT}};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Stores ---
    let (courses, blobs): (Arc<dyn CourseStore>, Arc<dyn BlobStore>) = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let store = Arc::new(PgStore::new(db_pool));
            info!("Running database migrations...");
            store.run_migrations().await?;
            info!("Database migrations complete.");
            (store.clone() as Arc<dyn CourseStore>, store as Arc<dyn BlobStore>)
        }
        None => {
            info!("DATABASE_URL is not set; courses will live in memory only.");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn CourseStore>, store as Arc<dyn BlobStore>)
        }
    };

    // --- 3. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    if let Some(api_base) = &config.generation_api_base {
        openai_config = openai_config.with_api_base(api_base);
    }
    let openai_client = Client::with_config(openai_config);

    let generation_adapter = Arc::new(OpenAiGenerationAdapter::new(
        openai_client,
        config.generation_model.clone(),
    ));
    let qa_adapter = Arc::new(HuggingFaceQaAdapter::new(
        config.qa_endpoint.clone(),
        config.qa_api_key.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        courses,
        blobs,
        generation_adapter,
        qa_adapter,
        in_flight: InFlightRegistry::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/courses", get(list_courses_handler).post(create_course_handler))
        .route("/courses/{course_id}", delete(delete_course_handler))
        .route("/courses/{course_id}/chapters", post(create_chapter_handler))
        .route(
            "/courses/{course_id}/chapters/{chapter_id}",
            delete(delete_chapter_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/resources",
            post(upload_resource_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/resources/{resource_id}",
            delete(delete_resource_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/resources/{resource_id}/generate",
            post(generate_artifact_handler),
        )
        .route(
            "/courses/{course_id}/chapters/{chapter_id}/chat",
            post(chat_handler),
        )
        .route("/generations", get(list_generations_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
