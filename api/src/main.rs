use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod error;
mod middleware;
mod providers;
mod routes;
mod state;

use config::ServerConfig;
use providers::Providers;
use providers::openai::OpenAiAgentFactory;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Formcall Voice API",
        version = "0.1.0",
        description = "Voice agent that fills web forms. Calls run over the `/call` websocket: the first text frame carries the session parameters, after which the server streams call events."
    ),
    paths(routes::health::health_check),
    components(schemas(
        HealthResponse,
        formcall_core::fields::FieldType,
        formcall_core::fields::FormField,
        formcall_core::fields::FormSchema,
        formcall_core::handshake::SessionParams,
        formcall_core::protocol::ServerEvent,
        formcall_core::protocol::ClientCommand,
        formcall_core::error::ErrorCode,
        formcall_core::error::CallError,
        formcall_core::conversation::Role,
        formcall_core::conversation::ConversationEntry,
        formcall_core::bridge::ToolDefinition,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formcall_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = ServerConfig::from_env();
    if config.openai.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; calls will fail with an unauthorized error");
    }

    let providers = Providers {
        agent: Arc::new(OpenAiAgentFactory::new(config.openai.clone())),
        stt: None,
        tts: None,
    };

    let cors_layer = middleware::cors::build_cors_layer(config.cors_origins.as_deref());
    let addr = config.addr();
    let app_state = state::AppState::new(config, providers);

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::call::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    tracing::info!("Formcall voice API listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
