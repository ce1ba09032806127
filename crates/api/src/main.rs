use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::config::AppConfig;
use atelier_api::{router, state};

use atelier_comfyui::Gateway;
use atelier_core::redact::Redactor;
use atelier_core::tags::TagDictionary;
use atelier_core::workflow::load_workflow;
use atelier_session::{EngineConfig, Limits, SessionEngine};
use atelier_storage::JsonFileStore;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = Arc::new(AppConfig::from_env());

    // --- Tracing ---
    let default_filter = format!(
        "atelier_api={level},atelier_session={level},atelier_comfyui={level},tower_http=info",
        level = config.log_level,
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        workflow = %config.workflow_path.display(),
        per_user_limit = config.per_user_limit,
        global_max_running = config.global_max_running,
        "Loaded configuration",
    );

    // --- Workflow template ---
    let template =
        load_workflow(&config.workflow_path).expect("Failed to load the workflow template");
    tracing::info!("Workflow template loaded");

    // --- Gateway client ---
    let gateway = Gateway::new(&config.api_base, &config.ws_url, config.request_timeout)
        .expect("Failed to build the ComfyUI gateway client");

    // --- Session engine ---
    let store = JsonFileStore::new(&config.snapshot_dir);
    let redactor = Redactor::new([config.api_base.clone(), config.ws_url.clone()]);
    let engine = Arc::new(SessionEngine::new(
        Arc::new(gateway),
        Arc::new(store),
        template,
        redactor,
        EngineConfig {
            limits: Limits {
                per_user: config.per_user_limit,
                global_max_running: config.global_max_running,
            },
            reconcile_timeout: config.reconcile_timeout,
            history_ttl: config.history_ttl,
        },
    ));
    tracing::info!("Session engine created");

    // --- Tag dictionary ---
    let tags = Arc::new(TagDictionary::load_or_empty(
        config.tag_dictionary_path.as_deref(),
    ));

    // --- Router ---
    let app_state = AppState {
        engine,
        config: Arc::clone(&config),
        tags,
    };
    let app = router::build_router(app_state);

    // --- Serve ---
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {addr}: {e}"));
    tracing::info!(%addr, "Atelier API listening");

    axum::serve(listener, app).await.expect("Server error");
}
