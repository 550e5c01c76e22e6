use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::openapi;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ocr = Router::new()
        .route("/single/{image_name}", get(handlers::readings::read_single))
        .route("/batch-process", get(handlers::readings::batch_process))
        .route("/ui-data", get(handlers::readings::ui_data))
        .route("/demo-readings", get(handlers::demo::demo_readings));

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .route("/drive/sync", get(handlers::drive::sync_drive))
        .route("/openapi.json", get(openapi::openapi_json))
        .merge(openapi::redoc_router())
        .nest("/ocr", ocr)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
