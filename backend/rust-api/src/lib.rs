use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod battle;
pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(api_routes())
        .nest("/api/v1/battles", battle_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Stateless question/oracle endpoints and the saved battle history.
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/questions/generate",
            post(handlers::questions::generate_questions),
        )
        .route("/api/ai/answer", post(handlers::questions::ai_answer))
        .route(
            "/api/battles",
            get(handlers::history::list_battles).post(handlers::history::save_battle),
        )
        .route("/api/battles/{id}", get(handlers::history::get_battle))
        .layer(CompressionLayer::new())
}

/// Server-driven battles.
fn battle_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::battles::create_battle))
        .route(
            "/{id}",
            get(handlers::battles::get_battle).delete(handlers::battles::delete_battle),
        )
        .route("/{id}/start", post(handlers::battles::start_battle))
        .route("/{id}/select", post(handlers::battles::select_answer))
        .route("/{id}/check", post(handlers::battles::check_answer))
        .route("/{id}/next", post(handlers::battles::next_question))
        .route("/{id}/previous", post(handlers::battles::previous_question))
        .route("/{id}/finish", post(handlers::battles::finish_battle))
        .route("/{id}/restart", post(handlers::battles::restart_battle))
        .route("/{id}/stream", get(handlers::sse::battle_stream))
}
