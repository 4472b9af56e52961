//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::{any::Any as PanicPayload, sync::Arc};

use axum::{
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::error::ApiError;
use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - `/health`, `/categories`, `/questions` (GET + POST), `/explain`, `/tts`
/// - CORS: the `CORS_ALLOW_ORIGINS` allow-list, or any origin when unset
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
/// - handler panics answered as 500 `INTERNAL`
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    let routes = Router::new()
        .route("/health", get(http::http_health))
        .route("/categories", get(http::http_categories))
        .route("/questions", get(http::http_get_questions).post(http::http_post_questions))
        .route("/explain", post(http::http_post_explain))
        .route("/tts", post(http::http_post_tts))
        .with_state(state);
    with_layers(routes, cors)
}

fn with_layers(routes: Router, cors: CorsLayer) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "non-string panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "millionaire_api", origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}
