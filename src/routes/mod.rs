pub mod chat;

use crate::state::SharedState;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use chat::chat_handler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

pub fn create_router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(cors_layer())
        // outside the cors layer so preflight answers carry it too
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
}
