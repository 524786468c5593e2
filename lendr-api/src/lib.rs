use axum::{
    extract::FromRequest,
    http::Method,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod customers;
pub mod error;
pub mod import;
pub mod loans;
pub mod middleware;
pub mod payments;
pub mod state;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

/// JSON body whose rejections render as 400 `{"detail": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `?customer_external_id=` filter shared by the loan and payment listings.
#[derive(Debug, Default, Deserialize)]
pub struct CustomerFilter {
    pub customer_external_id: Option<String>,
}

impl CustomerFilter {
    pub fn as_deref(&self) -> Option<&str> {
        self.customer_external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(middleware::auth::API_KEY_HEADER),
        ]);

    let api = Router::new()
        .merge(customers::routes())
        .merge(loans::routes())
        .merge(payments::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
