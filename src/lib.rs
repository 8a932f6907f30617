//! identa manages accounts, JWT sessions and KYC profiles.
#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod kyc;
mod middleware;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
pub use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    authorization: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub token: token::TokenManager,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let authenticated = Router::new()
        // `GET /api/user/profile/` goes to `profile`.
        .route("/user/profile/", get(router::profile::handler))
        // `POST /api/kyc/submit/` goes to `kyc::submit`.
        .route("/kyc/submit/", post(router::kyc::submit))
        .route("/kyc/", get(router::kyc::get))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    let api = Router::new()
        .route("/register/", post(router::register::handler))
        .route("/token/", post(router::token::handler))
        .route("/token/refresh/", post(router::refresh::handler))
        .merge(authenticated);

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .nest("/api", api)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. keep it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let db = match config.postgres {
        Some(ref config) => database::Database::from_config(config).await?,
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, data will be lost on shutdown"
            );
            database::Database::memory()
        },
    };

    let salt = std::env::var("SALT")
        .map_err(|_| "missing `SALT` environment variable")?;
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), salt)?);

    // handle jwt.
    let Some(token_config) = &config.token else {
        return Err("missing `token` entry on `config.yaml` file".into());
    };
    let mut token = token::TokenManager::new(
        &config.url,
        token_config.key_id.clone(),
        &token_config.public_key_pem,
        &token_config.private_key_pem,
    )?;
    if let Some(audience) = &token_config.audience {
        token.audience(audience);
    }
    token.lifetimes(
        token_config.access_lifetime,
        token_config.refresh_lifetime,
    );

    Ok(AppState {
        config,
        db,
        crypto,
        token,
    })
}
