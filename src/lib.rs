use std::{any::Any, sync::Arc, time::Duration};

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info_span};

pub mod config;
pub mod cors;
pub mod domain;
pub mod errors;
pub mod http;
pub mod influx_client;
pub mod logging;
pub mod mcp;
pub mod stdio;

use cors::OriginPolicy;
use domain::{build_registry, CatalogError, StoreContext};
use errors::AppError;
use http::{handlers, session::SessionNegotiator, sse::HEARTBEAT_INTERVAL};
use mcp::{
    audit::AuditedDispatcher,
    dispatcher::{Dispatch, Dispatcher},
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<dyn Dispatch>,
    pub origin_policy: Arc<OriginPolicy>,
    pub session: Arc<SessionNegotiator>,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(dispatcher: Arc<dyn Dispatch>, origin_policy: OriginPolicy) -> Self {
        Self {
            dispatcher,
            origin_policy: Arc::new(origin_policy),
            session: Arc::new(SessionNegotiator::new()),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }
}

/// Registry, dispatcher and audit logging, ready for either transport.
pub fn build_dispatcher(context: &StoreContext) -> Result<Arc<dyn Dispatch>, CatalogError> {
    let registry = Arc::new(build_registry(context)?);
    let dispatcher = Dispatcher::new(registry, info_span!("dispatcher"));
    Ok(Arc::new(AuditedDispatcher::new(
        dispatcher,
        info_span!("audit"),
    )))
}

pub fn build_app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(handlers::server_metadata))
        .route("/health", get(handlers::health))
        .route(
            handlers::GATEWAY_PATH,
            get(handlers::gateway_get)
                .post(handlers::gateway_post)
                .options(handlers::preflight),
        );

    with_gateway_layers(routes, &state).with_state(state)
}

/// Fallbacks and middleware shared by every route. Panics are turned into a
/// response inside the CORS layer so the 500 still carries CORS headers.
fn with_gateway_layers(routes: Router<AppState>, state: &AppState) -> Router<AppState> {
    routes
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            state.origin_policy.clone(),
            cors::apply_cors_policy,
        ))
        .layer(middleware::from_fn(logging::request_logging_middleware))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|message| message.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(error = %message, "request handler panicked");
    AppError::internal(message).into_response()
}
