//! The gallery platform's HTTP API

mod routes;
mod shared;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::response::Response;
use gallery_core::conf::Conf;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{event, Level, Span};

pub use shared::Shared;

/// The state every route handler is given, a cheaply-cloned handle onto the
/// process's backend clients, the way thorium's `AppState` wraps `Shared`.
pub type AppState = Arc<Shared>;

/// Build the axum router, mounting every route module and the tower-http
/// tracing/CORS layers, mirroring `thorium`'s `build_app`.
fn build_app(state: AppState) -> axum::Router {
    let app = axum::Router::new();
    let app = routes::mount(app);

    let cors = CorsLayer::permissive();

    app.layer(DefaultBodyLimit::disable())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(|req: &Request<_>, span: &Span| {
                    let path = req.uri().path();
                    event!(parent: span, Level::INFO, path = path, msg = "starting request");
                })
                .on_response(|resp: &Response, latency: Duration, span: &Span| {
                    let code = resp.status();
                    event!(
                        parent: span,
                        Level::INFO,
                        code = code.as_u16(),
                        latency_ms = latency.as_millis() as u64,
                        msg = "responding to request"
                    );
                }),
        )
        .layer(cors)
        .with_state(state)
}

/// Periodically reap chunked-upload sessions older than their configured
/// TTL, per spec.md §3.2/§4.4's janitor. Runs hourly for the life of the
/// process; there is no shutdown hook since it only ever deletes already-
/// expired scratch state.
fn spawn_upload_janitor(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            ticker.tick().await;
            state.chunked_uploads.cleanup_expired().await;
        }
    });
}

/// Launch the gallery API using axum.
///
/// # Panics
///
/// Panics if the tenant bucket is unreachable at startup, or if the
/// configured interface cannot be parsed or bound.
pub async fn axum(conf: Conf) {
    let server = conf.server.clone();
    let shared = Arc::new(Shared::new(conf).await);

    tracing::event!(
        Level::INFO,
        interface = %server.interface,
        port = server.port,
        "binding gallery API"
    );

    let gradient_worker = Arc::clone(&shared.gradient_worker);
    gradient_worker.start().await;

    spawn_upload_janitor(Arc::clone(&shared));

    let app = build_app(shared);

    let addr: SocketAddr = format!("{}:{}", server.interface, server.port)
        .parse()
        .expect("failed to parse interface/port into a socket address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|err| panic!("gallery API server crashed: {err}"));
}
