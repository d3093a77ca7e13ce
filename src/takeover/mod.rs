//! C5: Takeover Server.
//!
//! Binds the one `/ws` takeover socket plus the ambient `/status` and `/healthz` surface (§4.5,
//! §10) on a single axum router, the same shape the host daemon's own HTTP server uses.

pub mod http;
pub mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::SharedState;

/// Serve the takeover router on `listen` until `shutdown` resolves (§5 Cancellation). A bind
/// failure is fatal and reported to the caller; a serve-time I/O error is logged and ends the
/// server without tearing down the rest of the process.
pub async fn run(
	listen: SocketAddr,
	state: Arc<SharedState>,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::error::Result<(), crate::error::TakeoverError> {
	let app = Router::new()
		.route("/ws", get(ws::ws_handler))
		.route("/status", get(http::handle_status))
		.route("/healthz", get(http::handle_healthz))
		.layer(TraceLayer::new_for_http())
		.with_state(state);

	let listener = tokio::net::TcpListener::bind(listen)
		.await
		.map_err(|source| crate::error::TakeoverError::Bind { addr: listen.to_string(), source })?;

	info!(%listen, "takeover server listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await
		.map_err(|source| crate::error::TakeoverError::Serve { addr: listen.to_string(), source })?;

	Ok(())
}
