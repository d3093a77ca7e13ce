//! The `/ws` handler: exclusivity, eviction, idle timeout, and raw binary passthrough to the
//! serial write path (§4.5).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::state::{ClaimOutcome, ControlSignal, SharedState};

/// Capacity of the internal queue between the websocket receive loop and the serial write path
/// (SPEC_FULL.md §9 "Backpressure at the WebSocket boundary"): a bounded buffer plus measured
/// frame drops, rather than letting a slow device grow receive-loop latency unboundedly.
const WRITE_QUEUE_CAPACITY: usize = 32;

#[derive(Serialize)]
struct WsError {
	error: String,
	code: &'static str,
	timestamp: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	#[serde(rename = "retryAfter")]
	retry_after: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	details: Option<String>,
}

impl WsError {
	fn new(message: impl Into<String>, code: &'static str) -> Self {
		Self {
			error: message.into(),
			code,
			timestamp: Utc::now().to_rfc3339(),
			retry_after: None,
			details: None,
		}
	}

	fn with_retry_after(mut self, secs: u64) -> Self {
		self.retry_after = Some(secs);
		self
	}

	fn to_message(&self) -> Message {
		Message::Text(serde_json::to_string(self).unwrap_or_else(|_| json!({"error": "internal"}).to_string()))
	}
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SharedState>>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<SharedState>) {
	match state.try_claim().await {
		ClaimOutcome::Busy { retry_after_secs } => {
			warn!(retry_after_secs, "takeover rejected, a client is already active");
			let err = WsError::new("another client is already in control", "SERVER_BUSY").with_retry_after(retry_after_secs);
			let _ = socket.send(err.to_message()).await;
			let _ = socket.close().await;
		}
		ClaimOutcome::Accepted { id, control_rx } => {
			serve_active_client(socket, state, id, control_rx).await;
		}
		ClaimOutcome::AcceptedAfterEviction { id, control_rx } => {
			serve_active_client(socket, state, id, control_rx).await;
		}
	}
}

/// Drive one accepted takeover session: pause the engine, forward binary frames to the serial
/// write path, and end the session on idle timeout, client close, eviction, or shutdown.
async fn serve_active_client(
	mut socket: WebSocket,
	state: Arc<SharedState>,
	id: u64,
	mut control_rx: tokio::sync::oneshot::Receiver<ControlSignal>,
) {
	if let Err(err) = state.engine.pause().await {
		warn!(%err, "failed to pause render engine for takeover, closing connection");
		let wserr = WsError::new("failed to take control of the serial link", "SERIAL_ERROR");
		let _ = socket.send(wserr.to_message()).await;
		state.release(id).await;
		return;
	}
	info!(id, "takeover client accepted");

	let idle_timeout = state.idle_timeout;
	let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;

	// The websocket receive loop never awaits the serial write directly: it hands frames to a
	// bounded queue drained by a single writer task, so a device that's slow to drain its
	// serial buffer (bounded in turn by `Session::write_timeout`) can't grow the receive loop's
	// latency. When the queue is full, the frame is dropped and counted rather than queued.
	let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_CAPACITY);
	let (writer_err_tx, mut writer_err_rx) = oneshot::channel::<WsError>();
	let writer_serial = state.serial.clone();
	let writer_task = tokio::spawn(async move {
		let mut writer_err_tx = Some(writer_err_tx);
		while let Some(frame) = frame_rx.recv().await {
			let mut serial = writer_serial.lock().await;
			if let Err(err) = serial.write_frame(&frame).await {
				warn!(id, %err, "serial write failed during takeover");
				if let Some(tx) = writer_err_tx.take() {
					let _ = tx.send(WsError::new(format!("serial write failed: {err}"), "SERIAL_ERROR"));
				}
				break;
			}
		}
	});

	let mut dropped_frames: u64 = 0;
	let close_reason;

	loop {
		tokio::select! {
			biased;

			control = &mut control_rx => {
				close_reason = match control {
					Ok(ControlSignal::Evicted) => Some(WsError::new("evicted by a newer client", "EVICTED")),
					Ok(ControlSignal::Shutdown) => Some(WsError::new("server is shutting down", "SHUTDOWN")),
					Err(_) => None,
				};
				break;
			}

			Ok(err) = &mut writer_err_rx => {
				close_reason = Some(err);
				break;
			}

			_ = tokio::time::sleep_until(idle_deadline) => {
				close_reason = Some(WsError::new("no activity within the idle timeout", "IDLE_TIMEOUT"));
				break;
			}

			message = socket.recv() => {
				match message {
					None => {
						close_reason = None;
						break;
					}
					Some(Err(err)) => {
						warn!(%err, "websocket receive error");
						close_reason = None;
						break;
					}
					// Only a binary message resets the idle deadline (§4.5); text/ping/pong keep
					// the connection alive for the select but do not postpone the timeout.
					Some(Ok(Message::Binary(bytes))) => {
						idle_deadline = tokio::time::Instant::now() + idle_timeout;
						if frame_tx.try_send(bytes.to_vec()).is_err() {
							dropped_frames += 1;
							if dropped_frames == 1 || dropped_frames % 50 == 0 {
								warn!(id, dropped_frames, "takeover write queue full, dropping frame");
							}
						}
					}
					Some(Ok(Message::Close(_))) => {
						close_reason = None;
						break;
					}
					Some(Ok(Message::Text(_))) => {
						warn!("ignoring text frame from takeover client, only binary is accepted");
					}
					Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
				}
			}
		}
	}

	// Dropping the sender lets the writer task drain whatever's already queued, then exit.
	drop(frame_tx);
	let _ = writer_task.await;

	if let Some(err) = &close_reason {
		let _ = socket.send(err.to_message()).await;
	}
	let _ = socket.close().await;

	// A connection evicted by a newer client must not release the new client's slot; only the
	// still-current holder resumes rendering (§4.5 Coupling).
	let was_current = state.active.lock().await.as_ref().map(|s| s.id) == Some(id);
	state.release(id).await;
	if was_current {
		state.engine.resume().await;
	}
	info!(id, "takeover client disconnected");
}
