//! `/status` and `/healthz` (§4.5 ambient status/health surface; §10).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::state::SharedState;

pub async fn handle_status(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
	let phase = state.engine.phase().await;
	let client_age_secs = state.client_age().await.map(|age| age.as_secs_f64());
	let last_telemetry = state.telemetry.get().await;

	Json(json!({
		"phase": match phase {
			crate::render::Phase::Rendering => "rendering",
			crate::render::Phase::PausedByTakeover => "paused_by_takeover",
		},
		"client_age_secs": client_age_secs,
		"last_telemetry": last_telemetry,
		"pid": state.pid,
	}))
}

pub async fn handle_healthz(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
	Json(json!({
		"status": "ok",
		"pid": state.pid,
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::animation::builtins::SolidColor;
	use crate::animation::params::ParamValues;
	use crate::animation::Animation;
	use crate::coords::CoordStore;
	use crate::render::RenderEngine;
	use crate::status::TelemetryCache;
	use std::time::Duration;

	fn make_state() -> Arc<SharedState> {
		// A RenderEngine needs an open SerialSession; tests that only exercise the HTTP
		// endpoints never touch the serial link, so this never needs to succeed a real write.
		let coords = Arc::new(CoordStore::from_str("LED_A_0 0 0 0\n").unwrap());
		let animation = Animation::for_test(Box::new(SolidColor), ParamValues::new(), "solid".into());
		let (serial, _peer) = crate::serial::loopback_session();
		let serial = Arc::new(tokio::sync::Mutex::new(serial));
		let engine = Arc::new(RenderEngine::new(coords, animation, serial.clone(), 1, 1, 30));
		Arc::new(SharedState::new(
			engine,
			serial,
			TelemetryCache::new(),
			Duration::from_secs(30),
			Duration::from_secs(60),
		))
	}

	#[tokio::test]
	async fn healthz_reports_ok() {
		let state = make_state();
		let response = handle_healthz(State(state)).await.into_response();
		assert_eq!(response.status(), axum::http::StatusCode::OK);
	}

	#[tokio::test]
	async fn status_reports_rendering_phase_with_no_client() {
		let state = make_state();
		let response = handle_status(State(state)).await.into_response();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(json["phase"], "rendering");
		assert!(json["client_age_secs"].is_null());
	}
}
