//! Shared state for the takeover server: the single active-client slot, plus the handles it
//! needs to coordinate with the render engine and serial session (§4.5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};

use crate::render::RenderEngine;
use crate::serial::SerialSession;
use crate::status::TelemetryCache;

/// Sent to an active connection's task to tell it why it's being kicked off.
#[derive(Debug, Clone, Copy)]
pub enum ControlSignal {
	Evicted,
	Shutdown,
}

pub struct ActiveSlot {
	pub id: u64,
	pub connect_time: Instant,
	control_tx: oneshot::Sender<ControlSignal>,
}

pub struct SharedState {
	pub active: Mutex<Option<ActiveSlot>>,
	next_id: AtomicU64,
	pub engine: Arc<RenderEngine>,
	pub serial: Arc<Mutex<SerialSession>>,
	pub telemetry: Arc<TelemetryCache>,
	pub eviction_age: Duration,
	pub idle_timeout: Duration,
	pub started_at: std::time::SystemTime,
	pub pid: u32,
}

/// The outcome of attempting to claim the active-client slot.
pub enum ClaimOutcome {
	/// No one was active; this connection owns the slot now.
	Accepted { id: u64, control_rx: oneshot::Receiver<ControlSignal> },
	/// Someone was active but past the eviction age; they were told and this connection now
	/// owns the slot.
	AcceptedAfterEviction { id: u64, control_rx: oneshot::Receiver<ControlSignal> },
	/// Someone else is active and not yet evictable.
	Busy { retry_after_secs: u64 },
}

impl SharedState {
	pub fn new(
		engine: Arc<RenderEngine>,
		serial: Arc<Mutex<SerialSession>>,
		telemetry: Arc<TelemetryCache>,
		eviction_age: Duration,
		idle_timeout: Duration,
	) -> Self {
		Self {
			active: Mutex::new(None),
			next_id: AtomicU64::new(1),
			engine,
			serial,
			telemetry,
			eviction_age,
			idle_timeout,
			started_at: std::time::SystemTime::now(),
			pid: std::process::id(),
		}
	}

	/// Try to become the active client (§4.5 Exclusivity and eviction). Never blocks longer than
	/// acquiring the `active` lock.
	pub async fn try_claim(&self) -> ClaimOutcome {
		let mut active = self.active.lock().await;

		if let Some(slot) = active.as_ref() {
			let age = slot.connect_time.elapsed();
			if age < self.eviction_age {
				let retry_after_secs = (self.eviction_age - age).as_secs_f64().ceil() as u64;
				return ClaimOutcome::Busy { retry_after_secs };
			}
		}

		let evicted = active.take();
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let (control_tx, control_rx) = oneshot::channel();
		*active = Some(ActiveSlot {
			id,
			connect_time: Instant::now(),
			control_tx,
		});

		if let Some(previous) = evicted {
			let _ = previous.control_tx.send(ControlSignal::Evicted);
			ClaimOutcome::AcceptedAfterEviction { id, control_rx }
		} else {
			ClaimOutcome::Accepted { id, control_rx }
		}
	}

	/// Release the active slot if it is still held by `id` (a connection that was itself evicted
	/// or replaced must not clobber whoever holds the slot now).
	pub async fn release(&self, id: u64) {
		let mut active = self.active.lock().await;
		if active.as_ref().map(|s| s.id) == Some(id) {
			*active = None;
		}
	}

	/// Current session phase and, if a client is active, its connection age (for `/status`).
	pub async fn client_age(&self) -> Option<Duration> {
		self.active.lock().await.as_ref().map(|s| s.connect_time.elapsed())
	}

	/// Tell whoever is currently active to shut down (§5 Cancellation), if anyone is.
	pub async fn notify_shutdown(&self) {
		let mut active = self.active.lock().await;
		if let Some(slot) = active.take() {
			let _ = slot.control_tx.send(ControlSignal::Shutdown);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::animation::builtins::SolidColor;
	use crate::animation::params::ParamValues;
	use crate::animation::Animation;
	use crate::coords::CoordStore;
	use crate::status::TelemetryCache;

	fn make_state(eviction_age: Duration) -> SharedState {
		let coords = Arc::new(CoordStore::from_str("LED_A_0 0 0 0\n").unwrap());
		let animation = Animation::for_test(Box::new(SolidColor), ParamValues::new(), "solid".into());
		let (serial, _peer) = crate::serial::loopback_session();
		let serial = Arc::new(Mutex::new(serial));
		let engine = Arc::new(RenderEngine::new(coords, animation, serial.clone(), 1, 1, 30));
		SharedState::new(engine, serial, TelemetryCache::new(), eviction_age, Duration::from_secs(60))
	}

	#[tokio::test]
	async fn first_claim_is_accepted_outright() {
		let state = make_state(Duration::from_secs(30));
		match state.try_claim().await {
			ClaimOutcome::Accepted { id, .. } => assert_eq!(id, 1),
			_ => panic!("expected Accepted"),
		}
	}

	#[tokio::test]
	async fn second_claim_is_busy_before_eviction_age() {
		let state = make_state(Duration::from_secs(30));
		let _first = state.try_claim().await;
		match state.try_claim().await {
			ClaimOutcome::Busy { retry_after_secs } => assert!(retry_after_secs > 0 && retry_after_secs <= 30),
			_ => panic!("expected Busy"),
		}
	}

	#[tokio::test]
	async fn second_claim_evicts_after_eviction_age_elapses() {
		let state = make_state(Duration::from_millis(10));
		let first = state.try_claim().await;
		tokio::time::sleep(Duration::from_millis(30)).await;

		match state.try_claim().await {
			ClaimOutcome::AcceptedAfterEviction { id, .. } => assert_eq!(id, 2),
			_ => panic!("expected AcceptedAfterEviction"),
		}

		if let ClaimOutcome::Accepted { mut control_rx, .. } = first {
			assert!(matches!(control_rx.try_recv(), Ok(ControlSignal::Evicted)));
		} else {
			panic!("expected first claim to have been Accepted");
		}
	}

	#[tokio::test]
	async fn release_by_stale_id_does_not_clobber_newer_client() {
		let state = make_state(Duration::from_millis(10));
		let first_id = match state.try_claim().await {
			ClaimOutcome::Accepted { id, .. } => id,
			_ => unreachable!(),
		};
		tokio::time::sleep(Duration::from_millis(30)).await;
		let _second = state.try_claim().await;

		state.release(first_id).await;
		assert!(state.client_age().await.is_some(), "the second client's slot must survive");
	}

	#[tokio::test]
	async fn notify_shutdown_sends_shutdown_signal_and_clears_slot() {
		let state = make_state(Duration::from_secs(30));
		let control_rx = match state.try_claim().await {
			ClaimOutcome::Accepted { control_rx, .. } => control_rx,
			_ => unreachable!(),
		};
		state.notify_shutdown().await;
		assert!(matches!(control_rx.await, Ok(ControlSignal::Shutdown)));
		assert!(state.client_age().await.is_none());
	}
}
