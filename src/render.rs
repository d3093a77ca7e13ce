//! C3: Render Engine.
//!
//! A single-task fixed-rate loop that samples the installed [`Animation`] once per tick,
//! packs its output into per-channel byte frames, and hands them to the Serial Session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::animation::{Animation, CoordLookup, Sample};
use crate::coords::CoordStore;
use crate::error::SerialError;
use crate::serial::protocol::{self, Rgb as WireRgb};
use crate::serial::SerialSession;

/// Whether the engine is driving the display itself, or a takeover client has exclusive
/// control of the serial write path (§5 Ordering guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Rendering,
	PausedByTakeover,
}

/// Convert one real-valued color component to the 8-bit wire encoding (§4.3 step 2c).
pub fn to_byte(component: f64) -> u8 {
	(component.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Evaluate one full frame: for every LED id in `[0, total_leds)`, look up its coordinate (skip,
/// i.e. leave black, if absent), evaluate the animation, and pack the byte-quantized result.
/// Pure and synchronous so it can be scenario-tested without any serial/async machinery (S1, S2).
pub fn render_frame(
	coords: &CoordStore,
	animation: &Animation,
	t: f64,
	total_leds: u32,
) -> Vec<[u8; 3]> {
	let params = animation.default_params();
	(0..total_leds)
		.map(|id| match coords.coord(id) {
			Some(c) => {
				let sample = Sample {
					x: c.x,
					y: c.y,
					z: c.z,
					t,
					id,
				};
				let (r, g, b) = animation.evaluate(sample, params, coords as &dyn CoordLookup);
				[to_byte(r), to_byte(g), to_byte(b)]
			}
			None => [0, 0, 0],
		})
		.collect()
}

/// Split a flat per-LED frame into per-channel wire pixel slices (§4.3 step 3).
pub fn split_channels(frame: &[[u8; 3]], channels: u32, leds_per_channel: u32) -> Vec<Vec<WireRgb>> {
	(0..channels)
		.map(|k| {
			let start = (k * leds_per_channel) as usize;
			let end = (start + leds_per_channel as usize).min(frame.len());
			if start >= frame.len() {
				return Vec::new();
			}
			frame[start..end].iter().map(|[r, g, b]| WireRgb(*r, *g, *b)).collect()
		})
		.collect()
}

pub struct RenderEngine {
	coords: Arc<CoordStore>,
	installed: RwLock<Arc<Animation>>,
	serial: Arc<Mutex<SerialSession>>,
	phase: Mutex<Phase>,
	channels: u32,
	leds_per_channel: u32,
	fps: u32,
	start: Instant,
	stopping: AtomicBool,
}

impl RenderEngine {
	pub fn new(
		coords: Arc<CoordStore>,
		initial: Animation,
		serial: Arc<Mutex<SerialSession>>,
		channels: u32,
		leds_per_channel: u32,
		fps: u32,
	) -> Self {
		Self {
			coords,
			installed: RwLock::new(Arc::new(initial)),
			serial,
			phase: Mutex::new(Phase::Rendering),
			channels,
			leds_per_channel,
			fps,
			start: Instant::now(),
			stopping: AtomicBool::new(false),
		}
	}

	/// Install a new animation. Takes effect at the next tick boundary, never mid-tick, since
	/// the loop only reads the slot once at the top of [`Self::tick_once`] (§4.3 Hot swap).
	pub async fn install(&self, animation: Animation) {
		let mut slot = self.installed.write().await;
		*slot = Arc::new(animation);
	}

	/// Pause the engine for a takeover client: issues `clear-all` then hands serial control to
	/// the caller (§4.5 Coupling to the render engine, invariant 5). Idempotent: a client that
	/// replaces another evicted client without the engine ever resuming in between does not
	/// trigger a second `clear-all` (S3, invariant 3 "exactly one Clear All per handoff").
	pub async fn pause(&self) -> Result<(), SerialError> {
		let mut phase = self.phase.lock().await;
		if *phase == Phase::PausedByTakeover {
			return Ok(());
		}
		let mut buf = BytesMut::new();
		protocol::encode_clear_all(&mut buf);
		self.serial.lock().await.write_frame(&buf).await?;
		*phase = Phase::PausedByTakeover;
		Ok(())
	}

	/// Resume rendering after a takeover client disconnects (§4.5).
	pub async fn resume(&self) {
		let mut phase = self.phase.lock().await;
		*phase = Phase::Rendering;
	}

	pub async fn phase(&self) -> Phase {
		*self.phase.lock().await
	}

	pub fn request_stop(&self) {
		self.stopping.store(true, Ordering::SeqCst);
	}

	/// Run one tick: if paused, do nothing (the takeover client owns the wire). Otherwise render
	/// a frame, pack it per channel, and emit exactly one `Update only` per non-empty channel
	/// followed by one `Flush` covering all of them (invariant 3).
	pub async fn tick_once(&self) -> Result<(), SerialError> {
		if self.phase().await == Phase::PausedByTakeover {
			return Ok(());
		}

		let animation = self.installed.read().await.clone();
		let t = self.start.elapsed().as_secs_f64();
		let total_leds = self.channels * self.leds_per_channel;
		let frame = render_frame(&self.coords, &animation, t, total_leds);
		let per_channel = split_channels(&frame, self.channels, self.leds_per_channel);
		let slices: Vec<&[WireRgb]> = per_channel.iter().map(Vec::as_slice).collect();
		let buf = protocol::encode_tick(&slices);

		let mut serial = self.serial.lock().await;
		if let Err(err) = serial.write_frame(&buf).await {
			warn!(%err, "tick write failed");
			return Err(err);
		}
		Ok(())
	}

	/// Drive the fixed-rate loop until [`Self::request_stop`] is called. On exit, sends a final
	/// `clear-all` (§5 Cancellation): completes the in-flight tick, then darkens the display.
	pub async fn run(&self) -> Result<(), SerialError> {
		let period = Duration::from_secs_f64(1.0 / self.fps as f64);
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		while !self.stopping.load(Ordering::SeqCst) {
			interval.tick().await;
			self.tick_once().await?;
		}

		debug!("render loop stopping, sending clear-all");
		let mut buf = BytesMut::new();
		protocol::encode_clear_all(&mut buf);
		self.serial.lock().await.write_frame(&buf).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::animation::builtins::SolidColor;
	use crate::animation::params::ParamValues;

	fn coords_with_ids(ids: &[u32]) -> CoordStore {
		let text: String = ids
			.iter()
			.map(|id| format!("LED_A_{id} {id} {id} {id}\n"))
			.collect();
		CoordStore::from_str(&text).unwrap()
	}

	#[test]
	fn s1_single_solid_red_frame() {
		let coords = coords_with_ids(&[0, 1]);
		let mut params = ParamValues::new();
		params.insert(
			"color.rgb".to_string(),
			crate::animation::params::ParamValue::Color(1.0, 0.0, 0.0),
		);
		let animation = Animation::for_test(Box::new(SolidColor), params, "red".into());

		let frame = render_frame(&coords, &animation, 0.0, 2);
		let per_channel = split_channels(&frame, 1, 2);
		let slices: Vec<&[WireRgb]> = per_channel.iter().map(Vec::as_slice).collect();
		let buf = protocol::encode_tick(&slices);

		assert_eq!(
			&buf[..],
			&[0xFE, 0x00, 0x02, 0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00, 0xFD, 0x01][..]
		);
	}

	#[test]
	fn s2_missing_coordinate_yields_black() {
		let coords = coords_with_ids(&[0, 2]);
		let mut params = ParamValues::new();
		params.insert(
			"color.rgb".to_string(),
			crate::animation::params::ParamValue::Color(0.0, 1.0, 0.0),
		);
		let animation = Animation::for_test(Box::new(SolidColor), params, "green".into());

		let frame = render_frame(&coords, &animation, 0.0, 3);
		assert_eq!(frame, vec![[0, 255, 0], [0, 0, 0], [0, 255, 0]]);
	}

	#[test]
	fn to_byte_matches_round_trip_endpoints() {
		assert_eq!(to_byte(0.0), 0);
		assert_eq!(to_byte(1.0), 255);
	}
}
