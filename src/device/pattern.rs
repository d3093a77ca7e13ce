//! Device-local test patterns (§4.7), used as a safety fallback when the host is silent and
//! as an aid for physical calibration. All patterns are deterministic functions of frame
//! counter, channel, and LED position; pattern 4 (ternary calibration) additionally has a
//! bit-exact encoding requirement because it is read by an external camera.

use super::channel::Rgb;

pub const PATTERN_COUNT: u8 = 6;
pub const PATTERN_HZ: u64 = 30;

/// LEDs per channel assumed by the ternary calibration pattern's global-id numbering,
/// independent of the host's configured `leds_per_channel` (§4.7 literally specifies
/// `channel*200 + local index`).
const TERNARY_LEDS_PER_CHANNEL: u32 = 200;
const TERNARY_DIGITS: u32 = 9;

/// Color for one LED under `pattern`, at device pattern-frame-counter `tick` (incremented at
/// [`PATTERN_HZ`]), for the given `channel`/`local_index` within that channel.
pub fn color_for(pattern: u8, tick: u64, channel: usize, local_index: usize) -> Rgb {
	match pattern {
		0 => channel_identification(channel),
		1 => rgb_cycle(tick),
		2 => color_cycle(tick),
		3 => end_blink(tick, local_index),
		4 => ternary_calibration(tick, channel, local_index),
		5 => colorful_twinkle(tick, channel, local_index),
		_ => Rgb(0, 0, 0),
	}
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
	let h = h.rem_euclid(1.0) * 6.0;
	let i = h.floor() as i32;
	let f = h - h.floor();
	let p = v * (1.0 - s);
	let q = v * (1.0 - s * f);
	let t = v * (1.0 - s * (1.0 - f));
	let (r, g, b) = match i.rem_euclid(6) {
		0 => (v, t, p),
		1 => (q, v, p),
		2 => (p, v, t),
		3 => (p, q, v),
		4 => (t, p, v),
		_ => (v, p, q),
	};
	Rgb(
		(r * 255.0).round() as u8,
		(g * 255.0).round() as u8,
		(b * 255.0).round() as u8,
	)
}

fn channel_identification(channel: usize) -> Rgb {
	hsv_to_rgb(channel as f64 / 8.0, 1.0, 1.0)
}

fn rgb_cycle(tick: u64) -> Rgb {
	match (tick / PATTERN_HZ) % 3 {
		0 => Rgb(255, 0, 0),
		1 => Rgb(0, 255, 0),
		_ => Rgb(0, 0, 255),
	}
}

fn color_cycle(tick: u64) -> Rgb {
	let period_ticks = PATTERN_HZ * 4;
	let phase = (tick % period_ticks) as f64 / period_ticks as f64;
	hsv_to_rgb(phase, 1.0, 1.0)
}

fn end_blink(tick: u64, local_index: usize) -> Rgb {
	let on = (tick / (PATTERN_HZ / 2)) % 2 == 0;
	if (local_index == 0 || local_index == super::channel::MAX_LEDS_PER_CHANNEL - 1) && on {
		Rgb(255, 255, 255)
	} else {
		Rgb(0, 0, 0)
	}
}

fn ternary_digit_code(global_id: u32) -> u32 {
	let base = global_id * 9;
	base + (7 - (base % 7))
}

fn ternary_calibration(tick: u64, channel: usize, local_index: usize) -> Rgb {
	const FRAME_TICKS: u64 = 6;
	let total_frames = 3 + 2 * TERNARY_DIGITS as u64;
	let display_frame = (tick / FRAME_TICKS) % total_frames;

	if display_frame == 0 || display_frame == 2 {
		return Rgb(0, 0, 0);
	}
	if display_frame == 1 {
		return Rgb(255, 0, 255);
	}

	let idx = display_frame - 3;
	if idx % 2 == 1 {
		return Rgb(0, 0, 0);
	}

	let k = (idx / 2) as u32;
	let global_id = channel as u32 * TERNARY_LEDS_PER_CHANNEL + local_index as u32;
	let n = ternary_digit_code(global_id);
	let digit = (n / 3u32.pow(k)) % 3;
	match digit {
		0 => Rgb(255, 0, 0),
		1 => Rgb(0, 255, 0),
		_ => Rgb(0, 0, 255),
	}
}

/// Small fixed palette for pattern 5, deterministically selected per-LED.
const TWINKLE_PALETTE: [Rgb; 5] = [
	Rgb(255, 0, 0),
	Rgb(0, 255, 0),
	Rgb(0, 0, 255),
	Rgb(255, 200, 0),
	Rgb(0, 200, 255),
];

fn colorful_twinkle(tick: u64, channel: usize, local_index: usize) -> Rgb {
	let generation = tick / 10;
	let global_id = channel as u64 * TERNARY_LEDS_PER_CHANNEL as u64 + local_index as u64;
	// A cheap, deterministic mix -- not cryptographic, just enough to decorrelate neighbours.
	let mixed = global_id
		.wrapping_mul(2_654_435_761)
		.wrapping_add(generation.wrapping_mul(40_503))
		^ (generation << 17);
	if mixed % 3 == 0 {
		Rgb(0, 0, 0)
	} else {
		TWINKLE_PALETTE[(mixed as usize) % TWINKLE_PALETTE.len()]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ternary_frames_0_and_2_are_black_and_frame_1_is_magenta() {
		assert_eq!(ternary_calibration(0, 0, 0), Rgb(0, 0, 0));
		assert_eq!(ternary_calibration(2 * 6, 0, 0), Rgb(0, 0, 0));
		assert_eq!(ternary_calibration(1 * 6, 0, 0), Rgb(255, 0, 255));
	}

	#[test]
	fn ternary_digit_sequences_are_unique_across_all_global_ids() {
		use std::collections::HashSet;

		let mut seen = HashSet::new();
		for channel in 0..8u32 {
			for local in 0..200u32 {
				let global_id = channel * TERNARY_LEDS_PER_CHANNEL + local;
				let n = ternary_digit_code(global_id);
				let mut digits = [0u32; TERNARY_DIGITS as usize];
				for (k, d) in digits.iter_mut().enumerate() {
					*d = (n / 3u32.pow(k as u32)) % 3;
				}
				assert!(seen.insert(digits), "duplicate ternary code for global id {global_id}");
			}
		}
	}

	#[test]
	fn pattern_ids_beyond_defined_set_are_black() {
		assert_eq!(color_for(200, 0, 0, 0), Rgb(0, 0, 0));
	}
}
