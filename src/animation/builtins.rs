//! A handful of built-in animations.
//!
//! Animation scripts proper are explicitly out of scope (§1): they're user-authored, in an
//! unspecified scripting language, on the other side of the §4.2 host/script boundary. These
//! fixtures stand in for that boundary so the render loop, hot-swap, and `coord()` ambient
//! helper are exercised end to end without inventing a scripting runtime.

use std::collections::HashMap;

use super::params::{ParamSchema, ParamType, ParamValue, ParamValues};
use super::{AnimationScript, CoordLookup, Sample};

/// Every LED is a single solid color, taken from the `color.rgb` parameter.
pub struct SolidColor;

impl AnimationScript for SolidColor {
	fn schema(&self) -> ParamSchema {
		let mut color = HashMap::new();
		color.insert(
			"rgb".to_string(),
			ParamType::Color {
				default: (1.0, 0.0, 0.0),
			},
		);
		let mut schema = ParamSchema::new();
		schema.insert("color".to_string(), color);
		schema
	}

	fn color(&self, _sample: Sample, params: &ParamValues, _lookup: &dyn CoordLookup) -> (f64, f64, f64) {
		match params.get("color.rgb") {
			Some(ParamValue::Color(r, g, b)) => (*r, *g, *b),
			_ => (0.0, 0.0, 0.0),
		}
	}
}

/// A spherical pulse expanding from the cube's center, `motion.speed` cycles per second.
pub struct RadialPulse;

impl AnimationScript for RadialPulse {
	fn schema(&self) -> ParamSchema {
		let mut motion = HashMap::new();
		motion.insert(
			"speed".to_string(),
			ParamType::ScalarReal {
				min: 0.0,
				max: 10.0,
				default: 1.0,
			},
		);
		let mut schema = ParamSchema::new();
		schema.insert("motion".to_string(), motion);
		schema
	}

	fn color(&self, sample: Sample, params: &ParamValues, _lookup: &dyn CoordLookup) -> (f64, f64, f64) {
		let speed = params
			.get("motion.speed")
			.and_then(ParamValue::as_real)
			.unwrap_or(1.0);

		let dx = sample.x - 0.5;
		let dy = sample.y - 0.5;
		let dz = sample.z - 0.5;
		let radius = (dx * dx + dy * dy + dz * dz).sqrt();

		let phase = (sample.t * speed - radius * 2.0).rem_euclid(1.0);
		let intensity = (1.0 - (phase * 2.0 - 1.0).abs()).clamp(0.0, 1.0);
		(intensity, intensity * 0.5, intensity)
	}
}

/// Colors each LED by the position of a different LED (`scramble.offset` ids away), using the
/// `coord()` ambient helper; falls back to black for out-of-range/absent ids.
pub struct AxisScramble;

impl AnimationScript for AxisScramble {
	fn schema(&self) -> ParamSchema {
		let mut scramble = HashMap::new();
		scramble.insert(
			"offset".to_string(),
			ParamType::ScalarInteger {
				min: -200,
				max: 200,
				default: 17,
			},
		);
		let mut schema = ParamSchema::new();
		schema.insert("scramble".to_string(), scramble);
		schema
	}

	fn color(&self, sample: Sample, params: &ParamValues, lookup: &dyn CoordLookup) -> (f64, f64, f64) {
		let offset = match params.get("scramble.offset") {
			Some(ParamValue::Integer(v)) => *v,
			_ => 0,
		};

		let other_id = sample.id as i64 + offset;
		if other_id < 0 {
			return (0.0, 0.0, 0.0);
		}

		match lookup.coord(other_id as u32) {
			Some(c) => (c.x, c.y, c.z),
			None => (0.0, 0.0, 0.0),
		}
	}
}

pub fn lookup_builtin(name: &str) -> Option<Box<dyn AnimationScript>> {
	match name {
		"solid" => Some(Box::new(SolidColor)),
		"pulse" => Some(Box::new(RadialPulse)),
		"scramble" => Some(Box::new(AxisScramble)),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NullLookup;
	impl CoordLookup for NullLookup {
		fn coord(&self, _id: u32) -> Option<crate::coords::Coord> {
			None
		}
	}

	#[test]
	fn solid_color_ignores_space_and_time() {
		let anim = SolidColor;
		let mut params = ParamValues::new();
		params.insert("color.rgb".to_string(), ParamValue::Color(0.2, 0.4, 0.6));
		let sample = Sample {
			x: 0.1,
			y: 0.9,
			z: 0.5,
			t: 123.0,
			id: 7,
		};
		assert_eq!(anim.color(sample, &params, &NullLookup), (0.2, 0.4, 0.6));
	}

	#[test]
	fn scramble_returns_black_for_absent_coordinate() {
		let anim = AxisScramble;
		let mut params = ParamValues::new();
		params.insert("scramble.offset".to_string(), ParamValue::Integer(1));
		let sample = Sample {
			x: 0.0,
			y: 0.0,
			z: 0.0,
			t: 0.0,
			id: 0,
		};
		assert_eq!(anim.color(sample, &params, &NullLookup), (0.0, 0.0, 0.0));
	}

	#[test]
	fn scramble_returns_black_for_negative_id() {
		let anim = AxisScramble;
		let mut params = ParamValues::new();
		params.insert("scramble.offset".to_string(), ParamValue::Integer(-5));
		let sample = Sample {
			x: 0.0,
			y: 0.0,
			z: 0.0,
			t: 0.0,
			id: 2,
		};
		assert_eq!(anim.color(sample, &params, &NullLookup), (0.0, 0.0, 0.0));
	}
}
