//! C2: Animation Host.
//!
//! Loads a named animation script, extracts its declared parameter defaults, and exposes a
//! `color(x, y, z, t, params, id)` evaluation contract that never aborts the render: any
//! non-finite result or panic inside the script is treated as black for that LED.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::coords::{Coord, CoordStore};
use crate::error::AnimationError;

pub mod builtins;
pub mod params;

use params::{ParamSchema, ParamValues, flatten_defaults};

/// A single spatial+temporal sample at which a script is asked for a color.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
	pub x: f64,
	pub y: f64,
	pub z: f64,
	pub t: f64,
	pub id: u32,
}

/// The ambient helper scripts can use to look up another LED's position (for "scramble"
/// effects). Provided by the host, never imported by the script itself (§4.2).
pub trait CoordLookup {
	fn coord(&self, id: u32) -> Option<Coord>;
}

impl CoordLookup for CoordStore {
	fn coord(&self, id: u32) -> Option<Coord> {
		CoordStore::coord(self, id)
	}
}

/// A loaded spatial color function plus its declared parameter schema.
pub trait AnimationScript: Send + Sync {
	fn schema(&self) -> ParamSchema;
	fn color(&self, sample: Sample, params: &ParamValues, lookup: &dyn CoordLookup) -> (f64, f64, f64);
}

/// `{func, default_params, source_path}` (§3 Entities: Animation).
pub struct Animation {
	script: Box<dyn AnimationScript>,
	default_params: ParamValues,
	source_path: PathBuf,
}

impl Animation {
	pub fn source_path(&self) -> &Path {
		&self.source_path
	}

	pub fn default_params(&self) -> &ParamValues {
		&self.default_params
	}

	#[cfg(test)]
	pub(crate) fn for_test(script: Box<dyn AnimationScript>, default_params: ParamValues, name: String) -> Self {
		Self {
			script,
			default_params,
			source_path: PathBuf::from(name),
		}
	}

	/// Evaluate the script at `sample`, enforcing the §4.2 evaluation contract: any non-finite
	/// component, unexpected shape, or panic becomes black. Never propagates an error.
	pub fn evaluate(&self, sample: Sample, params: &ParamValues, lookup: &dyn CoordLookup) -> (f64, f64, f64) {
		let script = &self.script;
		let result = panic::catch_unwind(AssertUnwindSafe(|| script.color(sample, params, lookup)));

		match result {
			Ok((r, g, b)) if r.is_finite() && g.is_finite() && b.is_finite() => (r, g, b),
			Ok(_) => {
				warn!(id = sample.id, "animation produced non-finite color, using black");
				(0.0, 0.0, 0.0)
			}
			Err(_) => {
				warn!(id = sample.id, "animation panicked, using black");
				(0.0, 0.0, 0.0)
			}
		}
	}
}

/// Loads animations by filename (without extension) from a directory, via a small built-in
/// registry. A real scripting runtime is explicitly out of scope (§1); see `builtins`.
pub struct AnimationHost {
	directory: PathBuf,
}

impl AnimationHost {
	pub fn new(directory: PathBuf) -> Self {
		Self { directory }
	}

	pub fn load(&self, name: &str) -> Result<Animation, AnimationError> {
		let stem = name.trim_end_matches(".js").trim_end_matches(".rhai");
		let script =
			builtins::lookup_builtin(stem).ok_or_else(|| AnimationError::UnknownScript(name.to_string()))?;

		let schema = script.schema();
		let default_params = flatten_defaults(&schema);

		Ok(Animation {
			script,
			default_params,
			source_path: self.directory.join(name),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NullLookup;
	impl CoordLookup for NullLookup {
		fn coord(&self, _id: u32) -> Option<Coord> {
			None
		}
	}

	struct PanickingScript;
	impl AnimationScript for PanickingScript {
		fn schema(&self) -> ParamSchema {
			ParamSchema::new()
		}
		fn color(&self, _s: Sample, _p: &ParamValues, _l: &dyn CoordLookup) -> (f64, f64, f64) {
			panic!("boom");
		}
	}

	struct NonFiniteScript;
	impl AnimationScript for NonFiniteScript {
		fn schema(&self) -> ParamSchema {
			ParamSchema::new()
		}
		fn color(&self, _s: Sample, _p: &ParamValues, _l: &dyn CoordLookup) -> (f64, f64, f64) {
			(f64::NAN, 0.0, 0.0)
		}
	}

	fn sample() -> Sample {
		Sample {
			x: 0.0,
			y: 0.0,
			z: 0.0,
			t: 0.0,
			id: 0,
		}
	}

	#[test]
	fn unknown_animation_is_an_error() {
		let host = AnimationHost::new(PathBuf::from("/tmp"));
		assert!(matches!(host.load("nope"), Err(AnimationError::UnknownScript(_))));
	}

	#[test]
	fn known_builtins_load_with_defaults() {
		let host = AnimationHost::new(PathBuf::from("/tmp"));
		let anim = host.load("solid").unwrap();
		assert!(anim.default_params().contains_key("color.rgb"));
	}

	#[test]
	fn panicking_script_yields_black_not_a_crash() {
		let anim = Animation {
			script: Box::new(PanickingScript),
			default_params: ParamValues::new(),
			source_path: PathBuf::from("panic"),
		};
		let out = anim.evaluate(sample(), anim.default_params(), &NullLookup);
		assert_eq!(out, (0.0, 0.0, 0.0));
	}

	#[test]
	fn non_finite_script_yields_black() {
		let anim = Animation {
			script: Box::new(NonFiniteScript),
			default_params: ParamValues::new(),
			source_path: PathBuf::from("nonfinite"),
		};
		let out = anim.evaluate(sample(), anim.default_params(), &NullLookup);
		assert_eq!(out, (0.0, 0.0, 0.0));
	}
}
