//! C1: Coordinate Store.
//!
//! Holds normalized per-LED 3D positions and answers `coord(id)` lookups. Built once at
//! startup from a text file and immutable thereafter.

use std::{collections::HashMap, path::Path};

use tracing::warn;

use crate::error::CoordError;

/// A normalized LED position. Each component lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

#[derive(Debug)]
pub struct CoordStore {
	positions: HashMap<u32, Coord>,
}

struct RawRecord {
	id: u32,
	x: f64,
	y: f64,
	z: f64,
}

impl CoordStore {
	/// Load and normalize coordinates from `path`. Fatal on missing file, zero valid records,
	/// or an unparseable id on an otherwise `LED_`-shaped line.
	pub fn load(path: &Path) -> Result<Self, CoordError> {
		let text = std::fs::read_to_string(path).map_err(|source| CoordError::Read {
			path: path.display().to_string(),
			source,
		})?;
		Self::parse(&text, &path.display().to_string())
	}

	/// Parse without a path for error messages (used by tests); an unparseable id is reported
	/// against an empty path.
	pub(crate) fn from_str(text: &str) -> Option<Self> {
		Self::parse(text, "").ok()
	}

	fn parse(text: &str, path: &str) -> Result<Self, CoordError> {
		let mut records = Vec::new();
		for (lineno, line) in text.lines().enumerate() {
			if let Some(record) = parse_line(path, lineno, line)? {
				records.push(record);
			}
		}

		if records.is_empty() {
			return Err(CoordError::NoValidRecords { path: path.to_string() });
		}

		Ok(Self {
			positions: normalize(records),
		})
	}

	/// Look up the normalized position of `id`. Returns `None` if this id has no coordinate
	/// (the render engine's cue to skip it and keep the pixel black).
	pub fn coord(&self, id: u32) -> Option<Coord> {
		self.positions.get(&id).copied()
	}

	pub fn len(&self) -> usize {
		self.positions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.positions.is_empty()
	}
}

/// Parse one line of the coordinate file. Blank lines and `#` comments are silently ignored;
/// a `LED_` line with malformed coordinates is skipped with a warning (§8 "Coordinate parsing
/// tolerance" covers this case only). A `LED_` line whose coordinates parse but whose id token
/// does not is a distinct, fatal condition (§4.1 Failure: "unparseable id") and is propagated
/// as an error rather than skipped.
fn parse_line(path: &str, lineno: usize, line: &str) -> Result<Option<RawRecord>, CoordError> {
	let line = line.trim();
	if line.is_empty() || line.starts_with('#') {
		return Ok(None);
	}
	if !line.starts_with("LED_") {
		return Ok(None);
	}

	let mut fields = line.split_whitespace();
	let label = match fields.next() {
		Some(label) => label,
		None => return Ok(None),
	};
	let (x, y, z) = match (fields.next(), fields.next(), fields.next()) {
		(Some(x), Some(y), Some(z)) => match (x.parse(), y.parse(), z.parse()) {
			(Ok(x), Ok(y), Ok(z)) => (x, y, z),
			_ => {
				warn!(lineno, label, "skipping LED_ line with malformed coordinates");
				return Ok(None);
			}
		},
		_ => {
			warn!(lineno, label, "skipping LED_ line with malformed coordinates");
			return Ok(None);
		}
	};

	let id = match label.rsplit('_').next().and_then(|s| s.parse::<u32>().ok()) {
		Some(id) => id,
		None => {
			return Err(CoordError::UnparseableId {
				path: path.to_string(),
				lineno,
				label: label.to_string(),
			});
		}
	};

	Ok(Some(RawRecord { id, x, y, z }))
}

fn normalize(records: Vec<RawRecord>) -> HashMap<u32, Coord> {
	let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
	let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
	let (mut min_z, mut max_z) = (f64::INFINITY, f64::NEG_INFINITY);

	for r in &records {
		min_x = min_x.min(r.x);
		max_x = max_x.max(r.x);
		min_y = min_y.min(r.y);
		max_y = max_y.max(r.y);
		min_z = min_z.min(r.z);
		max_z = max_z.max(r.z);
	}

	let axis = |v: f64, min: f64, max: f64| {
		if max > min {
			(v - min) / (max - min)
		} else {
			0.5
		}
	};

	records
		.into_iter()
		.map(|r| {
			let coord = Coord {
				x: axis(r.x, min_x, max_x),
				y: axis(r.y, min_y, max_y),
				z: axis(r.z, min_z, max_z),
			};
			(r.id, coord)
		})
		.collect()
}
