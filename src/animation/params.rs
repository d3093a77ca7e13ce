//! Parameter schema (§4.2).
//!
//! The core only needs the flat default values to drive execution; the richer per-parameter
//! domain bounds exist so a design-time editor (out of scope here) can build a UI from them.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
	Real(f64),
	Integer(i64),
	Pair(f64, f64),
	Color(f64, f64, f64),
	Enum(usize),
	Flags(u64),
}

impl ParamValue {
	pub fn as_real(&self) -> Option<f64> {
		match self {
			ParamValue::Real(v) => Some(*v),
			ParamValue::Integer(v) => Some(*v as f64),
			_ => None,
		}
	}
}

#[derive(Debug, Clone)]
pub enum ParamType {
	ScalarReal { min: f64, max: f64, default: f64 },
	ScalarInteger { min: i64, max: i64, default: i64 },
	PairOfReals { default: (f64, f64) },
	Color { default: (f64, f64, f64) },
	Enum { options: Vec<String>, default: usize },
	FlagSet { flags: Vec<String>, default: u64 },
}

impl ParamType {
	pub fn default_value(&self) -> ParamValue {
		match self {
			ParamType::ScalarReal { default, .. } => ParamValue::Real(*default),
			ParamType::ScalarInteger { default, .. } => ParamValue::Integer(*default),
			ParamType::PairOfReals { default } => ParamValue::Pair(default.0, default.1),
			ParamType::Color { default } => ParamValue::Color(default.0, default.1, default.2),
			ParamType::Enum { default, .. } => ParamValue::Enum(*default),
			ParamType::FlagSet { default, .. } => ParamValue::Flags(*default),
		}
	}
}

/// Outer key: group name. Inner key: parameter name within the group.
pub type ParamSchema = HashMap<String, HashMap<String, ParamType>>;

/// Flat key -> value map, keyed `"<group>.<param>"`, used at render time.
pub type ParamValues = HashMap<String, ParamValue>;

pub fn flatten_defaults(schema: &ParamSchema) -> ParamValues {
	let mut out = ParamValues::new();
	for (group, params) in schema {
		for (name, ty) in params {
			out.insert(format!("{group}.{name}"), ty.default_value());
		}
	}
	out
}
