//! Host-side parsing of the device's `STATS` lines (§6 grammar).

use std::collections::HashMap;

use winnow::ascii::{alphanumeric1, float};
use winnow::combinator::{alt, separated};
use winnow::token::take_while;
use winnow::{PResult, Parser};

/// One parsed numeric or string value from a `key=value` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Int(i64),
	Float(f64),
	Hex(u8),
	Ident(String),
}

impl Value {
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(i) => Some(*i as f64),
			Value::Float(f) => Some(*f),
			Value::Hex(h) => Some(*h as f64),
			Value::Ident(_) => None,
		}
	}
}

/// A parsed `STATS` line: the ordered key/value pairs exactly as they appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
	pub fields: HashMap<String, Value>,
}

impl Stats {
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.fields.get(key)
	}
}

/// A fully parsed device serial line: either telemetry or a forwarded info line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
	Stats(Stats),
	Info(String),
}

/// Parse one `\n`-stripped line from the device. Never fails: unparseable `STATS ` content
/// degrades to an [`Line::Info`] line rather than being dropped, so nothing from the link is
/// silently lost.
pub fn parse_line(line: &str) -> Line {
	let line = line.trim_end_matches(['\r', '\n']);
	if let Some(rest) = line.strip_prefix("STATS ") {
		match parse_stats.parse(rest) {
			Ok(fields) => return Line::Stats(Stats { fields }),
			Err(_) => return Line::Info(line.to_string()),
		}
	}
	Line::Info(line.to_string())
}

fn key(input: &mut &str) -> PResult<String> {
	alphanumeric1.map(str::to_string).parse_next(input)
}

fn hex_value(input: &mut &str) -> PResult<Value> {
	take_while(2, |c: char| c.is_ascii_hexdigit())
		.verify_map(|digits: &str| u8::from_str_radix(digits, 16).ok())
		.map(Value::Hex)
		.parse_next(input)
}

fn ident_value(input: &mut &str) -> PResult<Value> {
	take_while(1.., |c: char| !c.is_whitespace())
		.map(|s: &str| Value::Ident(s.to_string()))
		.parse_next(input)
}

fn numeric_value(input: &mut &str) -> PResult<Value> {
	float.map(|f: f64| {
		if f.fract() == 0.0 {
			Value::Int(f as i64)
		} else {
			Value::Float(f)
		}
	})
	.parse_next(input)
}

/// `fb` is the one key with a fixed 2-hex-digit bitmask shape (§6); every other key is
/// `int | float | ident` per the grammar.
fn kv_pair(input: &mut &str) -> PResult<(String, Value)> {
	let k = key(input)?;
	'='.parse_next(input)?;
	let v = if k == "fb" {
		hex_value(input)?
	} else {
		alt((numeric_value, ident_value)).parse_next(input)?
	};
	Ok((k, v))
}

fn parse_stats(input: &mut &str) -> PResult<HashMap<String, Value>> {
	let pairs: Vec<(String, Value)> = separated(1.., kv_pair, ' ').parse_next(input)?;
	Ok(pairs.into_iter().collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_stats_line() {
		let line = "STATS up=42 cmd=10 pix=1600 flush=5 err=1 t0=25.5 t1=26.1 v=11.98 i=3.20 fb=ff trip=0 lim=0 mode=0";
		match parse_line(line) {
			Line::Stats(stats) => {
				assert_eq!(stats.get("up"), Some(&Value::Int(42)));
				assert_eq!(stats.get("t0"), Some(&Value::Float(25.5)));
				assert_eq!(stats.get("mode"), Some(&Value::Int(0)));
			}
			Line::Info(_) => panic!("expected Stats"),
		}
	}

	#[test]
	fn non_stats_line_is_info() {
		match parse_line("channel 3 TRIPPED") {
			Line::Info(s) => assert_eq!(s, "channel 3 TRIPPED"),
			Line::Stats(_) => panic!("expected Info"),
		}
	}

	#[test]
	fn malformed_stats_line_degrades_to_info_without_panicking() {
		match parse_line("STATS not a valid kv stream !!") {
			Line::Info(_) => {}
			Line::Stats(_) => panic!("malformed content should not parse as Stats"),
		}
	}
}
