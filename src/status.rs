//! Status file writer (§6 Status file; §10 ambient stack).
//!
//! Owns the serial read half: drains `\n`-terminated lines from the device, forwards info lines
//! to the log, and rewrites a JSON status file every time a `STATS` line parses, via a
//! temp-file-then-rename dance so a reader never observes a half-written file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::SerialError;
use crate::serial::telemetry::{Line, Stats, Value as StatsValue};
use crate::serial::{log_info_line, SerialReader};

/// The most recent `STATS` document, shared with the takeover server's `/status` endpoint
/// (§4.5 Status/health surface) so it can report the last telemetry snapshot without itself
/// touching the serial link.
#[derive(Default)]
pub struct TelemetryCache(Mutex<Option<Value>>);

impl TelemetryCache {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub async fn set(&self, document: Value) {
		*self.0.lock().await = Some(document);
	}

	pub async fn get(&self) -> Option<Value> {
		self.0.lock().await.clone()
	}
}

fn stats_value_to_json(v: &StatsValue) -> Value {
	match v {
		StatsValue::Int(i) => Value::from(*i),
		StatsValue::Float(f) => Value::from(*f),
		StatsValue::Hex(h) => Value::from(format!("{h:02x}")),
		StatsValue::Ident(s) => Value::from(s.clone()),
	}
}

/// Build the JSON document for one `STATS` line: its fields plus `timestamp`/`timestamp_iso`.
pub fn stats_to_json(stats: &Stats, now: chrono::DateTime<chrono::Utc>) -> Value {
	let mut map = Map::new();
	for (k, v) in &stats.fields {
		map.insert(k.clone(), stats_value_to_json(v));
	}
	map.insert("timestamp".to_string(), Value::from(now.timestamp_millis()));
	map.insert("timestamp_iso".to_string(), Value::from(now.to_rfc3339()));
	Value::Object(map)
}

/// Atomically rewrite `path` with `document`: write to a sibling temp file, then persist
/// (rename) over the destination, so a concurrent reader never sees a partial write.
pub fn write_status(path: &Path, document: &Value) -> std::io::Result<()> {
	let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
	let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
	serde_json::to_writer_pretty(&mut tmp, document)?;
	tmp.persist(path).map_err(|e| e.error)?;
	Ok(())
}

/// Drain the serial read half for the lifetime of the process: info lines are logged, `STATS`
/// lines are written to the status file. A link loss propagates and is fatal (§5/§7), matching
/// the write side's treatment of a lost serial port.
pub async fn run(mut reader: SerialReader, status_path: PathBuf, telemetry: Arc<TelemetryCache>) -> Result<(), SerialError> {
	loop {
		let line = reader.read_line().await?;
		match line {
			Line::Info(text) => log_info_line(&text),
			Line::Stats(stats) => {
				let document = stats_to_json(&stats, chrono::Utc::now());
				telemetry.set(document.clone()).await;
				if let Err(err) = write_status(&status_path, &document) {
					warn!(%err, path = %status_path.display(), "failed to write status file");
				}
			}
		}
	}
}
