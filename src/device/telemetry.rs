//! Device-side `STATS` line emission (§4.7, §6 grammar).

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
	pub uptime_s: u64,
	pub command_count: u64,
	pub pixel_count: u64,
	pub flush_count: u64,
	pub error_count: u64,
	pub t0: f64,
	pub t1: f64,
	pub bus_voltage: f64,
	pub bus_current: f64,
	pub feedback_mask: u8,
	pub trip_count: u64,
	pub limit_events: u64,
	pub pattern_mode: bool,
}

impl Snapshot {
	/// Render as the `STATS ...` line the device emits once per second.
	pub fn to_stats_line(&self) -> String {
		format!(
			"STATS up={} cmd={} pix={} flush={} err={} t0={:.1} t1={:.1} v={:.2} i={:.2} fb={:02x} trip={} lim={} mode={}",
			self.uptime_s,
			self.command_count,
			self.pixel_count,
			self.flush_count,
			self.error_count,
			self.t0,
			self.t1,
			self.bus_voltage,
			self.bus_current,
			self.feedback_mask,
			self.trip_count,
			self.limit_events,
			if self.pattern_mode { 1 } else { 0 },
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stats_line_has_expected_shape() {
		let snap = Snapshot {
			uptime_s: 42,
			command_count: 10,
			pixel_count: 1600,
			flush_count: 5,
			error_count: 1,
			t0: 25.5,
			t1: 26.1,
			bus_voltage: 11.98,
			bus_current: 3.2,
			feedback_mask: 0xff,
			trip_count: 0,
			limit_events: 0,
			pattern_mode: false,
		};
		let line = snap.to_stats_line();
		assert!(line.starts_with("STATS "));
		assert!(line.contains("up=42"));
		assert!(line.contains("fb=ff"));
		assert!(line.contains("mode=0"));
	}
}
