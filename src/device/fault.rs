//! Channel trip detection and the global fault latch (§4.7).

use tracing::info;

#[derive(Debug, Default)]
pub struct ChannelFault {
	pub tripped: bool,
	pub trip_count: u64,
}

impl ChannelFault {
	/// Feed one feedback-voltage sample. Logs on rising/falling edges; tripping is advisory
	/// and does not mute the channel.
	pub fn sample(&mut self, channel: usize, voltage: f64, fault_voltage: f64) {
		let now_tripped = voltage <= fault_voltage;
		if now_tripped && !self.tripped {
			self.trip_count += 1;
			info!(channel, voltage, "channel TRIPPED");
		} else if !now_tripped && self.tripped {
			info!(channel, voltage, "channel recovered");
		}
		self.tripped = now_tripped;
	}
}

#[derive(Debug, Default)]
pub struct GlobalFault {
	pub fault_present: bool,
	pub fault_history: bool,
}

impl GlobalFault {
	/// Recompute `fault_present` from the latest sensor snapshot and latch it into
	/// `fault_history` for the remainder of the boot session.
	pub fn update(&mut self, t0: f64, t1: f64, fault_temp: f64, current: f64, fault_current: f64, any_channel_tripped: bool) {
		self.fault_present = t0 > fault_temp || t1 > fault_temp || current > fault_current || any_channel_tripped;
		self.fault_history |= self.fault_present;
	}

	/// Reset on device reboot (`0xFC`); `fault_history` does not survive a reboot.
	pub fn reset(&mut self) {
		*self = Self::default();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trip_counts_rising_edges_only() {
		let mut fault = ChannelFault::default();
		fault.sample(0, 5.0, 2.0); // fine
		assert!(!fault.tripped);
		fault.sample(0, 1.0, 2.0); // trips
		assert!(fault.tripped);
		assert_eq!(fault.trip_count, 1);
		fault.sample(0, 1.0, 2.0); // still tripped, no new edge
		assert_eq!(fault.trip_count, 1);
		fault.sample(0, 5.0, 2.0); // recovers
		assert!(!fault.tripped);
		fault.sample(0, 1.0, 2.0); // trips again
		assert_eq!(fault.trip_count, 2);
	}

	#[test]
	fn global_fault_latches_until_reset() {
		let mut g = GlobalFault::default();
		g.update(50.0, 20.0, 80.0, 1.0, 10.0, false);
		assert!(!g.fault_present);
		assert!(!g.fault_history);

		g.update(90.0, 20.0, 80.0, 1.0, 10.0, false);
		assert!(g.fault_present);
		assert!(g.fault_history);

		g.update(50.0, 20.0, 80.0, 1.0, 10.0, false);
		assert!(!g.fault_present);
		assert!(g.fault_history, "history stays latched until reboot");

		g.reset();
		assert!(!g.fault_history);
	}
}
