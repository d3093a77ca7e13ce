//! The device-side byte-stream parser (§4.7): a tagged state variable plus a small register
//! set, persisting across bytes and resetting to `WaitCommand` after each completed command.

use tracing::{debug, warn};

use super::channel::{ChannelBuffer, DmaEngine, Rgb, MAX_LEDS_PER_CHANNEL};
use super::fault::{ChannelFault, GlobalFault};
use super::gamma::{self, DEFAULT_GAMMA};
use super::pattern;
use super::telemetry::Snapshot;

pub const NUM_CHANNELS: usize = 8;

const CMD_UPDATE_FLUSH: u8 = 0xFF;
const CMD_UPDATE_ONLY: u8 = 0xFE;
const CMD_FLUSH: u8 = 0xFD;
const CMD_RESET: u8 = 0xFC;
const CMD_START_PATTERN: u8 = 0xFB;
const CMD_STOP_PATTERN: u8 = 0xFA;
const CMD_CLEAR_ALL: u8 = 0xF9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
	WaitCommand,
	ReadChannel,
	ReadCountLo,
	ReadCountHi,
	ReadRgb,
	ReadFlushMask,
	ReadPatternId,
}

/// The parser's persistent register set (§3 Entities: Parser State; §9 Design Notes).
#[derive(Debug, Default)]
struct Registers {
	command: u8,
	channel: u8,
	count_lo: u8,
	count: u16,
	led_index: u16,
	rgb_index: u8,
	rgb: [u8; 3],
	auto_flush: bool,
	/// Set when the in-progress command is known to be invalid but its payload must still be
	/// consumed byte-for-byte to keep the stream in sync (§4.7 Validation; see S5).
	aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Normal,
	Pattern(u8),
}

/// Host-configurable device parameters, set once at boot.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
	pub gamma: f64,
	pub current_limit_threshold: u32,
	pub fault_voltage: f64,
	pub fault_temp: f64,
	pub fault_current: f64,
	pub timeout_ticks: u64,
}

impl Default for DeviceConfig {
	fn default() -> Self {
		Self {
			gamma: DEFAULT_GAMMA,
			current_limit_threshold: 200 * 3 * 255,
			fault_voltage: 2.0,
			fault_temp: 80.0,
			fault_current: 20.0,
			timeout_ticks: 5 * pattern::PATTERN_HZ,
		}
	}
}

pub struct Decoder {
	state: ParserState,
	regs: Registers,
	channels: [ChannelBuffer; NUM_CHANNELS],
	dmas: [Box<dyn DmaEngine>; NUM_CHANNELS],
	gamma_lut: [u8; 256],
	config: DeviceConfig,

	pub command_count: u64,
	pub pixel_count: u64,
	pub flush_count: u64,
	pub error_count: u64,

	pub mode: Mode,
	pattern_tick: u64,
	ticks_since_valid_command: u64,

	pub global_fault: GlobalFault,
	pub channel_faults: [ChannelFault; NUM_CHANNELS],

	boot_uptime_ticks: u64,
}

impl Decoder {
	pub fn new(config: DeviceConfig, dmas: [Box<dyn DmaEngine>; NUM_CHANNELS]) -> Self {
		Self {
			state: ParserState::WaitCommand,
			regs: Registers::default(),
			channels: Default::default(),
			dmas,
			gamma_lut: gamma::build_lut(config.gamma),
			config,
			command_count: 0,
			pixel_count: 0,
			flush_count: 0,
			error_count: 0,
			mode: Mode::Normal,
			pattern_tick: 0,
			ticks_since_valid_command: 0,
			global_fault: GlobalFault::default(),
			channel_faults: Default::default(),
			boot_uptime_ticks: 0,
		}
	}

	pub fn channel(&self, index: usize) -> &ChannelBuffer {
		&self.channels[index]
	}

	/// Reboot (`0xFC`): reinitialize all state. `fault_history` does not survive.
	pub fn reboot(&mut self) {
		let config = self.config;
		*self = Self::new(config, std::array::from_fn(|_| Box::new(super::channel::InstantDma::default()) as Box<dyn DmaEngine>));
	}

	/// Feed one byte from the serial link into the parser. This is the only entry point that
	/// advances `state`/`regs`; transitions are a pure function of `(state, byte)` plus the
	/// side-effectful buffer writes described in §4.7.
	pub fn feed_byte(&mut self, byte: u8) {
		match self.state {
			ParserState::WaitCommand => self.on_command_byte(byte),
			ParserState::ReadChannel => {
				self.regs.channel = byte;
				self.regs.aborted = byte as usize >= NUM_CHANNELS;
				self.state = ParserState::ReadCountLo;
			}
			ParserState::ReadCountLo => {
				self.regs.count_lo = byte;
				self.state = ParserState::ReadCountHi;
			}
			ParserState::ReadCountHi => {
				let count = u16::from_le_bytes([self.regs.count_lo, byte]);
				self.regs.count = count;
				if count == 0 || count as usize > MAX_LEDS_PER_CHANNEL {
					self.regs.aborted = true;
				}
				if count == 0 {
					// Nothing to consume: abort now, no RGB payload follows.
					self.finish_update_command();
					return;
				}
				if !self.regs.aborted {
					self.channels[self.regs.channel as usize].set_led_count(count as usize);
				}
				self.regs.led_index = 0;
				self.regs.rgb_index = 0;
				self.state = ParserState::ReadRgb;
			}
			ParserState::ReadRgb => self.on_rgb_byte(byte),
			ParserState::ReadFlushMask => {
				self.apply_flush(byte);
				self.command_count += 1;
				self.on_valid_command();
				self.reset_to_wait();
			}
			ParserState::ReadPatternId => {
				let pattern_id = byte;
				self.mode = Mode::Pattern(pattern_id);
				self.command_count += 1;
				self.on_valid_command();
				self.reset_to_wait();
			}
		}
	}

	pub fn feed_bytes(&mut self, bytes: &[u8]) {
		for &b in bytes {
			self.feed_byte(b);
		}
	}

	fn on_command_byte(&mut self, byte: u8) {
		self.regs = Registers {
			command: byte,
			..Registers::default()
		};
		match byte {
			CMD_UPDATE_FLUSH => {
				self.regs.auto_flush = true;
				self.state = ParserState::ReadChannel;
			}
			CMD_UPDATE_ONLY => {
				self.state = ParserState::ReadChannel;
			}
			CMD_FLUSH => self.state = ParserState::ReadFlushMask,
			CMD_START_PATTERN => self.state = ParserState::ReadPatternId,
			CMD_STOP_PATTERN => {
				self.mode = Mode::Normal;
				self.command_count += 1;
				self.on_valid_command();
				self.reset_to_wait();
			}
			CMD_CLEAR_ALL => {
				for channel in self.channels.iter_mut() {
					channel.clear();
				}
				self.flush_all();
				self.command_count += 1;
				self.on_valid_command();
				self.reset_to_wait();
			}
			CMD_RESET => {
				debug!("device reset requested");
				self.reboot();
			}
			_ => {
				warn!(byte, "unrecognized command byte, ignoring");
				self.state = ParserState::WaitCommand;
			}
		}
	}

	fn on_rgb_byte(&mut self, byte: u8) {
		self.regs.rgb[self.regs.rgb_index as usize] = byte;
		self.regs.rgb_index += 1;

		if self.regs.rgb_index == 3 {
			if !self.regs.aborted {
				let gamma_corrected = Rgb(
					self.gamma_lut[self.regs.rgb[0] as usize],
					self.gamma_lut[self.regs.rgb[1] as usize],
					self.gamma_lut[self.regs.rgb[2] as usize],
				);
				self.channels[self.regs.channel as usize].write(self.regs.led_index as usize, gamma_corrected);
				self.pixel_count += 1;
			}
			self.regs.rgb_index = 0;
			self.regs.led_index += 1;

			if self.regs.led_index == self.regs.count {
				self.finish_update_command();
			}
		}
	}

	fn finish_update_command(&mut self) {
		self.command_count += 1;

		if self.regs.aborted {
			self.error_count += 1;
			self.reset_to_wait();
			return;
		}

		let channel = &mut self.channels[self.regs.channel as usize];
		channel.apply_current_limit(self.config.current_limit_threshold);

		if self.regs.auto_flush {
			let channel_index = self.regs.channel as usize;
			self.try_swap_channel(channel_index);
			self.flush_count += 1;
		}

		self.on_valid_command();
		self.reset_to_wait();
	}

	fn try_swap_channel(&mut self, index: usize) -> bool {
		self.channels[index].try_swap(self.dmas[index].as_mut())
	}

	fn apply_flush(&mut self, mask: u8) {
		for k in 0..NUM_CHANNELS {
			if mask & (1 << k) != 0 {
				self.try_swap_channel(k);
			}
		}
		self.flush_count += 1;
	}

	fn flush_all(&mut self) {
		for k in 0..NUM_CHANNELS {
			self.try_swap_channel(k);
		}
		self.flush_count += 1;
	}

	fn on_valid_command(&mut self) {
		self.ticks_since_valid_command = 0;
		if matches!(self.regs.command, CMD_UPDATE_FLUSH | CMD_UPDATE_ONLY) {
			self.mode = Mode::Normal;
		}
	}

	fn reset_to_wait(&mut self) {
		self.state = ParserState::WaitCommand;
		self.regs = Registers::default();
	}

	pub fn is_idle(&self) -> bool {
		self.state == ParserState::WaitCommand
	}

	/// Advance the device's 30 Hz cooperative timer by one tick: advances pattern animation
	/// (when active) and arms the timeout fallback (§4.7).
	pub fn on_pattern_tick(&mut self) {
		self.pattern_tick += 1;
		self.boot_uptime_ticks += 1;
		self.ticks_since_valid_command += 1;

		if self.ticks_since_valid_command >= self.config.timeout_ticks && self.mode == Mode::Normal {
			self.mode = Mode::Pattern(0);
		}

		if let Mode::Pattern(pattern_id) = self.mode {
			for channel in 0..NUM_CHANNELS {
				self.channels[channel].set_led_count(MAX_LEDS_PER_CHANNEL);
				for local in 0..MAX_LEDS_PER_CHANNEL {
					let rgb = pattern::color_for(pattern_id, self.pattern_tick, channel, local);
					self.channels[channel].write(local, rgb);
				}
				self.try_swap_channel(channel);
			}
		}
	}

	/// Feed one 20 Hz feedback-voltage round-robin sample for `channel`.
	pub fn sample_channel_voltage(&mut self, channel: usize, voltage: f64) {
		self.channel_faults[channel].sample(channel, voltage, self.config.fault_voltage);
	}

	/// Recompute the global fault flags from the latest sensor snapshot (§4.7).
	pub fn sample_global(&mut self, t0: f64, t1: f64, bus_current: f64) {
		let any_tripped = self.channel_faults.iter().any(|f| f.tripped);
		self.global_fault.update(t0, t1, self.config.fault_temp, bus_current, self.config.fault_current, any_tripped);
	}

	pub fn snapshot(&self, t0: f64, t1: f64, bus_voltage: f64, bus_current: f64, feedback_mask: u8) -> Snapshot {
		Snapshot {
			uptime_s: self.boot_uptime_ticks / pattern::PATTERN_HZ,
			command_count: self.command_count,
			pixel_count: self.pixel_count,
			flush_count: self.flush_count,
			error_count: self.error_count,
			t0,
			t1,
			bus_voltage,
			bus_current,
			feedback_mask,
			trip_count: self.channel_faults.iter().map(|f| f.trip_count).sum(),
			limit_events: self.channels.iter().map(|c| c.limit_events).sum(),
			pattern_mode: matches!(self.mode, Mode::Pattern(_)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn decoder() -> Decoder {
		Decoder::new(DeviceConfig::default(), std::array::from_fn(|_| Box::new(super::super::channel::InstantDma::default()) as Box<dyn DmaEngine>))
	}

	#[test]
	fn s5_invalid_channel_then_valid_update_recovers() {
		let mut d = decoder();
		// channel 9 invalid, cnt=1, one RGB triple to stay in sync, no flush (0xFE).
		d.feed_bytes(&[0xFE, 0x09, 0x01, 0x00, 0xFF, 0x00, 0x00]);
		assert_eq!(d.error_count, 1);
		assert!(d.is_idle());

		d.feed_bytes(&[0xFF, 0x00, 0x01, 0x00, 0x10, 0x20, 0x30]);
		assert_eq!(d.error_count, 1);
		assert!(d.is_idle());

		let lut = gamma::build_lut(DEFAULT_GAMMA);
		let expect = Rgb(lut[0x10], lut[0x20], lut[0x30]);
		assert_eq!(d.channel(0).output_slice()[0], expect);
	}

	#[test]
	fn zero_count_is_rejected_without_consuming_rgb_bytes() {
		let mut d = decoder();
		d.feed_bytes(&[0xFE, 0x00, 0x00, 0x00]);
		assert_eq!(d.error_count, 1);
		assert!(d.is_idle());
	}

	#[test]
	fn parser_returns_to_wait_command_from_every_state() {
		let mut d = decoder();
		d.feed_byte(0xFF); // -> ReadChannel
		d.feed_bytes(&[0x00, 0x01, 0x00, 0x01, 0x02, 0x03]); // completes the command
		assert!(d.is_idle());

		let mut d2 = decoder();
		d2.feed_bytes(&[0xFD, 0x01]); // Flush
		assert!(d2.is_idle());

		let mut d3 = decoder();
		d3.feed_bytes(&[0xFB, 0x04]); // Start pattern
		assert!(d3.is_idle());
	}

	#[test]
	fn update_flush_swaps_buffer_update_only_does_not() {
		let mut d = decoder();
		d.feed_bytes(&[0xFE, 0x00, 0x01, 0x00, 0x01, 0x02, 0x03]);
		assert_eq!(d.channel(0).output_slice().len(), 0, "update-only must not swap");

		d.feed_bytes(&[0xFD, 0x01]);
		let lut = gamma::build_lut(DEFAULT_GAMMA);
		assert_eq!(d.channel(0).output_slice()[0], Rgb(lut[1], lut[2], lut[3]));
	}

	#[test]
	fn timeout_enters_pattern_mode_then_update_exits_it() {
		let mut d = decoder();
		for _ in 0..d.config.timeout_ticks {
			d.on_pattern_tick();
		}
		assert!(matches!(d.mode, Mode::Pattern(0)));

		d.feed_bytes(&[0xFE, 0x00, 0x01, 0x00, 0x10, 0x10, 0x10]);
		d.feed_bytes(&[0xFD, 0x01]);
		assert_eq!(d.mode, Mode::Normal);
	}

	#[test]
	fn stop_pattern_leaves_pattern_mode() {
		let mut d = decoder();
		d.feed_bytes(&[0xFB, 0x02]);
		assert!(matches!(d.mode, Mode::Pattern(2)));
		d.feed_bytes(&[0xFA]);
		assert_eq!(d.mode, Mode::Normal);
	}

	#[test]
	fn reboot_clears_fault_history() {
		let mut d = decoder();
		d.sample_channel_voltage(0, 0.5);
		d.sample_global(95.0, 20.0, 1.0);
		assert!(d.global_fault.fault_history);
		d.reboot();
		assert!(!d.global_fault.fault_history);
	}
}
