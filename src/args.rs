use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{ArgAction, Parser, ValueEnum};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// LED volumetric display show controller
#[derive(Debug, Clone, Parser)]
#[command(
	author,
	version,
	long_version = format!("{} built from branch={} commit={} dirty={} source_timestamp={}",
		env!("CARGO_PKG_VERSION"),
		env!("GIT_BRANCH"),
		env!("GIT_COMMIT"),
		env!("GIT_DIRTY"),
		env!("SOURCE_TIMESTAMP"),
	),
	after_help = "Want more detail? Try the long '--help' flag!",
)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Config {
	/// Path to the LED coordinate text file
	#[arg(long, env = "SHOWRUNNER_LED_COORDINATES")]
	pub led_coordinates: PathBuf,

	/// Directory containing animation scripts
	#[arg(long, env = "SHOWRUNNER_ANIMATION_DIR", default_value = "./animations")]
	pub animation_dir: PathBuf,

	/// Path to the animation control file (hot-swap trigger)
	#[arg(long, env = "SHOWRUNNER_CONTROL_FILE", default_value = "./animation.control")]
	pub control_file: PathBuf,

	/// Filename (within animation-dir) of the initially installed animation
	#[arg(long, env = "SHOWRUNNER_INITIAL_ANIMATION", default_value = "solid")]
	pub initial_animation: String,

	/// Base path for serial device discovery; candidates are `<base>0`..`<base>9`
	#[arg(long, env = "SHOWRUNNER_SERIAL_BASE", default_value = "/dev/ttyACM")]
	pub serial_base: String,

	/// Serial baud rate
	#[arg(long, env = "SHOWRUNNER_SERIAL_BAUD", default_value_t = 921_600)]
	pub serial_baud: u32,

	/// LEDs per channel (1..=200)
	#[arg(long, env = "SHOWRUNNER_LEDS_PER_CHANNEL", default_value_t = 200)]
	pub leds_per_channel: u32,

	/// Number of device channels (1..=8)
	#[arg(long, env = "SHOWRUNNER_CHANNELS", default_value_t = 8)]
	pub channels: u32,

	/// Target frames per second (1..=120)
	#[arg(long, env = "SHOWRUNNER_FPS", default_value_t = 30)]
	pub fps: u32,

	/// Path to the status JSON file, rewritten atomically on every STATS line
	#[arg(long, env = "SHOWRUNNER_STATUS_FILE", default_value = "./status.json")]
	pub status_file: PathBuf,

	/// Host:port for the takeover WebSocket + status/health HTTP listener
	#[arg(long, env = "SHOWRUNNER_LISTEN", default_value = "127.0.0.1:8787")]
	pub listen: SocketAddr,

	/// Duration of age after which an active takeover client can be evicted by a new connection
	#[arg(long, env = "SHOWRUNNER_EVICTION_AGE", default_value = "30s")]
	pub eviction_age: humantime::Duration,

	/// Duration of inactivity after which an active takeover client is disconnected
	#[arg(long, env = "SHOWRUNNER_IDLE_TIMEOUT", default_value = "60s")]
	pub idle_timeout: humantime::Duration,

	/// Set diagnostic log level
	///
	/// Use multiple times to increase verbosity. Goes up to '-vvvvv'. Setting $RUST_LOG also
	/// works, and takes precedence, but is not recommended unless you know what you're doing.
	#[arg(long, short, action = ArgAction::Count, num_args = 0)]
	pub verbose: Option<u8>,

	/// Write diagnostic logs to a file in JSON-lines format, instead of the terminal
	#[arg(long, env = "SHOWRUNNER_LOG_FILE", num_args = 0..=1, default_missing_value = ".")]
	pub log_file: Option<PathBuf>,

	/// When to use terminal colours
	#[arg(long, default_value = "auto", value_name = "MODE", alias = "colour")]
	pub color: ColourMode,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColourMode {
	Auto,
	Always,
	Never,
}

impl Config {
	pub fn eviction_age_duration(&self) -> Duration {
		*self.eviction_age
	}

	pub fn idle_timeout_duration(&self) -> Duration {
		*self.idle_timeout
	}

	/// Validate cross-field range constraints that `clap` alone cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.fps == 0 || self.fps > 120 {
			return Err(ConfigError::FpsOutOfRange(self.fps));
		}
		if self.channels == 0 || self.channels > 8 {
			return Err(ConfigError::ChannelsOutOfRange(self.channels));
		}
		if self.leds_per_channel == 0 || self.leds_per_channel > 200 {
			return Err(ConfigError::LedsPerChannelOutOfRange(self.leds_per_channel));
		}
		if self.idle_timeout_duration().is_zero() {
			return Err(ConfigError::ZeroIdleTimeout);
		}
		Ok(())
	}

	pub fn total_leds(&self) -> u32 {
		self.channels * self.leds_per_channel
	}
}

pub fn get_config() -> Config {
	if std::env::var("RUST_LOG").is_ok() {
		warn!("⚠ RUST_LOG environment variable set, --verbose/-v has no effect on filtering");
	}

	debug!("parsing arguments");
	let config = Config::parse();
	debug!(?config, "got configuration");
	config
}

#[test]
fn verify_cli() {
	use clap::CommandFactory;
	Config::command().debug_assert()
}

#[test]
fn validate_rejects_bad_fps() {
	let mut config = Config::parse_from([
		"showrunner",
		"--led-coordinates",
		"coords.txt",
	]);
	config.fps = 0;
	assert!(matches!(config.validate(), Err(ConfigError::FpsOutOfRange(0))));
}
