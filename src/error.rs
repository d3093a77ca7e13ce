//! Error taxonomy for the showrunner daemon.
//!
//! Each subsystem gets its own small `thiserror` enum; [`ShowError`] unifies them at the
//! process boundary so `main` can report a single `miette::Result`.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
	#[error("target fps {0} out of range (1..=120)")]
	#[diagnostic(help("set --fps or $SHOWRUNNER_FPS to a value between 1 and 120"))]
	FpsOutOfRange(u32),

	#[error("channel count {0} out of range (1..=8)")]
	#[diagnostic(help("set --channels or $SHOWRUNNER_CHANNELS to a value between 1 and 8"))]
	ChannelsOutOfRange(u32),

	#[error("leds-per-channel {0} out of range (1..=200)")]
	#[diagnostic(help("set --leds-per-channel or $SHOWRUNNER_LEDS_PER_CHANNEL to 1..=200"))]
	LedsPerChannelOutOfRange(u32),

	#[error("websocket idle timeout must be greater than zero")]
	#[diagnostic(help("set --idle-timeout or $SHOWRUNNER_IDLE_TIMEOUT to a positive duration"))]
	ZeroIdleTimeout,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CoordError {
	#[error("could not read led coordinate file {path}")]
	#[diagnostic(help("check the path given by --led-coordinates or $SHOWRUNNER_LED_COORDINATES"))]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("led coordinate file {path} contained no valid LED_ records")]
	#[diagnostic(help("every data line must look like 'LED_<anything>_<id> <x> <y> <z>'"))]
	NoValidRecords { path: String },

	#[error("{path} line {lineno}: unparseable led id {label:?}")]
	#[diagnostic(help("the integer after the last underscore must parse as the LED id, e.g. 'LED_chan0_12'"))]
	UnparseableId { path: String, lineno: usize, label: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum AnimationError {
	#[error("animation {0:?} is not a known script")]
	#[diagnostic(help("check the animation directory and control file contents"))]
	UnknownScript(String),

	#[error("animation {0:?} failed to load")]
	LoadFailed(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum SerialError {
	#[error("no serial device found under base path {base}")]
	#[diagnostic(help("check --serial-base or $SHOWRUNNER_SERIAL_BASE and that the device is plugged in"))]
	NoPortFound { base: String },

	#[error("failed to open serial port {path}")]
	Open {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("serial write error, frame truncated")]
	WriteTruncated {
		#[source]
		source: std::io::Error,
	},

	#[error("serial link lost")]
	#[diagnostic(help("the process will now exit; the supervising service is expected to restart it"))]
	LinkLost {
		#[source]
		source: std::io::Error,
	},
}

#[derive(Debug, Error, Diagnostic)]
pub enum TakeoverError {
	#[error("failed to bind websocket listener on {addr}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	#[error("takeover server stopped serving on {addr}")]
	Serve {
		addr: String,
		#[source]
		source: std::io::Error,
	},
}

#[derive(Debug, Error, Diagnostic)]
pub enum ShowError {
	#[error(transparent)]
	#[diagnostic(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Coord(#[from] CoordError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Animation(#[from] AnimationError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Serial(#[from] SerialError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Takeover(#[from] TakeoverError),

	#[error("i/o error")]
	Io(#[from] std::io::Error),
}

pub type Result<T, E = ShowError> = std::result::Result<T, E>;
