//! C4: Serial Session.
//!
//! Owns the open serial port, discovers it at startup, and mediates all host→device writes and
//! device→host line reads. Exactly one writer (the render engine, or a takeover client while
//! paused) and one reader (this module's own read task) are active at a time (§5).

pub mod protocol;
pub mod telemetry;

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::error::SerialError;
use telemetry::Line;

/// Find and open the first readable/writable candidate under `<base>0..9` (§4.4).
pub fn open_port(base: &str, baud: u32) -> Result<SerialStream, SerialError> {
	for index in 0..10 {
		let path = format!("{base}{index}");
		debug!(path, "probing serial candidate");
		match tokio_serial::new(&path, baud).timeout(Duration::from_millis(200)).open_native_async() {
			Ok(port) => {
				info!(path, baud, "opened serial port");
				return Ok(port);
			}
			Err(source) => {
				debug!(path, %source, "candidate unavailable");
			}
		}
	}
	Err(SerialError::NoPortFound { base: base.to_string() })
}

/// The write half of an open serial link: the renderer writes into it on every tick, and a
/// takeover client borrows the same handle while it holds exclusive control (§5). Kept separate
/// from the read half (via [`split`]) so a slow or silent device never stalls writes behind a
/// read lock (§5 single-producer/single-consumer).
///
/// Boxes the underlying writer (rather than taking a type parameter) so `SharedState`/
/// `RenderEngine` can hold a plain `Arc<Mutex<SerialSession>>` while tests still substitute an
/// in-memory duplex for the real port, the same trait-object idiom `DmaEngine` uses on the
/// device side.
///
/// `write_timeout` is what actually makes the "never blocks beyond one tick" claim on
/// [`Self::write_frame`] true: without it, a full OS-level serial buffer (the device has
/// stopped draining) leaves `write_all` awaiting indefinitely, and that wait propagates straight
/// into the render loop's fixed-rate tick (§4.4 Backpressure).
pub struct Session {
	write: Box<dyn AsyncWrite + Unpin + Send>,
	pub error_count: u64,
	write_timeout: Duration,
}

pub type SerialSession = Session;

/// Fallback write deadline for a session whose caller never calls [`Session::set_write_timeout`]
/// (e.g. a test loopback session). Real sessions are given a deadline derived from the
/// configured tick period at startup (see `lib.rs::run`).
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

impl Session {
	pub fn new(write: impl AsyncWrite + Unpin + Send + 'static) -> Self {
		Self {
			write: Box::new(write),
			error_count: 0,
			write_timeout: DEFAULT_WRITE_TIMEOUT,
		}
	}

	/// Bound every future `write_frame` call to at most `timeout`. The render engine sets this
	/// to its tick period at startup, so a stalled write never stalls more than one tick.
	pub fn set_write_timeout(&mut self, timeout: Duration) {
		self.write_timeout = timeout;
	}

	/// Write a fully-encoded command buffer. Never blocks the caller beyond `write_timeout`
	/// (§4.4 Backpressure, §5): if the underlying writer can't accept the whole frame within the
	/// deadline, the remainder is dropped and `error_count` is incremented, matching the spec's
	/// MAY-drop language, rather than awaiting indefinitely.
	pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SerialError> {
		match tokio::time::timeout(self.write_timeout, self.write.write_all(frame)).await {
			Ok(Ok(())) => Ok(()),
			Ok(Err(source)) => {
				self.error_count += 1;
				Err(SerialError::WriteTruncated { source })
			}
			Err(_elapsed) => {
				self.error_count += 1;
				warn!(
					timeout_ms = self.write_timeout.as_millis() as u64,
					"serial write did not complete within the tick deadline, dropping remainder of frame"
				);
				Ok(())
			}
		}
	}
}

/// The read half of an open serial link: owned by a single dedicated telemetry task (§5).
pub struct Reader {
	read: Box<dyn AsyncRead + Unpin + Send>,
	read_buf: BytesMut,
}

pub type SerialReader = Reader;

impl Reader {
	pub fn new(read: impl AsyncRead + Unpin + Send + 'static) -> Self {
		Self {
			read: Box::new(read),
			read_buf: BytesMut::with_capacity(4096),
		}
	}

	/// Read and parse the next complete `\n`-terminated line from the device. A link loss is
	/// fatal per §5/§7: the caller is expected to propagate and exit the process.
	pub async fn read_line(&mut self) -> Result<Line, SerialError> {
		loop {
			if let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
				let line_bytes = self.read_buf.split_to(pos + 1);
				let text = String::from_utf8_lossy(&line_bytes);
				return Ok(telemetry::parse_line(text.trim_end()));
			}

			let mut chunk = [0u8; 256];
			let n = self.read.read(&mut chunk).await.map_err(|source| SerialError::LinkLost { source })?;
			if n == 0 {
				return Err(SerialError::LinkLost {
					source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "serial port closed"),
				});
			}
			self.read_buf.extend_from_slice(&chunk[..n]);
		}
	}
}

/// Split an opened port into its independent write (renderer/takeover) and read (telemetry)
/// halves.
pub fn split(port: SerialStream) -> (SerialSession, SerialReader) {
	let (read, write) = tokio::io::split(port);
	(Session::new(write), Reader::new(read))
}

/// A write-only session over an in-memory duplex, for tests (unit and integration) that
/// exercise the render engine or takeover server without a real serial port. The peer half is
/// returned so a test can inspect what was written; drop it to have writes fail instead.
pub fn loopback_session() -> (SerialSession, tokio::io::DuplexStream) {
	let (here, there) = tokio::io::duplex(8192);
	(Session::new(here), there)
}

/// Log a forwarded device info line (§4.4 Framing from device).
pub fn log_info_line(line: &str) {
	if line.contains("TRIPPED") || line.contains("recovered") {
		warn!(device_line = line, "device fault transition");
	} else {
		info!(device_line = line, "device log");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_port_fails_fatally_when_nothing_matches() {
		// A base path guaranteed not to exist on any CI or dev box.
		let result = open_port("/dev/this-path-should-never-exist-on-any-machine-", 921_600);
		assert!(matches!(result, Err(SerialError::NoPortFound { .. })));
	}

	#[tokio::test]
	async fn write_frame_times_out_instead_of_blocking_forever() {
		let (mut session, _peer) = loopback_session();
		session.set_write_timeout(Duration::from_millis(20));

		// Nobody reads from `_peer`, so once the duplex's internal buffer is full, write_all
		// would await forever without the timeout.
		let frame = vec![0u8; 64 * 1024];
		let returned = tokio::time::timeout(Duration::from_millis(500), session.write_frame(&frame))
			.await
			.expect("write_frame must return promptly instead of hanging past its own deadline");

		assert!(returned.is_ok(), "a timed-out write is a dropped frame, not a fatal error");
		assert_eq!(session.error_count, 1);
	}
}
