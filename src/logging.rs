//! Diagnostic logging setup.
//!
//! Plain ANSI output to the terminal by default; `--log-file` switches to non-blocking
//! JSON-lines output, mirroring the verbosity/`$RUST_LOG` precedence rules in [`crate::args`].

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::args::Config;

/// Must be kept alive for the lifetime of the process when logging to a file: dropping it
/// flushes and stops the background writer thread.
pub struct LogGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

pub fn init(config: &Config) -> LogGuard {
	let filter = build_filter(config);

	match &config.log_file {
		Some(path) => {
			let (writer, guard) = tracing_appender::non_blocking(file_writer(path));
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(writer))
				.init();
			LogGuard(Some(guard))
		}
		None => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_ansi(ansi_enabled(config)))
				.init();
			LogGuard(None)
		}
	}
}

fn build_filter(config: &Config) -> EnvFilter {
	if let Ok(from_env) = std::env::var("RUST_LOG") {
		return EnvFilter::new(from_env);
	}

	let level = match config.verbose.unwrap_or(0) {
		0 if config.log_file.is_some() => "debug",
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	EnvFilter::new(format!("showrunner={level}"))
}

fn ansi_enabled(config: &Config) -> bool {
	use crate::args::ColourMode;
	match config.color {
		ColourMode::Always => true,
		ColourMode::Never => false,
		ColourMode::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
	}
}

fn file_writer(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
	let (dir, file_name) = if path.is_dir() || path.as_os_str() == "." {
		(path.to_path_buf(), format!("showrunner.{}.log", chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ")))
	} else {
		(
			path.parent().map(Path::to_path_buf).unwrap_or_default(),
			path.file_name()
				.map(|n| n.to_string_lossy().into_owned())
				.unwrap_or_else(|| "showrunner.log".to_string()),
		)
	};
	tracing_appender::rolling::never(dir, file_name)
}
