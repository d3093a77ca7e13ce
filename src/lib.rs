#![deny(rust_2018_idioms)]

pub mod animation;
pub mod args;
pub mod coords;
pub mod device;
pub mod error;
pub mod logging;
pub mod render;
pub mod serial;
pub mod status;
pub mod switcher;
pub mod takeover;

use std::sync::Arc;

use miette::IntoDiagnostic;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use crate::args::Config;
use crate::error::ShowError;
use crate::logging::LogGuard;

#[allow(dead_code)] // read by tests and by anything that wants to tag its own log lines
pub(crate) const APP_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Parse the CLI/environment and stand up logging, in that order, so a config parse error
/// (clap's own `--help`/usage failure) never goes through the tracing subscriber.
pub fn args() -> miette::Result<(Config, LogGuard)> {
	let config = args::get_config();
	let guard = logging::init(&config);
	Ok((config, guard))
}

/// Wait for Ctrl-C or, on Unix, SIGTERM, then resolve. Mirrors the teacher daemon's own signal
/// plumbing (§10 Process supervision); there is deliberately no SIGHUP reload here, since the
/// Animation Switcher already hot-swaps via the control file.
async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			error!(%err, "failed to listen for ctrl-c");
		}
	};

	#[cfg(unix)]
	let terminate = async {
		use tokio::signal::unix::{signal, SignalKind};
		match signal(SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(err) => error!(%err, "failed to install sigterm handler"),
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => info!("received ctrl-c"),
		_ = terminate => info!("received sigterm"),
	}
}

/// Bring up every component named in the specification (C1-C6) and run until a shutdown signal
/// arrives or a fatal condition is hit (§5 Cancellation, §7 Error taxonomy).
pub async fn run(config: Config) -> miette::Result<()> {
	config.validate().map_err(ShowError::from).into_diagnostic()?;
	info!(version = env!("CARGO_PKG_VERSION"), "starting up");
	debug!(?config, "resolved configuration");

	let coords = Arc::new(coords::CoordStore::load(&config.led_coordinates).map_err(ShowError::from).into_diagnostic()?);

	let port = serial::open_port(&config.serial_base, config.serial_baud)
		.map_err(ShowError::from)
		.into_diagnostic()?;
	let (mut session, reader) = serial::split(port);
	// Bound every write to one tick period, so a device that stops draining its serial buffer
	// stalls at most one tick instead of the whole render loop (§4.4 Backpressure).
	session.set_write_timeout(std::time::Duration::from_secs_f64(1.0 / config.fps as f64));
	let serial = Arc::new(Mutex::new(session));

	let animation_host = animation::AnimationHost::new(config.animation_dir.clone());
	let initial_animation = animation_host
		.load(&config.initial_animation)
		.map_err(ShowError::from)
		.into_diagnostic()?;

	let engine = Arc::new(render::RenderEngine::new(
		coords,
		initial_animation,
		serial.clone(),
		config.channels,
		config.leds_per_channel,
		config.fps,
	));

	let telemetry = status::TelemetryCache::new();

	let mut status_task = tokio::spawn(status::run(reader, config.status_file.clone(), telemetry.clone()));

	let switcher_task = tokio::spawn(switcher::run(
		config.control_file.clone(),
		config.initial_animation.clone(),
		animation::AnimationHost::new(config.animation_dir.clone()),
		engine.clone(),
	));

	let shared_state = Arc::new(takeover::SharedState::new(
		engine.clone(),
		serial.clone(),
		telemetry,
		config.eviction_age_duration(),
		config.idle_timeout_duration(),
	));

	let shutdown = Arc::new(Notify::new());

	let takeover_shutdown = shutdown.clone();
	let takeover_state = shared_state.clone();
	let mut takeover_task = tokio::spawn(takeover::run(config.listen, shared_state, async move {
		takeover_shutdown.notified().await;
		takeover_state.notify_shutdown().await;
	}));

	// The render loop itself only returns once `request_stop` flips its flag (after completing
	// one more tick and sending clear-all, §5); a tiny sibling task flips that flag on signal.
	let render_engine = engine.clone();
	let mut render_task = tokio::spawn(async move { render_engine.run().await });
	let stopper_engine = engine.clone();
	let stopper_shutdown = shutdown.clone();
	tokio::spawn(async move {
		stopper_shutdown.notified().await;
		stopper_engine.request_stop();
	});

	let exit: Result<(), ShowError> = tokio::select! {
		_ = wait_for_shutdown_signal() => {
			info!("shutting down");
			shutdown.notify_waiters();
			Ok(())
		}
		result = &mut status_task => Err(status_fatal(result)),
		result = &mut render_task => render_fatal(result),
		result = &mut takeover_task => Err(takeover_fatal(result)),
	};

	switcher_task.abort();

	if exit.is_ok() {
		// Let the already-in-flight final tick/clear-all and the takeover server's graceful
		// shutdown (which notifies any active client) actually finish before the process exits.
		let _ = render_task.await;
		let _ = takeover_task.await;
	}

	match exit {
		Ok(()) => {
			info!("shutdown complete");
			Ok(())
		}
		Err(err) => {
			error!(%err, "fatal error, exiting");
			Err(err).into_diagnostic()
		}
	}
}

type Joined<T, E> = Result<Result<T, E>, tokio::task::JoinError>;

/// The status/telemetry task never returns `Ok`: its only exit path is a lost serial link, which
/// is always fatal (§5 Cancellation, §7 taxonomy item 5).
fn status_fatal(result: Joined<(), error::SerialError>) -> ShowError {
	match result {
		Ok(Err(err)) => ShowError::from(err),
		Ok(Ok(())) => unreachable!("status::run only returns on error"),
		Err(join_err) => task_panicked("status", join_err),
	}
}

/// The render loop resolves to `Ok(())` on a graceful stop; a write failure is fatal.
fn render_fatal(result: Joined<(), error::SerialError>) -> Result<(), ShowError> {
	match result {
		Ok(Ok(())) => Ok(()),
		Ok(Err(err)) => Err(ShowError::from(err)),
		Err(join_err) => Err(task_panicked("render", join_err)),
	}
}

/// The takeover server resolves to `Ok(())` only once its graceful-shutdown future completes; if
/// it returns on its own (bind loss, serve error) while we're still running, that is fatal.
fn takeover_fatal(result: Joined<(), error::TakeoverError>) -> ShowError {
	match result {
		Ok(Err(err)) => ShowError::from(err),
		Ok(Ok(())) => ShowError::from(error::TakeoverError::Serve {
			addr: "unknown".to_string(),
			source: std::io::Error::new(std::io::ErrorKind::Other, "takeover server exited before shutdown was requested"),
		}),
		Err(join_err) => task_panicked("takeover", join_err),
	}
}

fn task_panicked(task: &str, join_err: tokio::task::JoinError) -> ShowError {
	ShowError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("{task} task panicked: {join_err}")))
}
