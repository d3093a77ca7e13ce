//! Animation Switcher (§4.6, adjunct to C2/C3).
//!
//! Watches the control file and installs whatever animation it names into the
//! [`RenderEngine`], debouncing bursts of filesystem events the way editors tend to produce
//! them (write-then-rename, or several events for one logical save).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::animation::AnimationHost;
use crate::render::RenderEngine;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Read the control file's trimmed contents, or `None` if empty (§4.6: ignore empty files).
fn read_control_file(path: &Path) -> Option<String> {
	let text = std::fs::read_to_string(path).ok()?;
	let trimmed = text.trim().to_string();
	if trimmed.is_empty() {
		None
	} else {
		Some(trimmed)
	}
}

/// Create the control file with `initial_animation` if it doesn't already exist.
fn ensure_control_file(path: &Path, initial_animation: &str) -> std::io::Result<()> {
	if !path.exists() {
		std::fs::write(path, initial_animation)?;
	}
	Ok(())
}

async fn apply_if_changed(host: &AnimationHost, engine: &RenderEngine, name: &str, installed: &mut String) {
	if name == installed {
		return;
	}
	match host.load(name) {
		Ok(animation) => {
			info!(name, "installing animation from control file");
			engine.install(animation).await;
			*installed = name.to_string();
		}
		Err(err) => {
			warn!(name, %err, "failed to load animation, keeping current");
		}
	}
}

/// Watch `control_file` for changes and install whatever animation it names, for the lifetime
/// of the returned task. The file is created with `initial_animation` if absent.
pub async fn run(
	control_file: PathBuf,
	initial_animation: String,
	host: AnimationHost,
	engine: Arc<RenderEngine>,
) {
	if let Err(err) = ensure_control_file(&control_file, &initial_animation) {
		error!(%err, "failed to create control file, hot-swap disabled");
		return;
	}

	let mut installed = initial_animation;

	let (tx, mut rx) = mpsc::channel(16);
	let watcher_result: notify::Result<RecommendedWatcher> =
		notify::recommended_watcher(move |res: notify::Result<Event>| match res {
			Ok(event) => {
				if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
					let _ = tx.blocking_send(());
				}
			}
			Err(err) => error!(%err, "control file watch error"),
		});

	let mut watcher = match watcher_result {
		Ok(w) => w,
		Err(err) => {
			error!(%err, "failed to create control file watcher, hot-swap disabled");
			return;
		}
	};

	if let Err(err) = watcher.watch(&control_file, RecursiveMode::NonRecursive) {
		error!(%err, ?control_file, "failed to watch control file, hot-swap disabled");
		return;
	}

	let mut debounce = tokio::time::interval(DEBOUNCE);
	debounce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	let mut pending = false;

	loop {
		tokio::select! {
			Some(()) = rx.recv() => {
				pending = true;
			}
			_ = debounce.tick() => {
				if pending {
					pending = false;
					if let Some(name) = read_control_file(&control_file) {
						apply_if_changed(&host, &engine, &name, &mut installed).await;
					}
				}
			}
			else => break,
		}
	}

	debug!("control file watcher exiting");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_control_file_is_ignored() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("control");
		std::fs::write(&path, "   \n").unwrap();
		assert_eq!(read_control_file(&path), None);
	}

	#[test]
	fn control_file_contents_are_trimmed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("control");
		std::fs::write(&path, "  green.js  \n").unwrap();
		assert_eq!(read_control_file(&path), Some("green.js".to_string()));
	}

	#[test]
	fn ensure_control_file_creates_missing_file_with_initial_name() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("control");
		ensure_control_file(&path, "solid").unwrap();
		assert_eq!(read_control_file(&path), Some("solid".to_string()));
	}

	#[test]
	fn ensure_control_file_leaves_existing_file_untouched() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("control");
		std::fs::write(&path, "pulse").unwrap();
		ensure_control_file(&path, "solid").unwrap();
		assert_eq!(read_control_file(&path), Some("pulse".to_string()));
	}
}
