//! Full-tick integration tests against an in-memory fake serial sink (no real port).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use showrunner::animation::{Animation, AnimationHost};
use showrunner::coords::CoordStore;
use showrunner::render::RenderEngine;
use showrunner::serial;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

/// The "solid" builtin defaults to red, so loading it needs no parameter overrides.
fn solid_red() -> Animation {
	AnimationHost::new(PathBuf::from("/tmp")).load("solid").unwrap()
}

fn coord_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("coords.txt");
	std::fs::write(&path, contents).unwrap();
	(dir, path)
}

#[tokio::test]
async fn one_tick_writes_exactly_update_then_flush() {
	let (_dir, path) = coord_file("LED_A_0 0 0 0\nLED_A_1 1 1 1\n");
	let coords = Arc::new(CoordStore::load(&path).unwrap());
	let (session, mut peer) = serial::loopback_session();
	let serial = Arc::new(Mutex::new(session));
	let engine = RenderEngine::new(coords, solid_red(), serial, 1, 2, 30);

	engine.tick_once().await.unwrap();

	let mut buf = [0u8; 64];
	let n = tokio::time::timeout(Duration::from_millis(200), peer.read(&mut buf)).await.unwrap().unwrap();

	assert_eq!(
		&buf[..n],
		&[0xFE, 0x00, 0x02, 0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00, 0xFD, 0x01][..]
	);
}

#[tokio::test]
async fn paused_engine_skips_ticks_until_resumed() {
	let (_dir, path) = coord_file("LED_A_0 0 0 0\n");
	let coords = Arc::new(CoordStore::load(&path).unwrap());
	let (session, mut peer) = serial::loopback_session();
	let serial = Arc::new(Mutex::new(session));
	let engine = RenderEngine::new(coords, solid_red(), serial, 1, 1, 30);

	engine.pause().await.unwrap();

	let mut clear_all = [0u8; 8];
	let n = tokio::time::timeout(Duration::from_millis(200), peer.read(&mut clear_all)).await.unwrap().unwrap();
	assert_eq!(&clear_all[..n], &[0xF9][..]);

	// While paused, a tick is a no-op: nothing further arrives on the wire.
	engine.tick_once().await.unwrap();
	let mut probe = [0u8; 8];
	let timed_out = tokio::time::timeout(Duration::from_millis(100), peer.read(&mut probe)).await;
	assert!(timed_out.is_err(), "expected no bytes while paused");

	// A second pause() call while already paused must not emit a second clear-all (S3).
	engine.pause().await.unwrap();
	let still_nothing = tokio::time::timeout(Duration::from_millis(100), peer.read(&mut probe)).await;
	assert!(still_nothing.is_err(), "pause() must be idempotent once already paused");

	engine.resume().await;
	engine.tick_once().await.unwrap();
	let n = tokio::time::timeout(Duration::from_millis(200), peer.read(&mut probe)).await.unwrap().unwrap();
	assert!(n > 0, "expected a frame once rendering resumed");
}
