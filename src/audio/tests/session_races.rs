use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::audio::clock::ManualClock;
use crate::audio::Player;
use crate::error::{PlayerError, SessionError};

const SETTLE: Duration = Duration::from_secs(3);

/// Player whose task never gets past priming, so the ring only fills up
fn stalled_player(sink: &RecordingSink) -> Arc<Player> {
    let config = PlayerConfig {
        ring_buffer_capacity: 1024,
        ..test_config()
    };
    let player = Player::with_components(config, sink.clone(), echo_factory(64), Arc::new(ManualClock::new())).unwrap();
    Arc::new(player)
}

#[test]
fn test_stop_aborts_blocked_writer() {
    let sink = RecordingSink::new();
    let player = stalled_player(&sink);
    player.start(None).unwrap();

    let writer = {
        let player = Arc::clone(&player);
        thread::spawn(move || player.write(None, &[1u8; 4096], true))
    };

    assert!(wait_until(SETTLE, || player.status().buffered_bytes == 1024));
    player.stop().unwrap();

    match writer.join().unwrap() {
        Err(PlayerError::Session(SessionError::WriteAborted { written, total })) => {
            assert_eq!(written, 1024);
            assert_eq!(total, 4096);
        }
        other => panic!("Expected WriteAborted, got {:?}", other),
    }
    assert!(!player.is_playing());
    assert_eq!(player.status().buffered_bytes, 0);
}

#[test]
fn test_stale_writer_never_feeds_new_session() {
    let sink = RecordingSink::new();
    let player = stalled_player(&sink);
    player.start(None).unwrap();

    let writer = {
        let player = Arc::clone(&player);
        thread::spawn(move || player.write(None, &[0xAAu8; 8192], false))
    };
    assert!(wait_until(SETTLE, || player.status().buffered_bytes == 1024));

    // Restart with the same (absent) id while the old write is still blocked
    player.stop().unwrap();
    player.start(None).unwrap();

    let result = writer.join().unwrap();
    assert!(matches!(result, Err(PlayerError::Session(SessionError::WriteAborted { .. }))));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(player.status().buffered_bytes, 0);

    player.write(None, &[0x55u8; 10], false).unwrap();
    assert_eq!(player.status().buffered_bytes, 10);
}

#[test]
fn test_concurrent_writers_share_session() {
    let sink = RecordingSink::new();
    let player = stalled_player(&sink);
    player.start(Some("S")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let player = Arc::clone(&player);
            thread::spawn(move || player.write(Some("S"), &[7u8; 100], false))
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(player.status().buffered_bytes, 400);
}

#[test]
fn test_stop_from_another_thread_while_playing() {
    let sink = RecordingSink::new();
    let player = stalled_player(&sink);
    player.start(Some("S")).unwrap();

    let stopper = {
        let player = Arc::clone(&player);
        thread::spawn(move || player.stop())
    };
    stopper.join().unwrap().unwrap();

    assert!(!player.is_playing());
    assert!(matches!(
        player.write(Some("S"), &[1u8; 10], false),
        Err(PlayerError::Session(SessionError::NotPlaying { .. }))
    ));
}
