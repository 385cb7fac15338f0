//! Async side of a playback session: pumps compressed bytes from any reader into the player.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::audio::Player;
use crate::error::{AudioError, PlayerError, SessionError};

/// Default read size; a few MP3 frames at speech bitrates
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// What one `feed` call delivered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub bytes: u64,
    pub chunks: usize,
    /// The session ended before the reader did
    pub interrupted: bool,
}

/// Reads a byte stream in chunks and writes each one into the active session
#[derive(Debug, Clone)]
pub struct StreamFeeder {
    chunk_size: usize,
    pacing: Option<Duration>,
}

impl Default for StreamFeeder {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamFeeder {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pacing: None,
        }
    }

    /// Wait `interval` between chunks, imitating a network source
    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Feed `reader` into `session` until end of input, then mark end-of-stream.
    ///
    /// `Player::write` blocks under backpressure, so every write runs on the blocking pool.
    /// If the session is stopped or finishes first the report comes back `interrupted`.
    pub async fn feed<R>(&self, player: Arc<Player>, session: Option<String>, mut reader: R) -> Result<FeedReport, PlayerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut report = FeedReport::default();
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            if !write_chunk(&player, &session, buf[..n].to_vec(), false).await? {
                report.interrupted = true;
                info!("Session ended after {} bytes; stopping feed", report.bytes);
                return Ok(report);
            }
            report.bytes += n as u64;
            report.chunks += 1;

            if let Some(interval) = self.pacing {
                tokio::time::sleep(interval).await;
            }
        }

        if !write_chunk(&player, &session, Vec::new(), true).await? {
            report.interrupted = true;
        }

        debug!("Feed complete: {:?}", report);
        Ok(report)
    }
}

/// Returns false when the session is gone rather than failing
async fn write_chunk(
    player: &Arc<Player>,
    session: &Option<String>,
    data: Vec<u8>,
    is_eof: bool,
) -> Result<bool, PlayerError> {
    let player = Arc::clone(player);
    let session = session.clone();

    let result = tokio::task::spawn_blocking(move || player.write(session.as_deref(), &data, is_eof))
        .await
        .map_err(|e| AudioError::StreamError(format!("Write task failed: {}", e)))?;

    match result {
        Ok(()) => Ok(true),
        Err(PlayerError::Session(SessionError::WriteAborted { .. }))
        | Err(PlayerError::Session(SessionError::NotPlaying { .. })) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{echo_factory, test_config, wait_until, RecordingSink};
    use crate::audio::SystemClock;
    use crate::config::PlayerConfig;
    use tokio_test::io::Builder;

    fn echo_player(sink: &RecordingSink) -> Arc<Player> {
        let config = PlayerConfig {
            priming_threshold_bytes: 64,
            ..test_config()
        };
        Arc::new(Player::with_components(config, sink.clone(), echo_factory(64), Arc::new(SystemClock)).unwrap())
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|n| (n % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_feed_delivers_every_byte_and_finishes() {
        let sink = RecordingSink::new();
        let player = echo_player(&sink);
        player.start(Some("tts")).unwrap();

        let data = pattern(768);
        let reader = Builder::new().read(&data[..256]).read(&data[256..512]).read(&data[512..]).build();

        let report = StreamFeeder::new(1024)
            .feed(Arc::clone(&player), Some("tts".to_string()), reader)
            .await
            .unwrap();

        assert_eq!(report, FeedReport { bytes: 768, chunks: 3, interrupted: false });
        assert!(wait_until(Duration::from_secs(5), || !player.is_playing()));
        assert_eq!(sink.echoed_bytes(), data);
    }

    #[tokio::test]
    async fn test_feed_splits_large_reads_into_chunks() {
        let sink = RecordingSink::new();
        let player = echo_player(&sink);
        player.start(None).unwrap();

        let data = pattern(1000);
        let reader = Builder::new().read(&data).build();

        let report = StreamFeeder::new(256)
            .with_pacing(Duration::from_millis(1))
            .feed(Arc::clone(&player), None, reader)
            .await
            .unwrap();

        assert_eq!(report.bytes, 1000);
        assert_eq!(report.chunks, 4);
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn test_feed_without_session_is_interrupted() {
        let player = echo_player(&RecordingSink::new());
        let reader = Builder::new().read(&pattern(128)).build();

        let report = StreamFeeder::default().feed(player, None, reader).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.bytes, 0);
        assert_eq!(report.chunks, 0);
    }

    #[tokio::test]
    async fn test_feed_propagates_read_errors() {
        let player = echo_player(&RecordingSink::new());
        player.start(None).unwrap();
        let reader = Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away"))
            .build();

        let result = StreamFeeder::default().feed(player, None, reader).await;

        assert!(matches!(result, Err(PlayerError::File(_))));
    }

    #[tokio::test]
    async fn test_feed_rejects_foreign_session() {
        let player = echo_player(&RecordingSink::new());
        player.start(Some("A")).unwrap();
        let reader = Builder::new().read(&pattern(64)).build();

        let result = StreamFeeder::default().feed(player, Some("B".to_string()), reader).await;

        assert!(matches!(
            result,
            Err(PlayerError::Session(SessionError::SessionMismatch { .. }))
        ));
    }

    #[test]
    fn test_zero_chunk_size_is_raised() {
        assert_eq!(StreamFeeder::new(0).chunk_size(), 1);
        assert_eq!(StreamFeeder::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }
}
