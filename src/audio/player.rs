use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::audio::adapter::DecoderAdapter;
use crate::audio::clock::{Clock, SystemClock};
use crate::audio::decoder::{mp3_factory, DecoderFactory};
use crate::audio::ring_buffer::ByteRingBuffer;
use crate::audio::session::SessionGuard;
use crate::audio::task::PlayerTask;
use crate::audio::{lock, PlaybackSink};
use crate::config::PlayerConfig;
use crate::error::{AudioError, DecodeError, PlayerError, SessionError};
use crate::logging::PlayerLogger;

/// Player state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Start,
    Play,
    Pause,
    Finish,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "Idle",
            PlayerState::Start => "Start",
            PlayerState::Play => "Play",
            PlayerState::Pause => "Pause",
            PlayerState::Finish => "Finish",
        }
    }

    /// States in which `write()` accepts data
    pub fn accepts_data(&self) -> bool {
        matches!(self, PlayerState::Start | PlayerState::Play)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the player for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub playing: bool,
    pub priming: bool,
    pub buffered_bytes: usize,
    pub staged_bytes: usize,
    pub frames_decoded: u64,
    pub pcm_bytes: u64,
    pub session_id: Option<String>,
}

pub(crate) enum Command {
    Transition(PlayerState),
    Shutdown,
}

/// Everything guarded by the state lock
pub(crate) struct Control {
    pub state: PlayerState,
    pub session: SessionGuard,
    /// Transition commands the task has applied so far
    pub applied: u64,
    pub start_error: Option<DecodeError>,
}

#[derive(Default)]
pub(crate) struct PlaybackStats {
    pub frames_decoded: AtomicU64,
    pub pcm_bytes: AtomicU64,
    pub staged_bytes: AtomicUsize,
    pub priming: AtomicBool,
}

impl PlaybackStats {
    pub fn reset(&self) {
        self.frames_decoded.store(0, Ordering::Relaxed);
        self.pcm_bytes.store(0, Ordering::Relaxed);
        self.staged_bytes.store(0, Ordering::Relaxed);
        self.priming.store(true, Ordering::Relaxed);
    }
}

/// State shared between the public API and the background task
///
/// Lock order: `control` may be held while taking `ring`; `ring` is never
/// held while taking `control`. `sink` is always taken on its own.
pub(crate) struct Shared {
    pub control: Mutex<Control>,
    pub changed: Condvar,
    pub ring: Mutex<ByteRingBuffer>,
    pub sink: Mutex<Box<dyn PlaybackSink>>,
    pub playing: AtomicBool,
    pub stats: PlaybackStats,
    pub config: PlayerConfig,
    pub clock: Arc<dyn Clock>,
    pub logger: PlayerLogger,
}

impl Shared {
    pub fn notify(&self) {
        self.changed.notify_all();
    }
}

/// Transition queue sender plus the number of transitions posted through it
struct Poster {
    commands: SyncSender<Command>,
    posted: u64,
}

/// Streaming MP3 player
///
/// Callers push compressed bytes with `write()`; a dedicated thread decodes
/// them and hands PCM to the sink. `start()` and `stop()` are serialized
/// against each other and block until the background thread has applied
/// the transitions they request.
pub struct Player {
    shared: Arc<Shared>,
    poster: Mutex<Poster>,
    task: Option<JoinHandle<()>>,
}

impl Player {
    /// Player with the MP3 decoder and the system clock
    pub fn new<S>(config: PlayerConfig, sink: S) -> Result<Self, PlayerError>
    where
        S: PlaybackSink + 'static,
    {
        Self::with_components(config, sink, mp3_factory(), Arc::new(SystemClock))
    }

    pub fn with_components<S>(
        config: PlayerConfig,
        sink: S,
        decoder_factory: DecoderFactory,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PlayerError>
    where
        S: PlaybackSink + 'static,
    {
        config.validate()?;

        let ring = ByteRingBuffer::with_capacity(config.ring_buffer_capacity, config.overflow_policy)?;
        let adapter = DecoderAdapter::new(config.raw_buffer_size, config.pcm_buffer_samples)?;
        let (commands, receiver) = mpsc::sync_channel(config.state_queue_depth);

        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: PlayerState::Idle,
                session: SessionGuard::new(),
                applied: 0,
                start_error: None,
            }),
            changed: Condvar::new(),
            ring: Mutex::new(ring),
            sink: Mutex::new(Box::new(sink)),
            playing: AtomicBool::new(false),
            stats: PlaybackStats::default(),
            config,
            clock,
            logger: PlayerLogger::new(),
        });

        let task = PlayerTask::new(Arc::clone(&shared), receiver, adapter, decoder_factory);
        let handle = thread::Builder::new()
            .name("voice-player".to_string())
            .spawn(move || task.run())
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to spawn player task: {}", e)))?;

        info!(
            "Player ready: ring {} bytes, staging {} bytes, PCM {} samples",
            shared.config.ring_buffer_capacity, shared.config.raw_buffer_size, shared.config.pcm_buffer_samples
        );

        Ok(Self {
            shared,
            poster: Mutex::new(Poster { commands, posted: 0 }),
            task: Some(handle),
        })
    }

    /// Begin a playback session
    ///
    /// Does nothing if a session is already playing. Returns once the
    /// background task has prepared the decoder, or with an error if that
    /// failed or took longer than `start_timeout_ms`.
    pub fn start(&self, session_id: Option<&str>) -> Result<(), PlayerError> {
        let mut poster = lock(&self.poster);
        if self.is_playing() {
            debug!("start() ignored: already playing");
            return Ok(());
        }

        {
            let mut control = lock(&self.shared.control);
            control.session.begin(session_id);
            control.start_error = None;
            control.state = PlayerState::Start;
            lock(&self.shared.ring).reset();
            self.shared.playing.store(true, Ordering::SeqCst);
        }

        let ticket = match Self::post(&mut poster, PlayerState::Start) {
            Ok(ticket) => ticket,
            Err(e) => {
                let mut control = lock(&self.shared.control);
                control.session.end();
                control.state = PlayerState::Idle;
                self.shared.playing.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let timeout = self.shared.config.start_timeout();
        let mut control = match self.wait_applied_for(ticket, timeout) {
            Some(control) => control,
            None => {
                warn!("Player task did not pick up START within {:?}", timeout);
                return Err(SessionError::StartTimeout { waited_ms: timeout.as_millis() as u64 }.into());
            }
        };

        if let Some(e) = control.start_error.take() {
            return Err(e.into());
        }
        drop(control);

        self.shared.logger.log_session_started(session_id);
        Ok(())
    }

    /// Queue compressed bytes for the active session
    ///
    /// Blocks while the ring buffer is full, retrying every
    /// `write_retry_ms`. The retry loop gives up with `WriteAborted` as soon
    /// as the session it was admitted under is stopped or replaced.
    pub fn write(&self, session_id: Option<&str>, data: &[u8], is_eof: bool) -> Result<(), PlayerError> {
        let shared = &self.shared;
        let mut control = lock(&shared.control);

        if !control.state.accepts_data() {
            return Err(SessionError::NotPlaying { state: control.state.to_string() }.into());
        }

        if !control.session.matches(session_id) {
            let error = SessionError::SessionMismatch {
                active: control.session.id().map(str::to_owned),
                requested: session_id.map(str::to_owned),
            };
            drop(control);
            shared.logger.log_write_rejected(session_id, "session mismatch");
            return Err(error.into());
        }

        let generation = control.session.generation();
        control.session.enter_write();

        let mut written = 0;
        loop {
            written += lock(&shared.ring).write(&data[written..]);
            if written == data.len() {
                break;
            }

            drop(control);
            thread::sleep(shared.config.write_retry());
            control = lock(&shared.control);

            if !control.state.accepts_data() || control.session.generation() != generation {
                control.session.leave_write();
                drop(control);
                shared.notify();
                shared.logger.log_write_rejected(
                    session_id,
                    &format!("aborted after {} of {} bytes", written, data.len()),
                );
                return Err(SessionError::WriteAborted { written, total: data.len() }.into());
            }
        }

        control.session.set_eof(is_eof);
        control.session.leave_write();
        drop(control);
        shared.notify();
        Ok(())
    }

    /// End the active session and silence the sink
    ///
    /// A no-op when nothing is playing.
    pub fn stop(&self) -> Result<(), PlayerError> {
        let mut poster = lock(&self.poster);
        if !self.is_playing() {
            return Ok(());
        }

        let ticket = Self::post(&mut poster, PlayerState::Pause)?;
        let session_id = {
            let mut control = self.wait_applied(ticket)?;
            let session_id = control.session.id().map(str::to_owned);
            control.session.end();

            let warn_every = self.shared.config.handshake_warn();
            while control.session.is_writing() {
                let (guard, timeout) = self
                    .shared
                    .changed
                    .wait_timeout(control, warn_every)
                    .unwrap_or_else(PoisonError::into_inner);
                control = guard;
                if timeout.timed_out() && control.session.is_writing() {
                    warn!("stop() still waiting for an in-flight write to leave");
                }
            }

            lock(&self.shared.ring).reset();
            session_id
        };

        if let Err(e) = lock(&self.shared.sink).stop() {
            warn!("Playback sink failed to stop: {}", e);
            self.shared.logger.log_sink_error(session_id.as_deref(), &e.to_string());
        }
        self.shared.playing.store(false, Ordering::SeqCst);

        let ticket = Self::post(&mut poster, PlayerState::Idle)?;
        drop(self.wait_applied(ticket)?);

        self.shared.logger.log_session_stopped(session_id.as_deref());
        Ok(())
    }

    /// Lock-free; may briefly lag the background task
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlayerState {
        lock(&self.shared.control).state
    }

    pub fn status(&self) -> PlayerStatus {
        let control = lock(&self.shared.control);
        let buffered_bytes = lock(&self.shared.ring).used();
        let stats = &self.shared.stats;

        PlayerStatus {
            state: control.state,
            playing: self.is_playing(),
            priming: control.state == PlayerState::Play && stats.priming.load(Ordering::Relaxed),
            buffered_bytes,
            staged_bytes: stats.staged_bytes.load(Ordering::Relaxed),
            frames_decoded: stats.frames_decoded.load(Ordering::Relaxed),
            pcm_bytes: stats.pcm_bytes.load(Ordering::Relaxed),
            session_id: control.session.id().map(str::to_owned),
        }
    }

    pub fn logger(&self) -> &PlayerLogger {
        &self.shared.logger
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    /// Callback that stops the session without keeping the player alive.
    /// Once the last `Arc` is gone it does nothing.
    pub fn interrupt_handler(self: &Arc<Self>) -> impl Fn() + Send + Sync + 'static {
        let player = Arc::downgrade(self);
        move || {
            if let Some(player) = player.upgrade() {
                if let Err(e) = player.stop() {
                    warn!("Stop on interrupt failed: {}", e);
                }
            }
        }
    }

    fn post(poster: &mut Poster, target: PlayerState) -> Result<u64, AudioError> {
        match poster.commands.try_send(Command::Transition(target)) {
            Ok(()) => {
                poster.posted += 1;
                Ok(poster.posted)
            }
            Err(TrySendError::Full(_)) => Err(AudioError::TransitionQueueFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(AudioError::StreamError("player task has exited".to_string()))
            }
        }
    }

    /// Wait until the task has applied transition `ticket`, giving up after `timeout`
    fn wait_applied_for(&self, ticket: u64, timeout: Duration) -> Option<MutexGuard<'_, Control>> {
        let deadline = Instant::now() + timeout;
        let mut control = lock(&self.shared.control);

        while control.applied < ticket {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            control = self
                .shared
                .changed
                .wait_timeout(control, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Some(control)
    }

    /// Wait without a deadline until the task has applied transition `ticket`
    fn wait_applied(&self, ticket: u64) -> Result<MutexGuard<'_, Control>, AudioError> {
        let warn_every = self.shared.config.handshake_warn();
        let started = Instant::now();
        let mut control = lock(&self.shared.control);

        while control.applied < ticket {
            let (guard, timeout) = self
                .shared
                .changed
                .wait_timeout(control, warn_every)
                .unwrap_or_else(PoisonError::into_inner);
            control = guard;

            if timeout.timed_out() && control.applied < ticket {
                if self.task.as_ref().map_or(true, JoinHandle::is_finished) {
                    return Err(AudioError::StreamError("player task has exited".to_string()));
                }
                warn!("Still waiting for the player task after {:?}", started.elapsed());
            }
        }
        Ok(control)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop player during shutdown: {}", e);
        }

        let poster = self.poster.get_mut().unwrap_or_else(PoisonError::into_inner);
        // The task may already be gone; joining below is all that matters then
        let _ = poster.commands.send(Command::Shutdown);

        if let Some(handle) = self.task.take() {
            if handle.join().is_err() {
                log::error!("Player task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::tests::{echo_factory, test_config, RecordingSink};

    fn echo_player(sink: &RecordingSink) -> Player {
        Player::with_components(test_config(), sink.clone(), echo_factory(64), Arc::new(ManualClock::new())).unwrap()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PlayerState::Idle.to_string(), "Idle");
        assert_eq!(PlayerState::Play.to_string(), "Play");
    }

    #[test]
    fn test_accepts_data() {
        assert!(PlayerState::Start.accepts_data());
        assert!(PlayerState::Play.accepts_data());
        assert!(!PlayerState::Idle.accepts_data());
        assert!(!PlayerState::Pause.accepts_data());
        assert!(!PlayerState::Finish.accepts_data());
    }

    #[test]
    fn test_stats_reset() {
        let stats = PlaybackStats::default();
        stats.frames_decoded.store(5, Ordering::Relaxed);
        stats.pcm_bytes.store(100, Ordering::Relaxed);

        stats.reset();

        assert_eq!(stats.frames_decoded.load(Ordering::Relaxed), 0);
        assert_eq!(stats.pcm_bytes.load(Ordering::Relaxed), 0);
        assert!(stats.priming.load(Ordering::Relaxed));
    }

    #[test]
    fn test_posted_finish_is_ignored() {
        let sink = RecordingSink::new();
        let player = echo_player(&sink);
        player.start(Some("S")).unwrap();

        let ticket = Player::post(&mut lock(&player.poster), PlayerState::Finish).unwrap();
        drop(player.wait_applied(ticket).unwrap());

        assert!(player.is_playing());
        assert_ne!(player.state(), PlayerState::Idle);
        assert_eq!(player.status().session_id.as_deref(), Some("S"));
        player.write(Some("S"), &[7u8; 64], false).unwrap();
    }

    #[test]
    fn test_interrupt_handler_stops_session() {
        let sink = RecordingSink::new();
        let player = Arc::new(echo_player(&sink));
        let interrupt = player.interrupt_handler();

        player.start(Some("S")).unwrap();
        interrupt();

        assert!(!player.is_playing());
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_interrupt_handler_does_not_keep_player_alive() {
        let sink = RecordingSink::new();
        let player = Arc::new(echo_player(&sink));
        let interrupt = player.interrupt_handler();
        let weak = Arc::downgrade(&player);

        player.start(None).unwrap();
        assert_eq!(sink.stop_count(), 0);
        drop(player);

        // Drop stopped the live session
        assert!(weak.upgrade().is_none());
        assert_eq!(sink.stop_count(), 1);
        interrupt();
        assert_eq!(sink.stop_count(), 1);
    }
}
