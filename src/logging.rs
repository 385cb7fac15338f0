use log::{debug, info, warn, error};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};

use crate::audio::lock;

/// Default number of events kept in the in-memory history
const DEFAULT_MAX_EVENTS: usize = 1000;

/// Player event for logging and debugging
#[derive(Debug, Clone)]
pub struct PlayerEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlayerEventType,
    pub session_id: Option<String>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEventType {
    SessionStarted,
    SessionStopped,
    SessionFinished,
    StarvationFinish,
    DecoderInitFailed,
    WriteRejected,
    SinkError,
    StateChanged,
}

impl PlayerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerEventType::SessionStarted => "SESSION_STARTED",
            PlayerEventType::SessionStopped => "SESSION_STOPPED",
            PlayerEventType::SessionFinished => "SESSION_FINISHED",
            PlayerEventType::StarvationFinish => "STARVATION_FINISH",
            PlayerEventType::DecoderInitFailed => "DECODER_INIT_FAILED",
            PlayerEventType::WriteRejected => "WRITE_REJECTED",
            PlayerEventType::SinkError => "SINK_ERROR",
            PlayerEventType::StateChanged => "STATE_CHANGED",
        }
    }
}

/// Logger for player operations; forwards to `log` and keeps a bounded event history
#[derive(Clone)]
pub struct PlayerLogger {
    events: Arc<Mutex<VecDeque<PlayerEvent>>>,
    max_events: usize,
}

impl Default for PlayerLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        // Set log level based on environment variable or default to Info
        let log_level = std::env::var("VSPLAY_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(Self::parse_level(&log_level));
        builder.try_init()?;

        info!("Player logging initialized with level: {}", log_level);
        Ok(())
    }

    fn parse_level(level: &str) -> log::LevelFilter {
        match level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }

    /// Log a player event
    pub fn log_event(&self, event_type: PlayerEventType, session_id: Option<&str>, details: String) {
        let session = session_id.unwrap_or("-");
        match event_type {
            PlayerEventType::SessionStarted
            | PlayerEventType::SessionStopped
            | PlayerEventType::SessionFinished => {
                info!("[{}] session={} {}", event_type.as_str(), session, details);
            }
            PlayerEventType::StarvationFinish | PlayerEventType::WriteRejected => {
                warn!("[{}] session={} {}", event_type.as_str(), session, details);
            }
            PlayerEventType::DecoderInitFailed | PlayerEventType::SinkError => {
                error!("[{}] session={} {}", event_type.as_str(), session, details);
            }
            PlayerEventType::StateChanged => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
        }

        let mut events = lock(&self.events);
        events.push_back(PlayerEvent {
            timestamp: Utc::now(),
            event_type,
            session_id: session_id.map(str::to_string),
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_session_started(&self, session_id: Option<&str>) {
        self.log_event(PlayerEventType::SessionStarted, session_id, "playback session started".to_string());
    }

    pub fn log_session_stopped(&self, session_id: Option<&str>) {
        self.log_event(PlayerEventType::SessionStopped, session_id, "playback stopped by caller".to_string());
    }

    pub fn log_session_finished(&self, session_id: Option<&str>, frames: u64, pcm_bytes: u64) {
        self.log_event(
            PlayerEventType::SessionFinished,
            session_id,
            format!("stream drained ({} frames, {} PCM bytes)", frames, pcm_bytes),
        );
    }

    pub fn log_starvation(&self, session_id: Option<&str>, timeout_ms: u64) {
        self.log_event(
            PlayerEventType::StarvationFinish,
            session_id,
            format!("no decodable data for {}ms, finishing session", timeout_ms),
        );
    }

    pub fn log_decoder_init_failed(&self, session_id: Option<&str>, reason: &str) {
        self.log_event(PlayerEventType::DecoderInitFailed, session_id, reason.to_string());
    }

    pub fn log_write_rejected(&self, session_id: Option<&str>, reason: &str) {
        self.log_event(PlayerEventType::WriteRejected, session_id, reason.to_string());
    }

    pub fn log_sink_error(&self, session_id: Option<&str>, error: &str) {
        self.log_event(PlayerEventType::SinkError, session_id, error.to_string());
    }

    pub fn log_state_changed(&self, from: &str, to: &str) {
        self.log_event(PlayerEventType::StateChanged, None, format!("{} -> {}", from, to));
    }

    /// Get recent events for debugging, oldest first
    pub fn recent_events(&self, count: usize) -> Vec<PlayerEvent> {
        let events = lock(&self.events);
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    /// Count events of one type in the retained history
    pub fn count(&self, event_type: PlayerEventType) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }

    /// Clear event history
    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }
}
