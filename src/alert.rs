//! Short local prompt clips played through the same player as streamed speech.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::{debug, info};

use crate::audio::Player;
use crate::error::{PlayerError, SessionError};

/// Prompts a device plays on its own, without a voice-agent stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum AlertKind {
    PowerOn = 1,
    NotActive,
    NetworkConfig,
    NetworkConnected,
    NetworkFail,
    NetworkDisconnect,
    BatteryLow,
    PleaseAgain,
    Wakeup,
    LongKeyTalk,
    KeyTalk,
    WakeupTalk,
    FreeTalk,
}

impl AlertKind {
    pub const ALL: [AlertKind; 13] = [
        AlertKind::PowerOn,
        AlertKind::NotActive,
        AlertKind::NetworkConfig,
        AlertKind::NetworkConnected,
        AlertKind::NetworkFail,
        AlertKind::NetworkDisconnect,
        AlertKind::BatteryLow,
        AlertKind::PleaseAgain,
        AlertKind::Wakeup,
        AlertKind::LongKeyTalk,
        AlertKind::KeyTalk,
        AlertKind::WakeupTalk,
        AlertKind::FreeTalk,
    ];

    /// Clip file name without the `.mp3` extension
    pub fn file_stem(&self) -> &'static str {
        match self {
            AlertKind::PowerOn => "prologue",
            AlertKind::NotActive => "network_conn",
            AlertKind::NetworkConfig => "network_config",
            AlertKind::NetworkConnected => "network_conn_success",
            AlertKind::NetworkFail => "network_conn_failed",
            AlertKind::NetworkDisconnect => "network_reconfigure",
            AlertKind::BatteryLow => "low_battery",
            AlertKind::PleaseAgain => "please_again",
            AlertKind::Wakeup => "ai",
            AlertKind::LongKeyTalk => "long_press",
            AlertKind::KeyTalk => "press_talk",
            AlertKind::WakeupTalk => "wakeup_chat",
            AlertKind::FreeTalk => "free_chat",
        }
    }

    /// Session id the prompt plays under, e.g. `alert_9` for `Wakeup`
    pub fn session_id(&self) -> String {
        format!("alert_{}", *self as u8)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => write!(f, "{}", value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

/// Directory of prompt clips, one `<stem>.mp3` per alert kind
#[derive(Debug, Clone)]
pub struct AlertLibrary {
    directory: PathBuf,
}

impl AlertLibrary {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn clip_path(&self, kind: AlertKind) -> PathBuf {
        self.directory.join(format!("{}.mp3", kind.file_stem()))
    }

    /// Read the clip for `kind`; an empty file counts as missing
    pub fn load(&self, kind: AlertKind) -> Result<Vec<u8>, PlayerError> {
        let path = self.clip_path(kind);
        let data = fs::read(&path)?;
        if data.is_empty() {
            return Err(SessionError::InvalidArgument(format!("alert clip {} is empty", path.display())).into());
        }

        debug!("Loaded {} bytes for alert {} from {}", data.len(), kind, path.display());
        Ok(data)
    }

    /// Kinds whose clip file exists in the directory
    pub fn available(&self) -> Vec<AlertKind> {
        AlertKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.clip_path(*kind).is_file())
            .collect()
    }
}

/// Play one prompt: a fresh `alert_<n>` session fed the whole clip with end-of-stream set.
///
/// Any session already playing keeps playing; call `Player::stop` first to interrupt it.
pub fn play_alert(player: &Player, library: &AlertLibrary, kind: AlertKind) -> Result<(), PlayerError> {
    let clip = library.load(kind)?;
    let session_id = kind.session_id();

    info!("Playing alert {} ({} bytes)", kind, clip.len());
    player.start(Some(&session_id))?;
    player.write(Some(&session_id), &clip, true)
}
