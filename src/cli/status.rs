use crate::audio::{PlayerState, PlayerStatus};
use crate::error::{AudioError, DecodeError, ErrorSeverity, PlayerError, SessionError};

/// Terminal rendering of player status and errors
pub struct StatusDisplay;

impl StatusDisplay {
    /// Multi-line status block
    pub fn display_full_status(status: &PlayerStatus) {
        println!("┌─ Voice Player ─────────────────────────────────────────┐");
        println!("│ State:    {}", Self::format_state(status.state, status.priming));
        println!(
            "│ Session:  {}",
            status.session_id.as_deref().unwrap_or("(anonymous)")
        );
        println!("│ Buffered: {}", Self::format_file_size(status.buffered_bytes as u64));
        println!("│ Staged:   {}", Self::format_file_size(status.staged_bytes as u64));
        println!("│ Decoded:  {} frames, {} PCM", status.frames_decoded, Self::format_file_size(status.pcm_bytes));
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// One-line status, rewritten in place
    pub fn display_compact_status(status: &PlayerStatus) {
        print!("\r{}", Self::compact_line(status));
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }

    pub fn compact_line(status: &PlayerStatus) -> String {
        format!(
            "[{}] {} frames | buffered {} | {}",
            Self::format_state(status.state, status.priming),
            status.frames_decoded,
            Self::format_file_size(status.buffered_bytes as u64),
            Self::truncate(status.session_id.as_deref().unwrap_or("-"), 24),
        )
    }

    /// Display a user-facing error with severity and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐", severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        if let Some(hint) = Self::error_hint(error) {
            eprintln!("│");
            eprintln!("│ {}", hint);
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Extra pointer for errors the CLI itself can help with
    fn error_hint(error: &PlayerError) -> Option<&'static str> {
        match error {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => Some("Use 'vsplay devices' to see available devices"),
            PlayerError::Decode(DecodeError::UnsupportedFormat { .. }) => Some("Only MPEG audio Layer III streams are supported"),
            PlayerError::Session(SessionError::StartTimeout { .. }) => Some("Raise start_timeout_ms with 'vsplay config path'"),
            PlayerError::File(_) => Some("Alert clips live in the configured alert_directory"),
            _ => None,
        }
    }

    pub fn format_state(state: PlayerState, priming: bool) -> String {
        match state {
            PlayerState::Play if priming => "▶ priming".to_string(),
            PlayerState::Play => "▶ playing".to_string(),
            PlayerState::Start => "… starting".to_string(),
            PlayerState::Pause => "⏸ pausing".to_string(),
            PlayerState::Finish => "■ finishing".to_string(),
            PlayerState::Idle => "■ idle".to_string(),
        }
    }

    /// Format byte counts in human-readable units
    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }

    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if !current_line.is_empty() && current_line.len() + word.len() + 1 > width {
                lines.push(std::mem::take(&mut current_line));
            }
            if !current_line.is_empty() {
                current_line.push(' ');
            }
            current_line.push_str(word);
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }
}
