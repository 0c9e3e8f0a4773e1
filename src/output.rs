//! Terminal rendering for the playback status line and notices.

use crate::notice::{Notice, NoticeLevel};
use crate::playback::{PlaybackState, PlaybackStatus};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Shown in place of the duration until the stream is finalized.
const UNKNOWN_TIME: &str = "--:--";

/// Key bindings listed once when interactive playback starts.
pub const CONTROLS_HINT: &str =
    "[space] play/pause  [r] rewind  [+/-] speed  [d] save  [x] dismiss  [q] quit";

/// Clear the current terminal line (replaces the status line)
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// `m:ss`, or `h:mm:ss` past an hour. Negative and non-finite input reads as zero.
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn state_icon(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "■",
        PlaybackState::Buffering => "…",
        PlaybackState::Playing => "▶",
        PlaybackState::Paused => "⏸",
        PlaybackState::Completed => "✓",
    }
}

fn state_color(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Playing | PlaybackState::Completed => GREEN,
        PlaybackState::Buffering | PlaybackState::Paused => YELLOW,
        PlaybackState::Idle => DIM,
    }
}

/// Plain-text status line: icon, elapsed / duration, speed, buffering marker.
pub fn format_status(status: &PlaybackStatus) -> String {
    let duration = status
        .duration_secs
        .map(format_time)
        .unwrap_or_else(|| UNKNOWN_TIME.to_string());
    let mut line = format!(
        "{} {} / {}  {:.1}x",
        state_icon(status.state),
        format_time(status.elapsed_secs),
        duration,
        status.speed
    );
    if status.state == PlaybackState::Buffering {
        line.push_str(&format!("  buffering ({} chunks)", status.buffered_chunks));
    } else if status.buffering {
        line.push_str("  streaming");
    }
    line
}

/// Redraw the status line in place.
pub fn render_status(status: &PlaybackStatus) {
    let color = state_color(status.state);
    clear_line();
    eprint!("{color}{}{RESET}", format_status(status));
}

/// Print a notice on its own line, keeping the status line below it.
pub fn render_notice(notice: &Notice) {
    clear_line();
    match notice.level {
        NoticeLevel::Error => eprintln!("{RED}✗ {}{RESET} {DIM}(x to dismiss){RESET}", notice.text),
        NoticeLevel::Info => eprintln!("{DIM}{}{RESET}", notice.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn status(state: PlaybackState) -> PlaybackStatus {
        PlaybackStatus {
            state,
            buffering: false,
            elapsed_secs: 0.0,
            duration_secs: None,
            speed: 1.0,
            can_rewind: false,
            can_download: false,
            buffered_chunks: 0,
            mode: None,
        }
    }

    #[test]
    fn format_time_minutes_and_hours() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(5.9), "0:05");
        assert_eq!(format_time(75.0), "1:15");
        assert_eq!(format_time(3725.0), "1:02:05");
    }

    #[test]
    fn format_time_rejects_nonsense() {
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(f64::INFINITY), "0:00");
    }

    #[test]
    fn duration_unknown_until_finalized() {
        let mut s = status(PlaybackState::Playing);
        s.elapsed_secs = 12.0;
        s.buffering = true;
        assert_eq!(format_status(&s), "▶ 0:12 / --:--  1.0x  streaming");

        s.buffering = false;
        s.duration_secs = Some(63.0);
        assert_eq!(format_status(&s), "▶ 0:12 / 1:03  1.0x");
    }

    #[test]
    fn buffering_shows_chunk_count() {
        let mut s = status(PlaybackState::Buffering);
        s.buffering = true;
        s.buffered_chunks = 2;
        s.speed = 1.5;
        assert_eq!(format_status(&s), "… 0:00 / --:--  1.5x  buffering (2 chunks)");
    }

    #[test]
    fn every_state_has_distinct_icon() {
        let states = [
            PlaybackState::Idle,
            PlaybackState::Buffering,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Completed,
        ];
        let icons: std::collections::HashSet<_> = states.iter().map(|s| state_icon(*s)).collect();
        assert_eq!(icons.len(), states.len());
    }

    #[test]
    fn test_render_doesnt_panic() {
        render_status(&status(PlaybackState::Paused));
        render_notice(&Notice::info("Saved", Instant::now()));
        render_notice(&Notice::error("Invalid API key", Instant::now()));
        clear_line();
    }
}
