//! Diagnostic logging on stderr via `tracing-subscriber`.
//!
//! Independent of the status line: `-v` flags only change what the library
//! logs, never what the user-facing output shows.

use tracing_subscriber::EnvFilter;

/// Filter directive for the given verbosity.
///
/// `quiet` wins over `verbosity`.
pub fn filter_directive(verbosity: u8, quiet: bool) -> String {
    let level = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    format!("whisper_tts={level}")
}

/// Install the global subscriber. `RUST_LOG` overrides the flags.
///
/// Calling it again is harmless; only the first call installs.
pub fn init(verbosity: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity, quiet)));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_warn() {
        assert_eq!(filter_directive(0, false), "whisper_tts=warn");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(filter_directive(1, false), "whisper_tts=info");
        assert_eq!(filter_directive(2, false), "whisper_tts=debug");
        assert_eq!(filter_directive(7, false), "whisper_tts=trace");
    }

    #[test]
    fn test_quiet_wins() {
        assert_eq!(filter_directive(3, true), "whisper_tts=error");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(0, false);
        init(2, false);
    }
}
