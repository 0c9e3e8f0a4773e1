//! Status-area notices.
//!
//! Info notices disappear on their own after a few seconds. Error notices
//! stay until the user dismisses them.

use crate::error::TtsError;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    shown_at: Instant,
}

impl Notice {
    pub fn info(text: impl Into<String>, now: Instant) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
            shown_at: now,
        }
    }

    pub fn error(text: impl Into<String>, now: Instant) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
            shown_at: now,
        }
    }

    /// Notice for `err`, or `None` for errors the user never sees.
    pub fn for_error(err: &TtsError, now: Instant) -> Option<Self> {
        err.is_actionable()
            .then(|| Self::error(err.user_message(), now))
    }

    pub fn requires_dismiss(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// Holds the one notice currently on screen.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    current: Option<Notice>,
    dismiss_after: Duration,
}

impl NoticeBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            current: None,
            dismiss_after,
        }
    }

    /// Show `notice`. An error on screen is not replaced by an info notice.
    pub fn show(&mut self, notice: Notice) {
        if let Some(current) = &self.current
            && current.requires_dismiss()
            && !notice.requires_dismiss()
        {
            return;
        }
        self.current = Some(notice);
    }

    pub fn dismiss(&mut self) -> bool {
        self.current.take().is_some()
    }

    /// Drop an expired info notice. Returns whether anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let expired = self.current.as_ref().is_some_and(|n| {
            !n.requires_dismiss() && now.duration_since(n.shown_at) >= self.dismiss_after
        });
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::defaults::NOTICE_DISMISS_MS))
    }
}
