//! UI surfaces
//!
//! Transient panels: the toolbar popup and the settings page. Both read the
//! shared settings store directly; the popup talks straight to the active
//! tab's page agent, the settings page asks the coordinator to broadcast.

pub mod popup;
pub mod recorder;
pub mod settings;

pub use popup::{Popup, PopupStatus, PopupView};
pub use recorder::{RecorderEvent, RecorderState, RecorderTransition, ShortcutRecorder};
pub use settings::{SaveError, SettingsPage};

use chrono::{DateTime, Duration, Local};

/// How long a status message stays on screen
const STATUS_VISIBLE_MS: i64 = 3000;

/// Transient status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub shown_at: DateTime<Local>,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
            shown_at: Local::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
            shown_at: Local::now(),
        }
    }

    pub fn is_visible(&self, now: DateTime<Local>) -> bool {
        now.signed_duration_since(self.shown_at) < Duration::milliseconds(STATUS_VISIBLE_MS)
    }
}
