//! Settings page
//!
//! Records, validates, persists and broadcasts the activation shortcut.

use chrono::{DateTime, Local};
use std::sync::Arc;

use super::recorder::{RecorderEvent, RecorderState, RecorderTransition, ShortcutRecorder};
use super::StatusMessage;
use crate::host::RuntimePort;
use crate::protocol::RuntimeMessage;
use crate::shortcut::{self, KeyInput, Platform, ShortcutSpec, ValidationError};
use crate::storage::{self, SettingsStore, StorageError};

/// Why a save did not happen
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("No shortcut recorded. Click to record one.")]
    NothingRecorded,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Error saving settings")]
    Storage(#[source] StorageError),
}

pub struct SettingsPage {
    store: Arc<dyn SettingsStore>,
    runtime: Arc<dyn RuntimePort>,
    platform: Platform,
    recorder: ShortcutRecorder,
    status: Option<StatusMessage>,
}

impl SettingsPage {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        runtime: Arc<dyn RuntimePort>,
        platform: Platform,
    ) -> Self {
        Self {
            store,
            runtime,
            platform,
            recorder: ShortcutRecorder::default(),
            status: None,
        }
    }

    /// Load the persisted shortcut (default when absent or unreadable)
    pub async fn load(&mut self) {
        let spec = storage::effective_shortcut(self.store.as_ref()).await;
        self.recorder.reset_to(spec);
    }

    pub fn recorder(&self) -> &ShortcutRecorder {
        &self.recorder
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.state() == RecorderState::Recording
    }

    /// Key badges for the recording field
    pub fn badges(&self) -> Vec<String> {
        self.recorder.display().key_badges(self.platform)
    }

    /// Latest status message, if still visible
    pub fn status(&self, now: DateTime<Local>) -> Option<&StatusMessage> {
        self.status.as_ref().filter(|s| s.is_visible(now))
    }

    pub fn start_recording(&mut self) -> RecorderTransition {
        self.recorder.process_event(RecorderEvent::Start)
    }

    pub fn key_down(&mut self, input: KeyInput) -> RecorderTransition {
        self.recorder.process_event(RecorderEvent::KeyDown(input))
    }

    pub fn key_up(&mut self) -> RecorderTransition {
        self.recorder.process_event(RecorderEvent::KeyUp)
    }

    pub fn blur(&mut self) -> RecorderTransition {
        self.recorder.process_event(RecorderEvent::Blur)
    }

    pub fn cancel(&mut self) -> RecorderTransition {
        self.recorder.process_event(RecorderEvent::Cancel)
    }

    /// Validate, persist and broadcast the pending shortcut
    pub async fn save(&mut self) -> Result<ShortcutSpec, SaveError> {
        let pending = self.recorder.pending().clone();

        if !pending.has_key() {
            return Err(self.fail(SaveError::NothingRecorded));
        }
        if let Err(e) = shortcut::validate(&pending) {
            return Err(self.fail(e.into()));
        }

        if let Err(e) = storage::save_custom_shortcut(self.store.as_ref(), &pending).await {
            tracing::warn!("Failed to persist shortcut: {}", e);
            return Err(self.fail(SaveError::Storage(e)));
        }

        self.recorder.commit();
        self.broadcast(&pending).await;
        self.status = Some(StatusMessage::success("Shortcut saved!"));
        tracing::info!("Shortcut saved: {}", pending);
        Ok(pending)
    }

    /// Restore and persist the built-in shortcut
    pub async fn reset_to_default(&mut self) -> Result<ShortcutSpec, SaveError> {
        let default = ShortcutSpec::default();
        self.recorder.reset_to(default.clone());

        if let Err(e) = storage::save_custom_shortcut(self.store.as_ref(), &default).await {
            tracing::warn!("Failed to persist default shortcut: {}", e);
            return Err(self.fail(SaveError::Storage(e)));
        }

        self.broadcast(&default).await;
        self.status = Some(StatusMessage::success(format!(
            "Reset to {}",
            default.combo_text(self.platform)
        )));
        Ok(default)
    }

    /// Ask the coordinator to push the shortcut to open pages; failures are
    /// ignored, pages will pick it up from storage on their next load
    async fn broadcast(&self, spec: &ShortcutSpec) {
        if !self.runtime.is_valid() {
            return;
        }
        let message = RuntimeMessage::BroadcastShortcut {
            shortcut: spec.clone(),
        };
        if let Err(e) = self.runtime.request(message).await {
            tracing::debug!("Broadcast request not delivered: {}", e);
        }
    }

    fn fail(&mut self, error: SaveError) -> SaveError {
        self.status = Some(StatusMessage::error(error.to_string()));
        error
    }
}
