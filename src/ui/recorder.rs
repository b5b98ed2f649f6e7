//! Shortcut recording state machine
//!
//! ```text
//!          start                     non-modifier key
//! ┌──────┐ ─────► ┌───────────┐ ─────────────────────► ┌──────┐
//! │ IDLE │        │ RECORDING │                        │ IDLE │ (pending = captured)
//! └──────┘ ◄───── └───────────┘                        └──────┘
//!      blur/cancel    │   ▲
//!   (pending reverts) └───┘ modifier key (preview only)
//! ```

use crate::shortcut::{KeyInput, ShortcutSpec};

/// Key that abandons a recording
pub const CANCEL_KEY: &str = "Escape";

/// Recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
}

/// Inputs from the recording field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Field clicked or focused
    Start,
    KeyDown(KeyInput),
    KeyUp,
    /// Field lost focus
    Blur,
    /// Cancel key pressed
    Cancel,
}

/// What an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderTransition {
    Started,
    /// Only modifiers held so far; preview updated
    Previewed,
    /// A full combination was captured into the pending spec
    Captured(ShortcutSpec),
    /// Recording abandoned; pending spec back to the committed one
    Reverted,
    /// Event not applicable in the current state
    Unchanged,
}

/// Recording field model
#[derive(Debug, Clone)]
pub struct ShortcutRecorder {
    state: RecorderState,
    committed: ShortcutSpec,
    pending: ShortcutSpec,
    display: ShortcutSpec,
}

impl Default for ShortcutRecorder {
    fn default() -> Self {
        Self::new(ShortcutSpec::default())
    }
}

impl ShortcutRecorder {
    pub fn new(committed: ShortcutSpec) -> Self {
        Self {
            state: RecorderState::Idle,
            pending: committed.clone(),
            display: committed.clone(),
            committed,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Last saved spec
    pub fn committed(&self) -> &ShortcutSpec {
        &self.committed
    }

    /// Spec that a save would persist
    pub fn pending(&self) -> &ShortcutSpec {
        &self.pending
    }

    /// Spec currently rendered in the field
    pub fn display(&self) -> &ShortcutSpec {
        &self.display
    }

    /// Mark the pending spec as saved
    pub fn commit(&mut self) {
        self.committed = self.pending.clone();
    }

    /// Replace everything with a known spec and stop recording
    pub fn reset_to(&mut self, spec: ShortcutSpec) {
        self.state = RecorderState::Idle;
        self.pending = spec.clone();
        self.display = spec.clone();
        self.committed = spec;
    }

    pub fn process_event(&mut self, event: RecorderEvent) -> RecorderTransition {
        match (self.state, event) {
            (RecorderState::Idle, RecorderEvent::Start) => {
                self.state = RecorderState::Recording;
                self.pending = ShortcutSpec::empty();
                RecorderTransition::Started
            }

            (RecorderState::Recording, RecorderEvent::KeyDown(input)) if input.key == CANCEL_KEY => {
                self.revert()
            }
            (RecorderState::Recording, RecorderEvent::KeyDown(input)) if input.is_modifier() => {
                self.display = ShortcutSpec {
                    key: String::new(),
                    ctrl: input.ctrl,
                    shift: input.shift,
                    alt: input.alt,
                    meta: input.meta,
                };
                RecorderTransition::Previewed
            }
            (RecorderState::Recording, RecorderEvent::KeyDown(input)) => {
                let captured =
                    ShortcutSpec::new(&input.key, input.ctrl, input.shift, input.alt, input.meta);
                self.pending = captured.clone();
                self.display = captured.clone();
                self.state = RecorderState::Idle;
                tracing::debug!("Captured shortcut {}", captured);
                RecorderTransition::Captured(captured)
            }

            (RecorderState::Recording, RecorderEvent::KeyUp) => {
                if !self.pending.has_key() {
                    self.display = self.committed.clone();
                }
                RecorderTransition::Unchanged
            }

            (RecorderState::Recording, RecorderEvent::Blur)
            | (RecorderState::Recording, RecorderEvent::Cancel) => self.revert(),

            (_, _) => RecorderTransition::Unchanged,
        }
    }

    fn revert(&mut self) -> RecorderTransition {
        self.state = RecorderState::Idle;
        self.pending = self.committed.clone();
        self.display = self.committed.clone();
        RecorderTransition::Reverted
    }
}
