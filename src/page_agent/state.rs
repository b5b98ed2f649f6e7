//! Page agent core
//!
//! Holds the authoritative toggle state and active shortcut for one page
//! instance. Everything here is synchronous; the runner feeds it one input at
//! a time.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::{EmptyShortcutPolicy, PageConfig};
use crate::host::{PageDocument, RuntimePort};
use crate::protocol::{PageCommand, PageReply, RuntimeMessage};
use crate::shortcut::{KeyInput, ShortcutSpec};
use crate::site::SiteScope;

/// What happened to a keydown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Matched the shortcut; default action suppressed and the mode toggled
    Toggled { enabled: bool },
    /// Evaluated but did not match
    NoMatch,
    /// Page is outside the feature's scope; the key was never evaluated
    OutOfScope,
}

impl KeyOutcome {
    /// Whether the browser's default action for the key is suppressed
    pub fn default_prevented(&self) -> bool {
        matches!(self, KeyOutcome::Toggled { .. })
    }
}

/// Read-only view of an agent, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub instance_id: Uuid,
    pub location: String,
    pub enabled: bool,
    pub shortcut: ShortcutSpec,
}

/// Per-page-instance agent
pub struct PageAgent {
    instance_id: Uuid,
    location: String,
    scope: SiteScope,
    config: PageConfig,
    enabled: bool,
    shortcut: ShortcutSpec,
    document: Arc<dyn PageDocument>,
    runtime: Arc<dyn RuntimePort>,
}

impl PageAgent {
    /// A fresh agent: disabled, using the built-in shortcut
    pub fn new(
        location: impl Into<String>,
        scope: SiteScope,
        config: PageConfig,
        document: Arc<dyn PageDocument>,
        runtime: Arc<dyn RuntimePort>,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            location: location.into(),
            scope,
            config,
            enabled: false,
            shortcut: ShortcutSpec::default(),
            document,
            runtime,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn shortcut(&self) -> &ShortcutSpec {
        &self.shortcut
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            instance_id: self.instance_id,
            location: self.location.clone(),
            enabled: self.enabled,
            shortcut: self.shortcut.clone(),
        }
    }

    /// Whether the hosting extension still recognises this page
    pub fn context_valid(&self) -> bool {
        self.runtime.is_valid()
    }

    /// Dispatch one command
    pub fn handle(&mut self, command: PageCommand) -> PageReply {
        match command {
            PageCommand::Toggle => PageReply::State {
                enabled: self.toggle(),
            },
            PageCommand::GetState => PageReply::State {
                enabled: self.enabled,
            },
            PageCommand::UpdateShortcut { shortcut } => PageReply::Ack {
                success: self.update_shortcut(shortcut),
            },
        }
    }

    /// Flip the visual mode; a no-op outside watched pages. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        if !self.scope.is_watched_page(&self.location) {
            tracing::debug!("Toggle ignored outside a watched page: {}", self.location);
            return self.enabled;
        }

        self.enabled = !self.enabled;
        if self.enabled {
            self.document.add_class(&self.config.marker_class);
        } else {
            self.document.remove_class(&self.config.marker_class);
        }
        tracing::info!(
            "ZenView {} (page {})",
            if self.enabled { "on" } else { "off" },
            self.instance_id
        );

        self.notify(RuntimeMessage::ZenViewToggled {
            enabled: self.enabled,
        });
        self.enabled
    }

    /// Match a keydown against the active shortcut and toggle on match
    pub fn on_key_down(&mut self, input: &KeyInput) -> KeyOutcome {
        if !self.scope.is_watched_page(&self.location) {
            return KeyOutcome::OutOfScope;
        }
        if !self.shortcut.matches(input) {
            return KeyOutcome::NoMatch;
        }
        KeyOutcome::Toggled {
            enabled: self.toggle(),
        }
    }

    /// Replace the shortcut. Returns the acknowledgement to send back.
    fn update_shortcut(&mut self, shortcut: ShortcutSpec) -> bool {
        if !self.accepts(&shortcut) {
            tracing::debug!("Unusable shortcut update {:?} handled as no-op", shortcut);
            return match self.config.empty_shortcut_policy {
                EmptyShortcutPolicy::Ignore => true,
                EmptyShortcutPolicy::Reject => false,
            };
        }

        self.shortcut = shortcut.normalized();
        tracing::info!("Shortcut updated to {}", self.shortcut);
        true
    }

    /// Adopt the shortcut read from storage at startup, if usable
    pub fn adopt_stored_shortcut(&mut self, stored: Option<ShortcutSpec>) {
        match stored {
            Some(spec) if self.accepts(&spec) => {
                self.shortcut = spec.normalized();
                tracing::debug!("Adopted stored shortcut {}", self.shortcut);
            }
            Some(spec) => {
                tracing::debug!("Stored shortcut {:?} unusable, keeping default", spec);
            }
            None => {}
        }
    }

    fn accepts(&self, spec: &ShortcutSpec) -> bool {
        spec.has_key() && (!self.config.require_modifier || spec.has_modifier())
    }

    /// Fire-and-forget notification to the coordinator.
    /// The capability check happens right before use and is never cached.
    fn notify(&self, message: RuntimeMessage) {
        if !self.runtime.is_valid() {
            tracing::debug!("Extension context gone, dropping {:?}", message);
            return;
        }
        if let Err(e) = self.runtime.post(message) {
            tracing::debug!("Notification not delivered: {}", e);
        }
    }
}
