//! Cross-context message catalogue
//!
//! Every message exchanged between the coordinator, page agents and UI
//! surfaces is a variant of a closed enum, so handlers are checked for
//! exhaustiveness instead of comparing action strings. The serde shapes keep
//! the `{ "action": ... }` wire form.
//!
//! | Message           | From → To                 | Reply              |
//! |-------------------|---------------------------|--------------------|
//! | toggle            | UI/Coordinator → Page     | `{enabled}`        |
//! | getState          | Coordinator/UI → Page     | `{enabled}`        |
//! | updateShortcut    | Coordinator → Page        | `{success}`        |
//! | zenViewToggled    | Page → Coordinator        | none               |
//! | broadcastShortcut | UI → Coordinator          | `{success}`        |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shortcut::ShortcutSpec;

/// Host-assigned tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loading status reported for a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    #[default]
    Loading,
    Complete,
}

/// Snapshot of a tab as the host reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub url: Option<String>,
    pub status: TabStatus,
    pub active: bool,
}

/// Commands addressed to a page agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageCommand {
    Toggle,
    GetState,
    UpdateShortcut { shortcut: ShortcutSpec },
}

impl PageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PageCommand::Toggle => "toggle",
            PageCommand::GetState => "getState",
            PageCommand::UpdateShortcut { .. } => "updateShortcut",
        }
    }
}

/// Replies produced by a page agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageReply {
    State { enabled: bool },
    Ack { success: bool },
}

impl PageReply {
    /// The toggle state carried by a `State` reply
    pub fn enabled(&self) -> Option<bool> {
        match self {
            PageReply::State { enabled } => Some(*enabled),
            PageReply::Ack { .. } => None,
        }
    }
}

/// Messages addressed to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuntimeMessage {
    /// Fire-and-forget notification from a page agent
    ZenViewToggled { enabled: bool },
    /// Request from a UI surface to push a shortcut to every target-site tab
    BroadcastShortcut { shortcut: ShortcutSpec },
}

/// Reply from the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeReply {
    pub success: bool,
}

/// Delivery failures. All of them mean "the other context is not there" and
/// are swallowed at the send site unless a UI surface reports them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Could not establish connection. Receiving end does not exist (tab {0})")]
    NoReceiver(TabId),

    #[error("No tab with id {0}")]
    UnknownTab(TabId),

    #[error("The message port closed before a response was received")]
    PortClosed,

    #[error("Extension context invalidated")]
    ContextInvalidated,
}
