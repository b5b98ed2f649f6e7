//! Host collaborator interfaces
//!
//! The browser host provides tab lookup and delivery, the per-tab badge, the
//! runtime channel into the coordinator, and the page document. Each role
//! only sees the traits it needs, so roles can be driven by the in-process
//! [`bus`](crate::bus) or by test doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::protocol::{PageCommand, PageReply, RuntimeMessage, RuntimeReply, SendError, TabId, TabInfo};

/// Tab lookup and tab-addressed delivery
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Active tab in the focused window
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Look up one tab
    async fn get_tab(&self, id: TabId) -> Option<TabInfo>;

    /// Every open tab
    async fn tabs(&self) -> Vec<TabInfo>;

    /// Deliver a command to the page agent living in a tab
    async fn send_to_tab(&self, id: TabId, command: PageCommand) -> Result<PageReply, SendError>;
}

/// Per-tab badge on the extension icon
pub trait BadgeRenderer: Send + Sync {
    fn set_badge_text(&self, tab: TabId, text: &str);
    fn set_badge_color(&self, tab: TabId, color: &str);
}

/// Channel from a page agent or UI surface into the coordinator
#[async_trait]
pub trait RuntimePort: Send + Sync {
    /// Whether the hosting extension still recognises this context.
    /// Must be evaluated right before every use; it can flip at any time.
    fn is_valid(&self) -> bool;

    /// Fire-and-forget delivery
    fn post(&self, message: RuntimeMessage) -> Result<(), SendError>;

    /// Delivery with a reply
    async fn request(&self, message: RuntimeMessage) -> Result<RuntimeReply, SendError>;
}

/// The page body the visual-mode marker is applied to
pub trait PageDocument: Send + Sync {
    fn add_class(&self, class: &str);
    fn remove_class(&self, class: &str);
    fn has_class(&self, class: &str) -> bool;
}

/// Class list of a page body
#[derive(Debug, Default)]
pub struct BodyClassList {
    classes: Mutex<BTreeSet<String>>,
}

impl BodyClassList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.lock().iter().cloned().collect()
    }
}

impl PageDocument for BodyClassList {
    fn add_class(&self, class: &str) {
        self.classes.lock().insert(class.to_string());
    }

    fn remove_class(&self, class: &str) {
        self.classes.lock().remove(class);
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.lock().contains(class)
    }
}
