//! Toolbar popup
//!
//! Shows the active tab's state and toggles it directly, bypassing the
//! coordinator. An unreachable page agent is reported as "Refresh page"
//! rather than retried.

use std::sync::Arc;

use crate::host::TabHost;
use crate::protocol::{PageCommand, PageReply, SendError, TabId};
use crate::shortcut::Platform;
use crate::site::SiteScope;
use crate::storage::{self, SettingsStore};

/// Status line shown in the popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopupStatus {
    #[default]
    Loading,
    NotOnSite,
    NotWatchPage,
    Ready,
    On,
    Off,
    NeedsRefresh,
}

impl PopupStatus {
    pub fn text(&self) -> &'static str {
        match self {
            PopupStatus::Loading => "",
            PopupStatus::NotOnSite => "Not on YouTube",
            PopupStatus::NotWatchPage => "Go to a video page",
            PopupStatus::Ready => "Ready",
            PopupStatus::On => "ZenView ON",
            PopupStatus::Off => "ZenView OFF",
            PopupStatus::NeedsRefresh => "Refresh page",
        }
    }
}

/// Everything the popup renders
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PopupView {
    pub status: PopupStatus,
    /// Whether the toggle accepts clicks
    pub toggle_enabled: bool,
    /// Whether the toggle is drawn as active
    pub toggle_active: bool,
    /// "Press Ctrl+Shift+F to toggle"
    pub shortcut_hint: Option<String>,
}

pub struct Popup {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    scope: SiteScope,
    platform: Platform,
    tab: Option<TabId>,
    view: PopupView,
}

impl Popup {
    pub fn new(
        host: Arc<dyn TabHost>,
        store: Arc<dyn SettingsStore>,
        scope: SiteScope,
        platform: Platform,
    ) -> Self {
        Self {
            host,
            store,
            scope,
            platform,
            tab: None,
            view: PopupView::default(),
        }
    }

    pub fn view(&self) -> &PopupView {
        &self.view
    }

    /// Resolve the active tab and query its state
    pub async fn open(&mut self) -> &PopupView {
        self.view = PopupView::default();
        self.tab = None;

        let Some(tab) = self.host.active_tab().await else {
            self.view.status = PopupStatus::NotOnSite;
            return &self.view;
        };
        let url = tab.url.unwrap_or_default();

        if !self.scope.is_target_site(&url) {
            self.view.status = PopupStatus::NotOnSite;
            return &self.view;
        }
        if !self.scope.is_watched_page(&url) {
            self.view.status = PopupStatus::NotWatchPage;
            return &self.view;
        }

        self.tab = Some(tab.id);
        self.view.status = PopupStatus::Ready;
        self.view.toggle_enabled = true;

        let shortcut = storage::effective_shortcut(self.store.as_ref()).await;
        self.view.shortcut_hint = Some(format!(
            "Press {} to toggle",
            shortcut.combo_text(self.platform)
        ));

        let reply = self.host.send_to_tab(tab.id, PageCommand::GetState).await;
        self.apply(reply);
        &self.view
    }

    /// Toggle the active tab directly
    pub async fn click_toggle(&mut self) -> &PopupView {
        let Some(tab) = self.tab.filter(|_| self.view.toggle_enabled) else {
            return &self.view;
        };

        let reply = self.host.send_to_tab(tab, PageCommand::Toggle).await;
        self.apply(reply);
        &self.view
    }

    fn apply(&mut self, reply: Result<PageReply, SendError>) {
        match reply {
            Ok(reply) => {
                let enabled = reply.enabled().unwrap_or(false);
                self.view.toggle_active = enabled;
                self.view.status = if enabled {
                    PopupStatus::On
                } else {
                    PopupStatus::Off
                };
            }
            Err(e) => {
                tracing::debug!("Popup could not reach the page: {}", e);
                self.view.status = PopupStatus::NeedsRefresh;
            }
        }
    }
}
