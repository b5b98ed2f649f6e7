//! Coordinator: the process-wide relay
//!
//! Owns no toggle state. It relays the global accelerator and shortcut
//! broadcasts to page agents, keeps the per-tab badge in step with what the
//! agents report, and re-pushes the stored shortcut to freshly loaded pages.
//!
//! Every outbound send is fallible and swallowed here: a tab without a live
//! agent must never stop the relay from serving other tabs.
//!
//! Events are handled one at a time in arrival order. A handler finishes,
//! including its sends to page agents, before the next event is looked at.
//! A broadcast is answered as soon as it is accepted, then delivered.
//! Agents only ever post to the coordinator, so awaiting their replies from
//! the loop cannot deadlock.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::Config;
use crate::host::{BadgeRenderer, TabHost};
use crate::indicator::{IndicatorBoard, IndicatorState};
use crate::protocol::{
    PageCommand, PageReply, RuntimeMessage, RuntimeReply, SendError, TabId, TabStatus,
};
use crate::shortcut::{ShortcutSpec, ValidationError};
use crate::site::SiteScope;
use crate::storage::{self, SettingsStore};

/// Host events delivered to the coordinator
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A global accelerator fired
    Command(String),
    /// A runtime message from a page agent (`sender` set) or UI surface
    Runtime {
        sender: Option<TabId>,
        message: RuntimeMessage,
        reply: Option<oneshot::Sender<RuntimeReply>>,
    },
    /// A tab's loading status or location changed
    TabUpdated {
        tab: TabId,
        status: TabStatus,
        url: Option<String>,
    },
    /// Focus moved to another tab
    TabActivated { tab: TabId },
    /// A tab was closed
    TabRemoved { tab: TabId },
}

/// Outcome of one broadcast, per tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<TabId>,
    pub failed: Vec<TabId>,
}

/// Relay handlers
#[derive(Clone)]
pub struct Coordinator {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    indicators: Arc<IndicatorBoard>,
    scope: SiteScope,
    accelerator_command: String,
}

impl Coordinator {
    pub fn new(
        config: &Config,
        host: Arc<dyn TabHost>,
        store: Arc<dyn SettingsStore>,
        renderer: Arc<dyn BadgeRenderer>,
    ) -> Self {
        Self {
            host,
            store,
            indicators: Arc::new(IndicatorBoard::new(config.indicator.clone(), renderer)),
            scope: SiteScope::from_config(&config.site),
            accelerator_command: config.accelerator.command.clone(),
        }
    }

    /// Last indicator shown for a tab since this coordinator started
    pub fn indicator(&self, tab: TabId) -> Option<IndicatorState> {
        self.indicators.get(tab)
    }

    /// Global accelerator: toggle the focused tab if it is on the target site
    pub async fn on_command(&self, command: &str) {
        if command != self.accelerator_command {
            tracing::debug!("Ignoring unbound command '{}'", command);
            return;
        }

        let Some(tab) = self.host.active_tab().await else {
            return;
        };
        let on_site = tab
            .url
            .as_deref()
            .is_some_and(|url| self.scope.is_target_site(url));
        if !on_site {
            return;
        }

        if let Err(e) = self.host.send_to_tab(tab.id, PageCommand::Toggle).await {
            tracing::debug!("Accelerator toggle not delivered to tab {}: {}", tab.id, e);
        }
    }

    /// Push model: a page reported its new state
    pub fn on_toggled(&self, sender: Option<TabId>, enabled: bool) {
        match sender {
            Some(tab) => self.indicators.show(tab, enabled),
            None => tracing::debug!("zenViewToggled without a sender tab ignored"),
        }
    }

    /// Send a shortcut to every target-site tab. Each tab is delivered to
    /// independently; failures are recorded, never propagated.
    ///
    /// A shortcut without a key is never relayed.
    pub async fn broadcast_shortcut(
        &self,
        shortcut: ShortcutSpec,
    ) -> Result<BroadcastReport, ValidationError> {
        if !shortcut.has_key() {
            tracing::debug!("Dropping broadcast of a shortcut without a key");
            return Err(ValidationError::MissingKey);
        }

        let tabs: Vec<TabId> = self
            .host
            .tabs()
            .await
            .into_iter()
            .filter(|tab| {
                tab.url
                    .as_deref()
                    .is_some_and(|url| self.scope.is_target_site(url))
            })
            .map(|tab| tab.id)
            .collect();

        let mut sends = JoinSet::new();
        for tab in tabs {
            let host = self.host.clone();
            let command = PageCommand::UpdateShortcut {
                shortcut: shortcut.clone(),
            };
            sends.spawn(async move { (tab, host.send_to_tab(tab, command).await) });
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((tab, Ok(_))) => report.delivered.push(tab),
                Ok((tab, Err(e))) => {
                    tracing::debug!("Shortcut not delivered to tab {}: {}", tab, e);
                    report.failed.push(tab);
                }
                Err(e) => tracing::warn!("Broadcast send task failed: {}", e),
            }
        }
        report.delivered.sort();
        report.failed.sort();

        tracing::info!(
            "Broadcast {} to {} tab(s), {} without a live page",
            shortcut,
            report.delivered.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// A tab finished loading: reset its badge and re-push the stored shortcut
    /// so the new page agent converges even if its own read lost the race.
    pub async fn on_tab_updated(&self, tab: TabId, status: TabStatus, url: Option<&str>) {
        if status != TabStatus::Complete {
            return;
        }
        if !url.is_some_and(|url| self.scope.is_target_site(url)) {
            return;
        }

        self.indicators.clear(tab);

        let shortcut = match storage::load_custom_shortcut(self.store.as_ref()).await {
            Ok(Some(shortcut)) => shortcut,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Could not read stored shortcut for tab {}: {}", tab, e);
                return;
            }
        };

        if let Err(e) = self
            .host
            .send_to_tab(tab, PageCommand::UpdateShortcut { shortcut })
            .await
        {
            tracing::debug!("Post-navigation shortcut push to tab {} failed: {}", tab, e);
        }
    }

    /// Focus moved: query the page on watched pages, otherwise show "off"
    pub async fn on_tab_activated(&self, tab: TabId) {
        let Some(info) = self.host.get_tab(tab).await else {
            return;
        };

        let watched = info
            .url
            .as_deref()
            .is_some_and(|url| self.scope.is_watched_page(url));
        if !watched {
            self.indicators.clear(tab);
            return;
        }

        match self.host.send_to_tab(tab, PageCommand::GetState).await {
            Ok(PageReply::State { enabled }) => self.indicators.show(tab, enabled),
            Ok(other) => {
                tracing::debug!("Unexpected getState reply from tab {}: {:?}", tab, other);
                self.indicators.clear(tab);
            }
            Err(e) => {
                tracing::debug!("Tab {} did not answer getState: {}", tab, e);
                self.indicators.clear(tab);
            }
        }
    }

    pub fn on_tab_removed(&self, tab: TabId) {
        self.indicators.forget(tab);
    }
}

// =============================================================================
// Event loop
// =============================================================================

/// Handle to a running coordinator
pub struct CoordinatorHandle {
    coordinator: Coordinator,
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a host event
    pub fn dispatch(&self, event: CoordinatorEvent) -> Result<(), SendError> {
        self.tx.send(event).map_err(|_| SendError::ContextInvalidated)
    }

    /// Fire-and-forget runtime message
    pub fn post(&self, sender: Option<TabId>, message: RuntimeMessage) -> Result<(), SendError> {
        self.dispatch(CoordinatorEvent::Runtime {
            sender,
            message,
            reply: None,
        })
    }

    /// Runtime message with a reply
    pub async fn request(
        &self,
        sender: Option<TabId>,
        message: RuntimeMessage,
    ) -> Result<RuntimeReply, SendError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(CoordinatorEvent::Runtime {
            sender,
            message,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| SendError::PortClosed)
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the coordinator's event loop
pub fn spawn_coordinator(coordinator: Coordinator) -> CoordinatorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_coordinator(coordinator.clone(), rx));
    tracing::info!("Coordinator started");
    CoordinatorHandle {
        coordinator,
        tx,
        task,
    }
}

async fn run_coordinator(
    coordinator: Coordinator,
    mut rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            CoordinatorEvent::Command(command) => coordinator.on_command(&command).await,
            CoordinatorEvent::Runtime {
                sender,
                message,
                reply,
            } => match message {
                RuntimeMessage::ZenViewToggled { enabled } => {
                    coordinator.on_toggled(sender, enabled);
                }
                RuntimeMessage::BroadcastShortcut { shortcut } => {
                    // Answered before the per-tab acknowledgements come in
                    if let Some(reply) = reply {
                        let _ = reply.send(RuntimeReply {
                            success: shortcut.has_key(),
                        });
                    }
                    // Outcome is logged by the broadcast itself
                    let _ = coordinator.broadcast_shortcut(shortcut).await;
                }
            },
            CoordinatorEvent::TabUpdated { tab, status, url } => {
                coordinator.on_tab_updated(tab, status, url.as_deref()).await;
            }
            CoordinatorEvent::TabActivated { tab } => coordinator.on_tab_activated(tab).await,
            CoordinatorEvent::TabRemoved { tab } => coordinator.on_tab_removed(tab),
        }
    }
    tracing::info!("Coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TabInfo;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Tabs with optional live agents that only record commands
    #[derive(Default)]
    struct FakeHost {
        tabs: Mutex<Vec<TabInfo>>,
        live: Mutex<HashMap<TabId, bool>>,
        sent: Mutex<Vec<(TabId, PageCommand)>>,
    }

    impl FakeHost {
        fn add(&self, id: u32, url: &str, active: bool, live: bool) {
            self.tabs.lock().push(TabInfo {
                id: TabId(id),
                url: Some(url.to_string()),
                status: TabStatus::Complete,
                active,
            });
            self.live.lock().insert(TabId(id), live);
        }
    }

    #[async_trait]
    impl TabHost for FakeHost {
        async fn active_tab(&self) -> Option<TabInfo> {
            self.tabs.lock().iter().find(|t| t.active).cloned()
        }

        async fn get_tab(&self, id: TabId) -> Option<TabInfo> {
            self.tabs.lock().iter().find(|t| t.id == id).cloned()
        }

        async fn tabs(&self) -> Vec<TabInfo> {
            self.tabs.lock().clone()
        }

        async fn send_to_tab(
            &self,
            id: TabId,
            command: PageCommand,
        ) -> Result<PageReply, SendError> {
            if !self.live.lock().get(&id).copied().unwrap_or(false) {
                return Err(SendError::NoReceiver(id));
            }
            let reply = match &command {
                PageCommand::Toggle | PageCommand::GetState => PageReply::State { enabled: true },
                PageCommand::UpdateShortcut { .. } => PageReply::Ack { success: true },
            };
            self.sent.lock().push((id, command));
            Ok(reply)
        }
    }

    #[derive(Default)]
    struct NullRenderer;

    impl BadgeRenderer for NullRenderer {
        fn set_badge_text(&self, _tab: TabId, _text: &str) {}
        fn set_badge_color(&self, _tab: TabId, _color: &str) {}
    }

    fn coordinator(host: Arc<FakeHost>, store: Arc<MemoryStore>) -> Coordinator {
        Coordinator::new(&Config::default(), host, store, Arc::new(NullRenderer))
    }

    const WATCH: &str = "https://www.youtube.com/watch?v=1";

    #[tokio::test]
    async fn test_accelerator_toggles_active_target_tab() {
        let host = Arc::new(FakeHost::default());
        host.add(1, "https://example.com/", false, true);
        host.add(2, WATCH, true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        c.on_command("toggle-fullscreen").await;
        assert_eq!(*host.sent.lock(), vec![(TabId(2), PageCommand::Toggle)]);
    }

    #[tokio::test]
    async fn test_accelerator_ignored_off_site_and_unbound() {
        let host = Arc::new(FakeHost::default());
        host.add(1, "https://example.com/", true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        c.on_command("toggle-fullscreen").await;
        c.on_command("something-else").await;
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_live_target_tabs() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, false, true);
        host.add(2, "https://www.youtube.com/", false, false);
        host.add(3, "https://m.youtube.com/watch?v=2", false, true);
        host.add(4, "https://example.com/", false, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        let report = c
            .broadcast_shortcut(ShortcutSpec::new("G", false, false, true, false))
            .await
            .unwrap();
        assert_eq!(report.delivered, vec![TabId(1), TabId(3)]);
        assert_eq!(report.failed, vec![TabId(2)]);
    }

    #[tokio::test]
    async fn test_tab_updated_pushes_stored_shortcut() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let store = Arc::new(MemoryStore::new());
        let spec = ShortcutSpec::new("J", true, false, false, false);
        storage::save_custom_shortcut(store.as_ref(), &spec)
            .await
            .unwrap();
        let c = coordinator(host.clone(), store);

        c.on_tab_updated(TabId(1), TabStatus::Complete, Some(WATCH))
            .await;

        assert_eq!(
            *host.sent.lock(),
            vec![(TabId(1), PageCommand::UpdateShortcut { shortcut: spec })]
        );
        assert!(!c.indicator(TabId(1)).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_tab_updated_without_custom_shortcut_only_clears() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        c.on_tab_updated(TabId(1), TabStatus::Loading, Some(WATCH)).await;
        assert!(c.indicator(TabId(1)).is_none());

        c.on_tab_updated(TabId(1), TabStatus::Complete, Some(WATCH)).await;
        assert!(host.sent.lock().is_empty());
        assert_eq!(c.indicator(TabId(1)).unwrap().text, "");
    }

    #[tokio::test]
    async fn test_tab_updated_storage_failure_is_swallowed() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let store = Arc::new(MemoryStore::new());
        store.set_fail_reads(true);
        let c = coordinator(host.clone(), store);

        c.on_tab_updated(TabId(1), TabStatus::Complete, Some(WATCH)).await;
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_activation_queries_watched_page() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        c.on_tab_activated(TabId(1)).await;
        assert_eq!(c.indicator(TabId(1)).unwrap().text, "ON");
    }

    #[tokio::test]
    async fn test_activation_failure_shows_off() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, false);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));
        c.on_toggled(Some(TabId(1)), true);

        c.on_tab_activated(TabId(1)).await;
        assert!(!c.indicator(TabId(1)).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_activation_off_watch_page_clears_without_query() {
        let host = Arc::new(FakeHost::default());
        host.add(1, "https://www.youtube.com/", true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        c.on_tab_activated(TabId(1)).await;
        assert!(host.sent.lock().is_empty());
        assert!(!c.indicator(TabId(1)).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_broadcast_without_key_is_dropped() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let c = coordinator(host.clone(), Arc::new(MemoryStore::new()));

        assert!(matches!(
            c.broadcast_shortcut(ShortcutSpec::empty()).await,
            Err(ValidationError::MissingKey)
        ));
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_event_loop_replies_to_broadcast() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, false);
        let handle = spawn_coordinator(coordinator(host, Arc::new(MemoryStore::new())));

        let reply = handle
            .request(
                None,
                RuntimeMessage::BroadcastShortcut {
                    shortcut: ShortcutSpec::default(),
                },
            )
            .await
            .unwrap();
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_event_loop_rejects_broadcast_without_key() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let handle = spawn_coordinator(coordinator(host.clone(), Arc::new(MemoryStore::new())));

        let reply = handle
            .request(
                None,
                RuntimeMessage::BroadcastShortcut {
                    shortcut: ShortcutSpec::empty(),
                },
            )
            .await
            .unwrap();
        assert!(!reply.success);
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_event_loop_delivers_broadcasts_in_order() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let handle = spawn_coordinator(coordinator(host.clone(), Arc::new(MemoryStore::new())));

        let first = ShortcutSpec::new("A", true, false, false, false);
        let second = ShortcutSpec::new("B", true, false, false, false);
        for shortcut in [first.clone(), second.clone()] {
            handle
                .post(None, RuntimeMessage::BroadcastShortcut { shortcut })
                .unwrap();
        }
        // Answered only once both broadcasts above have been delivered
        let reply = handle
            .request(
                None,
                RuntimeMessage::BroadcastShortcut {
                    shortcut: ShortcutSpec::empty(),
                },
            )
            .await
            .unwrap();
        assert!(!reply.success);

        let sent: Vec<ShortcutSpec> = host
            .sent
            .lock()
            .iter()
            .filter_map(|(_, command)| match command {
                PageCommand::UpdateShortcut { shortcut } => Some(shortcut.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![first, second]);
    }

    #[tokio::test]
    async fn test_event_loop_clears_before_later_toggle() {
        let host = Arc::new(FakeHost::default());
        host.add(1, WATCH, true, true);
        let store = Arc::new(MemoryStore::new());
        storage::save_custom_shortcut(
            store.as_ref(),
            &ShortcutSpec::new("J", true, false, false, false),
        )
        .await
        .unwrap();
        let handle = spawn_coordinator(coordinator(host, store));

        handle
            .dispatch(CoordinatorEvent::TabUpdated {
                tab: TabId(1),
                status: TabStatus::Complete,
                url: Some(WATCH.to_string()),
            })
            .unwrap();
        handle
            .post(Some(TabId(1)), RuntimeMessage::ZenViewToggled { enabled: true })
            .unwrap();
        handle
            .request(
                None,
                RuntimeMessage::BroadcastShortcut {
                    shortcut: ShortcutSpec::default(),
                },
            )
            .await
            .unwrap();

        assert_eq!(handle.coordinator().indicator(TabId(1)).unwrap().text, "ON");
    }

    #[tokio::test]
    async fn test_event_loop_applies_toggled_notification() {
        let host = Arc::new(FakeHost::default());
        let handle = spawn_coordinator(coordinator(host, Arc::new(MemoryStore::new())));

        handle
            .post(Some(TabId(7)), RuntimeMessage::ZenViewToggled { enabled: true })
            .unwrap();
        // A request behind the notification proves it has been handled
        handle
            .request(
                None,
                RuntimeMessage::BroadcastShortcut {
                    shortcut: ShortcutSpec::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(handle.coordinator().indicator(TabId(7)).unwrap().text, "ON");
    }
}
