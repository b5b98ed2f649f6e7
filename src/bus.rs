//! In-process extension host
//!
//! Plays the browser's part: tabs with a location and loading status, a
//! badge per tab, tab-addressed delivery to page agents, and the runtime
//! channel into the coordinator. Reloading the extension bumps a generation
//! counter; every page agent and UI surface created before the reload is
//! orphaned and its runtime calls fail from then on.
//!
//! No lock is ever held across an await or across a call into an agent or
//! the coordinator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use crate::config::Config;
use crate::coordinator::{spawn_coordinator, Coordinator, CoordinatorEvent, CoordinatorHandle};
use crate::host::{BadgeRenderer, BodyClassList, RuntimePort, TabHost};
use crate::page_agent::{spawn_page_agent, AgentSnapshot, KeyOutcome, PageAgent, PageAgentHandle};
use crate::protocol::{
    PageCommand, PageReply, RuntimeMessage, RuntimeReply, SendError, TabId, TabInfo, TabStatus,
};
use crate::shortcut::{KeyInput, Platform};
use crate::site::SiteScope;
use crate::storage::SettingsStore;
use crate::ui::{Popup, SettingsPage};

/// What the extension icon shows for one tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

/// Badge per tab, as rendered
#[derive(Debug, Default)]
pub struct BadgeTable {
    badges: Mutex<HashMap<TabId, Badge>>,
}

impl BadgeTable {
    pub fn get(&self, tab: TabId) -> Option<Badge> {
        self.badges.lock().get(&tab).cloned()
    }

    fn forget(&self, tab: TabId) {
        self.badges.lock().remove(&tab);
    }

    fn clear(&self) {
        self.badges.lock().clear();
    }
}

impl BadgeRenderer for BadgeTable {
    fn set_badge_text(&self, tab: TabId, text: &str) {
        self.badges.lock().entry(tab).or_default().text = text.to_string();
    }

    fn set_badge_color(&self, tab: TabId, color: &str) {
        self.badges.lock().entry(tab).or_default().color = color.to_string();
    }
}

struct TabSlot {
    url: String,
    status: TabStatus,
    agent: Option<Arc<PageAgentHandle>>,
    /// Extension generation the agent was injected under
    agent_generation: u64,
    body: Arc<BodyClassList>,
}

impl TabSlot {
    fn blank() -> Self {
        Self {
            url: String::new(),
            status: TabStatus::Loading,
            agent: None,
            agent_generation: 0,
            body: Arc::new(BodyClassList::new()),
        }
    }

    fn info(&self, id: TabId, active: bool) -> TabInfo {
        TabInfo {
            id,
            url: Some(self.url.clone()).filter(|url| !url.is_empty()),
            status: self.status,
            active,
        }
    }
}

struct BusState {
    next_tab: u32,
    active: Option<TabId>,
    generation: u64,
    tabs: BTreeMap<TabId, TabSlot>,
    coordinator: Option<Arc<CoordinatorHandle>>,
}

struct BusInner {
    config: Config,
    scope: SiteScope,
    store: Arc<dyn SettingsStore>,
    page_store: Arc<dyn SettingsStore>,
    badges: Arc<BadgeTable>,
    state: Mutex<BusState>,
}

impl BusInner {
    fn coordinator(&self) -> Option<Arc<CoordinatorHandle>> {
        self.state.lock().coordinator.clone()
    }

    fn dispatch(&self, event: CoordinatorEvent) {
        let Some(coordinator) = self.coordinator() else {
            return;
        };
        if let Err(e) = coordinator.dispatch(event) {
            tracing::debug!("Coordinator not listening: {}", e);
        }
    }

    fn agent(&self, tab: TabId) -> Result<Arc<PageAgentHandle>, SendError> {
        let state = self.state.lock();
        let slot = state.tabs.get(&tab).ok_or(SendError::UnknownTab(tab))?;
        match &slot.agent {
            Some(agent) => Ok(agent.clone()),
            None => Err(SendError::NoReceiver(tab)),
        }
    }
}

/// Browser-shaped host for one extension instance
pub struct ExtensionBus {
    inner: Arc<BusInner>,
}

impl ExtensionBus {
    /// Must be called from within a tokio runtime
    pub fn new(config: Config, store: Arc<dyn SettingsStore>) -> Self {
        Self::with_page_store(config, store.clone(), store)
    }

    /// Page agents read their startup shortcut through `page_store`;
    /// the coordinator and UI surfaces use `store`
    pub fn with_page_store(
        config: Config,
        store: Arc<dyn SettingsStore>,
        page_store: Arc<dyn SettingsStore>,
    ) -> Self {
        let inner = Arc::new(BusInner {
            scope: SiteScope::from_config(&config.site),
            config,
            store,
            page_store,
            badges: Arc::new(BadgeTable::default()),
            state: Mutex::new(BusState {
                next_tab: 1,
                active: None,
                generation: 0,
                tabs: BTreeMap::new(),
                coordinator: None,
            }),
        });
        let bus = Self { inner };
        bus.start_coordinator();
        bus
    }

    fn start_coordinator(&self) {
        let host: Arc<dyn TabHost> = Arc::new(HostView {
            inner: Arc::downgrade(&self.inner),
        });
        let coordinator = Coordinator::new(
            &self.inner.config,
            host,
            self.inner.store.clone(),
            self.inner.badges.clone(),
        );
        let handle = Arc::new(spawn_coordinator(coordinator));
        let previous = self.inner.state.lock().coordinator.replace(handle);
        if let Some(previous) = previous {
            previous.shutdown();
        }
    }

    /// Current extension generation
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn coordinator(&self) -> Option<Arc<CoordinatorHandle>> {
        self.inner.coordinator()
    }

    /// Open a tab at `url` and focus it
    pub fn open_tab(&self, url: &str) -> TabId {
        let tab = {
            let mut state = self.inner.state.lock();
            let tab = TabId(state.next_tab);
            state.next_tab += 1;
            state.tabs.insert(tab, TabSlot::blank());
            state.active = Some(tab);
            tab
        };
        tracing::info!("Opened tab {}", tab);

        self.load(tab, url);
        self.inner.dispatch(CoordinatorEvent::TabActivated { tab });
        tab
    }

    /// Load a new document in a tab. The previous page agent is torn down.
    pub fn navigate(&self, tab: TabId, url: &str) -> Result<(), SendError> {
        if !self.inner.state.lock().tabs.contains_key(&tab) {
            return Err(SendError::UnknownTab(tab));
        }
        self.load(tab, url);
        Ok(())
    }

    fn load(&self, tab: TabId, url: &str) {
        let (previous, body, generation) = {
            let mut state = self.inner.state.lock();
            let generation = state.generation;
            let Some(slot) = state.tabs.get_mut(&tab) else {
                return;
            };
            slot.url = url.to_string();
            slot.status = TabStatus::Loading;
            slot.body = Arc::new(BodyClassList::new());
            (slot.agent.take(), slot.body.clone(), generation)
        };
        if let Some(previous) = previous {
            tracing::debug!("Tearing down page {} in tab {}", previous.instance_id(), tab);
            previous.shutdown();
        }
        self.inner.dispatch(CoordinatorEvent::TabUpdated {
            tab,
            status: TabStatus::Loading,
            url: Some(url.to_string()),
        });

        // Page agents are injected into target-site documents only
        let agent = self.inner.scope.is_target_site(url).then(|| {
            let runtime = Arc::new(BusPort {
                inner: Arc::downgrade(&self.inner),
                tab: Some(tab),
                generation,
            });
            let agent = PageAgent::new(
                url,
                self.inner.scope.clone(),
                self.inner.config.page.clone(),
                body,
                runtime,
            );
            Arc::new(spawn_page_agent(agent, self.inner.page_store.clone()))
        });

        {
            let mut state = self.inner.state.lock();
            if let Some(slot) = state.tabs.get_mut(&tab) {
                slot.agent = agent;
                slot.agent_generation = generation;
                slot.status = TabStatus::Complete;
            }
        }
        self.inner.dispatch(CoordinatorEvent::TabUpdated {
            tab,
            status: TabStatus::Complete,
            url: Some(url.to_string()),
        });
    }

    /// Focus a tab
    pub fn activate(&self, tab: TabId) -> Result<(), SendError> {
        {
            let mut state = self.inner.state.lock();
            if !state.tabs.contains_key(&tab) {
                return Err(SendError::UnknownTab(tab));
            }
            state.active = Some(tab);
        }
        self.inner.dispatch(CoordinatorEvent::TabActivated { tab });
        Ok(())
    }

    /// Close a tab; focus falls back to the highest remaining tab id
    pub fn close(&self, tab: TabId) -> Result<(), SendError> {
        let slot = {
            let mut state = self.inner.state.lock();
            let slot = state.tabs.remove(&tab).ok_or(SendError::UnknownTab(tab))?;
            if state.active == Some(tab) {
                state.active = state.tabs.keys().next_back().copied();
            }
            slot
        };
        if let Some(agent) = &slot.agent {
            agent.shutdown();
        }
        self.inner.badges.forget(tab);
        self.inner.dispatch(CoordinatorEvent::TabRemoved { tab });
        tracing::info!("Closed tab {}", tab);
        Ok(())
    }

    /// Deliver a keydown to the page in `tab`
    pub async fn press_key(&self, tab: TabId, input: KeyInput) -> Result<KeyOutcome, SendError> {
        let agent = self.inner.agent(tab)?;
        agent.key_down(input).await
    }

    /// Send a page command to `tab` the way the coordinator does
    pub async fn send_to_tab(
        &self,
        tab: TabId,
        command: PageCommand,
    ) -> Result<PageReply, SendError> {
        self.host().send_to_tab(tab, command).await
    }

    /// Fire a global accelerator command
    pub fn fire_command(&self, command: &str) {
        self.inner
            .dispatch(CoordinatorEvent::Command(command.to_string()));
    }

    /// Fire the configured toggle accelerator
    pub fn fire_accelerator(&self) {
        self.fire_command(&self.inner.config.accelerator.command);
    }

    /// Reload the extension: a fresh coordinator replaces the old one and
    /// every existing page agent is orphaned.
    pub fn reload_extension(&self) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.generation
        };
        self.inner.badges.clear();
        self.start_coordinator();
        tracing::info!("Extension reloaded (generation {})", generation);
    }

    pub async fn agent_snapshot(&self, tab: TabId) -> Option<AgentSnapshot> {
        let agent = self.inner.agent(tab).ok()?;
        agent.snapshot().await.ok()
    }

    pub fn body_classes(&self, tab: TabId) -> Vec<String> {
        self.inner
            .state
            .lock()
            .tabs
            .get(&tab)
            .map(|slot| slot.body.classes())
            .unwrap_or_default()
    }

    pub fn badge(&self, tab: TabId) -> Option<Badge> {
        self.inner.badges.get(tab)
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.inner.state.lock().active
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        let state = self.inner.state.lock();
        state
            .tabs
            .iter()
            .map(|(id, slot)| slot.info(*id, state.active == Some(*id)))
            .collect()
    }

    /// Open the toolbar popup against the current generation
    pub fn popup(&self) -> Popup {
        Popup::new(
            self.host(),
            self.inner.store.clone(),
            self.inner.scope.clone(),
            Platform::current(),
        )
    }

    /// Open the settings page against the current generation
    pub fn settings_page(&self) -> SettingsPage {
        let runtime = Arc::new(BusPort {
            inner: Arc::downgrade(&self.inner),
            tab: None,
            generation: self.generation(),
        });
        SettingsPage::new(self.inner.store.clone(), runtime, Platform::current())
    }

    fn host(&self) -> Arc<dyn TabHost> {
        Arc::new(HostView {
            inner: Arc::downgrade(&self.inner),
        })
    }
}

/// Tab access for the coordinator and the popup
struct HostView {
    inner: Weak<BusInner>,
}

#[async_trait]
impl TabHost for HostView {
    async fn active_tab(&self) -> Option<TabInfo> {
        let inner = self.inner.upgrade()?;
        let state = inner.state.lock();
        let id = state.active?;
        state.tabs.get(&id).map(|slot| slot.info(id, true))
    }

    async fn get_tab(&self, id: TabId) -> Option<TabInfo> {
        let inner = self.inner.upgrade()?;
        let state = inner.state.lock();
        state
            .tabs
            .get(&id)
            .map(|slot| slot.info(id, state.active == Some(id)))
    }

    async fn tabs(&self) -> Vec<TabInfo> {
        let Some(inner) = self.inner.upgrade() else {
            return Vec::new();
        };
        let state = inner.state.lock();
        state
            .tabs
            .iter()
            .map(|(id, slot)| slot.info(*id, state.active == Some(*id)))
            .collect()
    }

    async fn send_to_tab(&self, id: TabId, command: PageCommand) -> Result<PageReply, SendError> {
        let inner = self.inner.upgrade().ok_or(SendError::ContextInvalidated)?;
        let agent = {
            let state = inner.state.lock();
            let slot = state.tabs.get(&id).ok_or(SendError::UnknownTab(id))?;
            match &slot.agent {
                // Agents injected before a reload no longer answer the extension
                Some(agent) if slot.agent_generation == state.generation => agent.clone(),
                _ => return Err(SendError::NoReceiver(id)),
            }
        };
        agent
            .send(command)
            .await
            .map_err(|_| SendError::NoReceiver(id))
    }
}

/// Runtime channel bound to the generation it was created under
struct BusPort {
    inner: Weak<BusInner>,
    tab: Option<TabId>,
    generation: u64,
}

impl BusPort {
    fn coordinator(&self) -> Result<Arc<CoordinatorHandle>, SendError> {
        let inner = self.inner.upgrade().ok_or(SendError::ContextInvalidated)?;
        let state = inner.state.lock();
        if state.generation != self.generation {
            return Err(SendError::ContextInvalidated);
        }
        state
            .coordinator
            .clone()
            .ok_or(SendError::ContextInvalidated)
    }
}

#[async_trait]
impl RuntimePort for BusPort {
    fn is_valid(&self) -> bool {
        self.coordinator().is_ok_and(|c| c.is_alive())
    }

    fn post(&self, message: RuntimeMessage) -> Result<(), SendError> {
        self.coordinator()?.post(self.tab, message)
    }

    async fn request(&self, message: RuntimeMessage) -> Result<RuntimeReply, SendError> {
        let coordinator = self.coordinator()?;
        coordinator.request(self.tab, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    const WATCH: &str = "https://www.youtube.com/watch?v=abc";

    fn bus() -> ExtensionBus {
        ExtensionBus::new(Config::default(), Arc::new(MemoryStore::new()))
    }

    async fn wait_for_badge(bus: &ExtensionBus, tab: TabId, text: &str) -> bool {
        for _ in 0..100 {
            if bus.badge(tab).is_some_and(|b| b.text == text) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_agents_only_on_target_site() {
        let bus = bus();
        let video = bus.open_tab(WATCH);
        let other = bus.open_tab("https://example.com/");

        assert!(bus.agent_snapshot(video).await.is_some());
        assert!(bus.agent_snapshot(other).await.is_none());
        assert_eq!(
            bus.press_key(other, KeyInput::new("f", true, true, false, false))
                .await,
            Err(SendError::NoReceiver(other))
        );
    }

    #[tokio::test]
    async fn test_open_tab_focuses_it() {
        let bus = bus();
        let first = bus.open_tab(WATCH);
        let second = bus.open_tab("https://www.youtube.com/");
        assert_eq!(bus.active_tab(), Some(second));

        bus.close(second).unwrap();
        assert_eq!(bus.active_tab(), Some(first));
        assert_eq!(bus.close(second), Err(SendError::UnknownTab(second)));
    }

    #[tokio::test]
    async fn test_navigation_replaces_page_instance() {
        let bus = bus();
        let tab = bus.open_tab(WATCH);
        let before = bus.agent_snapshot(tab).await.unwrap();

        bus.press_key(tab, KeyInput::new("f", true, true, false, false))
            .await
            .unwrap();
        assert_eq!(bus.body_classes(tab), vec!["youtube-zenview-extension"]);

        bus.navigate(tab, "https://www.youtube.com/watch?v=def")
            .unwrap();
        let after = bus.agent_snapshot(tab).await.unwrap();
        assert_ne!(before.instance_id, after.instance_id);
        assert!(!after.enabled);
        assert!(bus.body_classes(tab).is_empty());
    }

    #[tokio::test]
    async fn test_keydown_updates_badge() {
        let bus = bus();
        let tab = bus.open_tab(WATCH);

        let outcome = bus
            .press_key(tab, KeyInput::new("f", true, true, false, false))
            .await
            .unwrap();
        assert!(outcome.default_prevented());
        assert!(wait_for_badge(&bus, tab, "ON").await);
        assert_eq!(bus.badge(tab).unwrap().color, "#4285f4");
    }

    #[tokio::test]
    async fn test_reload_orphans_existing_pages() {
        let bus = bus();
        let tab = bus.open_tab(WATCH);
        bus.reload_extension();
        assert_eq!(bus.generation(), 1);

        // The orphan still reacts locally but cannot reach the new coordinator
        let outcome = bus
            .press_key(tab, KeyInput::new("f", true, true, false, false))
            .await
            .unwrap();
        assert_eq!(outcome, KeyOutcome::Toggled { enabled: true });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!bus.badge(tab).is_some_and(|b| b.text == "ON"));

        let host = bus.host();
        assert_eq!(
            host.send_to_tab(tab, PageCommand::GetState).await,
            Err(SendError::NoReceiver(tab))
        );
    }

    #[tokio::test]
    async fn test_tab_info_reports_status_and_focus() {
        let bus = bus();
        let tab = bus.open_tab(WATCH);
        let tabs = bus.tabs();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].id, tab);
        assert_eq!(tabs[0].status, TabStatus::Complete);
        assert!(tabs[0].active);
        assert_eq!(tabs[0].url.as_deref(), Some(WATCH));
    }
}
