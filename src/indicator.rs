//! Per-tab indicator state
//!
//! The badge is derived from the most recently observed toggle state of a
//! tab. The board keeps that derivation in memory only; a coordinator restart
//! clears it until the next query or notification.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::IndicatorConfig;
use crate::host::BadgeRenderer;
use crate::protocol::TabId;

/// Badge text and colour for one tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorState {
    pub enabled: bool,
    pub text: String,
    pub color: String,
}

impl IndicatorState {
    /// Derive the badge for a toggle state
    pub fn derive(enabled: bool, config: &IndicatorConfig) -> Self {
        if enabled {
            Self {
                enabled,
                text: config.on_text.clone(),
                color: config.on_color.clone(),
            }
        } else {
            Self {
                enabled,
                text: String::new(),
                color: config.off_color.clone(),
            }
        }
    }
}

/// Coordinator-side badge cache and renderer front
pub struct IndicatorBoard {
    config: IndicatorConfig,
    renderer: Arc<dyn BadgeRenderer>,
    states: RwLock<HashMap<TabId, IndicatorState>>,
}

impl IndicatorBoard {
    pub fn new(config: IndicatorConfig, renderer: Arc<dyn BadgeRenderer>) -> Self {
        Self {
            config,
            renderer,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Render the badge for a tab and remember it
    pub fn show(&self, tab: TabId, enabled: bool) {
        let state = IndicatorState::derive(enabled, &self.config);
        self.renderer.set_badge_text(tab, &state.text);
        self.renderer.set_badge_color(tab, &state.color);
        tracing::debug!("Indicator for tab {} set to {:?}", tab, state.text);
        self.states.write().insert(tab, state);
    }

    /// Reset a tab's badge to the default "off" state
    pub fn clear(&self, tab: TabId) {
        self.show(tab, false);
    }

    /// Last rendered state for a tab, if any since startup
    pub fn get(&self, tab: TabId) -> Option<IndicatorState> {
        self.states.read().get(&tab).cloned()
    }

    /// Drop a closed tab
    pub fn forget(&self, tab: TabId) {
        self.states.write().remove(&tab);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<(TabId, String, String)>>,
    }

    impl BadgeRenderer for RecordingRenderer {
        fn set_badge_text(&self, tab: TabId, text: &str) {
            self.calls
                .lock()
                .push((tab, "text".to_string(), text.to_string()));
        }

        fn set_badge_color(&self, tab: TabId, color: &str) {
            self.calls
                .lock()
                .push((tab, "color".to_string(), color.to_string()));
        }
    }

    #[test]
    fn test_derive() {
        let config = IndicatorConfig::default();
        let on = IndicatorState::derive(true, &config);
        assert_eq!(on.text, "ON");
        assert_eq!(on.color, "#4285f4");

        let off = IndicatorState::derive(false, &config);
        assert_eq!(off.text, "");
        assert_eq!(off.color, "#000000");
    }

    #[test]
    fn test_show_renders_text_and_colour() {
        let renderer = Arc::new(RecordingRenderer::default());
        let board = IndicatorBoard::new(IndicatorConfig::default(), renderer.clone());

        board.show(TabId(3), true);

        let calls = renderer.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (TabId(3), "text".to_string(), "ON".to_string()));
        assert_eq!(calls[1], (TabId(3), "color".to_string(), "#4285f4".to_string()));
        drop(calls);

        assert!(board.get(TabId(3)).unwrap().enabled);
    }

    #[test]
    fn test_clear_and_forget() {
        let board = IndicatorBoard::new(
            IndicatorConfig::default(),
            Arc::new(RecordingRenderer::default()),
        );
        board.show(TabId(1), true);
        board.clear(TabId(1));
        assert!(!board.get(TabId(1)).unwrap().enabled);

        board.forget(TabId(1));
        assert!(board.get(TabId(1)).is_none());
    }
}
