//! Page agent
//!
//! One agent lives in every loaded target page. It owns the toggle state and
//! the active shortcut for that page instance, applies the visual-mode marker
//! to the page body, matches keydowns against the shortcut, and answers state
//! queries.
//!
//! ## Lifecycle
//!
//! ```text
//! page load ──► spawn_page_agent ──► enabled = false, shortcut = default
//!                    │
//!                    ├── storage read (concurrent) ──► adopt custom shortcut
//!                    │                                 (silently skipped on failure)
//!                    ▼
//!             inbox: toggle / getState / updateShortcut / keydown
//!                    │
//! navigation/reload ─┴──► task aborted, every later send fails
//! ```

pub mod runner;
pub mod state;

pub use runner::{spawn_page_agent, PageAgentHandle};
pub use state::{AgentSnapshot, KeyOutcome, PageAgent};
