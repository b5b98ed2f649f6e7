//! Activation shortcut model
//!
//! A `ShortcutSpec` is the five-field key + modifiers combination that toggles
//! ZenView on a page. This module owns key normalisation, the exact-match rule
//! used by the page agent, validation before persisting, and the display
//! strings used by the popup and settings page.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key names reported for the modifier keys themselves
const MODIFIER_KEYS: &[&str] = &["Control", "Shift", "Alt", "Meta"];

/// Activation shortcut: one key plus exact modifier state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortcutSpec {
    /// Single printable character (uppercased) or a named key such as "Escape".
    /// Empty while a recording is still in progress.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl Default for ShortcutSpec {
    /// Built-in Ctrl+Shift+F
    fn default() -> Self {
        Self {
            key: "F".to_string(),
            ctrl: true,
            shift: true,
            alt: false,
            meta: false,
        }
    }
}

impl ShortcutSpec {
    /// Create a spec, normalising the key
    pub fn new(key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> Self {
        Self {
            key: normalize_key(key),
            ctrl,
            shift,
            alt,
            meta,
        }
    }

    /// A spec with no key and no modifiers (the "still recording" placeholder)
    pub fn empty() -> Self {
        Self {
            key: String::new(),
            ctrl: false,
            shift: false,
            alt: false,
            meta: false,
        }
    }

    /// Whether a key has been captured
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }

    /// Whether at least one of the four modifiers is set
    pub fn has_modifier(&self) -> bool {
        self.ctrl || self.shift || self.alt || self.meta
    }

    /// Return a copy with the key normalised
    pub fn normalized(&self) -> Self {
        Self {
            key: normalize_key(&self.key),
            ..self.clone()
        }
    }

    /// Check a keyboard event against this spec.
    ///
    /// The normalised keys must be equal and all four modifiers must be
    /// exactly equal; extra held modifiers do not match.
    pub fn matches(&self, input: &KeyInput) -> bool {
        normalize_key(&input.key) == normalize_key(&self.key)
            && input.ctrl == self.ctrl
            && input.shift == self.shift
            && input.alt == self.alt
            && input.meta == self.meta
    }

    /// Popup-style text, e.g. "Ctrl+Shift+F"
    pub fn combo_text(&self, platform: Platform) -> String {
        let mut text = String::new();
        if self.ctrl {
            text.push_str("Ctrl+");
        }
        if self.meta {
            text.push_str(if platform.is_mac() { "⌘+" } else { "Win+" });
        }
        if self.alt {
            text.push_str(if platform.is_mac() { "Option+" } else { "Alt+" });
        }
        if self.shift {
            text.push_str("Shift+");
        }
        text.push_str(&self.key.to_uppercase());
        text
    }

    /// Settings-page key badges, e.g. `["Ctrl", "Shift", "F"]`
    pub fn key_badges(&self, platform: Platform) -> Vec<String> {
        let mut badges = Vec::new();
        if self.ctrl {
            badges.push("Ctrl".to_string());
        }
        if self.meta {
            badges.push("⌘".to_string());
        }
        if self.alt {
            badges.push(if platform.is_mac() { "Option" } else { "Alt" }.to_string());
        }
        if self.shift {
            badges.push("Shift".to_string());
        }
        if self.has_key() {
            badges.push(display_key_name(&self.key, platform));
        }
        badges
    }
}

impl fmt::Display for ShortcutSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.combo_text(Platform::current()))
    }
}

/// A keydown as reported by the page or the settings surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyInput {
    pub fn new(key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> Self {
        Self {
            key: key.to_string(),
            ctrl,
            shift,
            alt,
            meta,
        }
    }

    /// Whether the pressed key is itself a modifier
    pub fn is_modifier(&self) -> bool {
        MODIFIER_KEYS.contains(&self.key.as_str())
    }

    /// Parse a combo such as "ctrl+shift+f" or "Alt+G".
    ///
    /// Modifier names are case-insensitive; the final segment is the key.
    /// `plus` names the literal `+` key.
    pub fn parse_combo(combo: &str) -> Option<Self> {
        let mut input = Self::new("", false, false, false, false);
        let parts: Vec<&str> = combo.split('+').map(str::trim).collect();
        let (last, modifiers) = parts.split_last()?;

        for part in modifiers {
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => input.ctrl = true,
                "shift" => input.shift = true,
                "alt" | "option" => input.alt = true,
                "meta" | "cmd" | "win" | "super" => input.meta = true,
                _ => return None,
            }
        }

        input.key = match last.to_lowercase().as_str() {
            "" => return None,
            "space" => " ".to_string(),
            "plus" => "+".to_string(),
            "esc" | "escape" => "Escape".to_string(),
            "ctrl" | "control" => "Control".to_string(),
            "shift" => "Shift".to_string(),
            "alt" | "option" => "Alt".to_string(),
            "meta" | "cmd" | "win" | "super" => "Meta".to_string(),
            _ => (*last).to_string(),
        };
        Some(input)
    }
}

/// Normalise a key name: single characters are uppercased, named keys kept as-is
pub fn normalize_key(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_uppercase().collect(),
        _ => key.to_string(),
    }
}

/// Display platform, used only for modifier labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    Mac,
    #[default]
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }

    pub fn is_mac(&self) -> bool {
        matches!(self, Platform::Mac)
    }
}

/// Map a key name to the glyph shown on a key badge
pub fn display_key_name(key: &str, platform: Platform) -> String {
    match key {
        "Control" => "Ctrl".to_string(),
        "Shift" => "Shift".to_string(),
        "Alt" => if platform.is_mac() { "Option" } else { "Alt" }.to_string(),
        "Meta" => "⌘".to_string(),
        " " => "Space".to_string(),
        "ArrowUp" => "↑".to_string(),
        "ArrowDown" => "↓".to_string(),
        "ArrowLeft" => "←".to_string(),
        "ArrowRight" => "→".to_string(),
        "Escape" => "Esc".to_string(),
        "Backspace" => "⌫".to_string(),
        "Delete" => "Del".to_string(),
        "Enter" => "↵".to_string(),
        "Tab" => "Tab".to_string(),
        other => other.to_uppercase(),
    }
}

/// Reasons a recorded shortcut cannot be saved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please press a key (not just modifiers)")]
    MissingKey,

    #[error("At least one modifier key is recommended")]
    NoModifier,
}

/// Validate a shortcut before it is persisted
pub fn validate(spec: &ShortcutSpec) -> Result<(), ValidationError> {
    if !spec.has_key() {
        return Err(ValidationError::MissingKey);
    }
    if !spec.has_modifier() {
        return Err(ValidationError::NoModifier);
    }
    Ok(())
}
