//! Interactive host shell
//!
//! Line-oriented commands that drive the [`ExtensionBus`] the way a user
//! would drive a browser: open and switch tabs, press keys on pages, fire
//! the accelerator, and use the popup and settings page.

use chrono::Local;
use std::time::Duration;

use crate::bus::ExtensionBus;
use crate::protocol::{SendError, TabId};
use crate::shortcut::KeyInput;
use crate::ui::{Popup, RecorderTransition, SettingsPage};

/// Grace period for the coordinator's background handlers after a command
const SETTLE_DELAY_MS: u64 = 50;

pub const HELP: &str = "\
Tabs
  open <url>                 open and focus a tab
  navigate <tab> <url>       load a new page in a tab
  activate <tab>             focus a tab
  close <tab>                close a tab
  tabs                       list tabs with badge and page state
Pages
  key <combo> [tab]          press keys on a page (default: focused tab)
  accelerator [command]      fire the global accelerator
Popup
  popup                      open the popup on the focused tab
  popup-toggle               click the popup's toggle
Settings
  record                     click the shortcut field
  press <combo>              press keys while recording
  release                    release all keys
  blur | cancel              leave the field / press the cancel key
  save | reset               save the shortcut / restore the default
Extension
  reload-extension           reload, orphaning open pages
  help | quit";

/// Shell errors
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid tab id '{0}'")]
    InvalidTab(String),

    #[error("Invalid key combination '{0}'")]
    InvalidCombo(String),

    #[error("Only http:// and https:// URLs are allowed")]
    InvalidUrl,

    #[error("No focused tab")]
    NoActiveTab,

    #[error("Open the settings page first with 'record'")]
    NoSettingsPage,

    #[error("Open the popup first with 'popup'")]
    NoPopup,

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Save(#[from] crate::ui::SaveError),
}

/// One parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Open(String),
    Navigate { tab: TabId, url: String },
    Activate(TabId),
    Close(TabId),
    Key { combo: KeyInput, tab: Option<TabId> },
    Accelerator(Option<String>),
    Popup,
    PopupToggle,
    Record,
    Press(KeyInput),
    Release,
    Blur,
    Cancel,
    Save,
    Reset,
    ReloadExtension,
    Tabs,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse one line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name {
            "open" => ShellCommand::Open(url_arg(args.first())?),
            "navigate" | "nav" => ShellCommand::Navigate {
                tab: tab_arg(args.first())?,
                url: url_arg(args.get(1))?,
            },
            "activate" => ShellCommand::Activate(tab_arg(args.first())?),
            "close" => ShellCommand::Close(tab_arg(args.first())?),
            "key" => ShellCommand::Key {
                combo: combo_arg(args.first())?,
                tab: args.get(1).map(|t| parse_tab(t)).transpose()?,
            },
            "accelerator" => ShellCommand::Accelerator(args.first().map(|c| c.to_string())),
            "popup" => ShellCommand::Popup,
            "popup-toggle" => ShellCommand::PopupToggle,
            "record" => ShellCommand::Record,
            "press" => ShellCommand::Press(combo_arg(args.first())?),
            "release" => ShellCommand::Release,
            "blur" => ShellCommand::Blur,
            "cancel" => ShellCommand::Cancel,
            "save" => ShellCommand::Save,
            "reset" => ShellCommand::Reset,
            "reload-extension" => ShellCommand::ReloadExtension,
            "tabs" => ShellCommand::Tabs,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_tab(word: &str) -> Result<TabId, ShellError> {
    word.parse::<u32>()
        .map(TabId)
        .map_err(|_| ShellError::InvalidTab(word.to_string()))
}

fn tab_arg(word: Option<&&str>) -> Result<TabId, ShellError> {
    parse_tab(word.ok_or(ShellError::MissingArgument("tab"))?)
}

fn url_arg(word: Option<&&str>) -> Result<String, ShellError> {
    let url = word.ok_or(ShellError::MissingArgument("url"))?;
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ShellError::InvalidUrl);
    }
    Ok(url.to_string())
}

fn combo_arg(word: Option<&&str>) -> Result<KeyInput, ShellError> {
    let combo = word.ok_or(ShellError::MissingArgument("key combination"))?;
    KeyInput::parse_combo(combo).ok_or_else(|| ShellError::InvalidCombo(combo.to_string()))
}

/// Result of running one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    Lines(Vec<String>),
    Quit,
}

/// Shell session over one bus
pub struct Shell {
    bus: ExtensionBus,
    popup: Option<Popup>,
    settings: Option<SettingsPage>,
}

impl Shell {
    pub fn new(bus: ExtensionBus) -> Self {
        Self {
            bus,
            popup: None,
            settings: None,
        }
    }

    /// Parse and run one line
    pub async fn run_line(&mut self, line: &str) -> Result<ShellOutcome, ShellError> {
        match ShellCommand::parse(line)? {
            Some(command) => self.execute(command).await,
            None => Ok(ShellOutcome::Lines(Vec::new())),
        }
    }

    pub async fn execute(&mut self, command: ShellCommand) -> Result<ShellOutcome, ShellError> {
        tracing::debug!("Shell command: {:?}", command);

        let lines = match command {
            ShellCommand::Open(url) => {
                let tab = self.bus.open_tab(&url);
                settle().await;
                vec![format!("Opened tab {}", tab)]
            }
            ShellCommand::Navigate { tab, url } => {
                self.bus.navigate(tab, &url)?;
                settle().await;
                vec![format!("Tab {} now at {}", tab, url)]
            }
            ShellCommand::Activate(tab) => {
                self.bus.activate(tab)?;
                settle().await;
                vec![format!("Focused tab {}", tab)]
            }
            ShellCommand::Close(tab) => {
                self.bus.close(tab)?;
                vec![format!("Closed tab {}", tab)]
            }
            ShellCommand::Key { combo, tab } => {
                let tab = match tab {
                    Some(tab) => tab,
                    None => self.bus.active_tab().ok_or(ShellError::NoActiveTab)?,
                };
                let outcome = self.bus.press_key(tab, combo).await?;
                settle().await;
                vec![format!("Tab {}: {:?}", tab, outcome)]
            }
            ShellCommand::Accelerator(command) => {
                match command {
                    Some(command) => self.bus.fire_command(&command),
                    None => self.bus.fire_accelerator(),
                }
                settle().await;
                self.tab_lines().await
            }
            ShellCommand::Popup => {
                let mut popup = self.bus.popup();
                popup.open().await;
                let lines = popup_lines(&popup);
                self.popup = Some(popup);
                lines
            }
            ShellCommand::PopupToggle => {
                let popup = self.popup.as_mut().ok_or(ShellError::NoPopup)?;
                popup.click_toggle().await;
                let lines = popup_lines(popup);
                settle().await;
                lines
            }
            ShellCommand::Record => {
                if self.settings.is_none() {
                    let mut page = self.bus.settings_page();
                    page.load().await;
                    self.settings = Some(page);
                }
                let page = self.settings_page()?;
                page.start_recording();
                settings_lines(page)
            }
            ShellCommand::Press(input) => {
                let page = self.settings_page()?;
                let transition = page.key_down(input);
                let mut lines = settings_lines(page);
                if let RecorderTransition::Captured(spec) = transition {
                    lines.push(format!("Captured {}", spec));
                }
                lines
            }
            ShellCommand::Release => {
                let page = self.settings_page()?;
                page.key_up();
                settings_lines(page)
            }
            ShellCommand::Blur => {
                let page = self.settings_page()?;
                page.blur();
                settings_lines(page)
            }
            ShellCommand::Cancel => {
                let page = self.settings_page()?;
                page.cancel();
                settings_lines(page)
            }
            ShellCommand::Save => {
                let page = self.settings_page()?;
                let result = page.save().await;
                let lines = settings_lines(page);
                result?;
                settle().await;
                lines
            }
            ShellCommand::Reset => {
                let page = self.settings_page()?;
                page.reset_to_default().await?;
                let lines = settings_lines(page);
                settle().await;
                lines
            }
            ShellCommand::ReloadExtension => {
                self.bus.reload_extension();
                vec![format!(
                    "Extension reloaded (generation {})",
                    self.bus.generation()
                )]
            }
            ShellCommand::Tabs => self.tab_lines().await,
            ShellCommand::Help => HELP.lines().map(str::to_string).collect(),
            ShellCommand::Quit => return Ok(ShellOutcome::Quit),
        };
        Ok(ShellOutcome::Lines(lines))
    }

    fn settings_page(&mut self) -> Result<&mut SettingsPage, ShellError> {
        self.settings.as_mut().ok_or(ShellError::NoSettingsPage)
    }

    async fn tab_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for tab in self.bus.tabs() {
            let badge = self.bus.badge(tab.id).unwrap_or_default();
            let page = match self.bus.agent_snapshot(tab.id).await {
                Some(snapshot) => format!(
                    "zen={} shortcut={}",
                    if snapshot.enabled { "on" } else { "off" },
                    snapshot.shortcut
                ),
                None => "no page agent".to_string(),
            };
            lines.push(format!(
                "{}{} {} badge={:?} {}",
                if tab.active { "*" } else { " " },
                tab.id,
                tab.url.unwrap_or_default(),
                badge.text,
                page
            ));
        }
        if lines.is_empty() {
            lines.push("No tabs".to_string());
        }
        lines
    }
}

fn popup_lines(popup: &Popup) -> Vec<String> {
    let view = popup.view();
    let mut lines = vec![format!(
        "[{}] {}",
        if view.toggle_active { "x" } else { " " },
        view.status.text()
    )];
    if let Some(hint) = &view.shortcut_hint {
        lines.push(hint.clone());
    }
    lines
}

fn settings_lines(page: &SettingsPage) -> Vec<String> {
    let mut lines = vec![format!(
        "Shortcut: {}{}",
        page.badges().join(" + "),
        if page.is_recording() { " (recording)" } else { "" }
    )];
    if let Some(status) = page.status(Local::now()) {
        lines.push(status.text.clone());
    }
    lines
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(SETTLE_DELAY_MS)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_parse_tab_commands() {
        assert_eq!(
            ShellCommand::parse("open https://www.youtube.com/watch?v=1").unwrap(),
            Some(ShellCommand::Open(
                "https://www.youtube.com/watch?v=1".to_string()
            ))
        );
        assert_eq!(
            ShellCommand::parse("navigate 2 https://example.com/").unwrap(),
            Some(ShellCommand::Navigate {
                tab: TabId(2),
                url: "https://example.com/".to_string()
            })
        );
        assert_eq!(
            ShellCommand::parse("  close 3 ").unwrap(),
            Some(ShellCommand::Close(TabId(3)))
        );
    }

    #[test]
    fn test_parse_key_with_optional_tab() {
        assert_eq!(
            ShellCommand::parse("key ctrl+shift+f").unwrap(),
            Some(ShellCommand::Key {
                combo: KeyInput::new("f", true, true, false, false),
                tab: None
            })
        );
        assert_eq!(
            ShellCommand::parse("key alt+g 4").unwrap(),
            Some(ShellCommand::Key {
                combo: KeyInput::new("g", false, false, true, false),
                tab: Some(TabId(4))
            })
        );
    }

    #[test]
    fn test_parse_blank_and_comment() {
        assert_eq!(ShellCommand::parse("").unwrap(), None);
        assert_eq!(ShellCommand::parse("# setup").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ShellCommand::parse("dance"),
            Err(ShellError::UnknownCommand(_))
        ));
        assert!(matches!(
            ShellCommand::parse("open"),
            Err(ShellError::MissingArgument("url"))
        ));
        assert!(matches!(
            ShellCommand::parse("open file:///etc/passwd"),
            Err(ShellError::InvalidUrl)
        ));
        assert!(matches!(
            ShellCommand::parse("activate first"),
            Err(ShellError::InvalidTab(_))
        ));
        assert!(matches!(
            ShellCommand::parse("press hyper+k"),
            Err(ShellError::InvalidCombo(_))
        ));
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn shell() -> Shell {
        Shell::new(ExtensionBus::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
        ))
    }

    fn lines(outcome: ShellOutcome) -> Vec<String> {
        match outcome {
            ShellOutcome::Lines(lines) => lines,
            ShellOutcome::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_key_then_tabs() {
        let mut shell = shell();
        shell
            .run_line("open https://www.youtube.com/watch?v=1")
            .await
            .unwrap();
        let out = lines(shell.run_line("key ctrl+shift+f").await.unwrap());
        assert_eq!(out, vec!["Tab 1: Toggled { enabled: true }"]);

        let out = lines(shell.run_line("tabs").await.unwrap());
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("*1 https://www.youtube.com/watch?v=1"));
        assert!(out[0].contains("badge=\"ON\""));
        assert!(out[0].contains("zen=on"));
    }

    #[tokio::test]
    async fn test_settings_flow() {
        let mut shell = shell();
        assert!(matches!(
            shell.run_line("save").await,
            Err(ShellError::NoSettingsPage)
        ));

        shell.run_line("record").await.unwrap();
        let out = lines(shell.run_line("press alt+g").await.unwrap());
        assert!(out.iter().any(|l| l.starts_with("Captured")));

        let out = lines(shell.run_line("save").await.unwrap());
        assert!(out.contains(&"Shortcut saved!".to_string()));
    }

    #[tokio::test]
    async fn test_save_without_key_reports_error() {
        let mut shell = shell();
        shell.run_line("record").await.unwrap();
        shell.run_line("press ctrl").await.unwrap();
        assert!(matches!(
            shell.run_line("save").await,
            Err(ShellError::Save(crate::ui::SaveError::NothingRecorded))
        ));
    }

    #[tokio::test]
    async fn test_popup_requires_open() {
        let mut shell = shell();
        assert!(matches!(
            shell.run_line("popup-toggle").await,
            Err(ShellError::NoPopup)
        ));

        shell
            .run_line("open https://www.youtube.com/feed")
            .await
            .unwrap();
        let out = lines(shell.run_line("popup").await.unwrap());
        assert_eq!(out, vec!["[ ] Go to a video page"]);
    }

    #[tokio::test]
    async fn test_quit() {
        let mut shell = shell();
        assert_eq!(shell.run_line("quit").await.unwrap(), ShellOutcome::Quit);
    }
}
