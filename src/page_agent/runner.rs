//! Page agent event loop
//!
//! Runs one [`PageAgent`] as its own task. Commands, keydowns and the startup
//! storage read all arrive through a single inbox, so the agent never sees
//! two inputs at once.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::state::{AgentSnapshot, KeyOutcome, PageAgent};
use crate::protocol::{PageCommand, PageReply, SendError};
use crate::shortcut::{KeyInput, ShortcutSpec};
use crate::storage::{self, SettingsStore};

/// Inputs accepted by a running agent
enum AgentInput {
    Command {
        command: PageCommand,
        reply: oneshot::Sender<PageReply>,
    },
    Key {
        input: KeyInput,
        reply: oneshot::Sender<KeyOutcome>,
    },
    StoredShortcut(Option<ShortcutSpec>),
    Snapshot(oneshot::Sender<AgentSnapshot>),
}

/// Handle to a running page agent
pub struct PageAgentHandle {
    instance_id: Uuid,
    tx: mpsc::UnboundedSender<AgentInput>,
    task: JoinHandle<()>,
}

impl PageAgentHandle {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Whether the agent's task is still receiving
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Deliver a command and wait for the reply
    pub async fn send(&self, command: PageCommand) -> Result<PageReply, SendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AgentInput::Command { command, reply })
            .map_err(|_| SendError::PortClosed)?;
        rx.await.map_err(|_| SendError::PortClosed)
    }

    /// Deliver a keydown from the page
    pub async fn key_down(&self, input: KeyInput) -> Result<KeyOutcome, SendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AgentInput::Key { input, reply })
            .map_err(|_| SendError::PortClosed)?;
        rx.await.map_err(|_| SendError::PortClosed)
    }

    pub async fn snapshot(&self) -> Result<AgentSnapshot, SendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AgentInput::Snapshot(reply))
            .map_err(|_| SendError::PortClosed)?;
        rx.await.map_err(|_| SendError::PortClosed)
    }

    /// Tear the page context down
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for PageAgentHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start an agent. The stored shortcut is read concurrently; until it
/// arrives, or if the read fails, the built-in default stays active.
pub fn spawn_page_agent(agent: PageAgent, store: Arc<dyn SettingsStore>) -> PageAgentHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let instance_id = agent.instance_id();

    if agent.context_valid() {
        let loader_tx = tx.clone();
        tokio::spawn(async move {
            let stored = match storage::load_custom_shortcut(store.as_ref()).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::debug!("Page {} keeps default shortcut: {}", instance_id, e);
                    None
                }
            };
            // The agent may already be gone; nothing to do then
            let _ = loader_tx.send(AgentInput::StoredShortcut(stored));
        });
    }

    let task = tokio::spawn(run_agent(agent, rx));
    tracing::debug!("Page agent {} started", instance_id);

    PageAgentHandle {
        instance_id,
        tx,
        task,
    }
}

async fn run_agent(mut agent: PageAgent, mut rx: mpsc::UnboundedReceiver<AgentInput>) {
    while let Some(input) = rx.recv().await {
        match input {
            AgentInput::Command { command, reply } => {
                let name = command.name();
                let response = agent.handle(command);
                if reply.send(response).is_err() {
                    tracing::debug!("Sender of '{}' stopped waiting for the reply", name);
                }
            }
            AgentInput::Key { input, reply } => {
                let _ = reply.send(agent.on_key_down(&input));
            }
            AgentInput::StoredShortcut(stored) => agent.adopt_stored_shortcut(stored),
            AgentInput::Snapshot(reply) => {
                let _ = reply.send(agent.snapshot());
            }
        }
    }
    tracing::debug!("Page agent {} stopped", agent.instance_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageConfig;
    use crate::host::{BodyClassList, RuntimePort};
    use crate::protocol::{RuntimeMessage, RuntimeReply};
    use crate::site::SiteScope;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullRuntime;

    #[async_trait]
    impl RuntimePort for NullRuntime {
        fn is_valid(&self) -> bool {
            true
        }

        fn post(&self, _message: RuntimeMessage) -> Result<(), SendError> {
            Ok(())
        }

        async fn request(&self, _message: RuntimeMessage) -> Result<RuntimeReply, SendError> {
            Ok(RuntimeReply { success: true })
        }
    }

    fn agent() -> PageAgent {
        PageAgent::new(
            "https://www.youtube.com/watch?v=1",
            SiteScope::default(),
            PageConfig::default(),
            Arc::new(BodyClassList::new()),
            Arc::new(NullRuntime),
        )
    }

    async fn wait_for_shortcut(handle: &PageAgentHandle, expected: &ShortcutSpec) -> bool {
        for _ in 0..100 {
            if let Ok(snapshot) = handle.snapshot().await {
                if &snapshot.shortcut == expected {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let handle = spawn_page_agent(agent(), Arc::new(MemoryStore::new()));
        assert_eq!(
            handle.send(PageCommand::Toggle).await.unwrap(),
            PageReply::State { enabled: true }
        );
        assert_eq!(
            handle.send(PageCommand::GetState).await.unwrap(),
            PageReply::State { enabled: true }
        );
    }

    #[tokio::test]
    async fn test_adopts_stored_shortcut() {
        let store = Arc::new(MemoryStore::new());
        let spec = ShortcutSpec::new("Y", true, false, false, false);
        storage::save_custom_shortcut(store.as_ref(), &spec)
            .await
            .unwrap();

        let handle = spawn_page_agent(agent(), store);
        assert!(wait_for_shortcut(&handle, &spec).await);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_default() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_reads(true);

        let handle = spawn_page_agent(agent(), store);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.shortcut, ShortcutSpec::default());
        assert!(!snapshot.enabled);
    }

    #[tokio::test]
    async fn test_shutdown_makes_sends_fail() {
        let handle = spawn_page_agent(agent(), Arc::new(MemoryStore::new()));
        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_alive());
        assert_eq!(
            handle.send(PageCommand::GetState).await,
            Err(SendError::PortClosed)
        );
    }
}
