//! Single-owner set actor.
//!
//! A `KeySet` is a set of string keys owned by exactly one spawned task.
//! Callers never touch the set; they send commands through a mailbox and the
//! owning task applies them one at a time. That single consumer is the whole
//! safety argument: mutations cannot interleave because only one loop body
//! ever runs, so no lock is needed.
//!
//! Mutation order is mailbox arrival order. Commands from one sender apply
//! in the order that sender issued them; ordering across senders is whatever
//! the mailbox arbitrates.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Mailbox capacity. Senders back-pressure once this many commands queue up.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// The actor has stopped; commands are rejected rather than queued.
#[derive(Debug, Error)]
#[error("key set actor is shut down")]
pub struct KeySetClosed;

/// A single applied mutation, as reported to the observer.
///
/// `Delete` is reported even when the key was absent — the observer sees
/// applied commands, not state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Set(String),
    Delete(String),
}

enum Command {
    Set(String),
    Delete(String),
    Contains {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

type Observer = Box<dyn FnMut(&Applied) + Send>;

/// Handle to a running key-set actor.
///
/// Cloning the handle gives another sender into the same mailbox; the actor
/// itself stops when it receives `Shutdown` or when every handle is dropped.
#[derive(Clone)]
pub struct KeySet {
    commands: mpsc::Sender<Command>,
}

impl KeySet {
    /// Spawn a fresh actor with empty state.
    #[must_use]
    pub fn spawn() -> Self {
        Self::spawn_inner(None)
    }

    /// Spawn a fresh actor whose observer runs after each applied mutation.
    ///
    /// The observer executes on the actor task, after the mutation is in the
    /// set and before the next command is taken — so when it fires, the
    /// effect it reports is fully visible.
    #[must_use]
    pub fn spawn_with_observer(observer: impl FnMut(&Applied) + Send + 'static) -> Self {
        Self::spawn_inner(Some(Box::new(observer)))
    }

    fn spawn_inner(observer: Option<Observer>) -> Self {
        let (commands, mailbox) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(run(mailbox, observer));
        Self { commands }
    }

    /// Request that `key` be marked present.
    ///
    /// Completion is asynchronous; observe it via the observer callback or a
    /// subsequent [`contains`](KeySet::contains).
    pub async fn set(&self, key: impl Into<String>) -> Result<(), KeySetClosed> {
        self.send(Command::Set(key.into())).await
    }

    /// Request that `key` be removed. Idempotent if the key is absent.
    pub async fn delete(&self, key: impl Into<String>) -> Result<(), KeySetClosed> {
        self.send(Command::Delete(key.into())).await
    }

    /// Ask the actor whether `key` is present.
    ///
    /// The read goes through the mailbox like any other command, so it
    /// observes every mutation queued ahead of it by this sender.
    pub async fn contains(&self, key: impl Into<String>) -> Result<bool, KeySetClosed> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Contains {
            key: key.into(),
            reply,
        })
        .await?;
        answer.await.map_err(|_| KeySetClosed)
    }

    /// Stop the actor and wait for it to exit.
    ///
    /// Commands queued ahead of the shutdown still apply; commands sent on
    /// any handle afterwards fail with [`KeySetClosed`].
    pub async fn shutdown(self) -> Result<(), KeySetClosed> {
        self.send(Command::Shutdown).await?;
        // The actor drops its mailbox on exit; that closes the channel.
        self.commands.closed().await;
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<(), KeySetClosed> {
        self.commands.send(command).await.map_err(|_| KeySetClosed)
    }
}

/// The actor loop. Sole owner of the set.
async fn run(mut mailbox: mpsc::Receiver<Command>, mut observer: Option<Observer>) {
    let mut keys: HashSet<String> = HashSet::new();
    while let Some(command) = mailbox.recv().await {
        match command {
            Command::Set(key) => {
                tracing::debug!(%key, "set");
                keys.insert(key.clone());
                notify(observer.as_mut(), &Applied::Set(key));
            }
            Command::Delete(key) => {
                tracing::debug!(%key, "delete");
                keys.remove(&key);
                notify(observer.as_mut(), &Applied::Delete(key));
            }
            Command::Contains { key, reply } => {
                // Caller may have stopped waiting; that is not our problem.
                let _ = reply.send(keys.contains(&key));
            }
            Command::Shutdown => break,
        }
    }
    tracing::debug!(remaining = keys.len(), "key set actor stopped");
}

fn notify(observer: Option<&mut Observer>, applied: &Applied) {
    if let Some(observer) = observer {
        observer(applied);
    }
}
