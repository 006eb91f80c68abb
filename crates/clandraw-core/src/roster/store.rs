// Single-owner roster task.
//
// The `RosterStore` lives inside one tokio task that processes commands one
// at a time from an mpsc channel. Every import, draw and reset therefore
// runs its read-modify-write to completion before the next command starts.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::cell::CellValue;
use super::state::{PoolEntry, RosterState, RosterStore};
use crate::auth::{AuthError, Grant};

/// Capacity of the command channel. Senders wait when it is full.
const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("roster task is not running")]
    Unavailable,
}

/// Commands accepted by the roster task. Each carries a reply channel.
#[derive(Debug)]
pub enum RosterCommand {
    Import {
        grant: Grant,
        rows: Vec<Vec<CellValue>>,
        reply: oneshot::Sender<Result<usize, AuthError>>,
    },
    Draw {
        grant: Grant,
        requested: i64,
        reply: oneshot::Sender<Result<Vec<PoolEntry>, AuthError>>,
    },
    ClearWinners {
        grant: Grant,
        reply: oneshot::Sender<Result<(), AuthError>>,
    },
    ClearRoster {
        grant: Grant,
        reply: oneshot::Sender<Result<(), AuthError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RosterState>,
    },
}

/// Cloneable handle for sending commands to the roster task.
#[derive(Debug, Clone)]
pub struct RosterHandle {
    tx: mpsc::Sender<RosterCommand>,
}

impl RosterHandle {
    /// Spawn the roster task on the current runtime.
    pub fn spawn(store: RosterStore) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(run(rx, store));
        (RosterHandle { tx }, handle)
    }

    pub async fn import(&self, grant: Grant, rows: Vec<Vec<CellValue>>) -> Result<usize, RosterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RosterCommand::Import { grant, rows, reply }).await?;
        Ok(rx.await.map_err(|_| RosterError::Unavailable)??)
    }

    pub async fn draw(&self, grant: Grant, requested: i64) -> Result<Vec<PoolEntry>, RosterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RosterCommand::Draw {
            grant,
            requested,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| RosterError::Unavailable)??)
    }

    pub async fn clear_winners(&self, grant: Grant) -> Result<(), RosterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RosterCommand::ClearWinners { grant, reply }).await?;
        Ok(rx.await.map_err(|_| RosterError::Unavailable)??)
    }

    pub async fn clear_roster(&self, grant: Grant) -> Result<(), RosterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RosterCommand::ClearRoster { grant, reply }).await?;
        Ok(rx.await.map_err(|_| RosterError::Unavailable)??)
    }

    pub async fn snapshot(&self) -> Result<RosterState, RosterError> {
        let (reply, rx) = oneshot::channel();
        self.send(RosterCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| RosterError::Unavailable)
    }

    async fn send(&self, cmd: RosterCommand) -> Result<(), RosterError> {
        self.tx.send(cmd).await.map_err(|_| RosterError::Unavailable)
    }
}

/// Process roster commands until every handle has been dropped.
pub async fn run(mut rx: mpsc::Receiver<RosterCommand>, mut store: RosterStore) {
    info!("Roster task started");

    while let Some(cmd) = rx.recv().await {
        // A dropped reply receiver means the request was cancelled; the
        // mutation still stands, so send errors are ignored.
        match cmd {
            RosterCommand::Import { grant, rows, reply } => {
                let _ = reply.send(store.import_rows(&grant, &rows));
            }
            RosterCommand::Draw {
                grant,
                requested,
                reply,
            } => {
                let _ = reply.send(store.draw(&grant, requested));
            }
            RosterCommand::ClearWinners { grant, reply } => {
                let _ = reply.send(store.clear_winners(&grant));
            }
            RosterCommand::ClearRoster { grant, reply } => {
                let _ = reply.send(store.clear_roster(&grant));
            }
            RosterCommand::Snapshot { reply } => {
                debug!("Snapshot requested");
                let _ = reply.send(store.state().clone());
            }
        }
    }

    info!("Roster task exiting");
}
