//! Unbounded FIFO between the command ingress surfaces and the interpreter.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

/// Producer handle. Cheap to clone; one per ingress surface.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<String>,
}

impl CommandSender {
    /// Append a command. Never blocks.
    pub fn push(&self, command: impl Into<String>) {
        let command = command.into();
        debug!("Queued command {:?}", command);
        // the receiver lives as long as the daemon
        let _ = self.tx.send(command);
    }

    /// Commands waiting to be executed.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Consumer end, owned by the interpreter.
#[derive(Debug)]
pub struct CommandQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Wait up to `timeout` for the next command.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
