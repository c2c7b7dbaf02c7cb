//! Background compaction worker
//!
//! One thread per container, fed by a crossbeam channel. Collections send a
//! weak handle of themselves when their dead-byte ratio crosses the threshold;
//! the worker compacts them one at a time.

use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::Collection;
use crate::error::Result;

enum CompactorMessage {
    Compact(Weak<Collection>),
    Shutdown,
}

/// Sending side of the worker, held by each collection
#[derive(Clone)]
pub(crate) struct CompactorHandle {
    sender: Sender<CompactorMessage>,
}

impl CompactorHandle {
    /// Queue `collection` for compaction. Returns false once the worker is gone.
    pub(crate) fn schedule(&self, collection: Weak<Collection>) -> bool {
        self.sender
            .send(CompactorMessage::Compact(collection))
            .is_ok()
    }
}

/// The worker thread
pub(crate) struct Compactor {
    handle: CompactorHandle,
    worker: Option<JoinHandle<()>>,
}

impl Compactor {
    pub(crate) fn start() -> Result<Self> {
        let (sender, receiver) = channel::unbounded();

        let worker = thread::Builder::new()
            .name("zelos-compactor".to_string())
            .spawn(move || run(receiver))
            .map_err(|e| io::Error::new(e.kind(), format!("failed to start compactor: {}", e)))?;

        tracing::debug!("Background compactor started");

        Ok(Self {
            handle: CompactorHandle { sender },
            worker: Some(worker),
        })
    }

    pub(crate) fn handle(&self) -> CompactorHandle {
        self.handle.clone()
    }

    /// Stop the worker after the queued work and wait for it
    pub(crate) fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // A send error means the worker already exited
        let _ = self.handle.sender.send(CompactorMessage::Shutdown);

        if worker.join().is_err() {
            tracing::error!("Background compactor panicked");
        } else {
            tracing::debug!("Background compactor stopped");
        }
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: Receiver<CompactorMessage>) {
    for message in receiver.iter() {
        match message {
            CompactorMessage::Compact(collection) => {
                // Dropped collections need no compaction
                if let Some(collection) = collection.upgrade() {
                    collection.run_scheduled_compaction();
                }
            }
            CompactorMessage::Shutdown => break,
        }
    }
}
