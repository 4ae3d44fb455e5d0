//! Background delivery of optimistic writes to the gateway.
//!
//! Commands run on one worker thread in submission order. Each is attempted
//! once; a failure is logged and reported on the failure channel, and the
//! local store is left as it is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use strum::IntoStaticStr;
use time::OffsetDateTime;

use crate::gateway::{DocumentPatch, FolderPatch, Gateway};
use crate::model::{DocId, Document, Folder, FolderId};

#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SyncCommand {
    InsertFolders(Vec<Folder>),
    InsertDocuments(Vec<Document>),
    UpdateFolder { id: FolderId, patch: FolderPatch },
    UpdateDocument { id: DocId, patch: DocumentPatch },
    UpdateSortOrders(Vec<(FolderId, i64)>),
    DeleteFolder(FolderId),
    DeleteDocument(DocId),
}

impl SyncCommand {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Id of the row the command targets, or the first row of a batch.
    pub fn subject(&self) -> String {
        match self {
            SyncCommand::InsertFolders(rows) => rows
                .first()
                .map(|f| f.id.to_string())
                .unwrap_or_default(),
            SyncCommand::InsertDocuments(rows) => rows
                .first()
                .map(|d| d.id.to_string())
                .unwrap_or_default(),
            SyncCommand::UpdateFolder { id, .. } | SyncCommand::DeleteFolder(id) => id.to_string(),
            SyncCommand::UpdateDocument { id, .. } | SyncCommand::DeleteDocument(id) => {
                id.to_string()
            }
            SyncCommand::UpdateSortOrders(orders) => format!("{} folders", orders.len()),
        }
    }

    fn apply(&self, gateway: &dyn Gateway) -> Result<()> {
        match self {
            SyncCommand::InsertFolders(rows) => gateway.insert_folders(rows),
            SyncCommand::InsertDocuments(rows) => gateway.insert_documents(rows),
            SyncCommand::UpdateFolder { id, patch } => gateway.update_folder(id, patch),
            SyncCommand::UpdateDocument { id, patch } => gateway.update_document(id, patch),
            SyncCommand::UpdateSortOrders(orders) => gateway.update_sort_orders(orders),
            SyncCommand::DeleteFolder(id) => gateway.delete_folder(id),
            SyncCommand::DeleteDocument(id) => gateway.delete_document(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub kind: &'static str,
    pub subject: String,
    pub message: String,
    pub occurred_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub applied: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicUsize,
    failed: AtomicUsize,
}

enum Message {
    Apply(SyncCommand),
    Flush(Sender<()>),
    Shutdown,
}

pub struct SyncQueue {
    tx: Sender<Message>,
    failures: Receiver<SyncFailure>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl SyncQueue {
    pub fn spawn(gateway: Arc<dyn Gateway>) -> Result<Self> {
        let (tx, rx) = unbounded::<Message>();
        let (failure_tx, failures) = unbounded();
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name("zen-sync".into())
            .spawn(move || run_worker(gateway, rx, failure_tx, worker_counters))
            .context("spawning sync worker")?;
        Ok(Self {
            tx,
            failures,
            counters,
            worker: Some(worker),
        })
    }

    /// Queues a write and returns immediately.
    pub fn submit(&self, command: SyncCommand) {
        let kind = command.kind();
        if self.tx.send(Message::Apply(command)).is_err() {
            tracing::error!(kind, "sync worker is gone, remote write dropped");
        }
    }

    /// Blocks until every command submitted so far has been attempted.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Message::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.recv();
    }

    pub fn drain_failures(&self) -> Vec<SyncFailure> {
        self.failures.try_iter().collect()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            applied: self.counters.applied.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("sync worker panicked");
            }
        }
    }
}

fn run_worker(
    gateway: Arc<dyn Gateway>,
    rx: Receiver<Message>,
    failures: Sender<SyncFailure>,
    counters: Arc<Counters>,
) {
    for message in rx {
        match message {
            Message::Apply(command) => match command.apply(gateway.as_ref()) {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::SeqCst);
                    tracing::trace!(kind = command.kind(), subject = %command.subject(), "remote write applied");
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(
                        ?err,
                        kind = command.kind(),
                        subject = %command.subject(),
                        "remote write failed; local state kept"
                    );
                    let _ = failures.send(SyncFailure {
                        kind: command.kind(),
                        subject: command.subject(),
                        message: format!("{err:#}"),
                        occurred_at: OffsetDateTime::now_utc(),
                    });
                }
            },
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
            Message::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[test]
    fn commands_apply_in_order() -> anyhow::Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        let queue = SyncQueue::spawn(gateway.clone())?;
        let folder = Folder::new("folder-a".into(), "A", None);
        queue.submit(SyncCommand::InsertFolders(vec![folder]));
        queue.submit(SyncCommand::UpdateFolder {
            id: "folder-a".into(),
            patch: FolderPatch {
                title: Some("Renamed".into()),
                ..FolderPatch::default()
            },
        });
        queue.flush();

        assert_eq!(gateway.folder(&"folder-a".into()).unwrap().title, "Renamed");
        assert_eq!(queue.stats(), SyncStats { applied: 2, failed: 0 });
        Ok(())
    }

    #[test]
    fn failures_are_reported_once_and_not_retried() -> anyhow::Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_fail_writes(true);
        let queue = SyncQueue::spawn(gateway.clone())?;
        queue.submit(SyncCommand::DeleteDocument("doc-1".into()));
        queue.flush();

        let failures = queue.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, "delete_document");
        assert_eq!(failures[0].subject, "doc-1");
        assert_eq!(gateway.failed_writes(), 1);
        assert!(queue.drain_failures().is_empty());
        Ok(())
    }
}
