use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use crossbeam_channel::Receiver;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{ChangeEvent, ChangeFeed, DocumentPatch, FolderPatch, Gateway, Table};
use crate::model::{DocId, Document, Folder, FolderId};

/// Counters for every write the gateway has accepted or refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub folder_insert_batches: usize,
    pub doc_insert_batches: usize,
    pub updates: usize,
    pub sort_order_batches: usize,
    pub deletes: usize,
    pub uploads: usize,
}

#[derive(Debug, Default)]
struct Tables {
    folders: IndexMap<FolderId, Folder>,
    docs: IndexMap<DocId, Document>,
    blobs: HashMap<String, (Vec<u8>, Option<String>)>,
    counts: CallCounts,
}

/// In-process backend. Writes can be made to fail on demand, which is how the
/// no-rollback policy gets exercised.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
    feed: ChangeFeed,
    fail_writes: AtomicBool,
    failed_writes: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(folders: Vec<Folder>, docs: Vec<Document>) -> Self {
        let gateway = Self::default();
        {
            let mut tables = gateway.tables.lock();
            tables.folders = folders.into_iter().map(|f| (f.id.clone(), f)).collect();
            tables.docs = docs.into_iter().map(|d| (d.id.clone(), d)).collect();
        }
        gateway
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> CallCounts {
        self.tables.lock().counts
    }

    pub fn folder(&self, id: &FolderId) -> Option<Folder> {
        self.tables.lock().folders.get(id).cloned()
    }

    pub fn document(&self, id: &DocId) -> Option<Document> {
        self.tables.lock().docs.get(id).cloned()
    }

    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.tables.lock().blobs.get(key).map(|(bytes, _)| bytes.clone())
    }

    /// Simulates a write made by another client: stored and broadcast.
    pub fn inject(&self, event: ChangeEvent) {
        {
            let mut tables = self.tables.lock();
            match &event {
                ChangeEvent::FolderInserted(f) | ChangeEvent::FolderUpdated(f) => {
                    tables.folders.insert(f.id.clone(), f.clone());
                }
                ChangeEvent::FolderDeleted(id) => {
                    tables.folders.shift_remove(id);
                }
                ChangeEvent::DocumentInserted(d) | ChangeEvent::DocumentUpdated(d) => {
                    tables.docs.insert(d.id.clone(), d.clone());
                }
                ChangeEvent::DocumentDeleted(id) => {
                    tables.docs.shift_remove(id);
                }
            }
        }
        self.feed.publish(event);
    }

    fn check_writable(&self, what: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            bail!("remote unavailable: {what} rejected");
        }
        Ok(())
    }
}

impl Gateway for MemoryGateway {
    fn select_folders(&self) -> Result<Vec<Folder>> {
        let tables = self.tables.lock();
        let mut rows: Vec<Folder> = tables.folders.values().cloned().collect();
        rows.sort_by_key(|f| f.created_at);
        Ok(rows)
    }

    fn select_documents(&self) -> Result<Vec<Document>> {
        let tables = self.tables.lock();
        let mut rows: Vec<Document> = tables.docs.values().cloned().collect();
        rows.sort_by_key(|d| d.created_at);
        Ok(rows)
    }

    fn insert_folders(&self, rows: &[Folder]) -> Result<()> {
        self.check_writable("folder insert")?;
        {
            let mut tables = self.tables.lock();
            if let Some(dup) = rows.iter().find(|f| tables.folders.contains_key(&f.id)) {
                bail!("duplicate folder id {}", dup.id);
            }
            for folder in rows {
                tables.folders.insert(folder.id.clone(), folder.clone());
            }
            tables.counts.folder_insert_batches += 1;
        }
        for folder in rows {
            self.feed.publish(ChangeEvent::FolderInserted(folder.clone()));
        }
        Ok(())
    }

    fn insert_documents(&self, rows: &[Document]) -> Result<()> {
        self.check_writable("document insert")?;
        {
            let mut tables = self.tables.lock();
            if let Some(dup) = rows.iter().find(|d| tables.docs.contains_key(&d.id)) {
                bail!("duplicate document id {}", dup.id);
            }
            for doc in rows {
                tables.docs.insert(doc.id.clone(), doc.clone());
            }
            tables.counts.doc_insert_batches += 1;
        }
        for doc in rows {
            self.feed.publish(ChangeEvent::DocumentInserted(doc.clone()));
        }
        Ok(())
    }

    fn update_folder(&self, id: &FolderId, patch: &FolderPatch) -> Result<()> {
        self.check_writable("folder update")?;
        let updated = {
            let mut tables = self.tables.lock();
            tables.counts.updates += 1;
            let Some(folder) = tables.folders.get_mut(id) else {
                bail!("folder {id} not found");
            };
            patch.apply(folder);
            folder.clone()
        };
        self.feed.publish(ChangeEvent::FolderUpdated(updated));
        Ok(())
    }

    fn update_document(&self, id: &DocId, patch: &DocumentPatch) -> Result<()> {
        self.check_writable("document update")?;
        let updated = {
            let mut tables = self.tables.lock();
            tables.counts.updates += 1;
            let Some(doc) = tables.docs.get_mut(id) else {
                bail!("document {id} not found");
            };
            patch.apply(doc);
            doc.clone()
        };
        self.feed.publish(ChangeEvent::DocumentUpdated(updated));
        Ok(())
    }

    fn update_sort_orders(&self, orders: &[(FolderId, i64)]) -> Result<()> {
        self.check_writable("sort order batch")?;
        let updated = {
            let mut tables = self.tables.lock();
            if let Some((missing, _)) = orders.iter().find(|(id, _)| !tables.folders.contains_key(id)) {
                bail!("folder {missing} not found");
            }
            tables.counts.sort_order_batches += 1;
            let mut updated = Vec::with_capacity(orders.len());
            for (id, order) in orders {
                if let Some(folder) = tables.folders.get_mut(id) {
                    folder.sort_order = *order;
                    updated.push(folder.clone());
                }
            }
            updated
        };
        for folder in updated {
            self.feed.publish(ChangeEvent::FolderUpdated(folder));
        }
        Ok(())
    }

    fn delete_folder(&self, id: &FolderId) -> Result<()> {
        self.check_writable("folder delete")?;
        let removed = {
            let mut tables = self.tables.lock();
            tables.counts.deletes += 1;
            tables.folders.shift_remove(id).is_some()
        };
        if removed {
            self.feed.publish(ChangeEvent::FolderDeleted(id.clone()));
        }
        Ok(())
    }

    fn delete_document(&self, id: &DocId) -> Result<()> {
        self.check_writable("document delete")?;
        let removed = {
            let mut tables = self.tables.lock();
            tables.counts.deletes += 1;
            tables.docs.shift_remove(id).is_some()
        };
        if removed {
            self.feed.publish(ChangeEvent::DocumentDeleted(id.clone()));
        }
        Ok(())
    }

    fn delete_all(&self, table: Table) -> Result<usize> {
        self.check_writable("bulk delete")?;
        let mut tables = self.tables.lock();
        let removed = match table {
            Table::Folders => std::mem::take(&mut tables.folders).len(),
            Table::Docs => std::mem::take(&mut tables.docs).len(),
        };
        Ok(removed)
    }

    fn subscribe(&self, tables: &[Table]) -> Receiver<ChangeEvent> {
        self.feed.subscribe(tables)
    }

    fn upload_blob(&self, key: &str, bytes: &[u8], mime: Option<&str>) -> Result<()> {
        self.check_writable("blob upload")?;
        let mut tables = self.tables.lock();
        tables.counts.uploads += 1;
        tables
            .blobs
            .insert(key.to_owned(), (bytes.to_vec(), mime.map(str::to_owned)));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://blobs/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_writes_leave_tables_untouched() -> anyhow::Result<()> {
        let gateway = MemoryGateway::new();
        gateway.set_fail_writes(true);
        let folder = Folder::new("folder-a".into(), "A", None);
        assert!(gateway.insert_folders(&[folder.clone()]).is_err());
        assert_eq!(gateway.failed_writes(), 1);
        assert!(gateway.select_folders()?.is_empty());

        gateway.set_fail_writes(false);
        gateway.insert_folders(&[folder])?;
        assert_eq!(gateway.counts().folder_insert_batches, 1);
        Ok(())
    }

    #[test]
    fn injected_events_reach_subscribers() {
        let gateway = MemoryGateway::new();
        let rx = gateway.subscribe(&[Table::Docs]);
        let doc = Document::new("doc-x".into(), "folder-a".into(), "Remote");
        gateway.inject(ChangeEvent::DocumentInserted(doc.clone()));
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::DocumentInserted(doc.clone()));
        assert_eq!(gateway.document(&doc.id), Some(doc));
    }
}
