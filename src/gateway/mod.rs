//! Remote data gateway: the system of record behind the hierarchy store.
//!
//! Any backend offering row CRUD per table, a change feed and blob storage
//! can stand behind [`Gateway`]. The workspace only ever talks to the trait.

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use strum::{Display, EnumString, IntoStaticStr};

use crate::model::{Attachment, DocId, Document, Folder, FolderId};

pub mod memory;
mod schema;
pub mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Folders,
    Docs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    FolderInserted(Folder),
    FolderUpdated(Folder),
    FolderDeleted(FolderId),
    DocumentInserted(Document),
    DocumentUpdated(Document),
    DocumentDeleted(DocId),
}

impl ChangeEvent {
    pub fn table(&self) -> Table {
        match self {
            ChangeEvent::FolderInserted(_)
            | ChangeEvent::FolderUpdated(_)
            | ChangeEvent::FolderDeleted(_) => Table::Folders,
            ChangeEvent::DocumentInserted(_)
            | ChangeEvent::DocumentUpdated(_)
            | ChangeEvent::DocumentDeleted(_) => Table::Docs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderPatch {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<Option<FolderId>>,
    pub sort_order: Option<i64>,
}

impl FolderPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, folder: &mut Folder) {
        if let Some(title) = &self.title {
            folder.title = title.clone();
        }
        if let Some(icon) = &self.icon {
            folder.icon = icon.clone();
        }
        if let Some(color) = &self.color {
            folder.color = color.clone();
        }
        if let Some(parent) = &self.parent_id {
            folder.parent_id = parent.clone();
        }
        if let Some(order) = self.sort_order {
            folder.sort_order = order;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<FolderId>,
    pub is_locked: Option<bool>,
    pub is_hidden: Option<bool>,
    pub attachments: Option<Vec<Attachment>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, doc: &mut Document) {
        if let Some(title) = &self.title {
            doc.title = title.clone();
        }
        if let Some(content) = &self.content {
            doc.content = content.clone();
        }
        if let Some(date) = &self.date {
            doc.date = date.clone();
        }
        if let Some(icon) = &self.icon {
            doc.icon = Some(icon.clone());
        }
        if let Some(color) = &self.color {
            doc.color = Some(color.clone());
        }
        if let Some(parent) = &self.parent_id {
            doc.parent_id = parent.clone();
        }
        if let Some(locked) = self.is_locked {
            doc.is_locked = locked;
        }
        if let Some(hidden) = self.is_hidden {
            doc.is_hidden = hidden;
        }
        if let Some(attachments) = &self.attachments {
            doc.attachments = attachments.clone();
        }
    }
}

pub trait Gateway: Send + Sync {
    /// All folders, oldest first.
    fn select_folders(&self) -> Result<Vec<Folder>>;
    /// All documents, oldest first.
    fn select_documents(&self) -> Result<Vec<Document>>;
    fn insert_folders(&self, rows: &[Folder]) -> Result<()>;
    fn insert_documents(&self, rows: &[Document]) -> Result<()>;
    fn update_folder(&self, id: &FolderId, patch: &FolderPatch) -> Result<()>;
    fn update_document(&self, id: &DocId, patch: &DocumentPatch) -> Result<()>;
    /// Writes every `(id, sort_order)` pair as a single batch.
    fn update_sort_orders(&self, orders: &[(FolderId, i64)]) -> Result<()>;
    fn delete_folder(&self, id: &FolderId) -> Result<()>;
    fn delete_document(&self, id: &DocId) -> Result<()>;
    /// Removes every row of `table`, returning how many went.
    fn delete_all(&self, table: Table) -> Result<usize>;
    /// One receiver for every listed table, in publish order across tables.
    fn subscribe(&self, tables: &[Table]) -> Receiver<ChangeEvent>;
    fn upload_blob(&self, key: &str, bytes: &[u8], mime: Option<&str>) -> Result<()>;
    fn public_url(&self, key: &str) -> String;
}

/// Fan-out of change events to every live subscriber of a table.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<(Vec<Table>, Sender<ChangeEvent>)>>,
}

impl ChangeFeed {
    pub fn subscribe(&self, tables: &[Table]) -> Receiver<ChangeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push((tables.to_vec(), tx));
        rx
    }

    pub fn publish(&self, event: ChangeEvent) {
        let table = event.table();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(subscribed, tx)| {
            if !subscribed.contains(&table) {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
