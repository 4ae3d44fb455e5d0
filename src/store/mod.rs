//! In-memory hierarchy of folders and documents for the current session.
//!
//! Entities live in insertion-ordered arenas keyed by id. Child lists are kept
//! per parent and updated on every insert, removal and reparent, so traversal
//! touches only the fan-out of the node being expanded.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use indexmap::IndexMap;

use crate::error::{OpError, OpResult};
use crate::gateway::{DocumentPatch, FolderPatch, Gateway};
use crate::model::{DocId, Document, Folder, FolderId};

mod seed;

pub use seed::{seed_documents, seed_folders};

#[derive(Debug, Clone, Default)]
pub struct HierarchyStore {
    folders: IndexMap<FolderId, Folder>,
    docs: IndexMap<DocId, Document>,
    child_folders: HashMap<Option<FolderId>, Vec<FolderId>>,
    folder_docs: HashMap<FolderId, Vec<DocId>>,
}

impl HierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches both tables. An empty backend gets the default seed, written
    /// as one insert batch per table before the store is built.
    pub fn load(gateway: &dyn Gateway) -> Result<Self> {
        let folders = gateway.select_folders().context("fetching folders")?;
        let docs = gateway.select_documents().context("fetching documents")?;
        if folders.is_empty() && docs.is_empty() {
            tracing::info!("empty workspace, seeding default folders and documents");
            let folders = seed_folders();
            let docs = seed_documents();
            gateway
                .insert_folders(&folders)
                .context("persisting seed folders")?;
            gateway
                .insert_documents(&docs)
                .context("persisting seed documents")?;
            return Ok(Self::from_rows(folders, docs));
        }
        let store = Self::from_rows(folders, docs);
        tracing::info!(
            folders = store.folder_count(),
            documents = store.document_count(),
            "workspace loaded"
        );
        Ok(store)
    }

    /// Builds the store from fetched rows, keeping fetch order. Rows that break
    /// the hierarchy (dangling parents, third-level folders) are left out of the
    /// session view and logged; they stay untouched remotely.
    pub fn from_rows(folders: Vec<Folder>, docs: Vec<Document>) -> Self {
        let mut store = Self::default();
        let roots: HashSet<FolderId> = folders
            .iter()
            .filter(|f| f.is_root())
            .map(|f| f.id.clone())
            .collect();

        for folder in folders {
            if let Some(parent) = &folder.parent_id {
                if !roots.contains(parent) || *parent == folder.id {
                    tracing::warn!(folder = %folder.id, parent = %parent, "skipping folder outside the two-level hierarchy");
                    continue;
                }
            }
            if store.folders.contains_key(&folder.id) {
                tracing::warn!(folder = %folder.id, "skipping duplicate folder row");
                continue;
            }
            store.index_folder(&folder);
            store.folders.insert(folder.id.clone(), folder);
        }

        for doc in docs {
            if !store.folders.contains_key(&doc.parent_id) {
                tracing::warn!(doc = %doc.id, parent = %doc.parent_id, "skipping document without a folder");
                continue;
            }
            if store.docs.contains_key(&doc.id) {
                tracing::warn!(doc = %doc.id, "skipping duplicate document row");
                continue;
            }
            store.index_document(&doc);
            store.docs.insert(doc.id.clone(), doc);
        }
        store
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn document(&self, id: &DocId) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    pub fn first_folder(&self) -> Option<&Folder> {
        self.folders.first().map(|(_, folder)| folder)
    }

    /// Position of the folder in fetch/insertion order.
    pub fn folder_position(&self, id: &FolderId) -> Option<usize> {
        self.folders.get_index_of(id)
    }

    pub fn document_position(&self, id: &DocId) -> Option<usize> {
        self.docs.get_index_of(id)
    }

    pub fn child_folder_ids(&self, parent: Option<&FolderId>) -> &[FolderId] {
        self.child_folders
            .get(&parent.cloned())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn document_ids_in(&self, folder: &FolderId) -> &[DocId] {
        self.folder_docs
            .get(folder)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn max_sort_order(&self) -> Option<i64> {
        self.folders.values().map(|f| f.sort_order).max()
    }

    pub fn insert_folder(&mut self, folder: Folder) -> OpResult<()> {
        if self.folders.contains_key(&folder.id) {
            return Err(OpError::DuplicateFolder(folder.id));
        }
        if let Some(parent) = &folder.parent_id {
            self.ensure_root_destination(parent)?;
        }
        self.index_folder(&folder);
        self.folders.insert(folder.id.clone(), folder);
        Ok(())
    }

    pub fn insert_document(&mut self, doc: Document) -> OpResult<()> {
        if self.docs.contains_key(&doc.id) {
            return Err(OpError::DuplicateDocument(doc.id));
        }
        if !self.folders.contains_key(&doc.parent_id) {
            return Err(OpError::FolderNotFound(doc.parent_id));
        }
        self.index_document(&doc);
        self.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Removes an empty folder. Any direct child blocks the removal.
    pub fn remove_folder(&mut self, id: &FolderId) -> OpResult<Folder> {
        if !self.folders.contains_key(id) {
            return Err(OpError::FolderNotFound(id.clone()));
        }
        let documents = self.document_ids_in(id).len();
        let folders = self.child_folder_ids(Some(id)).len();
        if documents > 0 || folders > 0 {
            return Err(OpError::FolderNotEmpty { documents, folders });
        }
        let folder = self
            .folders
            .shift_remove(id)
            .ok_or_else(|| OpError::FolderNotFound(id.clone()))?;
        self.unindex_folder(&folder);
        self.folder_docs.remove(id);
        self.child_folders.remove(&Some(id.clone()));
        Ok(folder)
    }

    pub fn remove_document(&mut self, id: &DocId) -> OpResult<Document> {
        let doc = self
            .docs
            .shift_remove(id)
            .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?;
        self.unindex_document(&doc);
        Ok(doc)
    }

    /// Checks a reparent without applying it.
    pub fn validate_folder_move(&self, id: &FolderId, destination: &FolderId) -> OpResult<()> {
        if id == destination {
            return Err(OpError::MoveIntoSelf);
        }
        if !self.folders.contains_key(id) {
            return Err(OpError::FolderNotFound(id.clone()));
        }
        self.ensure_root_destination(destination)?;
        if !self.child_folder_ids(Some(id)).is_empty() {
            return Err(OpError::WouldExceedDepth(id.clone()));
        }
        Ok(())
    }

    pub fn apply_folder_patch(&mut self, id: &FolderId, patch: &FolderPatch) -> OpResult<()> {
        let current_parent = self
            .folders
            .get(id)
            .map(|f| f.parent_id.clone())
            .ok_or_else(|| OpError::FolderNotFound(id.clone()))?;
        let reparent = match &patch.parent_id {
            Some(new_parent) if *new_parent != current_parent => {
                if let Some(destination) = new_parent {
                    self.validate_folder_move(id, destination)?;
                }
                Some(new_parent.clone())
            }
            _ => None,
        };

        if let Some(new_parent) = &reparent {
            if let Some(siblings) = self.child_folders.get_mut(&current_parent) {
                siblings.retain(|sibling| sibling != id);
            }
            self.child_folders
                .entry(new_parent.clone())
                .or_default()
                .push(id.clone());
        }
        if let Some(folder) = self.folders.get_mut(id) {
            patch.apply(folder);
        }
        Ok(())
    }

    pub fn apply_document_patch(&mut self, id: &DocId, patch: &DocumentPatch) -> OpResult<()> {
        let current_parent = self
            .docs
            .get(id)
            .map(|d| d.parent_id.clone())
            .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?;
        if let Some(new_parent) = &patch.parent_id {
            if *new_parent != current_parent {
                if !self.folders.contains_key(new_parent) {
                    return Err(OpError::FolderNotFound(new_parent.clone()));
                }
                if let Some(siblings) = self.folder_docs.get_mut(&current_parent) {
                    siblings.retain(|sibling| sibling != id);
                }
                self.folder_docs
                    .entry(new_parent.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        if let Some(doc) = self.docs.get_mut(id) {
            patch.apply(doc);
        }
        Ok(())
    }

    /// Replaces the sort order of every folder listed and rearranges the arena
    /// to the given order. Folders not listed keep their values and trail.
    pub fn assign_sort_orders(&mut self, order: &[FolderId]) -> Vec<(FolderId, i64)> {
        let mut assigned = Vec::with_capacity(order.len());
        for (idx, id) in order.iter().enumerate() {
            if let Some(folder) = self.folders.get_mut(id) {
                folder.sort_order = idx as i64;
                assigned.push((id.clone(), idx as i64));
            }
        }
        let mut rearranged = IndexMap::with_capacity(self.folders.len());
        for id in order {
            if let Some(folder) = self.folders.shift_remove(id) {
                rearranged.insert(id.clone(), folder);
            }
        }
        rearranged.extend(self.folders.drain(..));
        self.folders = rearranged;
        self.rebuild_folder_index();
        assigned
    }

    fn ensure_root_destination(&self, parent: &FolderId) -> OpResult<()> {
        match self.folders.get(parent) {
            None => Err(OpError::FolderNotFound(parent.clone())),
            Some(folder) if !folder.is_root() => Err(OpError::DestinationNotRoot(parent.clone())),
            Some(_) => Ok(()),
        }
    }

    fn index_folder(&mut self, folder: &Folder) {
        self.child_folders
            .entry(folder.parent_id.clone())
            .or_default()
            .push(folder.id.clone());
    }

    fn unindex_folder(&mut self, folder: &Folder) {
        if let Some(siblings) = self.child_folders.get_mut(&folder.parent_id) {
            siblings.retain(|sibling| *sibling != folder.id);
        }
    }

    fn rebuild_folder_index(&mut self) {
        self.child_folders.clear();
        let entries: Vec<(Option<FolderId>, FolderId)> = self
            .folders
            .values()
            .map(|f| (f.parent_id.clone(), f.id.clone()))
            .collect();
        for (parent, id) in entries {
            self.child_folders.entry(parent).or_default().push(id);
        }
    }

    fn index_document(&mut self, doc: &Document) {
        self.folder_docs
            .entry(doc.parent_id.clone())
            .or_default()
            .push(doc.id.clone());
    }

    fn unindex_document(&mut self, doc: &Document) {
        if let Some(siblings) = self.folder_docs.get_mut(&doc.parent_id) {
            siblings.retain(|sibling| *sibling != doc.id);
        }
    }

    /// Every folder either is a root or hangs off a root.
    pub fn depth_invariant_holds(&self) -> bool {
        self.folders.values().all(|folder| match &folder.parent_id {
            None => true,
            Some(parent) => self
                .folders
                .get(parent)
                .map(Folder::is_root)
                .unwrap_or(false),
        })
    }
}
