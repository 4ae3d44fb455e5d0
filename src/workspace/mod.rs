//! Operation handlers over the hierarchy store.
//!
//! Every mutating handler follows the same steps: check the session, validate,
//! mutate the store, queue a notice, then hand the remote write to the sync
//! queue. A validation error means nothing changed and nothing was sent.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;

use crate::config::{FailurePolicy, SyncOptions};
use crate::editor::EditorState;
use crate::error::{OpError, OpResult};
use crate::gateway::{ChangeEvent, Gateway, Table};
use crate::model::{DocId, Document, FolderId};
use crate::query::{self, TreeRow};
use crate::session::{Capabilities, Session};
use crate::store::HierarchyStore;
use crate::sync::{SyncCommand, SyncFailure, SyncQueue, SyncStats};
use crate::ui_state::{ExpandedFolders, UiStateStore};

mod editing;
mod ops;

pub use editing::DocumentView;
pub use ops::{PendingDelete, Target};

#[derive(Debug, Clone)]
pub enum Notice {
    Toast(String),
    SyncFailed(SyncFailure),
}

pub struct Workspace {
    gateway: Arc<dyn Gateway>,
    store: HierarchyStore,
    sync: SyncQueue,
    session: Session,
    active_folder: Option<FolderId>,
    active_doc: Option<DocId>,
    search_query: String,
    editor: EditorState,
    expanded: ExpandedFolders,
    ui_state: UiStateStore,
    notices: VecDeque<Notice>,
    on_failure: FailurePolicy,
    remote_events: Receiver<ChangeEvent>,
}

impl Workspace {
    pub fn open(
        gateway: Arc<dyn Gateway>,
        session: Session,
        ui_state: UiStateStore,
        options: &SyncOptions,
    ) -> Result<Self> {
        let store = HierarchyStore::load(gateway.as_ref()).context("loading workspace")?;
        let remote_events = gateway.subscribe(&[Table::Folders, Table::Docs]);
        let sync = SyncQueue::spawn(Arc::clone(&gateway))?;
        let expanded = ExpandedFolders::load(&ui_state, &store);
        let active_folder = store.first_folder().map(|f| f.id.clone());

        let mut workspace = Self {
            gateway,
            store,
            sync,
            session,
            active_folder,
            active_doc: None,
            search_query: String::new(),
            editor: EditorState::default(),
            expanded,
            ui_state,
            notices: VecDeque::new(),
            on_failure: options.on_failure,
            remote_events,
        };
        workspace.ensure_active_document();
        tracing::info!(
            user = workspace.session.user().unwrap_or("anonymous"),
            "workspace opened"
        );
        Ok(workspace)
    }

    pub fn store(&self) -> &HierarchyStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn active_folder(&self) -> Option<&FolderId> {
        self.active_folder.as_ref()
    }

    pub fn active_document(&self) -> Option<&DocId> {
        self.active_doc.as_ref()
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn expanded(&self) -> &ExpandedFolders {
        &self.expanded
    }

    /// The document list as the user currently sees it.
    pub fn visible_documents(&self) -> Vec<&Document> {
        query::visible_documents(
            &self.store,
            self.active_folder.as_ref(),
            &self.search_query,
            &self.session,
        )
    }

    pub fn tree_rows(&self) -> Vec<TreeRow> {
        query::tree_rows(
            &self.store,
            |id| self.expanded.is_expanded(id),
            self.active_folder.as_ref(),
        )
    }

    pub fn select_folder(&mut self, id: &FolderId) -> OpResult<()> {
        if self.store.folder(id).is_none() {
            return Err(OpError::FolderNotFound(id.clone()));
        }
        self.editor.discard("folder selected");
        self.search_query.clear();
        self.active_folder = Some(id.clone());
        self.ensure_active_document();
        Ok(())
    }

    pub fn select_document(&mut self, id: &DocId) -> OpResult<()> {
        let visible = self
            .store
            .document(id)
            .map(|doc| !doc.is_hidden || self.session.can(Capabilities::READ_HIDDEN))
            .unwrap_or(false);
        if !visible {
            return Err(OpError::DocumentNotFound(id.clone()));
        }
        self.editor.discard("document selected");
        self.active_doc = Some(id.clone());
        Ok(())
    }

    /// A non-empty query switches the list from folder scope to global search.
    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    /// Flips a folder open or closed and persists the set. Returns the new state.
    pub fn toggle_expanded(&mut self, id: &FolderId) -> Result<bool> {
        let expanded = self.expanded.toggle(id);
        self.expanded.save(&mut self.ui_state)?;
        Ok(expanded)
    }

    /// Picks the first document directly inside the active folder when none is
    /// selected.
    fn ensure_active_document(&mut self) {
        if self.active_doc.is_some() {
            return;
        }
        let Some(folder) = &self.active_folder else {
            return;
        };
        let show_hidden = self.session.can(Capabilities::READ_HIDDEN);
        self.active_doc = self
            .store
            .document_ids_in(folder)
            .iter()
            .filter_map(|id| self.store.document(id))
            .find(|doc| show_hidden || !doc.is_hidden)
            .map(|doc| doc.id.clone());
    }

    fn require(&self, capability: Capabilities) -> OpResult<()> {
        if self.session.can(capability) {
            Ok(())
        } else {
            Err(OpError::Unauthorized)
        }
    }

    fn toast(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "notice");
        self.notices.push_back(Notice::Toast(message));
    }

    fn persist_expanded(&mut self) {
        if let Err(err) = self.expanded.save(&mut self.ui_state) {
            tracing::warn!(?err, "failed to persist expanded folders");
        }
    }

    fn submit(&self, command: SyncCommand) {
        self.sync.submit(command);
    }

    /// Applies pending change-feed events from other clients. Only inserts of
    /// unknown ids and deletes of known ids change anything.
    pub fn apply_remote_events(&mut self) -> usize {
        let events: Vec<ChangeEvent> = self.remote_events.try_iter().collect();
        let mut applied = 0;
        for event in events {
            if self.apply_remote_event(event) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_remote_event(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::FolderInserted(folder) => {
                if self.store.folder(&folder.id).is_some() {
                    return false;
                }
                let id = folder.id.clone();
                match self.store.insert_folder(folder) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(%err, folder = %id, "ignoring remote folder insert");
                        false
                    }
                }
            }
            ChangeEvent::DocumentInserted(doc) => {
                if self.store.document(&doc.id).is_some() {
                    return false;
                }
                let id = doc.id.clone();
                match self.store.insert_document(doc) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(%err, doc = %id, "ignoring remote document insert");
                        false
                    }
                }
            }
            ChangeEvent::FolderDeleted(id) => {
                if self.store.folder(&id).is_none() {
                    return false;
                }
                match self.store.remove_folder(&id) {
                    Ok(_) => {
                        self.after_folder_removed(&id);
                        true
                    }
                    Err(err) => {
                        tracing::warn!(%err, folder = %id, "ignoring remote folder delete");
                        false
                    }
                }
            }
            ChangeEvent::DocumentDeleted(id) => {
                if self.store.remove_document(&id).is_err() {
                    return false;
                }
                self.after_document_removed(&id);
                true
            }
            ChangeEvent::FolderUpdated(folder) => {
                tracing::debug!(folder = %folder.id, "remote folder update ignored");
                false
            }
            ChangeEvent::DocumentUpdated(doc) => {
                tracing::debug!(doc = %doc.id, "remote document update ignored");
                false
            }
        }
    }

    fn after_folder_removed(&mut self, id: &FolderId) {
        if self.expanded.forget(id) {
            self.persist_expanded();
        }
        if self.active_folder.as_ref() == Some(id) {
            self.active_folder = self.store.first_folder().map(|f| f.id.clone());
        }
    }

    fn after_document_removed(&mut self, id: &DocId) {
        if self.active_doc.as_ref() == Some(id) {
            self.active_doc = None;
        }
        if self.editor.editing_doc() == Some(id) {
            self.editor.discard("document deleted");
        }
    }

    /// Moves failures reported by the sync worker into the notice queue when
    /// configured to. Returns how many failures were seen.
    pub fn poll_sync_failures(&mut self) -> usize {
        let failures = self.sync.drain_failures();
        let seen = failures.len();
        if self.on_failure == FailurePolicy::Notify {
            self.notices
                .extend(failures.into_iter().map(Notice::SyncFailed));
        }
        seen
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.poll_sync_failures();
        self.notices.drain(..).collect()
    }

    /// Waits until every queued remote write has been attempted.
    pub fn flush(&self) {
        self.sync.flush();
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Wipes both remote tables and reloads, which re-seeds the defaults.
    /// The caller is responsible for asking first.
    pub fn reset_workspace(&mut self) -> Result<()> {
        self.require(Capabilities::WRITE)?;
        self.sync.flush();
        let docs = self
            .gateway
            .delete_all(Table::Docs)
            .context("clearing documents")?;
        let folders = self
            .gateway
            .delete_all(Table::Folders)
            .context("clearing folders")?;
        tracing::info!(folders, docs, "workspace cleared");

        self.store = HierarchyStore::load(self.gateway.as_ref()).context("reloading workspace")?;
        self.remote_events.try_iter().for_each(drop);
        self.editor.discard("workspace reset");
        self.search_query.clear();
        self.active_folder = self.store.first_folder().map(|f| f.id.clone());
        self.active_doc = None;
        self.ensure_active_document();
        self.expanded = ExpandedFolders::all(&self.store);
        self.persist_expanded();
        self.toast("Workspace has been reset to default.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::model::Folder;

    pub fn folder(id: &str, parent: Option<&str>) -> Folder {
        Folder::new(id.into(), id, parent.map(FolderId::from))
    }

    pub fn doc(id: &str, parent: &str) -> Document {
        Document::new(id.into(), parent.into(), id)
    }

    pub fn open(gateway: &Arc<MemoryGateway>, session: Session) -> Workspace {
        open_with(gateway, session, FailurePolicy::Log)
    }

    pub fn open_with(
        gateway: &Arc<MemoryGateway>,
        session: Session,
        on_failure: FailurePolicy,
    ) -> Workspace {
        Workspace::open(
            gateway.clone(),
            session,
            UiStateStore::in_memory(),
            &SyncOptions { on_failure },
        )
        .expect("open workspace")
    }

    pub fn admin() -> Session {
        Session::authenticated("admin")
    }
}
