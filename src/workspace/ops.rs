use time::OffsetDateTime;

use super::Workspace;
use crate::error::{OpError, OpResult};
use crate::gateway::{DocumentPatch, FolderPatch};
use crate::model::{
    new_doc_id, new_folder_id, Appearance, DocId, Document, Folder, FolderId, COPY_SUFFIX,
};
use crate::query::child_folders_of;
use crate::session::Capabilities;
use crate::sync::SyncCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Folder(FolderId),
    Document(DocId),
}

/// A validated delete waiting for the user to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    target: Target,
    title: String,
}

impl PendingDelete {
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn prompt(&self) -> String {
        match self.target {
            Target::Folder(_) => format!("Delete folder \"{}\"?", self.title),
            Target::Document(_) => {
                format!("Delete \"{}\"? This cannot be undone.", self.title)
            }
        }
    }
}

fn trimmed_name(raw: &str) -> OpResult<&str> {
    let name = raw.trim();
    if name.is_empty() {
        Err(OpError::EmptyName)
    } else {
        Ok(name)
    }
}

impl Workspace {
    /// Creates a folder at the end of the sort order and makes it active.
    pub fn create_folder(&mut self, name: &str, parent: Option<&FolderId>) -> OpResult<FolderId> {
        self.require(Capabilities::WRITE)?;
        let title = trimmed_name(name)?;
        let mut folder = Folder::new(new_folder_id(), title, parent.cloned());
        folder.sort_order = self.store.max_sort_order().map_or(0, |max| max + 1);
        let id = folder.id.clone();
        self.store.insert_folder(folder.clone())?;

        self.active_folder = Some(id.clone());
        if let Some(parent) = parent {
            if self.expanded.expand(parent) {
                self.persist_expanded();
            }
        }
        self.toast(format!("Folder \"{title}\" created!"));
        self.submit(SyncCommand::InsertFolders(vec![folder]));
        Ok(id)
    }

    /// Creates a document in the active folder and opens it for editing.
    pub fn create_document(&mut self, title: &str) -> OpResult<DocId> {
        self.require(Capabilities::WRITE)?;
        let title = trimmed_name(title)?;
        let folder = self.active_folder.clone().ok_or(OpError::NoActiveFolder)?;
        let doc = Document::new(new_doc_id(), folder, title);
        let id = doc.id.clone();
        self.store.insert_document(doc.clone())?;

        self.active_doc = Some(id.clone());
        self.editor.start(&doc);
        self.toast(format!("Note \"{title}\" created!"));
        self.submit(SyncCommand::InsertDocuments(vec![doc]));
        Ok(id)
    }

    pub fn rename(&mut self, target: &Target, appearance: Appearance) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let title = trimmed_name(&appearance.title)?.to_owned();
        match target {
            Target::Folder(id) => {
                let patch = FolderPatch {
                    title: Some(title.clone()),
                    icon: appearance.icon,
                    color: appearance.color,
                    ..FolderPatch::default()
                };
                self.store.apply_folder_patch(id, &patch)?;
                self.submit(SyncCommand::UpdateFolder {
                    id: id.clone(),
                    patch,
                });
            }
            Target::Document(id) => {
                let patch = DocumentPatch {
                    title: Some(title.clone()),
                    icon: appearance.icon,
                    color: appearance.color,
                    ..DocumentPatch::default()
                };
                self.store.apply_document_patch(id, &patch)?;
                self.submit(SyncCommand::UpdateDocument {
                    id: id.clone(),
                    patch,
                });
            }
        }
        self.toast(format!("Renamed to \"{title}\""));
        Ok(())
    }

    /// Copies a single row under a fresh id. A folder copy does not bring its
    /// documents or subfolders along.
    pub fn duplicate(&mut self, target: &Target) -> OpResult<Target> {
        self.require(Capabilities::WRITE)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        match target {
            Target::Folder(id) => {
                let original = self
                    .store
                    .folder(id)
                    .ok_or_else(|| OpError::FolderNotFound(id.clone()))?;
                let source_title = original.title.clone();
                let mut copy = original.clone();
                copy.id = new_folder_id();
                copy.title = format!("{source_title}{COPY_SUFFIX}");
                copy.created_at = now;
                let copy_id = copy.id.clone();
                self.store.insert_folder(copy.clone())?;
                self.toast(format!("Duplicated \"{source_title}\""));
                self.submit(SyncCommand::InsertFolders(vec![copy]));
                Ok(Target::Folder(copy_id))
            }
            Target::Document(id) => {
                let original = self
                    .store
                    .document(id)
                    .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?;
                let source_title = original.title.clone();
                let mut copy = original.clone();
                copy.id = new_doc_id();
                copy.title = format!("{source_title}{COPY_SUFFIX}");
                copy.created_at = now;
                let copy_id = copy.id.clone();
                self.store.insert_document(copy.clone())?;
                self.toast(format!("Duplicated \"{source_title}\""));
                self.submit(SyncCommand::InsertDocuments(vec![copy]));
                Ok(Target::Document(copy_id))
            }
        }
    }

    /// Reparents a folder. `None` makes it a root folder; any other
    /// destination must itself be a root.
    pub fn move_folder(&mut self, id: &FolderId, destination: Option<&FolderId>) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let current = self
            .store
            .folder(id)
            .map(|f| f.parent_id.clone())
            .ok_or_else(|| OpError::FolderNotFound(id.clone()))?;
        if let Some(destination) = destination {
            self.store.validate_folder_move(id, destination)?;
        }
        if current.as_ref() == destination {
            return Ok(());
        }
        let patch = FolderPatch {
            parent_id: Some(destination.cloned()),
            ..FolderPatch::default()
        };
        self.store.apply_folder_patch(id, &patch)?;
        if let Some(destination) = destination {
            if self.expanded.expand(destination) {
                self.persist_expanded();
            }
        }
        self.toast("Folder moved");
        self.submit(SyncCommand::UpdateFolder {
            id: id.clone(),
            patch,
        });
        Ok(())
    }

    pub fn move_document(&mut self, id: &DocId, destination: &FolderId) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let current = self
            .store
            .document(id)
            .map(|d| d.parent_id.clone())
            .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?;
        if self.store.folder(destination).is_none() {
            return Err(OpError::FolderNotFound(destination.clone()));
        }
        if current == *destination {
            return Ok(());
        }
        let patch = DocumentPatch {
            parent_id: Some(destination.clone()),
            ..DocumentPatch::default()
        };
        self.store.apply_document_patch(id, &patch)?;
        self.toast("Document moved");
        self.submit(SyncCommand::UpdateDocument {
            id: id.clone(),
            patch,
        });
        Ok(())
    }

    /// First half of a delete. A folder with any direct document or subfolder
    /// is refused here, before any prompt is shown.
    pub fn request_delete(&self, target: &Target) -> OpResult<PendingDelete> {
        self.require(Capabilities::WRITE)?;
        let title = match target {
            Target::Folder(id) => {
                let folder = self
                    .store
                    .folder(id)
                    .ok_or_else(|| OpError::FolderNotFound(id.clone()))?;
                let documents = self.store.document_ids_in(id).len();
                let folders = self.store.child_folder_ids(Some(id)).len();
                if documents > 0 || folders > 0 {
                    return Err(OpError::FolderNotEmpty { documents, folders });
                }
                folder.title.clone()
            }
            Target::Document(id) => self
                .store
                .document(id)
                .map(|doc| doc.title.clone())
                .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?,
        };
        Ok(PendingDelete {
            target: target.clone(),
            title,
        })
    }

    pub fn confirm_delete(&mut self, pending: PendingDelete) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        match pending.target {
            Target::Folder(id) => {
                let folder = self.store.remove_folder(&id)?;
                self.after_folder_removed(&id);
                self.ensure_active_document();
                self.toast(format!("Folder \"{}\" deleted.", folder.title));
                self.submit(SyncCommand::DeleteFolder(id));
            }
            Target::Document(id) => {
                let doc = self.store.remove_document(&id)?;
                self.after_document_removed(&id);
                self.toast(format!("Deleted \"{}\"", doc.title));
                self.submit(SyncCommand::DeleteDocument(id));
            }
        }
        Ok(())
    }

    /// Returns the new locked state.
    pub fn toggle_lock(&mut self, id: &DocId) -> OpResult<bool> {
        self.require(Capabilities::WRITE)?;
        let locked = !self
            .store
            .document(id)
            .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?
            .is_locked;
        let patch = DocumentPatch {
            is_locked: Some(locked),
            ..DocumentPatch::default()
        };
        self.store.apply_document_patch(id, &patch)?;
        self.toast(if locked { "Document locked" } else { "Document unlocked" });
        self.submit(SyncCommand::UpdateDocument {
            id: id.clone(),
            patch,
        });
        Ok(locked)
    }

    /// Returns the new hidden state.
    pub fn toggle_hide(&mut self, id: &DocId) -> OpResult<bool> {
        self.require(Capabilities::WRITE)?;
        let hidden = !self
            .store
            .document(id)
            .ok_or_else(|| OpError::DocumentNotFound(id.clone()))?
            .is_hidden;
        let patch = DocumentPatch {
            is_hidden: Some(hidden),
            ..DocumentPatch::default()
        };
        self.store.apply_document_patch(id, &patch)?;
        self.toast(if hidden { "Document hidden" } else { "Document visible" });
        self.submit(SyncCommand::UpdateDocument {
            id: id.clone(),
            patch,
        });
        Ok(hidden)
    }

    /// Drag-and-drop reorder: `dragged` takes the slot of `over` in the flat
    /// display order, then every folder is renumbered 0..N-1 and the whole
    /// numbering goes out as one batch.
    pub fn reorder_folder(&mut self, dragged: &FolderId, over: &FolderId) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let mut order = self.display_order();
        let from = order
            .iter()
            .position(|id| id == dragged)
            .ok_or_else(|| OpError::FolderNotFound(dragged.clone()))?;
        let to = order
            .iter()
            .position(|id| id == over)
            .ok_or_else(|| OpError::FolderNotFound(over.clone()))?;
        if from == to {
            return Ok(());
        }
        let moved = order.remove(from);
        order.insert(to, moved);

        let assigned = self.store.assign_sort_orders(&order);
        self.toast("Folder order saved");
        self.submit(SyncCommand::UpdateSortOrders(assigned));
        Ok(())
    }

    /// Every folder, by `sort_order` and then fetch order, regardless of level.
    fn display_order(&self) -> Vec<FolderId> {
        let mut all: Vec<(&Folder, usize)> = self
            .store
            .folders()
            .enumerate()
            .map(|(position, folder)| (folder, position))
            .collect();
        all.sort_by_key(|(folder, position)| (folder.sort_order, *position));
        all.into_iter().map(|(folder, _)| folder.id.clone()).collect()
    }

    /// Root folders in display order, for pickers that only accept roots.
    pub fn root_folders(&self) -> Vec<&Folder> {
        child_folders_of(&self.store, None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::super::test_support::*;
    use super::*;
    use crate::gateway::{Gateway, MemoryGateway};
    use crate::query::documents_visible_in;
    use crate::session::Session;

    fn gateway() -> Arc<MemoryGateway> {
        Arc::new(MemoryGateway::with_rows(
            vec![
                folder("folder-a", None),
                folder("folder-b", None),
                folder("folder-sub", Some("folder-a")),
            ],
            vec![doc("doc-1", "folder-sub")],
        ))
    }

    #[test]
    fn anonymous_sessions_cannot_mutate() {
        let gateway = gateway();
        let mut ws = open(&gateway, Session::anonymous());
        assert_matches!(ws.create_folder("New", None), Err(OpError::Unauthorized));
        assert_matches!(
            ws.toggle_lock(&"doc-1".into()),
            Err(OpError::Unauthorized)
        );
        assert_matches!(
            ws.request_delete(&Target::Document("doc-1".into())),
            Err(OpError::Unauthorized)
        );
        ws.flush();
        assert_eq!(gateway.counts(), Default::default());
    }

    #[test]
    fn create_folder_appends_and_activates() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        let id = ws.create_folder("  Homelab ", Some(&"folder-b".into()))?;
        ws.flush();

        let created = ws.store().folder(&id).unwrap();
        assert_eq!(created.title, "Homelab");
        assert_eq!(created.parent_id, Some(FolderId::from("folder-b")));
        assert_eq!(created.sort_order, 1);
        assert_eq!(ws.active_folder(), Some(&id));
        assert!(ws.expanded().is_expanded(&"folder-b".into()));
        assert_eq!(gateway.folder(&id).map(|f| f.title), Some("Homelab".to_owned()));
        Ok(())
    }

    #[test]
    fn depth_never_exceeds_two_levels() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());

        assert_matches!(
            ws.create_folder("Deep", Some(&"folder-sub".into())),
            Err(OpError::DestinationNotRoot(_))
        );
        assert_matches!(
            ws.move_folder(&"folder-b".into(), Some(&"folder-sub".into())),
            Err(OpError::DestinationNotRoot(_))
        );
        assert_matches!(
            ws.move_folder(&"folder-a".into(), Some(&"folder-b".into())),
            Err(OpError::WouldExceedDepth(_))
        );
        ws.move_folder(&"folder-sub".into(), Some(&"folder-b".into()))?;
        ws.move_folder(&"folder-a".into(), Some(&"folder-b".into()))?;
        assert!(ws.store().depth_invariant_holds());

        ws.move_folder(&"folder-sub".into(), None)?;
        ws.flush();
        assert!(ws.store().folder(&"folder-sub".into()).unwrap().is_root());
        assert_eq!(gateway.folder(&"folder-sub".into()).unwrap().parent_id, None);
        Ok(())
    }

    #[test]
    fn move_into_self_is_rejected_before_mutation() {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        assert_matches!(
            ws.move_folder(&"folder-b".into(), Some(&"folder-b".into())),
            Err(OpError::MoveIntoSelf)
        );
        ws.flush();
        assert!(ws.store().folder(&"folder-b".into()).unwrap().is_root());
        assert_eq!(gateway.counts().updates, 0);
        assert!(ws.take_notices().is_empty());
    }

    #[test]
    fn non_empty_folder_delete_is_blocked() {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        assert_matches!(
            ws.request_delete(&Target::Folder("folder-a".into())),
            Err(OpError::FolderNotEmpty { documents: 0, folders: 1 })
        );
        assert_matches!(
            ws.request_delete(&Target::Folder("folder-sub".into())),
            Err(OpError::FolderNotEmpty { documents: 1, folders: 0 })
        );
        ws.flush();
        assert_eq!(ws.store().folder_count(), 3);
        assert_eq!(gateway.counts().deletes, 0);
    }

    #[test]
    fn deleting_the_active_folder_selects_the_first_remaining() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.select_folder(&"folder-b".into())?;
        let pending = ws.request_delete(&Target::Folder("folder-b".into()))?;
        assert_eq!(pending.prompt(), "Delete folder \"folder-b\"?");
        ws.confirm_delete(pending)?;
        ws.flush();

        assert_eq!(ws.active_folder(), Some(&FolderId::from("folder-a")));
        assert!(gateway.folder(&"folder-b".into()).is_none());
        Ok(())
    }

    #[test]
    fn deleting_the_active_document_leaves_editing() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.select_document(&"doc-1".into())?;
        ws.start_editing()?;
        let pending = ws.request_delete(&Target::Document("doc-1".into()))?;
        ws.confirm_delete(pending)?;

        assert!(ws.active_document().is_none());
        assert!(!ws.editor().is_editing());
        ws.flush();
        assert!(gateway.document(&"doc-1".into()).is_none());
        Ok(())
    }

    #[test]
    fn rename_keeps_id_and_reaches_the_backend() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        let id = ws.create_folder("Drafts", None)?;
        ws.rename(
            &Target::Folder(id.clone()),
            Appearance {
                title: "Published".into(),
                icon: Some("public".into()),
                color: None,
            },
        )?;
        ws.flush();

        let fetched = gateway
            .select_folders()?
            .into_iter()
            .find(|f| f.id == id)
            .unwrap();
        assert_eq!(fetched.title, "Published");
        assert_eq!(fetched.icon, "public");
        assert_eq!(fetched.color, "text-gray-400");
        Ok(())
    }

    #[test]
    fn blank_rename_is_rejected_without_remote_call() {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        assert_matches!(
            ws.rename(&Target::Document("doc-1".into()), Appearance::titled("   ")),
            Err(OpError::EmptyName)
        );
        ws.flush();
        assert_eq!(ws.store().document(&"doc-1".into()).unwrap().title, "doc-1");
        assert_eq!(gateway.counts().updates, 0);
    }

    #[test]
    fn created_document_shows_in_its_folder_only() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.select_folder(&"folder-b".into())?;
        let id = ws.create_document("Plan")?;

        assert_eq!(ws.editor().editing_doc(), Some(&id));
        let session = admin();
        let in_b = documents_visible_in(ws.store(), &"folder-b".into(), &session);
        assert!(in_b.iter().any(|d| d.id == id));
        let in_a = documents_visible_in(ws.store(), &"folder-a".into(), &session);
        assert!(in_a.iter().all(|d| d.id != id));
        Ok(())
    }

    #[test]
    fn create_document_needs_an_active_folder() -> anyhow::Result<()> {
        let gateway = Arc::new(MemoryGateway::with_rows(vec![folder("folder-a", None)], Vec::new()));
        let mut ws = open(&gateway, admin());
        let pending = ws.request_delete(&Target::Folder("folder-a".into()))?;
        ws.confirm_delete(pending)?;
        assert_matches!(ws.create_document("Orphan"), Err(OpError::NoActiveFolder));
        Ok(())
    }

    #[test]
    fn duplicate_copies_only_the_row() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        let copy = ws.duplicate(&Target::Folder("folder-a".into()))?;
        let Target::Folder(copy_id) = copy else {
            panic!("expected a folder copy");
        };
        assert_eq!(ws.store().folder(&copy_id).unwrap().title, "folder-a (Copy)");
        assert!(ws.store().child_folder_ids(Some(&copy_id)).is_empty());

        let doc_copy = ws.duplicate(&Target::Document("doc-1".into()))?;
        let Target::Document(doc_id) = doc_copy else {
            panic!("expected a document copy");
        };
        let copied = ws.store().document(&doc_id).unwrap();
        assert_eq!(copied.title, "doc-1 (Copy)");
        assert_eq!(copied.parent_id, FolderId::from("folder-sub"));
        Ok(())
    }

    #[test]
    fn reorder_renumbers_every_folder_in_one_batch() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.reorder_folder(&"folder-b".into(), &"folder-a".into())?;
        ws.flush();

        let mut orders: Vec<i64> = ws.store().folders().map(|f| f.sort_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2]);
        let roots: Vec<_> = ws.root_folders().iter().map(|f| f.id.to_string()).collect();
        assert_eq!(roots, vec!["folder-b", "folder-a"]);
        assert_eq!(gateway.counts().sort_order_batches, 1);
        assert_eq!(gateway.folder(&"folder-b".into()).unwrap().sort_order, 0);
        Ok(())
    }

    #[test]
    fn remote_failure_keeps_the_optimistic_state() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        gateway.set_fail_writes(true);
        let locked = ws.toggle_lock(&"doc-1".into())?;
        ws.flush();

        assert!(locked);
        assert!(ws.store().document(&"doc-1".into()).unwrap().is_locked);
        assert!(!gateway.document(&"doc-1".into()).unwrap().is_locked);
        assert_eq!(ws.sync_stats().failed, 1);
        Ok(())
    }
}
