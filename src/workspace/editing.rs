use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use super::Workspace;
use crate::editor::EditBuffer;
use crate::error::{OpError, OpResult};
use crate::model::{Attachment, DocId, Document};
use crate::session::Capabilities;
use crate::sync::SyncCommand;

const BLOB_PREFIX: &str = "docs";

/// What the reading pane may show. Locking only masks the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentView<'a> {
    Content(&'a Document),
    Locked { title: &'a str },
}

impl Workspace {
    /// `None` for unknown ids and for hidden documents the session may not see.
    pub fn view_document(&self, id: &DocId) -> Option<DocumentView<'_>> {
        let doc = self.store.document(id)?;
        if doc.is_hidden && !self.session.can(Capabilities::READ_HIDDEN) {
            return None;
        }
        if doc.is_locked && !self.session.can(Capabilities::READ_LOCKED) {
            return Some(DocumentView::Locked { title: &doc.title });
        }
        Some(DocumentView::Content(doc))
    }

    pub fn start_editing(&mut self) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let id = self.active_doc.clone().ok_or(OpError::NoActiveDocument)?;
        let doc = self
            .store
            .document(&id)
            .ok_or(OpError::DocumentNotFound(id))?;
        self.editor.start(doc);
        Ok(())
    }

    /// Mutable access to the draft while editing.
    pub fn edit_buffer_mut(&mut self) -> OpResult<&mut EditBuffer> {
        self.editor.buffer_mut().ok_or(OpError::NotEditing)
    }

    /// Commits the draft locally and queues the remote update. On a validation
    /// error the draft stays open.
    pub fn save_edit(&mut self) -> OpResult<()> {
        self.require(Capabilities::WRITE)?;
        let buffer = self.editor.buffer().ok_or(OpError::NotEditing)?;
        if buffer.title.trim().is_empty() {
            return Err(OpError::EmptyName);
        }
        if self.store.document(&buffer.doc_id).is_none() {
            return Err(OpError::DocumentNotFound(buffer.doc_id.clone()));
        }
        let Some(buffer) = self.editor.finish() else {
            return Err(OpError::NotEditing);
        };
        let id = buffer.doc_id.clone();
        let patch = buffer.into_patch();
        self.store.apply_document_patch(&id, &patch)?;
        self.toast("Changes saved successfully!");
        self.submit(SyncCommand::UpdateDocument { id, patch });
        Ok(())
    }

    /// Drops the draft. Nothing is sent anywhere.
    pub fn cancel_edit(&mut self) -> OpResult<()> {
        if !self.editor.is_editing() {
            return Err(OpError::NotEditing);
        }
        self.editor.discard("edit cancelled");
        Ok(())
    }

    /// Uploads bytes to blob storage and records the attachment on the draft.
    /// The upload is synchronous; the attachment list itself is only written
    /// remotely when the draft is saved.
    pub fn attach_file(
        &mut self,
        name: &str,
        bytes: &[u8],
        mime: Option<&str>,
    ) -> OpResult<Attachment> {
        self.require(Capabilities::WRITE)?;
        if !self.editor.is_editing() {
            return Err(OpError::NotEditing);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(OpError::EmptyName);
        }
        let id = Uuid::new_v4();
        let key = format!("{BLOB_PREFIX}/{id}-{name}");
        self.gateway
            .upload_blob(&key, bytes, mime)
            .map_err(OpError::Upload)?;

        let now = OffsetDateTime::now_utc();
        let attachment = Attachment {
            id: id.to_string(),
            name: name.to_owned(),
            url: self.gateway.public_url(&key),
            size: bytes.len() as u64,
            mime: mime.map(str::to_owned),
            uploaded_at: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| now.unix_timestamp().to_string()),
        };
        tracing::info!(key = %key, size = attachment.size, "attachment uploaded");
        self.edit_buffer_mut()?.attachments.push(attachment.clone());
        Ok(attachment)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::super::test_support::*;
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::model::EDITED_NOW_LABEL;
    use crate::session::Session;

    fn gateway() -> Arc<MemoryGateway> {
        let mut locked = doc("doc-locked", "folder-a");
        locked.is_locked = true;
        let mut hidden = doc("doc-hidden", "folder-a");
        hidden.is_hidden = true;
        Arc::new(MemoryGateway::with_rows(
            vec![folder("folder-a", None)],
            vec![doc("doc-open", "folder-a"), locked, hidden],
        ))
    }

    #[test]
    fn locked_and_hidden_gates_depend_on_session() {
        let gateway = gateway();
        let anon = open(&gateway, Session::anonymous());
        assert_matches!(
            anon.view_document(&"doc-locked".into()),
            Some(DocumentView::Locked { title: "doc-locked" })
        );
        assert!(anon.view_document(&"doc-hidden".into()).is_none());
        assert_matches!(
            anon.view_document(&"doc-open".into()),
            Some(DocumentView::Content(_))
        );

        let admin = open(&gateway, admin());
        assert_matches!(
            admin.view_document(&"doc-locked".into()),
            Some(DocumentView::Content(doc)) if doc.is_locked
        );
        assert!(admin.view_document(&"doc-hidden".into()).is_some());
    }

    #[test]
    fn save_commits_draft_and_marks_edited() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.start_editing()?;
        {
            let draft = ws.edit_buffer_mut()?;
            draft.title = "Runbook".into();
            draft.content = "<p>steps</p>".into();
        }
        ws.save_edit()?;
        ws.flush();

        assert!(!ws.editor().is_editing());
        let saved = gateway.document(&"doc-open".into()).unwrap();
        assert_eq!(saved.title, "Runbook");
        assert_eq!(saved.content, "<p>steps</p>");
        assert_eq!(saved.date, EDITED_NOW_LABEL);
        Ok(())
    }

    #[test]
    fn blank_title_keeps_the_draft_open() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.start_editing()?;
        ws.edit_buffer_mut()?.title = "  ".into();
        assert_matches!(ws.save_edit(), Err(OpError::EmptyName));
        assert!(ws.editor().is_editing());

        ws.cancel_edit()?;
        ws.flush();
        assert_eq!(gateway.counts().updates, 0);
        assert_matches!(ws.cancel_edit(), Err(OpError::NotEditing));
        Ok(())
    }

    #[test]
    fn attachments_upload_and_land_on_save() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        assert_matches!(
            ws.attach_file("notes.txt", b"hi", None),
            Err(OpError::NotEditing)
        );

        ws.start_editing()?;
        let attachment = ws.attach_file("notes.txt", b"hello", Some("text/plain"))?;
        assert!(attachment.url.starts_with("memory://blobs/docs/"));
        assert!(attachment.url.ends_with("-notes.txt"));
        assert_eq!(attachment.size, 5);
        let key = attachment.url.trim_start_matches("memory://blobs/");
        assert_eq!(gateway.blob(key).as_deref(), Some(&b"hello"[..]));

        ws.save_edit()?;
        ws.flush();
        let saved = gateway.document(&"doc-open".into()).unwrap();
        assert_eq!(saved.attachments, vec![attachment]);
        Ok(())
    }

    #[test]
    fn failed_upload_leaves_the_draft_untouched() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.start_editing()?;
        gateway.set_fail_writes(true);
        assert_matches!(
            ws.attach_file("big.bin", &[0u8; 16], None),
            Err(OpError::Upload(_))
        );
        assert!(ws.editor().buffer().unwrap().attachments.is_empty());
        Ok(())
    }

    #[test]
    fn switching_documents_discards_the_draft() -> anyhow::Result<()> {
        let gateway = gateway();
        let mut ws = open(&gateway, admin());
        ws.start_editing()?;
        ws.edit_buffer_mut()?.title = "Unsaved".into();
        ws.select_document(&"doc-locked".into())?;
        ws.flush();

        assert!(!ws.editor().is_editing());
        assert_eq!(ws.store().document(&"doc-open".into()).unwrap().title, "doc-open");
        assert_eq!(gateway.counts().updates, 0);
        Ok(())
    }
}
