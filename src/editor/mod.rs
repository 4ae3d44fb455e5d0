//! Viewing/Editing state for the active document.
//!
//! There is no autosave and no draft persistence: leaving Editing by any path
//! other than save drops the buffer.

use crate::gateway::DocumentPatch;
use crate::model::{Attachment, DocId, Document, EDITED_NOW_LABEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub doc_id: DocId,
    pub title: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    original_title: String,
    original_content: String,
    original_attachments: Vec<Attachment>,
}

impl EditBuffer {
    fn from_document(doc: &Document) -> Self {
        Self {
            doc_id: doc.id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            attachments: doc.attachments.clone(),
            original_title: doc.title.clone(),
            original_content: doc.content.clone(),
            original_attachments: doc.attachments.clone(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.title != self.original_title
            || self.content != self.original_content
            || self.attachments != self.original_attachments
    }

    pub fn into_patch(self) -> DocumentPatch {
        DocumentPatch {
            title: Some(self.title),
            content: Some(self.content),
            attachments: Some(self.attachments),
            date: Some(EDITED_NOW_LABEL.to_owned()),
            ..DocumentPatch::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditorState {
    #[default]
    Viewing,
    Editing(EditBuffer),
}

impl EditorState {
    pub fn start(&mut self, doc: &Document) {
        self.discard("editing another document");
        *self = EditorState::Editing(EditBuffer::from_document(doc));
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, EditorState::Editing(_))
    }

    pub fn editing_doc(&self) -> Option<&DocId> {
        self.buffer().map(|buffer| &buffer.doc_id)
    }

    pub fn buffer(&self) -> Option<&EditBuffer> {
        match self {
            EditorState::Editing(buffer) => Some(buffer),
            EditorState::Viewing => None,
        }
    }

    pub fn buffer_mut(&mut self) -> Option<&mut EditBuffer> {
        match self {
            EditorState::Editing(buffer) => Some(buffer),
            EditorState::Viewing => None,
        }
    }

    /// Leaves Editing and hands the buffer over for committing.
    pub fn finish(&mut self) -> Option<EditBuffer> {
        match std::mem::take(self) {
            EditorState::Editing(buffer) => Some(buffer),
            EditorState::Viewing => None,
        }
    }

    /// Drops any in-progress edit. Returns whether unsaved changes were lost.
    pub fn discard(&mut self, reason: &str) -> bool {
        let Some(buffer) = self.finish() else {
            return false;
        };
        let dirty = buffer.is_dirty();
        if dirty {
            tracing::debug!(doc = %buffer.doc_id, reason, "discarding unsaved edits");
        }
        dirty
    }
}
