use thiserror::Error;

use crate::model::{DocId, FolderId};

/// Validation failures. Any of these means nothing was mutated and nothing
/// was sent to the gateway.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("sign in to change the workspace")]
    Unauthorized,
    #[error("name cannot be empty")]
    EmptyName,
    #[error("folder {0} not found")]
    FolderNotFound(FolderId),
    #[error("document {0} not found")]
    DocumentNotFound(DocId),
    #[error("folder id {0} already exists")]
    DuplicateFolder(FolderId),
    #[error("document id {0} already exists")]
    DuplicateDocument(DocId),
    #[error("no folder is selected")]
    NoActiveFolder,
    #[error("no document is selected")]
    NoActiveDocument,
    #[error("a folder cannot be moved into itself")]
    MoveIntoSelf,
    #[error("folder {0} is not a root folder; folders nest at most two levels deep")]
    DestinationNotRoot(FolderId),
    #[error("folder {0} has subfolders and cannot become a subfolder itself")]
    WouldExceedDepth(FolderId),
    #[error("folder contains {documents} document(s) and {folders} subfolder(s); delete them first")]
    FolderNotEmpty { documents: usize, folders: usize },
    #[error("no document is being edited")]
    NotEditing,
    #[error("attachment upload failed: {0:#}")]
    Upload(#[source] anyhow::Error),
}

pub type OpResult<T> = std::result::Result<T, OpError>;
