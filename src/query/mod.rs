//! Read-side traversal of the hierarchy store.

use crate::model::{Document, Folder, FolderId};
use crate::session::{Capabilities, Session};
use crate::store::HierarchyStore;

mod highlight;
mod tree;

pub use highlight::{build_highlight_regex, highlight_matches};
pub use tree::{render_tree, tree_rows, TreeRow};

/// Folders under `parent` (roots for `None`), by `sort_order` then fetch order.
pub fn child_folders_of<'a>(store: &'a HierarchyStore, parent: Option<&FolderId>) -> Vec<&'a Folder> {
    let mut children: Vec<(&Folder, usize)> = store
        .child_folder_ids(parent)
        .iter()
        .filter_map(|id| {
            let folder = store.folder(id)?;
            let position = store.folder_position(id)?;
            Some((folder, position))
        })
        .collect();
    children.sort_by_key(|(folder, position)| (folder.sort_order, *position));
    children.into_iter().map(|(folder, _)| folder).collect()
}

/// Documents shown for a folder. A root folder also shows what its direct
/// subfolders hold. Hidden documents need `READ_HIDDEN`.
pub fn documents_visible_in<'a>(
    store: &'a HierarchyStore,
    folder_id: &FolderId,
    session: &Session,
) -> Vec<&'a Document> {
    let Some(folder) = store.folder(folder_id) else {
        return Vec::new();
    };
    let mut doc_ids: Vec<_> = store.document_ids_in(folder_id).to_vec();
    if folder.is_root() {
        for sub in store.child_folder_ids(Some(folder_id)) {
            doc_ids.extend_from_slice(store.document_ids_in(sub));
        }
    }
    let show_hidden = session.can(Capabilities::READ_HIDDEN);
    let mut docs: Vec<(&Document, usize)> = doc_ids
        .iter()
        .filter_map(|id| Some((store.document(id)?, store.document_position(id)?)))
        .filter(|(doc, _)| show_hidden || !doc.is_hidden)
        .collect();
    docs.sort_by_key(|(_, position)| *position);
    docs.into_iter().map(|(doc, _)| doc).collect()
}

/// Case-insensitive substring match on title or any tag, across every folder.
/// The query is matched literally, surrounding whitespace included.
pub fn search<'a>(store: &'a HierarchyStore, query: &str, session: &Session) -> Vec<&'a Document> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let show_hidden = session.can(Capabilities::READ_HIDDEN);
    store
        .documents()
        .filter(|doc| show_hidden || !doc.is_hidden)
        .filter(|doc| doc.matches_text(&needle))
        .collect()
}

/// What the document list shows: a non-empty search wins over the folder.
pub fn visible_documents<'a>(
    store: &'a HierarchyStore,
    active_folder: Option<&FolderId>,
    search_query: &str,
    session: &Session,
) -> Vec<&'a Document> {
    if !search_query.is_empty() {
        return search(store, search_query, session);
    }
    match active_folder {
        Some(folder) => documents_visible_in(store, folder, session),
        None => {
            let show_hidden = session.can(Capabilities::READ_HIDDEN);
            store
                .documents()
                .filter(|doc| show_hidden || !doc.is_hidden)
                .collect()
        }
    }
}
