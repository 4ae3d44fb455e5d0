//! Cosmetic UI state that survives restarts. Never authoritative.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::FolderId;
use crate::store::HierarchyStore;

pub const EXPANDED_FOLDERS_KEY: &str = "zen_expanded_folders";
const TMP_EXTENSION: &str = "json.tmp";

/// Flat JSON object on disk; `None` path keeps everything in memory.
#[derive(Debug, Default)]
pub struct UiStateStore {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl UiStateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "ignoring unreadable ui state");
                    Map::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading ui state {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(?err, key, "ui state value has unexpected shape");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).context("encoding ui state value")?;
        self.values.insert(key.to_owned(), encoded);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension(TMP_EXTENSION);
        let raw = serde_json::to_string_pretty(&self.values).context("serializing ui state")?;
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// Which folders are open in the sidebar. With nothing saved, every folder
/// starts expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedFolders {
    ids: IndexSet<FolderId>,
}

impl ExpandedFolders {
    pub fn load(state: &UiStateStore, store: &HierarchyStore) -> Self {
        match state.get::<Vec<FolderId>>(EXPANDED_FOLDERS_KEY) {
            Some(saved) => Self {
                ids: saved.into_iter().collect(),
            },
            None => Self::all(store),
        }
    }

    pub fn all(store: &HierarchyStore) -> Self {
        Self {
            ids: store.folders().map(|f| f.id.clone()).collect(),
        }
    }

    pub fn is_expanded(&self, id: &FolderId) -> bool {
        self.ids.contains(id)
    }

    /// Returns the new state of `id`.
    pub fn toggle(&mut self, id: &FolderId) -> bool {
        if self.ids.shift_remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    /// Returns true when this changed anything.
    pub fn expand(&mut self, id: &FolderId) -> bool {
        self.ids.insert(id.clone())
    }

    pub fn forget(&mut self, id: &FolderId) -> bool {
        self.ids.shift_remove(id)
    }

    pub fn save(&self, state: &mut UiStateStore) -> Result<()> {
        let ids: Vec<&FolderId> = self.ids.iter().collect();
        state.set(EXPANDED_FOLDERS_KEY, &ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Folder;
    use tempfile::TempDir;

    fn store() -> HierarchyStore {
        HierarchyStore::from_rows(
            vec![
                Folder::new("folder-a".into(), "A", None),
                Folder::new("folder-b".into(), "B", None),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn nothing_saved_means_everything_expanded() {
        let expanded = ExpandedFolders::load(&UiStateStore::in_memory(), &store());
        assert!(expanded.is_expanded(&"folder-a".into()));
        assert!(expanded.is_expanded(&"folder-b".into()));
    }

    #[test]
    fn expanded_set_survives_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("state/ui_state.json");
        let store = store();

        let mut state = UiStateStore::open(&path)?;
        let mut expanded = ExpandedFolders::load(&state, &store);
        assert!(!expanded.toggle(&"folder-a".into()));
        expanded.save(&mut state)?;

        let reopened = UiStateStore::open(&path)?;
        let restored = ExpandedFolders::load(&reopened, &store);
        assert!(!restored.is_expanded(&"folder-a".into()));
        assert!(restored.is_expanded(&"folder-b".into()));

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(raw[EXPANDED_FOLDERS_KEY], serde_json::json!(["folder-b"]));
        Ok(())
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("ui_state.json");
        fs::write(&path, "{not json")?;
        let state = UiStateStore::open(&path)?;
        assert!(state.get::<Vec<String>>(EXPANDED_FOLDERS_KEY).is_none());
        Ok(())
    }
}
