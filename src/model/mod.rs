use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use time::macros::format_description;
use time::OffsetDateTime;

pub const DEFAULT_FOLDER_ICON: &str = "folder";
pub const DEFAULT_FOLDER_COLOR: &str = "text-gray-400";
pub const DEFAULT_DOC_TAG: &str = "New";
pub const DEFAULT_DOC_CONTENT: &str = r#"<p class="lead">Start writing your thoughts here...</p>"#;
pub const EDITED_NOW_LABEL: &str = "Edited now";
pub const COPY_SUFFIX: &str = " (Copy)";

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(FolderId);
string_id!(DocId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub title: String,
    pub icon: String,
    pub color: String,
    pub parent_id: Option<FolderId>,
    pub sort_order: i64,
    pub created_at: i64,
}

impl Folder {
    pub fn new(id: FolderId, title: impl Into<String>, parent_id: Option<FolderId>) -> Self {
        Self {
            id,
            title: title.into(),
            icon: DEFAULT_FOLDER_ICON.to_owned(),
            color: DEFAULT_FOLDER_COLOR.to_owned(),
            parent_id,
            sort_order: 0,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size: u64,
    pub mime: Option<String>,
    pub uploaded_at: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub parent_id: FolderId,
    pub title: String,
    pub content: String,
    pub date: String,
    pub tags: Vec<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub cover: Option<String>,
    pub is_locked: bool,
    pub is_hidden: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: i64,
}

impl Document {
    /// Fresh document with the defaults a newly created page gets.
    pub fn new(id: DocId, parent_id: FolderId, title: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            parent_id,
            title: title.into(),
            content: DEFAULT_DOC_CONTENT.to_owned(),
            date: short_date_label(now),
            tags: vec![DEFAULT_DOC_TAG.to_owned()],
            icon: None,
            color: None,
            cover: None,
            is_locked: false,
            is_hidden: false,
            attachments: Vec::new(),
            created_at: now.unix_timestamp(),
        }
    }

    pub fn matches_text(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle_lower))
    }
}

/// Fields a rename touches. `None` leaves the current value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Appearance {
    pub title: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl Appearance {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// "Oct 18" style label used for document dates.
pub fn short_date_label(at: OffsetDateTime) -> String {
    let format = format_description!("[month repr:short] [day padding:none]");
    at.format(format)
        .unwrap_or_else(|_| format!("{} {}", u8::from(at.month()), at.day()))
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

fn next_millis() -> i64 {
    let now = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_ID_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

pub fn new_folder_id() -> FolderId {
    FolderId(format!("folder-{}", next_millis()))
}

pub fn new_doc_id() -> DocId {
    DocId(format!("doc-{}", next_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use time::macros::datetime;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = new_folder_id();
            assert!(id.as_str().starts_with("folder-"));
            assert!(seen.insert(id.to_string()));
        }
        let doc = new_doc_id();
        assert!(doc.as_str().starts_with("doc-"));
        assert!(!seen.contains(doc.as_str()));
    }

    #[test]
    fn short_date_label_uses_abbreviated_month() {
        assert_eq!(short_date_label(datetime!(2026-10-18 09:30 UTC)), "Oct 18");
        assert_eq!(short_date_label(datetime!(2026-03-02 00:00 UTC)), "Mar 2");
    }

    #[test]
    fn text_match_covers_title_and_tags() {
        let mut doc = Document::new("doc-1".into(), "folder-a".into(), "Proxmox Ceph");
        doc.tags = vec!["Storage".into(), "HA".into()];
        assert!(doc.matches_text("ceph"));
        assert!(doc.matches_text("stor"));
        assert!(!doc.matches_text("nextcloud"));
    }
}
