use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::child_folders_of;
use crate::model::FolderId;
use crate::store::HierarchyStore;

const INDENT: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: FolderId,
    pub title: String,
    pub icon: String,
    pub depth: usize,
    pub expanded: bool,
    pub active: bool,
    pub has_children: bool,
}

/// Depth-first rows for the sidebar. Only expanded roots contribute their
/// subfolders; the hierarchy never goes past depth 1.
pub fn tree_rows<F>(store: &HierarchyStore, is_expanded: F, active: Option<&FolderId>) -> Vec<TreeRow>
where
    F: Fn(&FolderId) -> bool,
{
    let mut rows = Vec::new();
    for root in child_folders_of(store, None) {
        let children = child_folders_of(store, Some(&root.id));
        let expanded = is_expanded(&root.id);
        rows.push(TreeRow {
            id: root.id.clone(),
            title: root.title.clone(),
            icon: root.icon.clone(),
            depth: 0,
            expanded,
            active: active == Some(&root.id),
            has_children: !children.is_empty(),
        });
        if !expanded {
            continue;
        }
        for child in children {
            rows.push(TreeRow {
                id: child.id.clone(),
                title: child.title.clone(),
                icon: child.icon.clone(),
                depth: 1,
                expanded: is_expanded(&child.id),
                active: active == Some(&child.id),
                has_children: false,
            });
        }
    }
    rows
}

pub fn render_tree(rows: &[TreeRow], max_title_width: usize) -> String {
    rows.iter()
        .map(|row| {
            let marker = match (row.has_children, row.expanded) {
                (true, true) => "▾",
                (true, false) => "▸",
                (false, _) => "•",
            };
            let mut line = format!(
                "{}{} {}",
                INDENT.repeat(row.depth),
                marker,
                truncate_to_width(&row.title, max_title_width)
            );
            if row.active {
                line.push_str(" *");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if max == 0 || text.width() <= max {
        return text.to_owned();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}
