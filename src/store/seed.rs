use crate::model::{Document, Folder, FolderId};

const SEED_CREATED_AT: i64 = 1_735_689_600;

struct SeedFolder {
    id: &'static str,
    title: &'static str,
    icon: &'static str,
    color: &'static str,
    parent: Option<&'static str>,
}

struct SeedDoc {
    id: &'static str,
    parent: &'static str,
    title: &'static str,
    date: &'static str,
    tags: &'static [&'static str],
    cover: &'static str,
    content: &'static str,
}

const FOLDERS: &[SeedFolder] = &[
    SeedFolder {
        id: "folder-docs",
        title: "Docs",
        icon: "folder",
        color: "text-amber-500",
        parent: None,
    },
    SeedFolder {
        id: "folder-proxmox",
        title: "Proxmox",
        icon: "dns",
        color: "text-gray-500",
        parent: Some("folder-docs"),
    },
    SeedFolder {
        id: "folder-nextcloud",
        title: "Nextcloud",
        icon: "cloud",
        color: "text-blue-500",
        parent: Some("folder-docs"),
    },
    SeedFolder {
        id: "folder-test",
        title: "Test Folder",
        icon: "folder_open",
        color: "text-gray-400",
        parent: None,
    },
];

const DOCS: &[SeedDoc] = &[
    SeedDoc {
        id: "doc-zen",
        parent: "folder-docs",
        title: "Zen Workspace Guide",
        date: "2m ago",
        tags: &["Guide", "Zen"],
        cover: "https://images.unsplash.com/photo-1497366216548-37526070297c?auto=format&fit=crop&q=80&w=2070",
        content: r#"*This document outlines the fundamental design language for the workspace.*

## 1. Core Philosophy

Minimalism isn't about the absence of content, but the presence of focus.

## 2. Design Principles

- **Clarity**: Every element serves a purpose
- **Hierarchy**: Folders nest two levels deep, no further
"#,
    },
    SeedDoc {
        id: "doc-proxmox-config",
        parent: "folder-proxmox",
        title: "Proxmox with Ceph Storage",
        date: "1d ago",
        tags: &["SysAdmin", "Storage"],
        cover: "https://images.unsplash.com/photo-1558494949-ef010cbdcc31?auto=format&fit=crop&q=80&w=2070",
        content: r#"*Distributed storage for a three node cluster.*

## Requirements

- At least three nodes
- Network 10Gbps recommended

## Steps

1. Install Ceph packages on every node
2. Initialise the cluster from the first node
3. Join the remaining nodes
4. Create an OSD per disk

```bash
pveceph install
pveceph init --network 10.0.0.0/24
```
"#,
    },
    SeedDoc {
        id: "doc-proxmox-ha",
        parent: "folder-proxmox",
        title: "HA Proxmox Cluster",
        date: "5h ago",
        tags: &["HA", "Cluster"],
        cover: "https://images.unsplash.com/photo-1518770660439-4636190af475?auto=format&fit=crop&q=80&w=2070",
        content: r#"*High availability for a three node cluster.*

## Overview

HA migrates guests automatically when a node fails.

> **Note**: HA needs shared storage (Ceph, NFS, iSCSI)

## HA Group

1. Create an HA group under Datacenter → HA
2. Add the guests that need HA
3. Set priority and restrictions
"#,
    },
    SeedDoc {
        id: "doc-nextcloud",
        parent: "folder-nextcloud",
        title: "Nextcloud Configuration",
        date: "1w ago",
        tags: &["Cloud", "Self-hosted"],
        cover: "https://images.unsplash.com/photo-1454165804606-c3d57bc86b40?auto=format&fit=crop&q=80&w=2070",
        content: r#"*Tuning Nextcloud with Redis and PHP-FPM.*

## Recommended stack

- **Web Server**: Nginx
- **Database**: MariaDB 10.6+
- **Cache**: Redis
- **PHP**: 8.2 with OPcache
"#,
    },
    SeedDoc {
        id: "doc-brand",
        parent: "folder-docs",
        title: "Brand Guidelines",
        date: "2d ago",
        tags: &["Design", "Brand"],
        cover: "https://images.unsplash.com/photo-1626785774573-4b79931bfd95?auto=format&fit=crop&q=80&w=2070",
        content: r#"*Brand identity guide.*

## Logo Usage

- Minimum size: 32px height
- Clear space: 1x logo height around all sides
- Never distort or rotate
"#,
    },
];

pub fn seed_folders() -> Vec<Folder> {
    FOLDERS
        .iter()
        .enumerate()
        .map(|(idx, seed)| Folder {
            id: seed.id.into(),
            title: seed.title.to_owned(),
            icon: seed.icon.to_owned(),
            color: seed.color.to_owned(),
            parent_id: seed.parent.map(FolderId::from),
            sort_order: idx as i64,
            created_at: SEED_CREATED_AT + idx as i64,
        })
        .collect()
}

pub fn seed_documents() -> Vec<Document> {
    DOCS.iter()
        .enumerate()
        .map(|(idx, seed)| {
            let mut doc = Document::new(seed.id.into(), seed.parent.into(), seed.title);
            doc.date = seed.date.to_owned();
            doc.tags = seed.tags.iter().map(|tag| (*tag).to_owned()).collect();
            doc.cover = Some(seed.cover.to_owned());
            doc.content = seed.content.to_owned();
            doc.created_at = SEED_CREATED_AT + idx as i64;
            doc
        })
        .collect()
}
