use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use rusqlite::config::DbConfig;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;

use super::{schema, ChangeEvent, ChangeFeed, DocumentPatch, FolderPatch, Gateway, Table};
use crate::config::GatewayOptions;
use crate::model::{DocId, Document, Folder, FolderId};

const FOLDER_COLUMNS: &str = "id, title, icon, color, parent_id, sort_order, created_at";
const DOC_COLUMNS: &str = "id, parent_id, title, content, date, tags, icon, color, cover, \
                           is_locked, is_hidden, attachments, created_at";

/// SQLite-backed gateway. Each call opens its own connection, so clones can
/// be moved onto worker threads freely.
#[derive(Clone)]
pub struct SqliteGateway {
    db_path: Arc<PathBuf>,
    options: Arc<GatewayOptions>,
    feed: Arc<ChangeFeed>,
}

impl SqliteGateway {
    pub fn open(options: &GatewayOptions) -> Result<Self> {
        let db_path = &options.database_path;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        fs::create_dir_all(&options.blob_dir)
            .with_context(|| format!("creating blob directory {}", options.blob_dir.display()))?;
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;
        tracing::debug!(path = %db_path.display(), "sqlite gateway ready");
        Ok(Self {
            db_path: Arc::new(db_path.clone()),
            options: Arc::new(options.clone()),
            feed: Arc::new(ChangeFeed::default()),
        })
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    fn fetch_folder(conn: &Connection, id: &FolderId) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
        conn.query_row(&sql, [id.as_str()], folder_from_row)
            .optional()
            .with_context(|| format!("fetching folder {id}"))
    }

    fn fetch_document(conn: &Connection, id: &DocId) -> Result<Option<Document>> {
        let sql = format!("SELECT {DOC_COLUMNS} FROM docs WHERE id = ?1");
        conn.query_row(&sql, [id.as_str()], document_from_row)
            .optional()
            .with_context(|| format!("fetching document {id}"))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|ch| {
                if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        let mut path = self.options.blob_dir.clone();
        for segment in sanitized.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }
}

impl Gateway for SqliteGateway {
    fn select_folders(&self) -> Result<Vec<Folder>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders ORDER BY created_at ASC, rowid ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], folder_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("selecting folders")?;
            Ok(rows)
        })
    }

    fn select_documents(&self) -> Result<Vec<Document>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {DOC_COLUMNS} FROM docs ORDER BY created_at ASC, rowid ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], document_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("selecting documents")?;
            Ok(rows)
        })
    }

    fn insert_folders(&self, rows: &[Folder]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting folder insert")?;
            for folder in rows {
                tx.execute(
                    "INSERT INTO folders (id, title, icon, color, parent_id, sort_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        folder.id.as_str(),
                        folder.title,
                        folder.icon,
                        folder.color,
                        folder.parent_id.as_ref().map(FolderId::as_str),
                        folder.sort_order,
                        folder.created_at,
                    ],
                )
                .with_context(|| format!("inserting folder {}", folder.id))?;
            }
            tx.commit().context("committing folder insert")?;
            Ok(())
        })?;
        for folder in rows {
            self.feed.publish(ChangeEvent::FolderInserted(folder.clone()));
        }
        Ok(())
    }

    fn insert_documents(&self, rows: &[Document]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting document insert")?;
            for doc in rows {
                let tags = serde_json::to_string(&doc.tags).context("encoding tags")?;
                let attachments =
                    serde_json::to_string(&doc.attachments).context("encoding attachments")?;
                tx.execute(
                    "INSERT INTO docs (id, parent_id, title, content, date, tags, icon, color, cover,
                                       is_locked, is_hidden, attachments, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        doc.id.as_str(),
                        doc.parent_id.as_str(),
                        doc.title,
                        doc.content,
                        doc.date,
                        tags,
                        doc.icon,
                        doc.color,
                        doc.cover,
                        doc.is_locked,
                        doc.is_hidden,
                        attachments,
                        doc.created_at,
                    ],
                )
                .with_context(|| format!("inserting document {}", doc.id))?;
            }
            tx.commit().context("committing document insert")?;
            Ok(())
        })?;
        for doc in rows {
            self.feed.publish(ChangeEvent::DocumentInserted(doc.clone()));
        }
        Ok(())
    }

    fn update_folder(&self, id: &FolderId, patch: &FolderPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut assignments: Vec<(&str, Value)> = Vec::new();
        if let Some(title) = &patch.title {
            assignments.push(("title", Value::Text(title.clone())));
        }
        if let Some(icon) = &patch.icon {
            assignments.push(("icon", Value::Text(icon.clone())));
        }
        if let Some(color) = &patch.color {
            assignments.push(("color", Value::Text(color.clone())));
        }
        if let Some(parent) = &patch.parent_id {
            let value = match parent {
                Some(parent) => Value::Text(parent.to_string()),
                None => Value::Null,
            };
            assignments.push(("parent_id", value));
        }
        if let Some(order) = patch.sort_order {
            assignments.push(("sort_order", Value::Integer(order)));
        }

        let updated = self.with_connection(|conn| {
            execute_update(conn, Table::Folders, id.as_str(), assignments)?;
            Self::fetch_folder(conn, id)
        })?;
        match updated {
            Some(folder) => {
                self.feed.publish(ChangeEvent::FolderUpdated(folder));
                Ok(())
            }
            None => bail!("folder {id} not found"),
        }
    }

    fn update_document(&self, id: &DocId, patch: &DocumentPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut assignments: Vec<(&str, Value)> = Vec::new();
        if let Some(title) = &patch.title {
            assignments.push(("title", Value::Text(title.clone())));
        }
        if let Some(content) = &patch.content {
            assignments.push(("content", Value::Text(content.clone())));
        }
        if let Some(date) = &patch.date {
            assignments.push(("date", Value::Text(date.clone())));
        }
        if let Some(icon) = &patch.icon {
            assignments.push(("icon", Value::Text(icon.clone())));
        }
        if let Some(color) = &patch.color {
            assignments.push(("color", Value::Text(color.clone())));
        }
        if let Some(parent) = &patch.parent_id {
            assignments.push(("parent_id", Value::Text(parent.to_string())));
        }
        if let Some(locked) = patch.is_locked {
            assignments.push(("is_locked", Value::Integer(locked as i64)));
        }
        if let Some(hidden) = patch.is_hidden {
            assignments.push(("is_hidden", Value::Integer(hidden as i64)));
        }
        if let Some(attachments) = &patch.attachments {
            let encoded = serde_json::to_string(attachments).context("encoding attachments")?;
            assignments.push(("attachments", Value::Text(encoded)));
        }

        let updated = self.with_connection(|conn| {
            execute_update(conn, Table::Docs, id.as_str(), assignments)?;
            Self::fetch_document(conn, id)
        })?;
        match updated {
            Some(doc) => {
                self.feed.publish(ChangeEvent::DocumentUpdated(doc));
                Ok(())
            }
            None => bail!("document {id} not found"),
        }
    }

    fn update_sort_orders(&self, orders: &[(FolderId, i64)]) -> Result<()> {
        let updated = self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting sort order batch")?;
            {
                let mut stmt = tx.prepare("UPDATE folders SET sort_order = ?1 WHERE id = ?2")?;
                for (id, order) in orders {
                    let changed = stmt
                        .execute(params![order, id.as_str()])
                        .with_context(|| format!("updating sort order of {id}"))?;
                    if changed == 0 {
                        bail!("folder {id} not found");
                    }
                }
            }
            tx.commit().context("committing sort order batch")?;
            let mut folders = Vec::with_capacity(orders.len());
            for (id, _) in orders {
                if let Some(folder) = Self::fetch_folder(conn, id)? {
                    folders.push(folder);
                }
            }
            Ok(folders)
        })?;
        for folder in updated {
            self.feed.publish(ChangeEvent::FolderUpdated(folder));
        }
        Ok(())
    }

    fn delete_folder(&self, id: &FolderId) -> Result<()> {
        let removed = self.with_connection(|conn| {
            conn.execute("DELETE FROM folders WHERE id = ?1", [id.as_str()])
                .with_context(|| format!("deleting folder {id}"))
        })?;
        if removed > 0 {
            self.feed.publish(ChangeEvent::FolderDeleted(id.clone()));
        }
        Ok(())
    }

    fn delete_document(&self, id: &DocId) -> Result<()> {
        let removed = self.with_connection(|conn| {
            conn.execute("DELETE FROM docs WHERE id = ?1", [id.as_str()])
                .with_context(|| format!("deleting document {id}"))
        })?;
        if removed > 0 {
            self.feed.publish(ChangeEvent::DocumentDeleted(id.clone()));
        }
        Ok(())
    }

    fn delete_all(&self, table: Table) -> Result<usize> {
        let name: &'static str = table.into();
        self.with_connection(|conn| {
            conn.execute(&format!("DELETE FROM {name}"), [])
                .with_context(|| format!("clearing {name}"))
        })
    }

    fn subscribe(&self, tables: &[Table]) -> Receiver<ChangeEvent> {
        self.feed.subscribe(tables)
    }

    fn upload_blob(&self, key: &str, bytes: &[u8], mime: Option<&str>) -> Result<()> {
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating blob directory {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("writing blob {}", path.display()))?;
        tracing::debug!(key, size = bytes.len(), ?mime, "stored blob");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("file://{}", self.blob_path(key).display())
    }
}

fn prepare_connection(conn: &Connection, options: &GatewayOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        options.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
        .context("setting busy timeout")?;
    Ok(())
}

fn execute_update(
    conn: &Connection,
    table: Table,
    id: &str,
    assignments: Vec<(&str, Value)>,
) -> Result<()> {
    let name: &'static str = table.into();
    let set_clause = assignments
        .iter()
        .enumerate()
        .map(|(idx, (column, _))| format!("{column} = ?{}", idx + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {name} SET {set_clause} WHERE id = ?{}",
        assignments.len() + 1
    );
    let values = assignments
        .into_iter()
        .map(|(_, value)| value)
        .chain(std::iter::once(Value::Text(id.to_owned())));
    conn.execute(&sql, params_from_iter(values))
        .with_context(|| format!("updating {name} row {id}"))?;
    Ok(())
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        icon: row.get(2)?,
        color: row.get(3)?,
        parent_id: row.get::<_, Option<String>>(4)?.map(FolderId::new),
        sort_order: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: DocId::new(row.get::<_, String>(0)?),
        parent_id: FolderId::new(row.get::<_, String>(1)?),
        title: row.get(2)?,
        content: row.get(3)?,
        date: row.get(4)?,
        tags: json_column(row, 5)?,
        icon: row.get(6)?,
        color: row.get(7)?,
        cover: row.get(8)?,
        is_locked: row.get::<_, i64>(9)? != 0,
        is_hidden: row.get::<_, i64>(10)? != 0,
        attachments: json_column(row, 11)?,
        created_at: row.get(12)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attachment;
    use tempfile::TempDir;

    fn open_gateway() -> anyhow::Result<(TempDir, SqliteGateway)> {
        let temp = TempDir::new()?;
        let options = GatewayOptions {
            database_path: temp.path().join("data/docs.db"),
            blob_dir: temp.path().join("data/blobs"),
            ..GatewayOptions::default()
        };
        let gateway = SqliteGateway::open(&options)?;
        Ok((temp, gateway))
    }

    fn folder(id: &str, parent: Option<&str>, created_at: i64) -> Folder {
        let mut folder = Folder::new(id.into(), id.to_uppercase(), parent.map(FolderId::from));
        folder.created_at = created_at;
        folder
    }

    #[test]
    fn select_orders_by_creation_time() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        gateway.insert_folders(&[folder("folder-b", None, 20), folder("folder-a", None, 10)])?;
        let ids: Vec<_> = gateway
            .select_folders()?
            .into_iter()
            .map(|f| f.id.to_string())
            .collect();
        assert_eq!(ids, vec!["folder-a", "folder-b"]);
        Ok(())
    }

    #[test]
    fn document_json_columns_survive_storage() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        gateway.insert_folders(&[folder("folder-a", None, 1)])?;
        let mut doc = Document::new("doc-1".into(), "folder-a".into(), "Ceph notes");
        doc.tags = vec!["Storage".into(), "HA".into()];
        doc.is_hidden = true;
        doc.attachments.push(Attachment {
            id: "att-1".into(),
            name: "diagram.png".into(),
            url: "file:///tmp/diagram.png".into(),
            size: 2048,
            mime: Some("image/png".into()),
            uploaded_at: "2026-10-18T09:00:00Z".into(),
        });
        gateway.insert_documents(&[doc.clone()])?;

        let loaded = gateway.select_documents()?;
        assert_eq!(loaded, vec![doc]);
        Ok(())
    }

    #[test]
    fn updates_publish_the_stored_row() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        let feed = gateway.subscribe(&[Table::Folders]);
        gateway.insert_folders(&[folder("folder-a", None, 1), folder("folder-b", None, 2)])?;
        gateway.update_folder(
            &"folder-b".into(),
            &FolderPatch {
                parent_id: Some(Some("folder-a".into())),
                title: Some("Nested".into()),
                ..FolderPatch::default()
            },
        )?;

        let events: Vec<_> = feed.try_iter().collect();
        assert_eq!(events.len(), 3);
        match &events[2] {
            ChangeEvent::FolderUpdated(folder) => {
                assert_eq!(folder.title, "Nested");
                assert_eq!(folder.parent_id, Some("folder-a".into()));
            }
            other => panic!("expected folder update, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn sort_order_batch_is_all_or_nothing() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        let mut seeded = folder("folder-b", None, 2);
        seeded.sort_order = 7;
        gateway.insert_folders(&[folder("folder-a", None, 1), seeded])?;
        let result = gateway.update_sort_orders(&[
            ("folder-b".into(), 0),
            ("folder-missing".into(), 1),
            ("folder-a".into(), 2),
        ]);
        assert!(result.is_err());
        let orders: Vec<_> = gateway
            .select_folders()?
            .into_iter()
            .map(|f| f.sort_order)
            .collect();
        assert_eq!(orders, vec![0, 7]);
        Ok(())
    }

    #[test]
    fn update_of_missing_row_fails() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        let err = gateway
            .update_document(
                &"doc-ghost".into(),
                &DocumentPatch {
                    is_locked: Some(true),
                    ..DocumentPatch::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("doc-ghost"));
        Ok(())
    }

    #[test]
    fn blobs_land_under_blob_dir() -> anyhow::Result<()> {
        let (temp, gateway) = open_gateway()?;
        gateway.upload_blob("docs/abc-report.pdf", b"%PDF", Some("application/pdf"))?;
        let expected = temp.path().join("data/blobs/docs/abc-report.pdf");
        assert_eq!(fs::read(&expected)?, b"%PDF");
        assert!(gateway
            .public_url("docs/abc-report.pdf")
            .ends_with("docs/abc-report.pdf"));
        Ok(())
    }

    #[test]
    fn delete_all_clears_table() -> anyhow::Result<()> {
        let (_temp, gateway) = open_gateway()?;
        gateway.insert_folders(&[folder("folder-a", None, 1), folder("folder-b", None, 2)])?;
        assert_eq!(gateway.delete_all(Table::Folders)?, 2);
        assert!(gateway.select_folders()?.is_empty());
        Ok(())
    }
}
