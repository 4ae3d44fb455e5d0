use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Subcommand};

use crate::config::AppConfig;
use crate::model::{Appearance, DocId, Document, FolderId};
use crate::query::{highlight_matches, render_tree};
use crate::workspace::{DocumentView, Target, Workspace};

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Folder to list (defaults to the first folder)
    #[arg(long)]
    pub folder: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search terms, matched against titles and tags
    #[arg(required = true)]
    pub query: Vec<String>,
    /// Limit the number of results printed (defaults to search.max_results)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Document identifier
    pub doc: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RenameArgs {
    /// Identifier of the item to rename
    pub id: String,
    /// New name
    pub name: String,
    /// New icon name
    #[arg(long)]
    pub icon: Option<String>,
    /// New icon color tag
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Identifier of the item to delete
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Identifier of the item
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct FolderArgs {
    #[command(subcommand)]
    pub command: FolderCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FolderCommand {
    /// Create a folder, optionally under a root folder
    New(FolderNewArgs),
    /// Rename a folder and optionally change its icon
    Rename(RenameArgs),
    /// Move a folder under a root folder, or back to the top level
    Move(FolderMoveArgs),
    /// Copy a folder row (contents are not copied)
    Duplicate(IdArgs),
    /// Delete an empty folder
    Delete(DeleteArgs),
    /// Move a folder to the position of another one
    Reorder(ReorderArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FolderNewArgs {
    /// Folder name
    pub name: String,
    /// Root folder to create it in
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("destination").required(true).args(["to", "root"])))]
pub struct FolderMoveArgs {
    /// Folder to move
    pub id: String,
    /// Root folder to move it into
    #[arg(long)]
    pub to: Option<String>,
    /// Make it a top-level folder
    #[arg(long)]
    pub root: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReorderArgs {
    /// Folder being dragged
    pub id: String,
    /// Folder whose position it takes
    pub over: String,
}

#[derive(Args, Debug, Clone)]
pub struct DocArgs {
    #[command(subcommand)]
    pub command: DocCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DocCommand {
    /// Create a document (prompted for a title if omitted)
    New(DocNewArgs),
    /// Replace a document's title and/or body
    Edit(DocEditArgs),
    /// Rename a document and optionally change its icon
    Rename(RenameArgs),
    /// Move a document into another folder
    Move(DocMoveArgs),
    /// Copy a document
    Duplicate(IdArgs),
    /// Delete a document
    Delete(DeleteArgs),
    /// Toggle the locked flag
    Lock(IdArgs),
    /// Toggle the hidden flag
    Hide(IdArgs),
    /// Upload a file and attach it to a document
    Attach(DocAttachArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DocNewArgs {
    /// Title for the document (prompted if omitted)
    pub title: Option<String>,
    /// Folder to create it in (defaults to the first folder)
    #[arg(long)]
    pub folder: Option<String>,
    /// Provide the body inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DocEditArgs {
    /// Document identifier
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New body. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DocMoveArgs {
    /// Document identifier
    pub id: String,
    /// Destination folder
    pub to: String,
}

#[derive(Args, Debug, Clone)]
pub struct DocAttachArgs {
    /// Document identifier
    pub id: String,
    /// File to upload
    pub path: PathBuf,
    /// MIME type recorded with the attachment
    #[arg(long)]
    pub mime: Option<String>,
}

pub fn tree(workspace: &Workspace, config: &AppConfig) -> String {
    let rows = workspace.tree_rows();
    if rows.is_empty() {
        return "No folders.\n".to_string();
    }
    let mut out = render_tree(&rows, config.tree.max_title_width);
    out.push('\n');
    out
}

pub fn list(workspace: &mut Workspace, args: ListArgs) -> Result<String> {
    if let Some(folder) = args.folder {
        workspace.select_folder(&FolderId::from(folder))?;
    }
    let docs = workspace.visible_documents();
    Ok(format_documents(&docs, None))
}

pub fn search(workspace: &mut Workspace, config: &AppConfig, args: SearchArgs) -> Result<String> {
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("search query cannot be empty");
    }
    workspace.set_search(query.as_str());
    let limit = args.limit.unwrap_or(config.search.max_results);
    let docs: Vec<&Document> = workspace.visible_documents().into_iter().take(limit).collect();
    Ok(format_documents(&docs, Some(query.trim())))
}

pub fn show(workspace: &Workspace, args: ShowArgs) -> Result<String> {
    let id = DocId::from(args.doc);
    let mut out = String::new();
    match workspace.view_document(&id) {
        None => bail!("document {id} not found"),
        Some(DocumentView::Locked { title }) => {
            let _ = writeln!(&mut out, "{title}");
            let _ = writeln!(&mut out, "This document is locked. Sign in to read it.");
        }
        Some(DocumentView::Content(doc)) => {
            let _ = writeln!(&mut out, "{}", doc.title);
            let _ = writeln!(&mut out, "    {}  {}", doc.date, format_tags(&doc.tags));
            out.push('\n');
            let _ = writeln!(&mut out, "{}", doc.content);
            if !doc.attachments.is_empty() {
                out.push('\n');
                let _ = writeln!(&mut out, "Attachments:");
                for attachment in &doc.attachments {
                    let _ = writeln!(
                        &mut out,
                        "- {} ({} bytes) {}",
                        attachment.name, attachment.size, attachment.url
                    );
                }
            }
        }
    }
    Ok(out)
}

pub fn handle_folder_command(workspace: &mut Workspace, args: FolderArgs) -> Result<String> {
    match args.command {
        FolderCommand::New(args) => {
            let parent = args.parent.map(FolderId::from);
            let id = workspace.create_folder(&args.name, parent.as_ref())?;
            Ok(format!("Created folder {id}\n"))
        }
        FolderCommand::Rename(args) => {
            let target = Target::Folder(FolderId::from(args.id));
            workspace.rename(&target, appearance(args.name, args.icon, args.color))?;
            Ok(String::new())
        }
        FolderCommand::Move(args) => {
            let destination = args.to.map(FolderId::from);
            workspace.move_folder(&FolderId::from(args.id), destination.as_ref())?;
            Ok(String::new())
        }
        FolderCommand::Duplicate(args) => {
            let copy = workspace.duplicate(&Target::Folder(FolderId::from(args.id)))?;
            Ok(format!("Created {}\n", target_id(&copy)))
        }
        FolderCommand::Delete(args) => {
            delete(workspace, Target::Folder(FolderId::from(args.id)), args.yes)
        }
        FolderCommand::Reorder(args) => {
            workspace.reorder_folder(&FolderId::from(args.id), &FolderId::from(args.over))?;
            Ok(String::new())
        }
    }
}

pub fn handle_doc_command(workspace: &mut Workspace, args: DocArgs) -> Result<String> {
    match args.command {
        DocCommand::New(args) => doc_new(workspace, args),
        DocCommand::Edit(args) => doc_edit(workspace, args),
        DocCommand::Rename(args) => {
            let target = Target::Document(DocId::from(args.id));
            workspace.rename(&target, appearance(args.name, args.icon, args.color))?;
            Ok(String::new())
        }
        DocCommand::Move(args) => {
            workspace.move_document(&DocId::from(args.id), &FolderId::from(args.to))?;
            Ok(String::new())
        }
        DocCommand::Duplicate(args) => {
            let copy = workspace.duplicate(&Target::Document(DocId::from(args.id)))?;
            Ok(format!("Created {}\n", target_id(&copy)))
        }
        DocCommand::Delete(args) => {
            delete(workspace, Target::Document(DocId::from(args.id)), args.yes)
        }
        DocCommand::Lock(args) => {
            let id = DocId::from(args.id);
            let locked = workspace.toggle_lock(&id)?;
            Ok(format!("{id} {}\n", if locked { "locked" } else { "unlocked" }))
        }
        DocCommand::Hide(args) => {
            let id = DocId::from(args.id);
            let hidden = workspace.toggle_hide(&id)?;
            Ok(format!("{id} {}\n", if hidden { "hidden" } else { "visible" }))
        }
        DocCommand::Attach(args) => doc_attach(workspace, args),
    }
}

pub fn reset(workspace: &mut Workspace, args: ResetArgs) -> Result<String> {
    if !workspace.session().is_authenticated() {
        bail!("sign in with --user to reset the workspace");
    }
    if !confirm(
        "This deletes every folder and document and restores the defaults. Continue?",
        args.yes,
    )? {
        return Ok("Reset cancelled.\n".to_string());
    }
    workspace.reset_workspace()?;
    Ok(String::new())
}

fn doc_new(workspace: &mut Workspace, args: DocNewArgs) -> Result<String> {
    if let Some(folder) = args.folder {
        workspace.select_folder(&FolderId::from(folder))?;
    }
    let title = match args.title {
        Some(title) => title,
        None => prompt("Title")?,
    };
    let body = match args.body {
        Some(body) => Some(body),
        None => read_stdin()?,
    };

    let id = workspace.create_document(&title)?;
    match body {
        Some(body) => {
            workspace.edit_buffer_mut()?.content = body;
            workspace.save_edit()?;
        }
        None => workspace.cancel_edit()?,
    }
    Ok(format!("Created document {id}\n"))
}

fn doc_edit(workspace: &mut Workspace, args: DocEditArgs) -> Result<String> {
    let body = match args.body {
        Some(body) => Some(body),
        None => read_stdin()?,
    };
    if args.title.is_none() && body.is_none() {
        bail!("nothing to change; pass --title, --body or pipe the body on stdin");
    }
    workspace.select_document(&DocId::from(args.id))?;
    workspace.start_editing()?;
    {
        let draft = workspace.edit_buffer_mut()?;
        if let Some(title) = args.title {
            draft.title = title;
        }
        if let Some(body) = body {
            draft.content = body;
        }
    }
    if let Err(err) = workspace.save_edit() {
        workspace.cancel_edit()?;
        return Err(err.into());
    }
    Ok(String::new())
}

fn doc_attach(workspace: &mut Workspace, args: DocAttachArgs) -> Result<String> {
    let name = args
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", args.path.display()))?
        .to_owned();
    let bytes = fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;

    workspace.select_document(&DocId::from(args.id))?;
    workspace.start_editing()?;
    let attachment = match workspace.attach_file(&name, &bytes, args.mime.as_deref()) {
        Ok(attachment) => attachment,
        Err(err) => {
            workspace.cancel_edit()?;
            return Err(err.into());
        }
    };
    workspace.save_edit()?;
    Ok(format!("Attached {} -> {}\n", attachment.name, attachment.url))
}

fn delete(workspace: &mut Workspace, target: Target, yes: bool) -> Result<String> {
    let pending = workspace.request_delete(&target)?;
    if !confirm(&pending.prompt(), yes)? {
        return Ok("Delete cancelled.\n".to_string());
    }
    workspace.confirm_delete(pending)?;
    Ok(String::new())
}

fn appearance(title: String, icon: Option<String>, color: Option<String>) -> Appearance {
    Appearance { title, icon, color }
}

fn target_id(target: &Target) -> String {
    match target {
        Target::Folder(id) => id.to_string(),
        Target::Document(id) => id.to_string(),
    }
}

fn format_documents(docs: &[&Document], highlight: Option<&str>) -> String {
    if docs.is_empty() {
        return "No documents.\n".to_string();
    }
    let mut out = String::new();
    for doc in docs {
        let title = match highlight {
            Some(query) => highlight_matches(&doc.title, query),
            None => doc.title.clone(),
        };
        let mut headline = format!("{}  {}", doc.id, title);
        if doc.is_locked {
            headline.push_str("  [LOCKED]");
        }
        if doc.is_hidden {
            headline.push_str("  [HIDDEN]");
        }
        let _ = writeln!(&mut out, "{headline}");
        let _ = writeln!(&mut out, "    {}  {}", doc.date, format_tags(&doc.tags));
    }
    out
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !atty::is(atty::Stream::Stdin) {
        bail!("{question} Re-run with --yes to confirm non-interactively.");
    }
    let answer = prompt(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::OpError;
    use crate::gateway::MemoryGateway;
    use crate::session::Session;
    use crate::workspace::test_support::{admin, open};
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn seeded(session: Session) -> (Arc<MemoryGateway>, Workspace) {
        let gateway = Arc::new(MemoryGateway::new());
        let workspace = open(&gateway, session);
        (gateway, workspace)
    }

    #[test]
    fn cli_tree_prints_seeded_hierarchy() {
        let (_gateway, workspace) = seeded(admin());
        let output = tree(&workspace, &AppConfig::default());
        insta::assert_snapshot!(output, @r###"
        ▾ Docs *
          • Proxmox
          • Nextcloud
        • Test Folder
        "###);
    }

    #[test]
    fn cli_search_highlights_and_respects_limit() -> TestResult {
        let (_gateway, mut workspace) = seeded(admin());
        let output = search(
            &mut workspace,
            &AppConfig::default(),
            SearchArgs {
                query: vec!["proxmox".into()],
                limit: Some(1),
            },
        )?;
        assert!(output.contains("[Proxmox]"));
        assert_eq!(output.matches("doc-").count(), 1);
        Ok(())
    }

    #[test]
    fn cli_show_masks_locked_documents_for_anonymous_users() -> TestResult {
        let (gateway, mut workspace) = seeded(admin());
        workspace.toggle_lock(&"doc-brand".into())?;
        workspace.flush();
        drop(workspace);

        let anon = open(&gateway, Session::anonymous());
        let output = show(
            &anon,
            ShowArgs {
                doc: "doc-brand".into(),
            },
        )?;
        assert!(output.contains("locked"));
        assert!(!output.contains("<"));
        Ok(())
    }

    #[test]
    fn cli_doc_new_saves_the_body() -> TestResult {
        let (gateway, mut workspace) = seeded(admin());
        let output = doc_new(
            &mut workspace,
            DocNewArgs {
                title: Some("Backups".into()),
                folder: Some("folder-test".into()),
                body: Some("<p>nightly</p>".into()),
            },
        )?;
        workspace.flush();

        let id = output
            .trim()
            .strip_prefix("Created document ")
            .expect("document id");
        let saved = gateway.document(&id.into()).expect("saved document");
        assert_eq!(saved.parent_id, FolderId::from("folder-test"));
        assert_eq!(saved.content, "<p>nightly</p>");
        assert!(!workspace.editor().is_editing());
        Ok(())
    }

    #[test]
    fn cli_folder_delete_reports_blocking_children() {
        let (_gateway, mut workspace) = seeded(admin());
        let err = handle_folder_command(
            &mut workspace,
            FolderArgs {
                command: FolderCommand::Delete(DeleteArgs {
                    id: "folder-docs".into(),
                    yes: true,
                }),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OpError>(),
            Some(OpError::FolderNotEmpty { documents: 2, folders: 2 })
        ));
        assert_eq!(workspace.store().folder_count(), 4);
    }

    #[test]
    fn cli_doc_attach_uploads_file() -> TestResult {
        let (gateway, mut workspace) = seeded(admin());
        let temp = TempDir::new()?;
        let path = temp.path().join("diagram.png");
        fs::write(&path, [1u8, 2, 3])?;

        let output = doc_attach(
            &mut workspace,
            DocAttachArgs {
                id: "doc-zen".into(),
                path,
                mime: Some("image/png".into()),
            },
        )?;
        workspace.flush();

        assert!(output.starts_with("Attached diagram.png"));
        let saved = gateway.document(&"doc-zen".into()).expect("document");
        assert_eq!(saved.attachments.len(), 1);
        assert_eq!(saved.attachments[0].mime.as_deref(), Some("image/png"));
        assert_eq!(gateway.counts().uploads, 1);
        Ok(())
    }

    #[test]
    fn cli_mutations_need_a_user() {
        let (_gateway, mut workspace) = seeded(Session::anonymous());
        let err = handle_doc_command(
            &mut workspace,
            DocArgs {
                command: DocCommand::Lock(IdArgs {
                    id: "doc-zen".into(),
                }),
            },
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<OpError>(), Some(OpError::Unauthorized)));
    }
}
