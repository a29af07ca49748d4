use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bookmark_hub_core::codec::{BookmarkId, DecodedTarget, PlatformTag, TargetIdentity};
use bookmark_hub_core::handle::StorageHandle;
use bookmark_hub_core::platform::native::NativeFsAuthorizer;
use bookmark_hub_core::provider::StorageProvider;
use bookmark_hub_core::resolver::ResolveError;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Save and resolve durable bookmarks for files and folders outside
/// the sandbox. Stands in for the picker (a path argument) and the
/// persistence layer (stdout) around the core.
#[derive(Parser)]
#[command(name = "bookmark-hub")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bookmark a file or folder and print its identifier
    Save { path: PathBuf },
    /// Resolve a saved identifier, print the handle, release it
    Resolve {
        id: String,
        #[arg(long, value_enum, default_value_t = TagArg::PathString)]
        tag: TagArg,
    },
    /// Print handle metadata for an identifier as JSON
    Info {
        id: String,
        #[arg(long, value_enum, default_value_t = TagArg::PathString)]
        tag: TagArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TagArg {
    PathString,
    ContentReference,
    SecurityScopedBlob,
}

impl From<TagArg> for PlatformTag {
    fn from(tag: TagArg) -> Self {
        match tag {
            TagArg::PathString => PlatformTag::PathString,
            TagArg::ContentReference => PlatformTag::ContentReference,
            TagArg::SecurityScopedBlob => PlatformTag::SecurityScopedBlob,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let provider = StorageProvider::new(Arc::new(NativeFsAuthorizer::new()));

    match cli.command {
        Command::Save { path } => {
            let path = tokio::fs::canonicalize(&path)
                .await
                .with_context(|| format!("cannot bookmark {}", path.display()))?;
            let target = DecodedTarget {
                tag: PlatformTag::PathString,
                identity: TargetIdentity::Path(path),
            };
            let handle = provider.open_selection(target).await.map_err(regrant_hint)?;
            let Some(id) = provider.save_bookmark(&handle) else {
                let _ = provider.release(&handle).await;
                bail!("selection is not bookmarkable");
            };
            let _ = provider.release(&handle).await;
            tracing::debug!(tag = %id.tag(), "bookmark saved");
            println!("{}", id.to_wire_string());
        }
        Command::Resolve { id, tag } => {
            let id = BookmarkId::from_tagged(tag.into(), &id)?;
            let handle = provider.resolve(&id).await.map_err(regrant_hint)?;
            print_handle(&handle);
            provider.release(&handle).await?;
        }
        Command::Info { id, tag } => {
            let id = BookmarkId::from_tagged(tag.into(), &id)?;
            let handle = provider.resolve(&id).await.map_err(regrant_hint)?;
            let info = serde_json::json!({
                "name": handle.name(),
                "kind": handle.kind().as_str(),
                "path": handle.path(),
                "capabilities": handle.capabilities(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
            provider.release(&handle).await?;
        }
    }
    Ok(())
}

fn print_handle(handle: &StorageHandle) {
    println!("name: {}", handle.name());
    println!("kind: {}", handle.kind().as_str());
    if let Some(path) = handle.path() {
        println!("path: {}", path.display());
    }
    let caps = handle.capabilities();
    println!(
        "capabilities: bookmarkable={} deletable={} movable={} enumerable={}",
        caps.bookmarkable, caps.deletable, caps.movable, caps.enumerable
    );
}

fn regrant_hint(err: ResolveError) -> anyhow::Error {
    match err {
        ResolveError::BookmarkInvalidated(_) => anyhow::Error::new(err)
            .context("bookmark invalidated; ask the user to pick the target again"),
        other => other.into(),
    }
}
