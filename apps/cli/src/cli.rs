use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ooxml_package::{
    default_storage_root, NodeKind, PackageSession, PartStatus, PartSummary, SessionHandle,
    SessionRegistry, ViewerConfig,
};
use serde::Serialize;

use crate::console_host::ConsoleHost;

#[derive(Parser)]
#[command(
    name = "ooxml-viewer",
    about = "Inspect and edit the XML parts of OOXML packages (docx, xlsx, pptx).",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub options: GlobalOptions,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Directory holding the part caches (default: the platform cache directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub storage_root: Option<PathBuf>,

    /// JSON settings file (`preserveComments`, `maximumOOXMLFileSizeBytes`, ...).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Drop XML comments when writing edited parts back.
    #[arg(long, global = true)]
    pub no_preserve_comments: bool,

    /// Refuse archives larger than this many bytes.
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_file_size: Option<u64>,

    /// Refuse archives with more entries than this.
    #[arg(long, global = true, value_name = "COUNT")]
    pub max_parts: Option<usize>,

    /// Leave parts whose minified size exceeds this unformatted.
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_format_size: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the parts of a package with their status, size and media type
    Inspect(InspectArgs),
    /// Print one part, pretty-printed
    Extract(ExtractArgs),
    /// Keep a package open: reload on change and write cached edits back
    Watch(WatchArgs),
    /// Find lines containing a term across the parts of a package
    Search(SearchArgs),
}

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct InspectArgs {
    pub archive: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ExtractArgs {
    pub archive: PathBuf,

    /// Part path inside the package, e.g. `word/document.xml`.
    pub part: String,
}

#[derive(Args)]
pub struct WatchArgs {
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct SearchArgs {
    pub archive: PathBuf,

    pub term: String,
}

#[derive(Debug, Serialize)]
struct JsonInspect<'a> {
    archive: String,
    cache: String,
    parts: &'a [PartSummary],
}

impl GlobalOptions {
    pub fn viewer_config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::from_json_file(path)
                .with_context(|| format!("read settings {}", path.display()))?,
            None => ViewerConfig::default(),
        };
        if self.no_preserve_comments {
            config.preserve_comments = false;
        }
        if let Some(max) = self.max_file_size {
            config.maximum_ooxml_file_size_bytes = max;
        }
        if let Some(max) = self.max_parts {
            config.maximum_number_of_ooxml_parts = max;
        }
        if let Some(max) = self.max_format_size {
            config.maximum_xml_parts_file_size_bytes = max;
        }
        Ok(config)
    }

    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage_root {
            Some(root) => Ok(root.clone()),
            None => default_storage_root()
                .context("no cache directory available; pass --storage-root"),
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let host = Arc::new(ConsoleHost::new());
    let watching = matches!(cli.command, Command::Watch(_));
    let registry = SessionRegistry::new(
        cli.options.storage_root()?,
        cli.options.viewer_config()?,
        host.clone(),
    )
    .with_watching(watching);

    let result = match &cli.command {
        Command::Inspect(args) => inspect(&registry, args).await,
        Command::Extract(args) => extract(&registry, args).await,
        Command::Watch(args) => watch(&registry, args).await,
        Command::Search(args) => search(&registry, &host, args).await,
    };
    registry.close_all().await;
    result
}

async fn open(registry: &SessionRegistry, archive: &Path) -> Result<SessionHandle> {
    registry
        .open(archive)
        .await
        .with_context(|| format!("open {}", archive.display()))?
        .with_context(|| format!("{} could not be opened", archive.display()))
}

async fn inspect(registry: &SessionRegistry, args: &InspectArgs) -> Result<()> {
    let handle = open(registry, &args.archive).await?;
    let session = handle.lock().await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => write_tree(&mut out, &session)?,
        OutputFormat::Json => {
            let parts = session.part_summaries();
            let report = JsonInspect {
                archive: session.archive_path().display().to_string(),
                cache: session.cache().base_dir().display().to_string(),
                parts: &parts,
            };
            serde_json::to_writer_pretty(&mut out, &report)?;
            out.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn write_tree(out: &mut impl Write, session: &PackageSession) -> Result<()> {
    let tree = session.tree();
    let summaries = session.part_summaries();
    writeln!(out, "{}", session.archive_path().display())?;
    for (depth, id) in tree.walk() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        let indent = "  ".repeat(depth + 1);
        match node.kind() {
            NodeKind::File => {
                let summary = summaries.iter().find(|s| s.path == node.path());
                let (size, content_type) =
                    summary.map_or((0, ""), |s| (s.size, s.content_type));
                writeln!(
                    out,
                    "{indent}{}{}  {size} bytes  {content_type}",
                    node.name(),
                    status_marker(node.status()),
                )?;
            }
            NodeKind::Folder | NodeKind::PackageRoot => writeln!(out, "{indent}{}/", node.name())?,
        }
    }
    Ok(())
}

fn status_marker(status: PartStatus) -> &'static str {
    match status {
        PartStatus::Unchanged => "",
        PartStatus::Modified => " [modified]",
        PartStatus::Created => " [created]",
        PartStatus::Deleted => " [deleted]",
    }
}

async fn extract(registry: &SessionRegistry, args: &ExtractArgs) -> Result<()> {
    let handle = open(registry, &args.archive).await?;
    let session = handle.lock().await;
    let part = ooxml_package::normalize_part_name(&args.part);
    if session.tree().find(&part).is_none() {
        anyhow::bail!("{} has no part named {part}", args.archive.display());
    }

    session.view_part(&part).await;
    let path = session.cache().normal_file_path(&part);
    let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(&bytes)?;
    if !bytes.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    Ok(())
}

async fn watch(registry: &SessionRegistry, args: &WatchArgs) -> Result<()> {
    let handle = open(registry, &args.archive).await?;
    let normal_dir = handle.lock().await.cache().normal_dir();
    eprintln!(
        "watching {}; edit files under {} to change the package (Ctrl-C to stop)",
        args.archive.display(),
        normal_dir.display()
    );
    drop(handle);

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for Ctrl-C")?;
                log::info!("interrupted");
                return Ok(());
            }
            _ = ticker.tick() => {
                if registry.open_archives().is_empty() {
                    eprintln!("{} is gone, stopping", args.archive.display());
                    return Ok(());
                }
            }
        }
    }
}

async fn search(registry: &SessionRegistry, host: &ConsoleHost, args: &SearchArgs) -> Result<()> {
    let handle = open(registry, &args.archive).await?;
    let session = handle.lock().await;
    session.search(&args.term);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for found in host.take_matches() {
        let part = session.cache().get_file_path_from_cache_file_path(&found.path);
        writeln!(out, "{part}:{}: {}", found.line, found.text)?;
    }
    Ok(())
}
