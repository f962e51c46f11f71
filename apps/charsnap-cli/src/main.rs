mod manifest;

use anyhow::{Context, bail};
use charsnap_common::{CoreConfig, CoreEvent, GamePath, NotifyLevel};
use charsnap_interchange::{ExportCodec, ExportRequest, McdfImporter};
use charsnap_migrate::MigrationEngine;
use charsnap_store::{
    AppearanceKind, METADATA_FILE, SnapshotCapturer, SnapshotState, list_snapshots,
};
use clap::{Parser, Subcommand};
use manifest::CaptureManifest;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "charsnap", about = "Versioned character snapshots for mod tooling")]
struct Cli {
    /// YAML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade every snapshot directory to the current format
    Migrate,
    /// Import an MCDF character file as a new snapshot
    Import {
        /// Path to the .mcdf file
        file: PathBuf,
    },
    /// Export a snapshot as a PMP mod pack
    Export {
        /// Snapshot name under the snapshots root, or a directory path
        snapshot: String,
        /// Chain node to export (defaults to the current node)
        #[arg(long)]
        node: Option<String>,
        /// Only export these game paths (materials bring their textures)
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
        /// Mod name (defaults to the snapshot's actor)
        #[arg(long)]
        name: Option<String>,
    },
    /// Capture the state described by a manifest into a snapshot
    Capture {
        /// Snapshot name under the snapshots root, or a directory path
        snapshot: String,
        /// YAML manifest standing in for the live host
        #[arg(short, long)]
        manifest: PathBuf,
        /// Actor name (defaults to the manifest's actor)
        #[arg(short, long)]
        actor: Option<String>,
    },
    /// Show the file-map chain and appearance histories of a snapshot
    History {
        snapshot: String,
    },
    /// Move a snapshot's current pointer to another chain node
    Checkout {
        snapshot: String,
        node: String,
    },
    /// List snapshots under the snapshots root
    List,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    let (tx, rx) = mpsc::channel();

    let result = run(cli.command, &config, &tx);
    print_events(&rx);
    result
}

fn run(command: Commands, config: &CoreConfig, tx: &mpsc::Sender<CoreEvent>) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let report = MigrationEngine::new(&config.backup_dir, tx).run(&config.snapshots_root)?;
            println!(
                "Migration: migrated={}, stamped={}, up-to-date={}, already-migrated={}, unknown={}, failed={}",
                report.migrated.len(),
                report.stamped.len(),
                report.up_to_date.len(),
                report.skipped_marked.len(),
                report.unknown.len(),
                report.failed.len()
            );
            if let Some(backup) = &report.backup {
                println!("Backup: {}", backup.display());
            }
            for (dir, reason) in &report.failed {
                println!("  failed {}: {reason}", dir.display());
            }
        }
        Commands::Import { file } => {
            let importer = McdfImporter::new(tx);
            let report = std::thread::scope(|s| {
                s.spawn(|| importer.import_file(&file, &config.snapshots_root))
                    .join()
            })
            .map_err(|_| anyhow::anyhow!("import worker panicked"))??;
            println!(
                "Imported {} paths ({} new blobs) into {}",
                report.mapped_paths,
                report.blobs_written,
                report.dir.display()
            );
            if let Some(t) = report.truncated {
                println!(
                    "  truncated at entry {}: declared {} bytes, {} available",
                    t.index, t.declared, t.available
                );
            }
            if report.ignored_swaps > 0 {
                println!("  {} file swaps were not carried", report.ignored_swaps);
            }
        }
        Commands::Export {
            snapshot,
            node,
            select,
            name,
        } => {
            let mut request = ExportRequest::new(snapshot_dir(config, &snapshot)?, &config.export_dir);
            request.node_id = node;
            request.mod_name = name;
            if !select.is_empty() {
                let selection = select
                    .iter()
                    .map(|p| GamePath::new(p).with_context(|| format!("bad game path {p:?}")))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                request = request.with_selection(selection);
            }
            let codec = ExportCodec::new(config.author.clone(), tx);
            let report = std::thread::scope(|s| s.spawn(|| codec.export(&request)).join())
                .map_err(|_| anyhow::anyhow!("export worker panicked"))??;
            println!(
                "Exported {} paths in {} blobs to {}",
                report.paths,
                report.blobs,
                report.archive.display()
            );
            for path in &report.missing {
                println!("  missing blob for {path}");
            }
        }
        Commands::Capture {
            snapshot,
            manifest,
            actor,
        } => {
            let host = CaptureManifest::load(&manifest)
                .with_context(|| format!("reading manifest {}", manifest.display()))?;
            let actor = host.actor(actor.as_deref());
            let capturer = SnapshotCapturer::new(&host, &host, tx);
            let dir = target_dir(config, &snapshot);
            if dir.join(METADATA_FILE).is_file() {
                let outcome = capturer.update(&dir, &actor)?;
                match outcome.node_id() {
                    Some(id) => println!("Recorded node {id} in {}", dir.display()),
                    None => println!("No changes for {}", dir.display()),
                }
            } else {
                let root = dir.parent().unwrap_or(Path::new("."));
                let name = dir.file_name().map(|n| n.to_string_lossy().into_owned());
                let created = capturer.create(root, &actor, name.as_deref())?;
                println!("Created snapshot {}", created.display());
            }
        }
        Commands::History { snapshot } => {
            let state = SnapshotState::load(snapshot_dir(config, &snapshot)?)?;
            let current = state.current_file_map_id();
            println!(
                "{} (format {}, {} paths, updated {})",
                state.source_actor,
                state.format_version,
                state.file_replacements().len(),
                state.last_update().format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(id) = current {
                let depth = state.file_maps().lineage(id)?.len();
                println!("current node {id} sits {depth} node(s) deep");
            }
            for node in state.file_maps().nodes() {
                let marker = if Some(node.id.as_str()) == current { "*" } else { " " };
                println!(
                    "{marker} {} parent={} changes={} manip={} at {}",
                    node.id,
                    node.parent_id.as_deref().unwrap_or("-"),
                    node.changes.len(),
                    if node.manipulation_override.is_some() { "set" } else { "inherited" },
                    node.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            for kind in [AppearanceKind::Glamourer, AppearanceKind::Customize] {
                println!("{kind:?} history:");
                for entry in state.history(kind) {
                    println!(
                        "  {} {} node={}{}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.description,
                        entry.file_map_id.as_deref().unwrap_or("-"),
                        if entry.derived_template.is_some() { " (template)" } else { "" }
                    );
                }
            }
        }
        Commands::Checkout { snapshot, node } => {
            let dir = snapshot_dir(config, &snapshot)?;
            let mut state = SnapshotState::load(&dir)?;
            state.checkout(&node)?;
            state.save(&dir)?;
            println!(
                "{} now at {node} ({} paths)",
                dir.display(),
                state.file_replacements().len()
            );
        }
        Commands::List => {
            let dirs = list_snapshots(&config.snapshots_root)?;
            if dirs.is_empty() {
                println!("No snapshots under {}", config.snapshots_root.display());
            }
            for dir in dirs {
                let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                match SnapshotState::load(&dir) {
                    Ok(state) => println!(
                        "{name}: actor={}, paths={}, nodes={}",
                        state.source_actor,
                        state.file_replacements().len(),
                        state.file_maps().len()
                    ),
                    Err(e) => println!("{name}: unreadable ({e})"),
                }
            }
        }
    }
    Ok(())
}

/// A snapshot argument names a directory under the root unless it is already
/// a path to one.
fn target_dir(config: &CoreConfig, snapshot: &str) -> PathBuf {
    let direct = PathBuf::from(snapshot);
    if direct.join(METADATA_FILE).is_file() {
        direct
    } else {
        config.snapshots_root.join(snapshot)
    }
}

fn snapshot_dir(config: &CoreConfig, snapshot: &str) -> anyhow::Result<PathBuf> {
    let dir = target_dir(config, snapshot);
    if !dir.join(METADATA_FILE).is_file() {
        bail!("no snapshot at {}", dir.display());
    }
    Ok(dir)
}

fn print_events(rx: &Receiver<CoreEvent>) {
    for event in rx.try_iter() {
        match event {
            CoreEvent::SnapshotsChanged => tracing::debug!("snapshots changed"),
            CoreEvent::Notification { level, message } => {
                let tag = match level {
                    NotifyLevel::Info => "info",
                    NotifyLevel::Success => "ok",
                    NotifyLevel::Warning => "warn",
                    NotifyLevel::Error => "error",
                };
                println!("[{tag}] {message}");
            }
        }
    }
}
