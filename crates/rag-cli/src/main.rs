//! CLI entry point: `rag init`, `rag rebuild`, `rag chat`, `rag ask`, `rag status`, `rag watch`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use rag_core::config::config_path;
use rag_core::index::BuildProgress;
use rag_core::{
    build_index, client_from_config, load_config, save_config, AskError, BuildStep, IndexStore,
    RagConfig, RebuildCoordinator, RebuildState, RebuildStatus, CONFIG_FILENAME,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rag")]
#[command(about = "Local RAG: index a folder of documents and ask questions about it")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create rag.yaml for a documents folder and build the index.
    Init {
        /// Folder with your .txt, .md and .pdf files.
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
    },
    /// Rebuild the index from the configured folder.
    Rebuild {
        /// Index this folder instead, and remember it in rag.yaml.
        #[arg(long, value_name = "FOLDER")]
        folder: Option<PathBuf>,
    },
    /// Interactive question answering. `/rebuild [folder]` re-indexes in the background.
    Chat,
    /// Answer a single question.
    Ask {
        #[arg(value_name = "QUESTION", required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Show config and index summary.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Rebuild whenever files in the documents folder change (until Ctrl+C).
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let work_dir = std::env::current_dir().context("cannot determine working directory")?;
    match command {
        Commands::Init { folder } => init(&work_dir, folder).await,
        Commands::Rebuild { folder } => rebuild(&work_dir, folder).await,
        Commands::Chat => chat(&work_dir).await,
        Commands::Ask { question } => ask(&work_dir, &question.join(" ")).await,
        Commands::Status { json } => status(&work_dir, json),
        Commands::Watch => watch(&work_dir).await,
    }
}

fn require_config(work_dir: &Path) -> anyhow::Result<RagConfig> {
    match load_config(work_dir)? {
        Some(config) => Ok(config),
        None => bail!("No configuration found. Run `rag init <folder>` first."),
    }
}

/// Coordinator with the persisted index loaded; fails if there is none yet.
fn open_index(work_dir: &Path) -> anyhow::Result<RebuildCoordinator> {
    let config = require_config(work_dir)?;
    let client = client_from_config(&config)?;
    let coordinator = RebuildCoordinator::new(config, client, IndexStore::new(work_dir));
    if !coordinator.load_existing()? {
        bail!("No index found. Run `rag rebuild` to create it.");
    }
    Ok(coordinator)
}

async fn init(work_dir: &Path, folder: PathBuf) -> anyhow::Result<()> {
    if config_path(work_dir).exists() {
        println!(
            "Configuration file already exists. Use `rag rebuild` to update or delete {} to start over.",
            CONFIG_FILENAME
        );
        return Ok(());
    }
    let config = RagConfig::new(folder);
    config.validate()?;
    save_config(work_dir, &config)?;
    println!("Initialized config for '{}'", config.folder_path.display());
    build_foreground(work_dir, &config)
        .await
        .context("initial build failed; fix the problem and run `rag rebuild`")
}

async fn rebuild(work_dir: &Path, folder: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = require_config(work_dir)?;
    let folder_changed = folder.is_some();
    if let Some(folder) = folder {
        config.folder_path = folder;
    }
    config.validate()?;
    build_foreground(work_dir, &config).await?;
    if folder_changed {
        save_config(work_dir, &config)?;
        println!("Saved new folder to {}", CONFIG_FILENAME);
    }
    Ok(())
}

async fn build_foreground(work_dir: &Path, config: &RagConfig) -> anyhow::Result<()> {
    println!("Starting ingestion pipeline...");
    let client = client_from_config(config)?;
    let store = IndexStore::new(work_dir);
    let report = |step: BuildStep| match step {
        BuildStep::Embedding { done, total } if done > 0 && done % 10 != 0 && done != total => {}
        BuildStep::Embedding { done, total } if done > 0 => {
            print!("\r  Embedded {done}/{total}");
            let _ = std::io::stdout().flush();
            if done == total {
                println!();
            }
        }
        step => println!("{step}"),
    };
    let progress: BuildProgress<'_> = &report;
    let loaded = build_index(config, client.as_ref(), &store, Some(progress)).await?;
    println!(
        "Index successfully built: {} chunks saved to '{}'.",
        loaded.len(),
        store.dir().display()
    );
    Ok(())
}

async fn chat(work_dir: &Path) -> anyhow::Result<()> {
    let coordinator = open_index(work_dir)?;
    println!("\n--- RAG Chatbot Ready ---");
    println!("Model: {}", coordinator.config().chat_model);
    println!("Type 'exit' to quit, '/rebuild [folder]' to re-index, '/status' for rebuild progress.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if let Some(rest) = input.strip_prefix("/rebuild") {
            let folder = Some(rest.trim()).filter(|s| !s.is_empty()).map(PathBuf::from);
            match coordinator.start_rebuild(folder) {
                Ok(_) => println!("Rebuild started in the background. Use /status to follow it.\n"),
                Err(e) => println!("{e}\n"),
            }
            continue;
        }
        if input == "/status" {
            print_status(&coordinator.status());
            continue;
        }
        match coordinator.ask(input).await {
            Ok(answer) => {
                println!("Bot: {}", answer.text);
                if !answer.sources.is_empty() {
                    println!("Sources: {}", answer.sources.join(", "));
                }
                println!();
            }
            Err(AskError::Query(e)) => println!("{e}\n"),
            Err(e) => println!("Error: {e}\n"),
        }
    }
    Ok(())
}

async fn ask(work_dir: &Path, question: &str) -> anyhow::Result<()> {
    let coordinator = open_index(work_dir)?;
    let answer = coordinator.ask(question).await?;
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources: {}", answer.sources.join(", "));
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    config_file: PathBuf,
    config: Option<RagConfig>,
    index_dir: PathBuf,
    indexed_chunks: Option<usize>,
    dimension: Option<usize>,
}

fn status(work_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(work_dir)?;
    let store = IndexStore::new(work_dir);
    let loaded = store.load()?;
    let report = StatusReport {
        config_file: config_path(work_dir),
        config,
        index_dir: store.dir().to_path_buf(),
        indexed_chunks: loaded.as_ref().map(|l| l.len()),
        dimension: loaded.as_ref().map(|l| l.index.dimension()),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match &report.config {
        Some(c) => {
            println!("Config:    {}", report.config_file.display());
            println!("  folder:    {}", c.folder_path.display());
            println!("  chunking:  {} chars, {} overlap", c.chunk_size, c.overlap);
            println!("  models:    embed={} chat={}", c.embedding_model, c.chat_model);
            println!("  endpoint:  {:?} at {}", c.provider, c.client_base_url);
        }
        None => println!("Config:    none (run `rag init <folder>`)"),
    }
    match (report.indexed_chunks, report.dimension) {
        (Some(n), Some(d)) => println!("Index:     {n} chunks, dimension {d}"),
        _ => println!("Index:     none (run `rag rebuild`)"),
    }
    Ok(())
}

async fn watch(work_dir: &Path) -> anyhow::Result<()> {
    let config = require_config(work_dir)?;
    let client = client_from_config(&config)?;
    let coordinator = RebuildCoordinator::new(config.clone(), client, IndexStore::new(work_dir));
    if !coordinator.load_existing()? {
        info!("no index yet; building one before watching");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _watcher = rag_core::watch_folder(
        &config.folder_path,
        &config.ignore_dirs,
        rag_core::DEFAULT_DEBOUNCE,
        move |paths| {
            let _ = tx.send(paths);
        },
    )?;
    println!(
        "Watching '{}'. Press Ctrl+C to stop.",
        config.folder_path.display()
    );

    // Changes that arrive during a rebuild are folded into one follow-up rebuild.
    let mut pending = coordinator.indexed_chunks().is_none();
    let mut running: Option<JoinHandle<()>> = None;
    loop {
        if pending && running.is_none() {
            match coordinator.start_rebuild(None) {
                Ok(handle) => {
                    println!("Rebuilding...");
                    running = Some(handle);
                    pending = false;
                }
                Err(e) => warn!(error = %e, "rebuild request rejected"),
            }
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(paths) = rx.recv() => {
                info!(changed = paths.len(), "documents changed");
                pending = true;
            }
            _ = wait_for(&mut running) => {
                running = None;
                print_status(&coordinator.status());
            }
        }
    }
    Ok(())
}

/// Resolves when the rebuild in `handle` ends; never resolves if there is none.
async fn wait_for(handle: &mut Option<JoinHandle<()>>) {
    match handle {
        Some(h) => {
            if let Err(e) = h.await {
                warn!(error = %e, "rebuild task failed");
            }
        }
        None => std::future::pending().await,
    }
}

fn print_status(status: &RebuildStatus) {
    let label = match status.state {
        RebuildState::Idle => "idle",
        RebuildState::Running => "running",
        RebuildState::Success => "success",
        RebuildState::Error => "error",
    };
    println!("[{label}] {}\n", status.message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_first_build_points_to_rebuild() {
        let work = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();

        let err = init(work.path(), docs.path().to_path_buf())
            .await
            .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("run `rag rebuild`"), "{message}");
        assert!(message.contains("no valid documents"), "{message}");
        assert!(config_path(work.path()).exists());
    }

    #[tokio::test]
    async fn init_leaves_existing_config_alone() {
        let work = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let mut existing = RagConfig::new(docs.path());
        existing.top_k = 9;
        save_config(work.path(), &existing).unwrap();

        init(work.path(), PathBuf::from("/elsewhere")).await.unwrap();

        assert_eq!(load_config(work.path()).unwrap(), Some(existing));
    }
}
