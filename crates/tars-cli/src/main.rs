//! tars CLI: retrieval-augmented conversational assistant

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tars_core::index::{IndexStats, ProgressEvent};
use tars_core::retrieve::is_error;
use tars_core::{
    layout, CachedEmbedder, CompletionClient, Config, Conversation, Embed, EmbeddingCache,
    EmbeddingClient, FlatStore, IndexManifest, Indexer, Persona, Retriever, RetryPolicy,
    TarsError, VectorStore, DEFAULT_DATA_DIR, DEFAULT_DB_DIR,
};

/// Reply shown when the language model keeps failing.
const APOLOGY: &str = "Sorry, I am having trouble processing your request.";

#[derive(Parser)]
#[command(name = "tars")]
#[command(about = "Retrieval-augmented conversational assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding the vector store, manifest and config
    #[arg(long, env = "DB_DIR", default_value = DEFAULT_DB_DIR, global = true)]
    db_dir: PathBuf,

    /// Directory of documents to index
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Base URL of the model service (overrides config and environment)
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the db directory with a default config and an empty store
    Init,

    /// Index new and changed documents
    Index {
        /// Drop the existing index and re-embed everything
        #[arg(long)]
        rebuild: bool,
    },

    /// Show configuration and index statistics
    Status,

    /// Show the chunks closest to a query, with scores
    Search {
        /// Search query
        query: Vec<String>,

        /// Number of results (default: top_k from config)
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// Print the context text a chat turn would receive
    Context {
        query: Vec<String>,

        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// Talk to the assistant (default)
    Chat {
        /// Persona to play, e.g. "tars" or "glados"
        #[arg(short, long)]
        persona: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let Cli {
        command,
        db_dir,
        data_dir,
        url,
    } = Cli::parse();

    let config = || load_config(&db_dir, url.as_deref());

    match command.unwrap_or(Commands::Chat { persona: None }) {
        Commands::Init => cmd_init(&db_dir)?,
        Commands::Index { rebuild } => cmd_index(&db_dir, &data_dir, &config()?, rebuild)?,
        Commands::Status => cmd_status(&db_dir, &config()?)?,
        Commands::Search { query, k } => {
            let config = config()?;
            let k = k.unwrap_or(config.top_k);
            cmd_search(&db_dir, &config, &query.join(" "), k)?;
        }
        Commands::Context { query, k } => {
            let config = config()?;
            let k = k.unwrap_or(config.top_k);
            cmd_context(&db_dir, &config, &query.join(" "), k)?;
        }
        Commands::Chat { persona } => {
            cmd_chat(&db_dir, &data_dir, &config()?, persona.as_deref())?
        }
    }

    Ok(())
}

/// Config file, then environment, then command-line flags.
fn load_config(db_dir: &Path, url: Option<&str>) -> Result<Config> {
    let mut config = Config::load(db_dir)
        .with_context(|| format!("Failed to load config from {}", db_dir.display()))?;
    config.apply_env().context("Invalid environment override")?;
    if let Some(url) = url {
        config.base_url = url.to_string();
    }
    Ok(config)
}

fn build_embedder(config: &Config) -> Result<CachedEmbedder<EmbeddingClient>> {
    Ok(CachedEmbedder::new(
        EmbeddingClient::from_config(config)?,
        EmbeddingCache::from_config(config)?,
    ))
}

fn open_store(db_dir: &Path) -> Result<FlatStore> {
    FlatStore::open(db_dir)
        .with_context(|| format!("Failed to open vector store in {}", db_dir.display()))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message);
    Ok(pb)
}

fn cmd_init(db_dir: &Path) -> Result<()> {
    let config_path = layout::config_path(db_dir);
    if config_path.exists() {
        anyhow::bail!("Already initialized: {} exists", config_path.display());
    }

    std::fs::create_dir_all(db_dir)?;
    Config::default().save(db_dir)?;
    open_store(db_dir)?;

    println!("Initialized tars database in {}", db_dir.display());
    println!("Run 'tars index' to index documents.");

    Ok(())
}

/// Run the indexer with a progress bar and return its stats.
fn index_with_progress(indexer: &mut Indexer, data_dir: &Path) -> Result<IndexStats> {
    let pb = spinner("Scanning documents...")?;
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("█▓░");

    indexer.set_progress_callback(Box::new({
        let pb = pb.clone();
        move |event| match event {
            ProgressEvent::Scanning { count } => {
                pb.set_message(format!("Scanning... {} documents found", count));
            }
            ProgressEvent::Indexing {
                current,
                total,
                filename,
            } => {
                pb.set_style(bar_style.clone());
                pb.set_length(total as u64);
                pb.set_position(current as u64);
                pb.set_message(filename.to_string());
            }
            ProgressEvent::Embedding { current, total } => {
                pb.set_message(format!("Embedding chunks {}/{}...", current, total));
            }
        }
    }));

    let stats = indexer
        .run(data_dir)
        .with_context(|| format!("Failed to index {}", data_dir.display()));
    pb.finish_and_clear();
    stats
}

fn print_stats(stats: &IndexStats) {
    println!("✓ Indexing complete:");
    println!("  Files scanned:   {}", stats.files_scanned);
    println!("  Files indexed:   {}", stats.files_indexed);
    println!("  Files unchanged: {}", stats.files_unchanged);
    println!("  Files skipped:   {}", stats.files_skipped);
    println!("  Files pruned:    {}", stats.files_pruned);
    println!("  Chunks created:  {}", stats.chunks_created);
}

fn cmd_index(db_dir: &Path, data_dir: &Path, config: &Config, rebuild: bool) -> Result<()> {
    let embedder = build_embedder(config)?;
    let mut store = open_store(db_dir)?;
    let mut indexer = Indexer::new(db_dir, config, &embedder, &mut store)?;

    if rebuild {
        indexer.reset().context("Failed to clear the index")?;
    }

    let stats = index_with_progress(&mut indexer, data_dir)?;
    print_stats(&stats);

    if stats.files_skipped > 0 {
        println!(
            "  {} file(s) will be retried on the next run.",
            stats.files_skipped
        );
    }

    Ok(())
}

fn cmd_status(db_dir: &Path, config: &Config) -> Result<()> {
    println!("tars database: {}", db_dir.display());
    println!();
    println!("Configuration:");
    println!("  Service: {}", config.service_url());
    println!("  Embedding model: {}", config.embedding_model);
    println!("  Completion model: {}", config.completion_model);
    println!(
        "  Chunking: {} chars, {} overlap",
        config.chunk_size, config.chunk_overlap
    );
    println!("  Fallback policy: {:?}", config.fallback_policy);
    println!("  Cache capacity: {}", config.cache_capacity);
    println!();

    if !layout::store_path(db_dir).exists() {
        println!("No index yet. Run 'tars init' or 'tars index' first.");
        return Ok(());
    }

    let manifest = IndexManifest::load(db_dir)?;
    let store = open_store(db_dir)?;

    println!("Index:");
    println!("  Files indexed: {}", manifest.len());
    println!("  Total chunks: {}", store.count()?);
    match store.dimension() {
        Some(dimension) => println!("  Dimension: {}", dimension),
        None => println!("  Dimension: -"),
    }

    Ok(())
}

fn cmd_search(db_dir: &Path, config: &Config, query: &str, k: usize) -> Result<()> {
    let pb = spinner("Searching...")?;

    let embedder = build_embedder(config)?;
    let store = open_store(db_dir)?;
    let results = Retriever::new(config, &embedder, &store).search(query, k);

    pb.finish_and_clear();
    let results = results.context("Search failed")?;

    if results.is_empty() {
        println!("No results found for: {}", query);
        return Ok(());
    }

    println!("Results for: {}\n", query);

    for (i, result) in results.iter().enumerate() {
        let score_color = if result.score > 0.7 {
            "\x1b[32m" // Green for high scores
        } else if result.score > 0.5 {
            "\x1b[33m" // Yellow for medium scores
        } else {
            "\x1b[31m"
        };

        let fallback = if result.payload.fallback {
            " \x1b[2m(fallback)\x1b[0m"
        } else {
            ""
        };

        println!(
            "\x1b[1;36m[{}]\x1b[0m {}{:.3}\x1b[0m  \x1b[1m{}\x1b[0m#{}{}",
            i + 1,
            score_color,
            result.score,
            result.payload.filename,
            result.payload.chunk_index,
            fallback,
        );
        for line in result.payload.text.lines() {
            println!("│ {}", line);
        }
        println!();
    }

    Ok(())
}

fn cmd_context(db_dir: &Path, config: &Config, query: &str, k: usize) -> Result<()> {
    let embedder = build_embedder(config)?;
    let store = open_store(db_dir)?;
    println!("{}", Retriever::new(config, &embedder, &store).retrieve(query, k));
    Ok(())
}

fn cmd_chat(
    db_dir: &Path,
    data_dir: &Path,
    config: &Config,
    persona: Option<&str>,
) -> Result<()> {
    let retry = RetryPolicy::from_config(config);
    let client = CompletionClient::from_config(config)?;

    status(Status::Info, "Starting TARS...");
    let ready = retry.wait_until(|attempt| {
        if client.is_ready() {
            return true;
        }
        status(
            Status::Warning,
            &format!(
                "Waiting for the language model server... attempt {}/{}",
                attempt,
                retry.attempts()
            ),
        );
        false
    });
    if !ready {
        anyhow::bail!(
            "Could not reach the language model server at {}. Make sure it is running.",
            config.service_url()
        );
    }
    status(Status::Success, "TARS is ready");

    let embedder = build_embedder(config)?;
    let mut store = open_store(db_dir)?;
    status(Status::Info, "Loading documents...");
    if let Some(stats) = load_documents(db_dir, data_dir, config, &embedder, &mut store, &retry) {
        status(
            Status::Success,
            &format!(
                "Documents loaded ({} indexed, {} unchanged, {} skipped)",
                stats.files_indexed, stats.files_unchanged, stats.files_skipped
            ),
        );
    }

    let mut lines = io::stdin().lines();
    let persona = match persona {
        Some(name) => {
            let found = Persona::find(name);
            if found.is_none() {
                status(
                    Status::Warning,
                    &format!("Unknown persona '{}', using TARS", name),
                );
            }
            found.unwrap_or_else(Persona::default_persona)
        }
        None => select_persona(&mut lines)?,
    };
    status(Status::Info, &format!("Acting as: {}", persona.name));
    status(Status::Info, "Type 'exit' to quit.");

    let retriever = Retriever::new(config, &embedder, &store);
    let mut conversation = Conversation::new(persona);

    loop {
        print!("\x1b[96mYou:\x1b[0m ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            break;
        }

        status(Status::Thinking, "Looking for relevant context...");
        let context = retry
            .run(|_| {
                let context = retriever.retrieve(text, config.top_k);
                if is_error(&context) {
                    Err(TarsError::Index(context))
                } else {
                    Ok(context)
                }
            })
            .unwrap_or_else(|_| {
                status(
                    Status::Error,
                    &format!(
                        "Could not retrieve context after {} attempts",
                        retry.attempts()
                    ),
                );
                String::new()
            });

        status(Status::Thinking, "Thinking...");
        let reply = retry
            .run(|_| conversation.respond(&client, text, Some(&context)))
            .unwrap_or_else(|e| {
                status(
                    Status::Error,
                    &format!(
                        "No reply from the language model after {} attempts: {}",
                        retry.attempts(),
                        e
                    ),
                );
                APOLOGY.to_string()
            });

        println!("\x1b[92m{}:\x1b[0m {}\n", persona.name, reply);
    }

    status(Status::Info, "Goodbye!");
    Ok(())
}

/// Bring the index up to date before chatting.
///
/// Failures are reported and the conversation continues against whatever
/// the store already holds.
fn load_documents(
    db_dir: &Path,
    data_dir: &Path,
    config: &Config,
    embedder: &dyn Embed,
    store: &mut FlatStore,
    retry: &RetryPolicy,
) -> Option<IndexStats> {
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        status(
            Status::Warning,
            &format!("Could not create {}: {}", data_dir.display(), e),
        );
    }

    let result = retry.run(|_| -> Result<IndexStats> {
        let mut indexer = Indexer::new(db_dir, config, embedder, &mut *store)?;
        index_with_progress(&mut indexer, data_dir)
    });

    match result {
        Ok(stats) => Some(stats),
        Err(e) => {
            status(
                Status::Error,
                &format!(
                    "Could not load documents after {} attempts: {:#}",
                    retry.attempts(),
                    e
                ),
            );
            status(Status::Warning, "Continuing with the existing index.");
            None
        }
    }
}

/// Ask for a persona by number until a valid one is chosen.
fn select_persona(
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<&'static Persona> {
    status(Status::Info, "Available personas:");
    for (i, persona) in Persona::all().iter().enumerate() {
        println!("  {}. {}: {}", i + 1, persona.name, persona.description);
    }

    loop {
        status(Status::Info, "Enter the number of the persona to use:");
        let Some(line) = lines.next() else {
            return Ok(Persona::default_persona());
        };

        match line?.trim().parse().ok().and_then(Persona::by_number) {
            Some(persona) => {
                status(
                    Status::Success,
                    &format!("Selected persona: {}", persona.name),
                );
                return Ok(persona);
            }
            None => status(Status::Error, "Invalid choice. Enter one of the numbers above."),
        }
    }
}

#[derive(Clone, Copy)]
enum Status {
    Info,
    Success,
    Warning,
    Error,
    Thinking,
}

fn status(kind: Status, message: &str) {
    let (color, symbol) = match kind {
        Status::Info => ("\x1b[94m", "ℹ"),
        Status::Success => ("\x1b[92m", "✓"),
        Status::Warning => ("\x1b[93m", "⚠"),
        Status::Error => ("\x1b[91m", "✗"),
        Status::Thinking => ("\x1b[95m", "…"),
    };
    println!("{}{} {}\x1b[0m", color, symbol, message);
}
