//! # docrag CLI
//!
//! Manage embedding providers, ingest documents into collections, and run
//! semantic search from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the SQLite database and run schema migrations |
//! | `docrag providers bootstrap` | Create or update the built-in providers |
//! | `docrag providers test <provider>` | Test a connection and refresh its catalog |
//! | `docrag collections create <name>` | Create a collection bound to an embedding model |
//! | `docrag upload <collection> <path>` | Ingest a PDF, DOCX, PPTX, or XLSX file |
//! | `docrag embed pending <collection>` | Retry chunks stored without an embedding |
//! | `docrag search "<query>" -c <collection>` | Semantic search |
//! | `docrag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! docrag init
//! docrag providers bootstrap
//! docrag providers test ollama
//! docrag collections create handbook --provider ollama --model nomic-embed-text
//! docrag upload handbook ./handbook.pdf
//! docrag search "parental leave policy" -c handbook --limit 3
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docrag::app::App;
use docrag::config;
use docrag::error::Error;
use docrag::ingest::NewCollection;
use docrag::migrate;
use docrag::registry::{Change, NewProvider, ProviderPatch};
use docrag::server;
use docrag::tasks::TaskState;
use docrag_core::models::{Collection, ProviderConfig, ProviderView};

/// docrag: provider-abstracted document indexing and semantic search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage embedding and chat providers.
    Providers {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Manage collections.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Upload a document and wait for chunking and embedding to finish.
    Upload {
        /// Collection id or name.
        collection: String,
        path: PathBuf,
        /// Display filename; decides the file type. Defaults to the path's.
        #[arg(long)]
        filename: Option<String>,
    },

    /// Inspect and delete documents.
    Documents {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Search one or more collections.
    Search {
        query: String,
        /// Collection id or name. Repeat to search several.
        #[arg(short, long = "collection", required = true)]
        collections: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Local,
    Api,
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Create or update the built-in providers from config and environment.
    Bootstrap,
    List,
    /// Register a custom provider.
    Add {
        name: String,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        base_url: String,
        /// Environment variable holding the API key.
        #[arg(long)]
        api_key_env: Option<String>,
        #[arg(long)]
        inactive: bool,
    },
    /// Replace a provider's API key with the value of an environment variable.
    SetKey {
        provider: String,
        #[arg(long)]
        env: String,
    },
    Remove {
        provider: String,
    },
    /// Test the connection; on success the model catalog is refreshed.
    Test {
        provider: String,
    },
    /// Refresh the model catalog.
    Refresh {
        provider: String,
    },
    /// List the stored model catalog.
    Models {
        provider: String,
    },
    /// Mark a model as selected.
    Select {
        provider: String,
        model: String,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    Create {
        name: String,
        /// Embedding provider id or name.
        #[arg(long)]
        provider: String,
        /// Provider-native embedding model id.
        #[arg(long)]
        model: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    List,
    /// Delete a collection with its documents and chunks.
    Delete {
        collection: String,
    },
}

#[derive(Subcommand)]
enum DocumentAction {
    List {
        collection: String,
    },
    Delete {
        id: String,
    },
    /// Show chunk and embedding counts.
    Status {
        id: String,
    },
    /// Re-chunk and re-embed with the collection's current settings.
    Reindex {
        id: String,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks stored without an embedding.
    Pending {
        collection: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "docrag=debug" } else { "docrag=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            let app = App::open(&cfg).await?;
            server::run_server(app).await?;
        }
        command => {
            let app = App::open(&cfg).await?;
            run(&app, command).await?;
        }
    }

    Ok(())
}

async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Providers { action } => run_providers(app, action).await?,
        Commands::Collections { action } => run_collections(app, action).await?,
        Commands::Upload {
            collection,
            path,
            filename,
        } => {
            let collection = app.pipeline.find_collection(&collection).await?;
            let document = app
                .pipeline
                .upload(&collection.id, &path, filename.as_deref())
                .await?;
            println!("Stored {} ({})", document.filename, document.id);
            match app.pipeline.wait(&document.id).await {
                Some(TaskState::Completed { report }) => {
                    println!("  chunks:   {}", report.chunks);
                    println!("  embedded: {}", report.embedded);
                    if report.failed_embeddings > 0 {
                        println!(
                            "  pending:  {} (retry with `docrag embed pending {}`)",
                            report.failed_embeddings, collection.name
                        );
                    }
                    if report.failed_writes > 0 {
                        println!("  failed writes: {}", report.failed_writes);
                    }
                }
                Some(TaskState::Failed { message }) => anyhow::bail!("ingestion failed: {}", message),
                _ => anyhow::bail!("ingestion task for {} was lost", document.id),
            }
        }
        Commands::Documents { action } => run_documents(app, action).await?,
        Commands::Embed {
            action: EmbedAction::Pending { collection },
        } => {
            let collection = app.pipeline.find_collection(&collection).await?;
            let report = app.pipeline.embed_pending(&collection.id).await?;
            println!("Embedding pending chunks in {}", collection.name);
            println!("  pending:  {}", report.chunks);
            println!("  embedded: {}", report.embedded);
            println!("  failed:   {}", report.failed_embeddings + report.failed_writes);
        }
        Commands::Search {
            query,
            collections,
            limit,
        } => {
            let mut ids = Vec::with_capacity(collections.len());
            for key in &collections {
                ids.push(app.pipeline.find_collection(key).await?.id);
            }
            let hits = app
                .retrieval
                .search(&query, &ids, limit)
                .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] document {} chunk {}",
                    i + 1,
                    hit.score,
                    hit.chunk.document_id,
                    hit.chunk.chunk_index
                );
                println!("    {}", snippet(&hit.chunk.content, 160));
            }
        }
        Commands::Init | Commands::Serve => {}
    }
    Ok(())
}

async fn run_providers(app: &App, action: ProviderAction) -> anyhow::Result<()> {
    let registry = &app.registry;
    match action {
        ProviderAction::Bootstrap => {
            let views = registry.bootstrap(&app.builtin_seeds()).await?;
            for view in &views {
                print_provider(view);
            }
        }
        ProviderAction::List => {
            let views = registry.list().await?;
            if views.is_empty() {
                println!("No providers. Run `docrag providers bootstrap`.");
            }
            for view in &views {
                print_provider(view);
            }
        }
        ProviderAction::Add {
            name,
            kind,
            base_url,
            api_key_env,
            inactive,
        } => {
            let config = match kind {
                KindArg::Local => ProviderConfig::local(base_url),
                KindArg::Api => ProviderConfig::api(base_url),
            };
            let credential = match api_key_env {
                Some(var) => Some(
                    std::env::var(&var).with_context(|| format!("{} is not set", var))?,
                ),
                None => None,
            };
            let view = registry
                .register(NewProvider {
                    name,
                    config,
                    credential,
                    is_active: !inactive,
                })
                .await?;
            print_provider(&view);
        }
        ProviderAction::SetKey { provider, env } => {
            let view = resolve_provider(app, &provider).await?;
            let key = std::env::var(&env).with_context(|| format!("{} is not set", env))?;
            let view = registry
                .update(
                    &view.id,
                    ProviderPatch {
                        credential: Change::Set(key),
                        ..Default::default()
                    },
                )
                .await?;
            print_provider(&view);
        }
        ProviderAction::Remove { provider } => {
            let view = resolve_provider(app, &provider).await?;
            registry.remove(&view.id).await?;
            println!("Removed {}", view.name);
        }
        ProviderAction::Test { provider } => {
            let view = resolve_provider(app, &provider).await?;
            let outcome = registry.test_provider(&view.id).await?;
            if outcome.success {
                println!("{}: ok ({})", view.name, outcome.message);
            } else {
                println!(
                    "{}: failed [{}] {}",
                    view.name,
                    outcome.code.unwrap_or("error"),
                    outcome.message
                );
            }
            if let Some(refresh) = outcome.refresh {
                match refresh.wait().await {
                    Some(count) => println!("  models: {}", count),
                    None => println!("  model refresh failed; see log"),
                }
            }
        }
        ProviderAction::Refresh { provider } => {
            let view = resolve_provider(app, &provider).await?;
            let models = registry.refresh_models(&view.id).await?;
            println!("{}: {} models", view.name, models.len());
        }
        ProviderAction::Models { provider } => {
            let view = resolve_provider(app, &provider).await?;
            for model in registry.list_models(&view.id).await? {
                let mut flags = Vec::new();
                if model.is_default {
                    flags.push("default");
                }
                if model.is_selected {
                    flags.push("selected");
                }
                println!("{:<40} {}", model.model_id, flags.join(","));
            }
        }
        ProviderAction::Select { provider, model } => {
            let view = resolve_provider(app, &provider).await?;
            let model = registry.select_model(&view.id, &model).await?;
            println!("{}: selected {}", view.name, model.model_id);
        }
    }
    Ok(())
}

async fn run_collections(app: &App, action: CollectionAction) -> anyhow::Result<()> {
    match action {
        CollectionAction::Create {
            name,
            provider,
            model,
            description,
            chunk_size,
            chunk_overlap,
        } => {
            let provider = resolve_provider(app, &provider).await?;
            let collection = app
                .pipeline
                .create_collection(NewCollection {
                    name,
                    description,
                    chunk_size,
                    chunk_overlap,
                    embedding_provider_id: provider.id,
                    embedding_model_id: model,
                })
                .await?;
            print_collection(&collection);
        }
        CollectionAction::List => {
            for collection in app.pipeline.list_collections().await? {
                print_collection(&collection);
            }
        }
        CollectionAction::Delete { collection } => {
            let collection = app.pipeline.find_collection(&collection).await?;
            app.pipeline.delete_collection(&collection.id).await?;
            println!("Deleted {}", collection.name);
        }
    }
    Ok(())
}

async fn run_documents(app: &App, action: DocumentAction) -> anyhow::Result<()> {
    match action {
        DocumentAction::List { collection } => {
            let collection = app.pipeline.find_collection(&collection).await?;
            for doc in app.pipeline.list_documents(&collection.id).await? {
                println!(
                    "{}  {:<5} {:>10}  {}",
                    doc.id,
                    doc.file_type.as_str(),
                    doc.file_size_bytes,
                    doc.filename
                );
            }
        }
        DocumentAction::Delete { id } => {
            app.pipeline.delete_document(&id).await?;
            println!("Deleted {}", id);
        }
        DocumentAction::Status { id } => {
            let doc = app.pipeline.get_document(&id).await?;
            let chunks = app.pipeline.list_chunks(&id).await?;
            let embedded = chunks.iter().filter(|c| c.embedding.is_some()).count();
            println!("{} ({})", doc.filename, doc.id);
            println!("  chunks:   {}", chunks.len());
            println!("  embedded: {}", embedded);
        }
        DocumentAction::Reindex { id } => {
            app.pipeline.reindex_document(&id).await?;
            match app.pipeline.wait(&id).await {
                Some(TaskState::Completed { report }) => {
                    println!("Reindexed {}: {} chunks, {} embedded", id, report.chunks, report.embedded)
                }
                Some(TaskState::Failed { message }) => anyhow::bail!("reindex failed: {}", message),
                _ => anyhow::bail!("reindex task for {} was lost", id),
            }
        }
    }
    Ok(())
}

/// Look up a provider by id, falling back to its name.
async fn resolve_provider(app: &App, key: &str) -> docrag::error::Result<ProviderView> {
    match app.registry.get(key).await {
        Err(Error::NotFound { .. }) => app.registry.get_by_name(key).await,
        other => other,
    }
}

fn print_provider(view: &ProviderView) {
    let status = if view.is_connected {
        "connected"
    } else {
        view.last_test_result.as_str()
    };
    println!(
        "{}  {:<16} {:<6} {:<10} key={}  {}",
        view.id,
        view.name,
        view.kind.as_str(),
        status,
        view.credential_hint.as_deref().unwrap_or("-"),
        view.config.base_url()
    );
}

fn print_collection(collection: &Collection) {
    println!(
        "{}  {:<20} {}/{}  model={}",
        collection.id,
        collection.name,
        collection.chunk_size,
        collection.chunk_overlap,
        collection.embedding_model_id
    );
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
