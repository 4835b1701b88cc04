//! # libdocs CLI
//!
//! Entry point for the `libdocs` binary: `serve` starts the REST/MCP
//! server; `create-library`, `upload-doc`, and `fetch-doc` call the
//! service layer directly, in-process, for local administration without
//! a loopback HTTP round trip.

use clap::{Parser, Subcommand};
use std::sync::Arc;

use libdocs::config::Config;
use libdocs::{documents, embedding, libraries, migrate, server, store, AppState};

#[derive(Parser)]
#[command(name = "libdocs", about = "libdocs — a self-hosted documentation retrieval service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations
    Init,

    /// Start the REST API and MCP server
    Serve {
        /// Override the HTTP port from configuration
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create a library record
    CreateLibrary {
        name: String,
        #[arg(long)]
        language: String,
        #[arg(long)]
        ecosystem: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Upload a document's content for a library
    UploadDoc {
        #[arg(long)]
        library_id: String,
        #[arg(long)]
        title: String,
        /// Path to a file containing the document's content
        #[arg(long)]
        file: std::path::PathBuf,
    },

    /// Fetch a document's content from a URL and ingest it
    FetchDoc {
        #[arg(long)]
        library_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
    },
}

async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let config = Arc::new(config);
    let pool = libdocs::db::connect(&config).await?;
    let store: Arc<dyn store::Store> = Arc::new(store::SqliteStore::new(pool));
    let embedder = Arc::from(embedding::create_embedder(&config.embedder_model, config.embedding_dim)?);
    let http_client = reqwest::Client::builder().timeout(config.fetch_timeout).build()?;
    Ok(Arc::new(AppState { store, embedder, config, http_client }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.http_port = port;
            }
            migrate::run_migrations(&config).await?;
            let state = build_state(config).await?;
            server::serve(state).await?;
        }
        Commands::CreateLibrary { name, language, ecosystem, description } => {
            migrate::run_migrations(&config).await?;
            let state = build_state(config).await?;
            let library = libraries::create_library(
                state.store.as_ref(),
                libraries::NewLibrary { name, language, ecosystem, description, ..Default::default() },
            )
            .await?;
            println!("Created library {} ({})", library.name, library.context7_id);
        }
        Commands::UploadDoc { library_id, title, file } => {
            migrate::run_migrations(&config).await?;
            let state = build_state(config).await?;
            let content = std::fs::read_to_string(&file)?;
            let outcome = documents::create_from_content(state.store.as_ref(), state.embedder.as_ref(), &state.config, &library_id, &title, &content).await?;
            println!("Ingested document {} ({} chunks)", outcome.document_id, outcome.chunk_count);
        }
        Commands::FetchDoc { library_id, title, url } => {
            migrate::run_migrations(&config).await?;
            let state = build_state(config).await?;
            let outcome =
                documents::create_from_url(state.store.as_ref(), state.embedder.as_ref(), &state.config, &state.http_client, &library_id, &title, &url).await?;
            println!("Ingested document {} ({} chunks)", outcome.document_id, outcome.chunk_count);
        }
    }

    Ok(())
}
