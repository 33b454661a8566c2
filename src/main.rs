use anyhow::Result;
use clap::{Parser, Subcommand};
use docrag::cache::EmbeddingCache;
use docrag::db::{migrate, Db};
use docrag::embeddings::OpenAIEmbedder;
use docrag::retrieve::{OpenAIGenerator, Retriever};
use docrag::{Config, Indexer, VectorStore};
use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(about = "Incremental document indexing and grounded question answering")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index the configured documents folder (incremental by default)
    Index {
        /// Re-chunk and re-embed every document, ignoring mtimes
        #[arg(short, long)]
        force: bool,
    },
    /// Ask a question grounded in the indexed documents
    Ask {
        /// The question to answer
        question: String,

        /// Number of chunks to retrieve (defaults from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Show index counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    let config = Config::load()?;
    log::info!("Configuration loaded");
    log::info!("Docs folder: {}", config.docs_folder().display());
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;
    log::info!("Database initialized");

    let store = VectorStore::new(db);
    let embedder = Arc::new(build_embedder(&config)?);

    match args.command {
        Command::Index { force } => {
            let indexer = Indexer::new(
                config.docs_folder().to_path_buf(),
                store,
                embedder,
                config.chunking.clone(),
            );

            let report = indexer.run(force).await?;
            if report.is_noop() {
                log::info!("Index already up to date ({} unchanged)", report.unchanged);
            } else {
                log::info!("Indexing finished: {}", report);
            }
        }
        Command::Ask { question, top_k } => {
            let api_key = api_key(&config)?;
            let generator = Arc::new(OpenAIGenerator::new(api_key, &config.generation));

            let mut retriever = Retriever::new(store, embedder, generator, &config.retrieval);
            if config.embeddings.cache_capacity > 0 {
                retriever = retriever
                    .with_cache(Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity)));
            }

            let grounded = retriever.ask(&question, top_k).await?;

            println!("{}", grounded.answer);
            if !grounded.sources.is_empty() {
                println!("\nSources:");
                for chunk in &grounded.sources {
                    println!(
                        "  {}. {} (chunk {}, score {:.3})",
                        chunk.rank, chunk.file_name, chunk.chunk_index, chunk.score
                    );
                }
            }
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!(
                "{} documents, {} chunks",
                stats.document_count, stats.chunk_count
            );
        }
    }

    Ok(())
}

fn api_key(config: &Config) -> Result<String> {
    std::env::var(&config.embeddings.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            config.embeddings.api_key_env
        )
    })
}

fn build_embedder(config: &Config) -> Result<OpenAIEmbedder> {
    Ok(OpenAIEmbedder::new(
        api_key(config)?,
        config.embeddings.model.clone(),
        config.embeddings.batch_size,
        config.embeddings.dimensions,
    ))
}
