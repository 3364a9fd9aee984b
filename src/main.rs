use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use tracing::error;
use tracing_subscriber::EnvFilter;

use sitesmith::{
    DocumentCache, EmbeddingClient, IdPolicy, IngestError, IngestionConfig, IngestionPipeline,
    MockEmbedder, OpenAiConfig, OpenAiEmbedder, ResumeTracker, SitemapResolver,
    SqliteVectorStore, VectorStore,
};

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(about = "Sitemap-driven web page ingestion into a vector index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover page URLs from a sitemap
    Crawl(CrawlArgs),

    /// Crawl, chunk, embed, and upsert pages into a vector index
    Ingest(IngestArgs),

    /// Similarity-search a previously populated index
    Search(SearchArgs),
}

#[derive(Args)]
struct CrawlArgs {
    /// Sitemap URL to resolve
    #[arg(long)]
    url: String,

    /// Keep only URLs containing this substring
    #[arg(long, default_value = "")]
    filter: String,
}

#[derive(Args)]
struct IngestArgs {
    /// Sitemap URL to resolve
    #[arg(long)]
    url: String,

    /// Keep only URLs containing this substring
    #[arg(long, default_value = "")]
    filter: String,

    /// Vector index name
    #[arg(long, default_value = "web-rag")]
    index: String,

    /// SQLite database path for the vector store
    #[arg(long, default_value = "./sitesmith.sqlite")]
    db: String,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = IngestionConfig::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters of overlap between consecutive chunks
    #[arg(long, default_value_t = IngestionConfig::DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Concurrent page fetches
    #[arg(long, default_value_t = IngestionConfig::DEFAULT_FETCH_CONCURRENCY)]
    concurrency: usize,

    /// Assign fresh random ids instead of content-derived ones
    #[arg(long)]
    random_ids: bool,

    /// Skip URLs recorded by earlier runs
    #[arg(long)]
    resume: bool,

    /// Cache downloaded pages under this directory
    #[arg(long)]
    cache_dir: Option<String>,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Args)]
struct SearchArgs {
    /// Vector index name
    #[arg(long, default_value = "web-rag")]
    index: String,

    /// SQLite database path for the vector store
    #[arg(long, default_value = "./sitesmith.sqlite")]
    db: String,

    /// Query text
    #[arg(long)]
    query: String,

    /// Number of results
    #[arg(short, default_value_t = 5)]
    k: usize,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Args)]
struct EmbeddingArgs {
    /// Embedding API key (falls back to OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding vector dimension
    #[arg(long, default_value_t = 1536)]
    dimension: usize,

    /// Use deterministic offline embeddings instead of an API
    #[arg(long)]
    mock_embeddings: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Crawl(args) => handle_crawl(args).await,
        Commands::Ingest(args) => handle_ingest(args).await,
        Commands::Search(args) => handle_search(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn handle_crawl(args: &CrawlArgs) -> Result<(), IngestError> {
    let client = build_client(&IngestionConfig::default())?;
    let resolver = SitemapResolver::new(client, IngestionConfig::DEFAULT_REQUEST_TIMEOUT);

    let mut urls = resolver.resolve(&args.url, &args.filter).await;
    urls.sort();

    // Zero results is a valid, if uninteresting, outcome.
    println!("Found {} pages in sitemap", urls.len());
    for url in urls {
        println!("{url}");
    }
    Ok(())
}

async fn handle_ingest(args: &IngestArgs) -> Result<(), IngestError> {
    let config = IngestionConfig::default()
        .with_chunking(args.chunk_size, args.chunk_overlap)
        .with_fetch_concurrency(args.concurrency)
        .with_id_policy(if args.random_ids {
            IdPolicy::Random
        } else {
            IdPolicy::ContentHash
        });
    config.validate()?;

    let client = build_client(&config)?;
    let embedder = build_embedder(&args.embedding, client.clone())?;
    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open(&args.db).await?);

    let mut pipeline = IngestionPipeline::new(client, embedder, store, config)?;

    let cache = args.cache_dir.as_ref().map(DocumentCache::new);
    if let Some(cache) = &cache {
        pipeline = pipeline.with_cache(cache.clone());
    }
    if args.resume {
        let state_path = cache
            .as_ref()
            .map(|cache| cache.state_file())
            .unwrap_or_else(|| "./sitesmith_state.json".into());
        let tracker = ResumeTracker::new(state_path);
        tracker.load().await?;
        pipeline = pipeline.with_resume(tracker);
    }

    let report = pipeline.run(&args.url, &args.filter, &args.index).await?;

    println!("Ingestion complete");
    println!("  urls discovered : {}", report.urls_discovered);
    println!("  pages fetched   : {}", report.pages_fetched);
    println!("  pages failed    : {}", report.pages_failed);
    println!("  pages skipped   : {}", report.pages_skipped);
    println!("  records written : {}", report.records_written);
    println!("  index           : {} ({})", args.index, args.db);
    Ok(())
}

async fn handle_search(args: &SearchArgs) -> Result<(), IngestError> {
    let client = build_client(&IngestionConfig::default())?;
    let embedder = build_embedder(&args.embedding, client)?;
    let store = SqliteVectorStore::open(&args.db).await?;

    let vectors = embedder.embed(std::slice::from_ref(&args.query)).await?;
    let query_vector = vectors
        .first()
        .ok_or_else(|| IngestError::Embedding("no vector returned for query".into()))?;

    let hits = store
        .similarity_search(&args.index, query_vector, args.k)
        .await?;
    if hits.is_empty() {
        println!("No results in index '{}'", args.index);
        return Ok(());
    }
    for hit in hits {
        let source = hit.metadata["source"].as_str().unwrap_or("<unknown>");
        let preview: String = hit.content.chars().take(120).collect();
        println!("{:.4}  {}  {}", hit.score, source, preview);
    }
    Ok(())
}

fn build_client(config: &IngestionConfig) -> Result<Client, IngestError> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .use_rustls_tls()
        .build()
        .map_err(IngestError::from)
}

fn build_embedder(
    args: &EmbeddingArgs,
    client: Client,
) -> Result<Arc<dyn EmbeddingClient>, IngestError> {
    if args.mock_embeddings {
        return Ok(Arc::new(MockEmbedder::new(args.dimension)));
    }
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .ok_or_else(|| {
            IngestError::Config(
                "no embedding API key: pass --api-key or set OPENAI_API_KEY".into(),
            )
        })?;
    let config = OpenAiConfig::new(api_key)
        .with_model(&args.embedding_model, args.dimension)
        .with_base_url(
            std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        );
    Ok(Arc::new(OpenAiEmbedder::new(client, config)?))
}
