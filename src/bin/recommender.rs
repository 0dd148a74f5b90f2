//! Recommender binary entry point.
//!
//! Serves the web interface, or runs one-off pipeline commands from the
//! terminal.
//!
//! # Examples
//!
//! Start the web interface:
//! ```bash
//! GEMINI_API_KEY=... recommender serve --port 5000
//! ```
//!
//! Print today's recommendations from the last three days:
//! ```bash
//! recommender --days 3 recommend --format table
//! ```
//!
//! Save a paper to the liked set:
//! ```bash
//! recommender save 1706.03762
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use paper_recommender::{
    embedding::{
        fastembed::FastEmbedProvider, gemini::GeminiEmbedding, openai::OpenAIEmbedding,
        EmbeddingProvider, EmbeddingResult,
    },
    models::{Paper, RankedPaper},
    pipeline::{PipelineConfig, RecommendationPipeline, RecommendationStatus},
    provider::{
        arxiv::{ArxivClient, ArxivConfig},
        FetchCompleteness,
    },
    server::{self, ServerConfig},
    storage::sqlite::SqliteStorage,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    Gemini(GeminiEmbedding),
    OpenAI(OpenAIEmbedding),
    FastEmbed(FastEmbedProvider),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::Gemini(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::Gemini(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::Gemini(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::Gemini(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
        }
    }
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// Google Gemini embeddings (requires GEMINI_API_KEY)
    Gemini,
    /// OpenAI embeddings (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
    /// FastEmbed local models (no API required, downloads weights once)
    FastEmbed,
}

/// Output format for paper listings
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON
    Json,
}

/// Recommend recent arXiv papers based on the papers you saved
#[derive(Parser, Debug)]
#[command(
    name = "recommender",
    version,
    about = "Recommend recent arXiv papers based on the papers you saved",
    long_about = "Learns a preference direction from your saved papers and ranks the most \
                  recently updated arXiv papers against it.

EXAMPLES:
  Start the web interface:
    GEMINI_API_KEY=... recommender serve

  Only consider papers from the last 3 days:
    recommender --days 3 serve

  One-off ranking in the terminal:
    recommender recommend --top-n 20

  Local embeddings, no API key:
    recommender --embedding-provider fast-embed recommend

  Save a paper:
    recommender save 1706.03762"
)]
struct Cli {
    /// SQLite database holding the saved papers
    #[arg(long, global = true, env = "RECOMMENDER_DB_PATH", default_value = "papers.db", value_name = "PATH")]
    db_path: PathBuf,

    /// Skip candidates last updated more than this many days ago
    #[arg(long, global = true, env = "RECOMMENDER_DAYS", value_name = "DAYS")]
    days: Option<u32>,

    /// Number of recent papers fetched as candidates
    #[arg(long, global = true, default_value = "500", value_name = "N")]
    candidates: usize,

    /// Number of ranked papers returned
    #[arg(long, global = true, default_value = "100", value_name = "N")]
    top_n: usize,

    /// Embedding provider
    #[arg(long, global = true, value_enum, default_value = "gemini")]
    embedding_provider: EmbeddingProviderType,

    /// Embedding model name (provider-specific, optional)
    #[arg(long, global = true, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// FastEmbed model cache directory (only used with FastEmbed provider)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web interface
    Serve {
        /// Address to bind
        #[arg(long, env = "RECOMMENDER_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to bind
        #[arg(long, env = "RECOMMENDER_PORT", default_value = "5000")]
        port: u16,
    },

    /// Run the pipeline once and print the ranking
    Recommend {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Save a paper to the liked set
    Save {
        /// arXiv id or abs/pdf URL
        paper_id: String,
    },

    /// List saved papers
    Liked {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Create the embedding provider selected on the command line
fn create_embedding_provider(cli: &Cli) -> Result<DynamicEmbeddingProvider> {
    let model = cli.embedding_model.clone();
    let provider = match cli.embedding_provider {
        EmbeddingProviderType::Gemini => {
            let api_key = std::env::var("GEMINI_API_KEY").context(
                "GEMINI_API_KEY environment variable must be set when using the Gemini provider",
            )?;
            DynamicEmbeddingProvider::Gemini(
                GeminiEmbedding::new(api_key, model)
                    .context("Failed to initialize Gemini provider")?,
            )
        }
        EmbeddingProviderType::OpenAI => {
            let api_key = std::env::var("OPENAI_API_KEY").context(
                "OPENAI_API_KEY environment variable must be set when using the OpenAI provider",
            )?;
            DynamicEmbeddingProvider::OpenAI(
                OpenAIEmbedding::new(api_key, model)
                    .context("Failed to initialize OpenAI provider")?,
            )
        }
        EmbeddingProviderType::FastEmbed => {
            let cache_dir = cli.cache_dir.clone().unwrap_or_else(|| {
                dirs::cache_dir()
                    .map(|p| p.join("fastembed"))
                    .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
            });
            debug!("Using FastEmbed cache directory: {}", cache_dir.display());
            DynamicEmbeddingProvider::FastEmbed(
                FastEmbedProvider::new(model.as_deref(), Some(cache_dir))
                    .context("Failed to initialize FastEmbed provider")?,
            )
        }
    };

    info!(
        "Embedding provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

/// Create storage, making sure the database directory exists
fn create_storage(db_path: &Path) -> Result<SqliteStorage> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }
    Ok(SqliteStorage::new(db_path))
}

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig {
        candidates: cli.candidates.max(1),
        max_age_days: cli.days,
        top_n: cli.top_n.max(1),
        ..PipelineConfig::default()
    }
}

fn create_spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Format ranked papers as a pretty table
fn format_ranked_table(papers: &[RankedPaper]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Updated").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Link").add_attribute(Attribute::Bold),
    ]);

    for (idx, paper) in papers.iter().enumerate() {
        let color = if paper.score > 0.0 {
            Color::Green
        } else {
            Color::White
        };
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&paper.title, 70)),
            Cell::new(paper.published.get(..10).unwrap_or(&paper.published)),
            Cell::new(format!("{:.4}", paper.score)).fg(color),
            Cell::new(&paper.id),
        ]);
    }

    table.to_string()
}

/// Format saved papers as a pretty table
fn format_liked_table(papers: &[Paper]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Id").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Updated").add_attribute(Attribute::Bold),
    ]);

    for paper in papers {
        table.add_row(vec![
            Cell::new(&paper.id),
            Cell::new(truncate(&paper.title, 70)),
            Cell::new(paper.updated.format("%Y-%m-%d")),
        ]);
    }

    table.to_string()
}

async fn run_serve(cli: &Cli, host: String, port: u16) -> Result<()> {
    let embedder = create_embedding_provider(cli)?;
    let arxiv = ArxivClient::new(ArxivConfig::default()).context("Failed to create arXiv client")?;
    let storage = create_storage(&cli.db_path)?;

    let pipeline = RecommendationPipeline::new(arxiv, embedder, storage, pipeline_config(cli));
    pipeline
        .initialize()
        .await
        .context("Failed to initialize database")?;

    let config = ServerConfig { host, port };
    println!("Serving on http://{}:{}", config.host, config.port);
    server::serve(Arc::new(pipeline), &config)
        .await
        .context("Server error")?;
    Ok(())
}

async fn run_recommend(cli: &Cli, format: &OutputFormat) -> Result<()> {
    let embedder = create_embedding_provider(cli)?;
    let arxiv = ArxivClient::new(ArxivConfig::default()).context("Failed to create arXiv client")?;
    let storage = create_storage(&cli.db_path)?;

    let pipeline = RecommendationPipeline::new(arxiv, embedder, storage, pipeline_config(cli));
    pipeline
        .initialize()
        .await
        .context("Failed to initialize database")?;

    let start = Instant::now();
    let spinner = create_spinner("Fetching, embedding and ranking papers")?;
    let result = pipeline.recommend().await;
    spinner.finish_and_clear();
    let recommendations = result.context("Recommendation run failed")?;
    let elapsed = start.elapsed();

    if recommendations.completeness == FetchCompleteness::Truncated {
        warn!("arXiv listing ended early; ranking a partial candidate set");
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&recommendations.papers)
                .context("Failed to serialize recommendations to JSON")?;
            println!("{}", json);
        }
        OutputFormat::Table => match recommendations.status {
            RecommendationStatus::Untrained(reason) => {
                println!("No recommendations: {}. Save a paper first.", reason);
            }
            RecommendationStatus::Ranked => {
                println!("{}", format_ranked_table(&recommendations.papers));
                println!(
                    "\nRanked {} of {} candidates in {:.2}s ({} already liked, {} too old)",
                    recommendations.papers.len(),
                    recommendations.stats.fetched,
                    elapsed.as_secs_f64(),
                    recommendations.stats.already_liked,
                    recommendations.stats.too_old,
                );
            }
        },
    }

    Ok(())
}

async fn run_save(cli: &Cli, paper_id: &str) -> Result<()> {
    let arxiv = ArxivClient::new(ArxivConfig::default()).context("Failed to create arXiv client")?;
    let storage = create_storage(&cli.db_path)?;
    // saving never embeds, so no embedding provider is configured
    let pipeline = RecommendationPipeline::new(arxiv, (), storage, pipeline_config(cli));
    pipeline
        .initialize()
        .await
        .context("Failed to initialize database")?;

    match pipeline
        .save_paper(paper_id)
        .await
        .with_context(|| format!("Failed to save paper '{}'", paper_id))?
    {
        Some(paper) => println!("Saved: {} ({})", paper.title, paper.id),
        None => anyhow::bail!("Paper not found: {}", paper_id),
    }
    Ok(())
}

async fn run_liked(cli: &Cli, format: &OutputFormat) -> Result<()> {
    let arxiv = ArxivClient::new(ArxivConfig::default()).context("Failed to create arXiv client")?;
    let storage = create_storage(&cli.db_path)?;
    let pipeline = RecommendationPipeline::new(arxiv, (), storage, pipeline_config(cli));
    pipeline
        .initialize()
        .await
        .context("Failed to initialize database")?;

    let papers = pipeline
        .liked_papers()
        .await
        .context("Failed to read saved papers")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&papers)
                .context("Failed to serialize saved papers to JSON")?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", format_liked_table(&papers));
            println!("\n{} saved papers", papers.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level);
    debug!("CLI arguments: {:?}", cli);

    match &cli.command {
        Command::Serve { host, port } => run_serve(&cli, host.clone(), *port).await,
        Command::Recommend { format } => run_recommend(&cli, format).await,
        Command::Save { paper_id } => run_save(&cli, paper_id).await,
        Command::Liked { format } => run_liked(&cli, format).await,
    }
}
