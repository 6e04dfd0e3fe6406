use clap::Parser;
use iawic::core::config::IawicConfig;
use iawic::core::engine::CrawlEngine;
use iawic::storage::{JsonBatchWriter, PageSink};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "iawic",
    version,
    about = "Intelligent adaptive web crawler with politeness-aware fetching and structured extraction"
)]
struct Cli {
    /// Starting URL to crawl
    url: String,

    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum crawl depth
    #[arg(long)]
    depth: Option<usize>,

    /// Maximum pages to crawl
    #[arg(long = "max-pages")]
    max_pages: Option<usize>,

    /// Output directory for JSON batches
    #[arg(long = "output-dir")]
    output_dir: Option<String>,

    /// Number of concurrent workers
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long = "log-level", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    log_level: Option<String>,

    /// Enable the MongoDB sink
    #[arg(long)]
    mongo: bool,

    /// Enable the Elasticsearch sink
    #[arg(long)]
    elastic: bool,

    /// Respect robots.txt
    #[arg(long = "respect-robots", action = clap::ArgAction::Set, default_value_t = true)]
    respect_robots: bool,
}

fn init_tracing(log_level: &str) {
    let default_filter = match log_level {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<IawicConfig> {
    let mut config = match &cli.config {
        Some(path) => IawicConfig::from_file(path)?,
        None => IawicConfig::default(),
    };

    config.crawl.url = cli.url.clone();
    if let Some(depth) = cli.depth {
        config.crawl.crawl_depth = depth;
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawl.max_pages = max_pages;
    }
    if let Some(output_dir) = &cli.output_dir {
        config.crawl.output_dir = output_dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }
    config.crawl.respect_robots_txt = cli.respect_robots;
    config.storage.mongo_enabled = cli.mongo;
    config.storage.elastic_enabled = cli.elastic;
    config.validate()?;

    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;

    if config.storage.mongo_enabled {
        warn!("MongoDB sink is not built into this binary; pages go to the JSON writer");
    }
    if config.storage.elastic_enabled {
        warn!("Elasticsearch sink is not built into this binary; pages go to the JSON writer");
    }

    let json_writer = Arc::new(JsonBatchWriter::new(&config.crawl.output_dir)?);
    let seed_url = config.crawl.url.clone();

    let engine = Arc::new(
        CrawlEngine::new(config)?.with_sink(Arc::clone(&json_writer) as Arc<dyn PageSink>),
    );

    // A stop request lets workers finish the URL in hand and exit at their
    // next frontier pop; start() then tears everything down.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let engine = Arc::clone(&engine);
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping crawl");
                interrupted.store(true, Ordering::SeqCst);
                engine.request_stop();
            }
        });
    }

    let summary = Arc::clone(&engine).start(&seed_url).await?;
    json_writer
        .save_summary(&serde_json::to_value(&summary)?)
        .await?;

    if interrupted.load(Ordering::SeqCst) {
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(EXIT_OK)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref().unwrap_or("INFO"));

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("crawl failed: {e:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}
