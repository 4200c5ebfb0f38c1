use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use match_post_bot::{
    blogger::BloggerClient,
    cleanup::run_cleanup,
    config::{BotConfig, SourceConfig},
    fetcher::RelayFetcher,
    match_parser::MatchParser,
    pipeline::{run_publish, PublishOptions},
    publisher::Publisher,
    retry::{RetryPolicy, Sleeper, TokioSleeper},
    state::UrlMappingStore,
    types::MatchDay,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape the schedule and publish one post per match
    Publish {
        /// Day to publish (yesterday, today, tomorrow); repeatable, defaults to MATCH_DAYS
        #[arg(short, long = "day")]
        days: Vec<MatchDay>,
        /// Optional limit on number of matches to publish
        #[arg(short, long)]
        limit: Option<usize>,
        /// Render posts to stdout without touching the blog
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete posts of finished matches
    Cleanup,
    /// Publish, then clean up
    Run,
    /// Parse a saved schedule page and print the matches as JSON
    ParseFile {
        /// Path to the HTML file to parse
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long, default_value = "today")]
        day: MatchDay,
    },
}

struct Bot {
    config: BotConfig,
    fetcher: RelayFetcher,
    publisher: Publisher<BloggerClient>,
    sleeper: Arc<dyn Sleeper>,
}

impl Bot {
    fn new(config: BotConfig) -> Result<Self> {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let fetcher = RelayFetcher::new(&config)?;
        let client = BloggerClient::new(&config, sleeper.clone())?;
        let publisher = Publisher::new(client, RetryPolicy::from_config(&config.publish), sleeper.clone());
        Ok(Self {
            config,
            fetcher,
            publisher,
            sleeper,
        })
    }

    async fn publish(&self, options: &PublishOptions) -> Result<()> {
        let mut store = UrlMappingStore::load(&self.config.cleanup.state_file)?;
        run_publish(
            &self.config,
            options,
            &self.fetcher,
            &self.publisher,
            &mut store,
            self.sleeper.as_ref(),
            Utc::now(),
        )
        .await?;
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        let mut store = UrlMappingStore::load(&self.config.cleanup.state_file)?;
        run_cleanup(&self.config, &self.fetcher, &self.publisher, &mut store, Utc::now()).await?;
        Ok(())
    }

    fn default_options(&self) -> PublishOptions {
        PublishOptions {
            days: self.config.source.days.clone(),
            limit: None,
            dry_run: false,
        }
    }
}

fn load_config() -> Result<BotConfig> {
    BotConfig::from_env().context("Invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Publish { days, limit, dry_run } => {
            let bot = Bot::new(load_config()?)?;
            let mut options = bot.default_options();
            if !days.is_empty() {
                options.days = days;
            }
            options.limit = limit;
            options.dry_run = dry_run;
            bot.publish(&options).await?;
        }
        Commands::Cleanup => {
            let bot = Bot::new(load_config()?)?;
            bot.cleanup().await?;
        }
        Commands::Run => {
            let bot = Bot::new(load_config()?)?;
            bot.publish(&bot.default_options()).await?;
            bot.cleanup().await?;
        }
        Commands::ParseFile { file, day } => {
            let html = fs::read_to_string(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let origin = std::env::var("SOURCE_ORIGIN").unwrap_or_else(|_| SourceConfig::default().origin);
            let matches = MatchParser::new(&origin)?.parse(&html, day);
            info!("Parsed {} matches from {:?}", matches.len(), file);
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
    }

    Ok(())
}
