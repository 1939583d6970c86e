use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod app;
mod config;
mod db;
mod epg;
mod error;
mod feed;
mod models;

use app::Ingestor;
use config::{read_sources_file, Config};
use error::{AppError, Result};

const USAGE: &str = "Usage: epg-loader [--source URL] [--sources FILE] [--db PATH] [--cache DIR] [--log-level LEVEL] [--stats] [--search TERM] [--channels URL] [--programs CHANNEL]";

/// Command line overrides on top of the config file.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    source: Option<String>,
    sources_file: Option<PathBuf>,
    db_path: Option<String>,
    cache_dir: Option<String>,
    log_level: Option<String>,
    stats_only: bool,
    search: Option<String>,
    channels_of: Option<String>,
    programs_of: Option<String>,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut cli = CliArgs::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .cloned()
                    .ok_or_else(|| AppError::Config(format!("{} needs a value\n{}", arg, USAGE)))
            };
            match arg.as_str() {
                "--source" => cli.source = Some(value()?),
                "--sources" => cli.sources_file = Some(PathBuf::from(value()?)),
                "--db" => cli.db_path = Some(value()?),
                "--cache" => cli.cache_dir = Some(value()?),
                "--log-level" => cli.log_level = Some(value()?),
                "--search" => cli.search = Some(value()?),
                "--channels" => cli.channels_of = Some(value()?),
                "--programs" => cli.programs_of = Some(value()?),
                "--stats" => cli.stats_only = true,
                other => {
                    return Err(AppError::Config(format!(
                        "Unknown argument: {}\n{}",
                        other, USAGE
                    )))
                }
            }
        }

        Ok(cli)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
    }

    fn sources(&self, config: &Config) -> Result<Vec<String>> {
        if let Some(source) = &self.source {
            return Ok(vec![source.clone()]);
        }
        if let Some(path) = &self.sources_file {
            let sources = read_sources_file(path)?;
            tracing::info!("Loaded {} sources from {}", sources.len(), path.display());
            return Ok(sources);
        }
        Ok(config.sources.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = CliArgs::parse(&args)?;

    let mut config = Config::load()?;
    cli.apply(&mut config);
    config.validate()?;

    // Initialize logging (config level unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ingestor = Ingestor::new(&config, Arc::new(epg::TracingReporter)).await?;

    if let Some(term) = &cli.search {
        let matches = ingestor.repository.search_channels(term, 100).await?;
        println!("Found {} channels matching '{}'", matches.len(), term);
        for channel in matches {
            println!(
                "{}\t{}\t{}\t{} programs\t{}",
                channel.id,
                channel.name,
                channel.source_name,
                channel.program_count,
                channel.icon.unwrap_or_default()
            );
        }
        return Ok(());
    }

    if let Some(url) = &cli.channels_of {
        let source_id = models::source_id_for(url);
        let Some(source) = ingestor.repository.get_source(&source_id).await? else {
            println!("Source {} has not been loaded", url);
            return Ok(());
        };
        let updated = source
            .last_updated
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} [{}] from {}: {} channels, {} programs, file {}, updated {}",
            source.name,
            source.id,
            source.url.unwrap_or_default(),
            source.channel_count,
            source.program_count,
            source.file_path.unwrap_or_default(),
            updated
        );
        for channel in ingestor.repository.get_channels(&source.id).await? {
            println!(
                "{}\t{}\t{}\t{}",
                channel.source_id,
                channel.id,
                channel.name,
                channel.icon.unwrap_or_default()
            );
        }
        return Ok(());
    }

    if let Some(channel_id) = &cli.programs_of {
        for program in ingestor.repository.get_programs(channel_id).await? {
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                program.start,
                program.stop,
                program.title,
                program.category.unwrap_or_default(),
                program.description.unwrap_or_default(),
                program.id
            );
        }
        return Ok(());
    }

    if cli.stats_only {
        let stats = ingestor.repository.statistics().await?;
        println!(
            "{} sources, {} channels, {} programs",
            stats.sources, stats.channels, stats.programs
        );
        let now = chrono::Utc::now();
        for source in &stats.source_details {
            let age = source
                .age_hours(now)
                .map(|hours| format!("{:.1} hours ago", hours))
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{}\t{} channels\t{} programs\tupdated {}\t{}",
                source.name,
                source.channel_count,
                source.program_count,
                age,
                source.url.as_deref().unwrap_or_default()
            );
        }
        return Ok(());
    }

    let sources = cli.sources(&config)?;
    tracing::info!("Starting EPG loader with {} sources", sources.len());
    tracing::info!("Database: {}", config.db_path);
    tracing::info!("Cache directory: {}", config.cache_dir);

    // Interrupts are honored between sources.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current source");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let summary = ingestor.run(&sources, &cancel).await;
    if summary.interrupted {
        println!("Interrupted before all sources were processed");
    }
    println!(
        "Processed {}/{} sources in {:.1} seconds",
        summary.succeeded(),
        summary.total_sources,
        summary.elapsed.as_secs_f64()
    );
    for outcome in summary.outcomes.iter().filter(|o| o.success) {
        println!(
            "{}\t{} channels\t{} programs\t{} skipped",
            outcome.url, outcome.channel_count, outcome.program_count, outcome.skipped_count
        );
    }

    Ok(())
}
